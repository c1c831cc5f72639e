use thiserror::Error;

use wii_ios_crypto::{IoscError, KeysError};
use wii_ios_fs::FsError;
use wii_ios_lib::{EsError, ImportError, KernelError, SettingsError};

/// Errors that can occur during CLI command execution.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("keys.bin: {0}")]
    Keys(#[from] KeysError),

    #[error("IOSC: {0}")]
    Iosc(#[from] IoscError),

    /// NAND filesystem operation failed
    #[error("{path}: {source}")]
    Fs { path: String, source: FsError },

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Verification failed: {0} ({code})", code = .0.code())]
    Verify(#[from] EsError),

    #[error("Kernel setup failed: {0}")]
    Kernel(#[from] KernelError),

    #[error("Config error: {0}")]
    Settings(#[from] SettingsError),

    /// Input file or argument is unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CliError {
    pub(crate) fn fs(path: impl Into<String>, source: FsError) -> Self {
        Self::Fs {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
