use std::path::PathBuf;

use thiserror::Error;
use wii_ios_core::codes;
use wii_ios_crypto::{IoscError, KeysError};
use wii_ios_fs::FsError;

/// Errors from reading or writing `settings.toml`.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Invalid(String),
}

impl SettingsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Errors while bringing up an [`EmulationKernel`](crate::EmulationKernel).
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read root key {path}: {source}")]
    RootKeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Root key rejected: {0}")]
    RootKey(IoscError),

    #[error(transparent)]
    Keys(#[from] KeysError),
}

/// Errors from importing a BootMii NAND dump.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected NAND dump size {0:#x}")]
    BadSize(u64),

    #[error("No SFFS superblock found")]
    NoSuperblock,

    #[error("Corrupted NAND: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Keys(#[from] KeysError),

    #[error("No NAND key available; supply keys.bin or a dump with appended keys")]
    MissingKeys,

    #[error("Filesystem error on {path}: {source}")]
    Fs { path: String, source: FsError },
}

impl ImportError {
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }
}

/// ES failures while verifying signed containers or unwrapping title keys.
#[derive(Debug, Error)]
pub enum EsError {
    #[error("Malformed signed blob")]
    InvalidContainer,

    #[error("Issuer {0} is not in the certificate chain")]
    UnknownIssuer(String),

    #[error("Malformed ticket")]
    InvalidTicket,

    #[error("Short read of the certificate store")]
    ShortRead,

    #[error("Failed to update the certificate store")]
    CertStoreWrite,

    #[error("IOSC: {0}")]
    Iosc(#[from] IoscError),

    #[error("FS: {0}")]
    Fs(#[from] FsError),
}

impl EsError {
    /// Guest-visible return value.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidContainer => codes::ES_EINVAL,
            Self::UnknownIssuer(_) => codes::ES_UNKNOWN_ISSUER,
            Self::InvalidTicket => codes::ES_INVALID_TICKET,
            Self::ShortRead => codes::ES_SHORT_READ,
            Self::CertStoreWrite => codes::ES_EIO,
            Self::Iosc(e) => e.code(),
            Self::Fs(e) => e.code(),
        }
    }
}
