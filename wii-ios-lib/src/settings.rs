//! Persistent settings (NAND location, console type, network options).
//!
//! The CLI and any other frontend read the same file,
//! `~/.config/wii-ios/settings.toml`, so NAND-root resolution is consistent
//! everywhere.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wii_ios_crypto::ConsoleType;

use crate::error::SettingsError;

/// Canonical path to the settings file: `~/.config/wii-ios/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("wii-ios").join("settings.toml")
}

/// NAND root used when neither the command line nor the settings name one.
pub fn default_nand_root() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data.join("wii-ios").join("wii")
}

/// `keys.bin` lives at the top of the NAND root.
pub fn keys_path(nand_root: &Path) -> PathBuf {
    nand_root.join("keys.bin")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    #[default]
    Retail,
    Rvt,
}

impl From<ConsoleKind> for ConsoleType {
    fn from(kind: ConsoleKind) -> Self {
        match kind {
            ConsoleKind::Retail => ConsoleType::Retail,
            ConsoleKind::Rvt => ConsoleType::Rvt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host directory holding the emulated NAND.
    pub nand_root: Option<PathBuf>,
    pub console_type: ConsoleKind,
    /// Blocking `connect` timeout.
    pub network_timeout_secs: u64,
    /// Verify TLS peers against the bundled roots.
    pub ssl_verify: bool,
    /// 512-byte RSA-4096 modulus replacing the built-in root key.
    pub root_key: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nand_root: None,
            console_type: ConsoleKind::Retail,
            network_timeout_secs: 30,
            ssl_verify: true,
            root_key: None,
        }
    }
}

impl Settings {
    /// Load the shared settings file; a missing file yields the defaults.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&settings_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Configured NAND root, or the platform default.
    pub fn nand_root(&self) -> PathBuf {
        self.nand_root.clone().unwrap_or_else(default_nand_root)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

/// Resolve the NAND root using a priority chain:
///
/// 1. CLI override (if `Some`)
/// 2. `nand_root` in `settings.toml`
/// 3. [`default_nand_root`]
pub fn resolve_nand_root(cli_override: Option<PathBuf>) -> PathBuf {
    if let Some(p) = cli_override {
        return p;
    }
    if let Some(p) = load_nand_root(&settings_path()) {
        return p;
    }
    default_nand_root()
}

fn load_nand_root(settings: &Path) -> Option<PathBuf> {
    let contents = std::fs::read_to_string(settings).ok()?;
    let doc: toml::Value = contents.parse().ok()?;
    let root = doc.get("nand_root")?.as_str()?;
    if root.is_empty() {
        None
    } else {
        Some(PathBuf::from(root))
    }
}

/// Save (or clear) the NAND root in the shared settings file.
pub fn save_nand_root(path: Option<&Path>) -> Result<(), SettingsError> {
    save_nand_root_to(&settings_path(), path)
}

/// Surgical update through `toml::Value` so unrelated keys survive.
pub fn save_nand_root_to(settings: &Path, path: Option<&Path>) -> Result<(), SettingsError> {
    let mut doc: toml::Value = match std::fs::read_to_string(settings) {
        Ok(contents) => contents
            .parse()
            .unwrap_or_else(|_| toml::Value::Table(Default::default())),
        Err(_) => toml::Value::Table(Default::default()),
    };

    let table = doc
        .as_table_mut()
        .ok_or_else(|| SettingsError::invalid("settings.toml root is not a table"))?;
    match path {
        Some(p) => {
            table.insert(
                "nand_root".to_string(),
                toml::Value::String(p.to_string_lossy().into_owned()),
            );
        }
        None => {
            table.remove("nand_root");
        }
    }

    // Write atomically
    if let Some(parent) = settings.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(&doc)?;
    let tmp = settings.with_extension("toml.tmp");
    std::fs::write(&tmp, &serialized)?;
    std::fs::rename(&tmp, settings)?;
    log::debug!("Saved NAND root to {}", settings.display());
    Ok(())
}

/// Load the full settings file as a pretty-printed TOML string for display.
pub fn load_settings_string() -> Option<String> {
    let contents = std::fs::read_to_string(settings_path()).ok()?;
    let doc: toml::Value = contents.parse().ok()?;
    toml::to_string_pretty(&doc).ok()
}
