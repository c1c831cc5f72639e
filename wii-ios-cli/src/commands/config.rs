use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use wii_ios_lib::Settings;
use wii_ios_lib::settings::{keys_path, resolve_nand_root, save_nand_root, settings_path};

use crate::error::CliError;

/// Show the settings file and the values every command will use.
pub(crate) fn run_config_show(nand_root: Option<PathBuf>) -> Result<(), CliError> {
    let path = settings_path();
    log::info!(
        "{}",
        "wii-ios Configuration".if_supports_color(Stdout, |t| t.bold()),
    );
    log::info!("");

    if path.exists() {
        log::info!(
            "  Settings file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(exists)".if_supports_color(Stdout, |t| t.green()),
        );
    } else {
        log::info!(
            "  Settings file: {} {}",
            path.display().if_supports_color(Stdout, |t| t.cyan()),
            "(not found, using defaults)".if_supports_color(Stdout, |t| t.dimmed()),
        );
    }
    log::info!("");

    let settings = Settings::load()?;
    let root = resolve_nand_root(nand_root);
    let keys = keys_path(&root);
    let keys_state = if keys.exists() {
        "(present)".if_supports_color(Stdout, |t| t.green()).to_string()
    } else {
        "(missing, default keys will be used)"
            .if_supports_color(Stdout, |t| t.yellow())
            .to_string()
    };

    let label = |name: &str| format!("{name}:").if_supports_color(Stdout, |t| t.cyan()).to_string();
    log::info!("  {} {}", label("nand_root"), root.display());
    log::info!("  {} {} {}", label("keys.bin"), keys.display(), keys_state);
    log::info!("  {} {:?}", label("console_type"), settings.console_type);
    log::info!("  {} {}s", label("network_timeout"), settings.network_timeout_secs);
    log::info!("  {} {}", label("ssl_verify"), settings.ssl_verify);
    match &settings.root_key {
        Some(key) => log::info!("  {} {}", label("root_key"), key.display()),
        None => log::info!(
            "  {} {}",
            label("root_key"),
            "built-in".if_supports_color(Stdout, |t| t.dimmed())
        ),
    }
    Ok(())
}

/// Print the settings file path.
pub(crate) fn run_config_path() -> Result<(), CliError> {
    log::info!("{}", settings_path().display());
    Ok(())
}

/// Create the directory if needed and store it as the NAND root.
pub(crate) fn run_config_set_nand_root(dir: &Path) -> Result<(), CliError> {
    std::fs::create_dir_all(dir)?;
    let dir = dir.canonicalize()?;
    save_nand_root(Some(&dir))?;
    log::info!(
        "{} NAND root set to {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        dir.display().if_supports_color(Stdout, |t| t.cyan()),
    );
    Ok(())
}
