//! wii-ios CLI
//!
//! Command-line interface for Wii key material, signed blobs and the
//! emulated NAND.

mod cli_types;
mod commands;
mod error;

use std::io::Write;

use clap::Parser;
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use cli_types::{Cli, Commands, ConfigAction, KeysAction, NandAction};
use commands::{config, keys, nand, sign, verify};
use error::CliError;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        log::error!("{} {e}", "\u{2718}".if_supports_color(Stderr, |t| t.red()));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let nand_root = cli.nand_root;
    match cli.command {
        Commands::Keys { action } => match action {
            KeysAction::Show { path } => keys::run_keys_show(&path),
            KeysAction::DeviceCert { path, output } => {
                keys::run_keys_device_cert(&path, output.as_deref())
            }
        },
        Commands::Sign {
            file,
            title_id,
            keys,
            output,
        } => sign::run_sign(&file, title_id, keys, nand_root, output.as_deref()),
        Commands::Verify {
            blob,
            chain,
            update_store,
        } => verify::run_verify(&blob, &chain, update_store, nand_root),
        Commands::Nand { action } => match action {
            NandAction::Import { dump, keys } => nand::run_nand_import(&dump, keys, nand_root),
            NandAction::Ls { path } => nand::run_nand_ls(&path, nand_root),
            NandAction::Cat { path, output } => {
                nand::run_nand_cat(&path, output.as_deref(), nand_root)
            }
            NandAction::Stat { path } => nand::run_nand_stat(&path, nand_root),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => config::run_config_show(nand_root),
            ConfigAction::Path => config::run_config_path(),
            ConfigAction::SetNandRoot { dir } => config::run_config_set_nand_root(&dir),
        },
    }
}

/// Human output goes through `log::info!`, so info lines print bare and
/// everything else carries its level. `RUST_LOG` overrides the flags.
fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else if quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| match record.level() {
            Level::Info => writeln!(buf, "{}", record.args()),
            level => writeln!(buf, "[{level} {}] {}", record.target(), record.args()),
        })
        .init();
}
