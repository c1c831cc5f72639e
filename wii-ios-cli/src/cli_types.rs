//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wii-ios")]
#[command(about = "Inspect Wii keys, certificates and emulated NAND contents", long_about = None)]
pub(crate) struct Cli {
    /// Emulated NAND root (defaults to the configured or platform data directory)
    #[arg(long, global = true)]
    pub nand_root: Option<PathBuf>,

    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Inspect BootMii keys.bin files
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Sign a file with the console's ECC identity, as IOS does for saves
    Sign {
        /// File to sign
        file: PathBuf,

        /// Title ID in hex (e.g., 0001000152534d45)
        #[arg(long, value_parser = parse_title_id)]
        title_id: u64,

        /// keys.bin to sign with (default: <nand-root>/keys.bin)
        #[arg(long)]
        keys: Option<PathBuf>,

        /// Write the signature followed by the AP certificate to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a signed ticket, TMD or device blob against a certificate chain
    Verify {
        /// Signed blob (ticket, TMD, ...)
        blob: PathBuf,

        /// Concatenated certificates (e.g., cert.sys or a title's cert chain)
        chain: PathBuf,

        /// Append newly seen certificates to /sys/cert.sys in the NAND
        #[arg(long)]
        update_store: bool,
    },

    /// Import and browse the emulated NAND
    Nand {
        #[command(subcommand)]
        action: NandAction,
    },

    /// Manage persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum KeysAction {
    /// Show the identifiers and keys stored in a keys.bin
    Show {
        /// Path to keys.bin
        path: PathBuf,
    },

    /// Build the console's NG device certificate
    DeviceCert {
        /// Path to keys.bin
        path: PathBuf,

        /// Write the raw certificate to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum NandAction {
    /// Import a BootMii nand.bin dump, replacing the current NAND contents
    Import {
        /// Path to nand.bin
        dump: PathBuf,

        /// keys.bin to use when the dump has no appended keys
        #[arg(long)]
        keys: Option<PathBuf>,
    },

    /// List a directory
    Ls {
        /// Wii path
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file's contents
    Cat {
        /// Wii path
        path: String,

        /// Write to this host file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show ownership, permissions and size of an entry
    Stat {
        /// Wii path
        path: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show current settings and the resolved NAND root
    Show,

    /// Print the settings file path
    Path,

    /// Persist the NAND root
    SetNandRoot {
        /// Host directory for the emulated NAND
        dir: PathBuf,
    },
}

pub(crate) fn parse_title_id(s: &str) -> Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || digits.len() > 16 {
        return Err(format!("'{s}' is not a 64-bit hex title ID"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| format!("'{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn title_ids_parse_as_hex() {
        assert_eq!(parse_title_id("0001000152534d45"), Ok(0x0001_0001_5253_4D45));
        assert_eq!(parse_title_id("0x10"), Ok(0x10));
        assert!(parse_title_id("").is_err());
        assert!(parse_title_id("00010001525345450").is_err());
        assert!(parse_title_id("xyz").is_err());
    }

    #[test]
    fn command_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn nand_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["wii-ios", "nand", "ls"]).unwrap();
        match cli.command {
            Commands::Nand {
                action: NandAction::Ls { path },
            } => assert_eq!(path, "/"),
            _ => panic!("expected nand ls"),
        }
    }

    #[test]
    fn global_nand_root_follows_subcommand() {
        let cli =
            Cli::try_parse_from(["wii-ios", "nand", "stat", "/sys", "--nand-root", "/tmp/n"])
                .unwrap();
        assert_eq!(cli.nand_root, Some(PathBuf::from("/tmp/n")));
    }
}
