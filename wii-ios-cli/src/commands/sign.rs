use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use wii_ios_core::util::to_hex;
use wii_ios_crypto::{CertReader, Iosc};
use wii_ios_lib::settings::{keys_path, resolve_nand_root};

use crate::error::CliError;

/// Sign a file for `title_id` with the console identity from keys.bin.
pub(crate) fn run_sign(
    file: &Path,
    title_id: u64,
    keys: Option<PathBuf>,
    nand_root: Option<PathBuf>,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let keys = keys.unwrap_or_else(|| keys_path(&resolve_nand_root(nand_root)));
    let mut iosc = Iosc::default();
    if !iosc.load_keys_bin(&keys)? {
        log::warn!("Signing with the default console identity");
    }

    let data = std::fs::read(file)?;
    let (signature, ap_cert) = iosc.sign(title_id, &data)?;
    let ap = CertReader::new(ap_cert.clone());

    log::info!(
        "{} signed for {:016x}",
        file.display().if_supports_color(Stdout, |t| t.bold()),
        title_id
    );
    log::info!("  signature:   {}", to_hex(&signature));
    log::info!("  certificate: {} (issued by {})", ap.name(), ap.issuer());

    if let Some(out) = output {
        let mut blob = signature.to_vec();
        blob.extend_from_slice(&ap_cert);
        std::fs::write(out, &blob)?;
        log::info!(
            "{} Signature and certificate written to {}",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
            out.display().if_supports_color(Stdout, |t| t.cyan()),
        );
    }
    Ok(())
}
