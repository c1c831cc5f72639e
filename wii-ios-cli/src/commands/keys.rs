use std::path::Path;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use wii_ios_core::util::to_hex;
use wii_ios_crypto::{BootMiiKeys, CertReader, Iosc};

use crate::error::CliError;

fn field(name: &str, value: impl std::fmt::Display) {
    log::info!(
        "  {:<16} {}",
        format!("{name}:").if_supports_color(Stdout, |t| t.cyan()),
        value
    );
}

/// Show the identifiers and keys stored in a keys.bin.
pub(crate) fn run_keys_show(path: &Path) -> Result<(), CliError> {
    let keys = BootMiiKeys::from_file(path)?;

    log::info!("{}", path.display().if_supports_color(Stdout, |t| t.bold()));
    let creator = keys.creator_string();
    if !creator.is_empty() {
        field("creator", creator);
    }
    field("device id", format!("{:08x}", keys.ng_id));
    field("NG key id", format!("{:08x}", keys.ng_key_id));
    field("MS id", format!("{:08x}", keys.ms_id));
    field("CA id", format!("{:08x}", keys.ca_id));
    field("common key", to_hex(&keys.common_key));
    field("NAND key", to_hex(&keys.nand_key));
    field("NAND HMAC", to_hex(&keys.nand_hmac));
    field("backup key", to_hex(&keys.backup_key));
    field("korean key", to_hex(&keys.korean_key));
    field("NG signature", to_hex(&keys.ng_signature));
    Ok(())
}

/// Build the NG device certificate from a keys.bin, optionally saving it.
pub(crate) fn run_keys_device_cert(path: &Path, output: Option<&Path>) -> Result<(), CliError> {
    let keys = BootMiiKeys::from_file(path)?;
    let mut iosc = Iosc::default();
    iosc.load_keys(&keys);

    let cert = iosc.get_device_certificate()?;
    let reader = CertReader::new(cert.clone());
    log::info!("{}", reader.name().if_supports_color(Stdout, |t| t.bold()));
    field("issuer", reader.issuer());
    field("key id", format!("{:08x}", reader.id()));
    field("public key", to_hex(reader.public_key()));
    field("size", format!("{:#x} bytes", cert.len()));

    match output {
        Some(out) => {
            std::fs::write(out, &cert)?;
            log::info!(
                "{} Certificate written to {}",
                "\u{2714}".if_supports_color(Stdout, |t| t.green()),
                out.display().if_supports_color(Stdout, |t| t.cyan()),
            );
        }
        None => field("certificate", to_hex(&cert)),
    }
    Ok(())
}
