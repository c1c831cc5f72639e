use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use wii_ios_crypto::{SignedBlobReader, parse_cert_chain};
use wii_ios_lib::{EmulationKernel, Settings, VerifyContainerType, VerifyMode};

use crate::error::CliError;

/// Container kind from the last component of an issuer such as
/// `Root-CA00000001-XS00000003`.
pub(crate) fn container_kind(issuer: &str) -> Option<VerifyContainerType> {
    let signer = issuer.rsplit('-').next()?;
    match signer.get(..2)? {
        "CP" => Some(VerifyContainerType::Tmd),
        "XS" => Some(VerifyContainerType::Ticket),
        "MS" => Some(VerifyContainerType::Device),
        _ => None,
    }
}

/// Verify a signed blob against a certificate chain through ES.
pub(crate) fn run_verify(
    blob: &Path,
    chain: &Path,
    update_store: bool,
    nand_root: Option<PathBuf>,
) -> Result<(), CliError> {
    let reader = SignedBlobReader::new(std::fs::read(blob)?);
    if !reader.is_signature_valid() {
        return Err(CliError::invalid_input(format!(
            "{} is not a signed blob",
            blob.display()
        )));
    }
    let issuer = reader.issuer();
    let kind = container_kind(&issuer).ok_or_else(|| {
        CliError::invalid_input(format!("Unrecognized issuer {issuer}"))
    })?;

    let chain_bytes = std::fs::read(chain)?;
    let certs = parse_cert_chain(&chain_bytes);
    log::debug!(
        "Chain holds {} certificates: {:?}",
        certs.len(),
        certs.keys().collect::<Vec<_>>()
    );

    let mut settings = Settings::load()?;
    if nand_root.is_some() {
        settings.nand_root = nand_root;
    }
    let mut kernel = EmulationKernel::from_settings(&settings)?;
    let mode = if update_store {
        VerifyMode::UpdateCertStore
    } else {
        VerifyMode::DoNotUpdateCertStore
    };
    kernel.es().verify_container(kind, mode, &reader, &chain_bytes)?;

    log::info!(
        "{} {} ({kind:?}, issuer {issuer}) is correctly signed",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        blob.display().if_supports_color(Stdout, |t| t.cyan()),
    );
    Ok(())
}
