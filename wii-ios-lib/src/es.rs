//! ES signature verification, the certificate store and title keys.
//!
//! A signed container names its signer as `Root-CAxxxxxxxx-YYyyyyyyyy`.
//! Verification imports the CA certificate against the root key, the
//! issuer certificate against the CA, and finally checks the container's
//! signature with the issuer key. Every temporary IOSC handle is released
//! before returning.

use wii_ios_core::pid;
use wii_ios_core::util::{read_u32_be, read_u64_be};
use wii_ios_crypto::iosc::{COMMON_KEY_HANDLES, HANDLE_COMMON_KEY, HANDLE_ROOT_KEY};
use wii_ios_crypto::{
    CertReader, Handle, Iosc, ObjectSubType, ObjectType, SignedBlobReader, parse_cert_chain,
};
use wii_ios_fs::{FsError, HostFileSystem, Mode, Modes, SeekMode};

use crate::error::EsError;

pub const CERT_STORE_PATH: &str = "/sys/cert.sys";

const CERT_STORE_MODES: Modes = Modes::new(Mode::ReadWrite, Mode::ReadWrite, Mode::Read);

/// What kind of container is being verified; each accepts one issuer
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyContainerType {
    Tmd,
    Ticket,
    Device,
}

impl VerifyContainerType {
    fn issuer_prefix(self) -> &'static str {
        match self {
            Self::Tmd => "CP",
            Self::Ticket => "XS",
            Self::Device => "MS",
        }
    }

    fn issuer_subtype(self) -> ObjectSubType {
        match self {
            Self::Device => ObjectSubType::Ecc233,
            Self::Tmd | Self::Ticket => ObjectSubType::Rsa2048,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    DoNotUpdateCertStore,
    UpdateCertStore,
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

pub const TICKET_SIZE: usize = 0x2A4;

/// Read-only view over a v0 ticket.
#[derive(Debug, Clone)]
pub struct TicketReader {
    blob: SignedBlobReader,
}

impl TicketReader {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: SignedBlobReader::new(bytes),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.blob.bytes().len() >= TICKET_SIZE && self.blob.is_signature_valid()
    }

    pub fn blob(&self) -> &SignedBlobReader {
        &self.blob
    }

    pub fn encrypted_title_key(&self) -> [u8; 16] {
        let mut key = [0u8; 16];
        if let Some(src) = self.blob.bytes().get(0x1BF..0x1CF) {
            key.copy_from_slice(src);
        }
        key
    }

    pub fn ticket_id(&self) -> u64 {
        self.read_u64(0x1D0)
    }

    /// Zero for tickets that are not console-bound.
    pub fn device_id(&self) -> u32 {
        match self.blob.bytes() {
            bytes if bytes.len() >= 0x1DC => read_u32_be(bytes, 0x1D8),
            _ => 0,
        }
    }

    pub fn title_id(&self) -> u64 {
        self.read_u64(0x1DC)
    }

    pub fn common_key_index(&self) -> u8 {
        self.blob.bytes().get(0x1F1).copied().unwrap_or(0)
    }

    fn read_u64(&self, offset: usize) -> u64 {
        let bytes = self.blob.bytes();
        if bytes.len() < offset + 8 {
            return 0;
        }
        read_u64_be(bytes, offset)
    }

    /// The title key is wrapped with the title ID as the CBC IV.
    fn title_key_iv(&self) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&self.title_id().to_be_bytes());
        iv
    }

    fn common_key_handle(&self) -> Handle {
        COMMON_KEY_HANDLES
            .get(usize::from(self.common_key_index()))
            .copied()
            .unwrap_or(HANDLE_COMMON_KEY)
    }
}

// ---------------------------------------------------------------------------
// EsCore
// ---------------------------------------------------------------------------

/// ES operations over the kernel's key store and NAND.
pub struct EsCore<'a> {
    iosc: &'a mut Iosc,
    fs: &'a mut HostFileSystem,
}

impl<'a> EsCore<'a> {
    pub fn new(iosc: &'a mut Iosc, fs: &'a mut HostFileSystem) -> Self {
        Self { iosc, fs }
    }

    /// Check `blob`'s signature against the chain in `cert_chain`.
    pub fn verify_container(
        &mut self,
        kind: VerifyContainerType,
        mode: VerifyMode,
        blob: &SignedBlobReader,
        cert_chain: &[u8],
    ) -> Result<(), EsError> {
        let issuer = self.verify(kind, mode, blob, cert_chain)?;
        self.release(issuer);
        Ok(())
    }

    /// Verify a certificate and import its public key into `dest`, which
    /// must be an object of the certificate's key type.
    pub fn verify_certificate(
        &mut self,
        kind: VerifyContainerType,
        mode: VerifyMode,
        cert: &CertReader,
        cert_chain: &[u8],
        dest: Handle,
    ) -> Result<(), EsError> {
        let issuer = self.verify(kind, mode, cert.blob(), cert_chain)?;
        let imported = self.iosc.import_certificate(cert, issuer, dest, pid::ES);
        self.release(issuer);
        if let Err(e) = imported {
            log::error!("Failed to import {} into handle {dest}: {e}", cert.name());
        }
        Ok(imported?)
    }

    /// Verify and return the issuer key handle, which the caller releases.
    fn verify(
        &mut self,
        kind: VerifyContainerType,
        mode: VerifyMode,
        blob: &SignedBlobReader,
        cert_chain: &[u8],
    ) -> Result<Handle, EsError> {
        if !blob.is_signature_valid() {
            return Err(EsError::InvalidContainer);
        }
        let issuer_name = blob.issuer();
        let parents: Vec<&str> = issuer_name.split('-').collect();
        let &[_, ca_name, signer_name] = parents.as_slice() else {
            log::error!("Malformed issuer {issuer_name}");
            return Err(EsError::InvalidContainer);
        };

        let certs = parse_cert_chain(cert_chain);
        let (Some(issuer_cert), Some(ca_cert)) = (certs.get(signer_name), certs.get(ca_name))
        else {
            return Err(EsError::UnknownIssuer(issuer_name));
        };
        if !signer_name.starts_with(kind.issuer_prefix()) {
            log::error!("{kind:?} cannot be signed by {signer_name}");
            return Err(EsError::InvalidContainer);
        }

        let ca = self
            .iosc
            .create_object(ObjectType::PublicKey, ObjectSubType::Rsa2048, pid::ES)?;
        let issuer = self.verify_with_ca(kind, blob, ca, ca_cert, issuer_cert);
        self.release(ca);
        let issuer = issuer?;

        if mode == VerifyMode::UpdateCertStore {
            let issuer_written = self.write_new_cert_to_store(issuer_cert);
            let ca_written = self.write_new_cert_to_store(ca_cert);
            if let Err(e) = issuer_written.and(ca_written) {
                log::error!("Failed to update the certificate store: {e}");
                self.release(issuer);
                return Err(e);
            }
        }
        Ok(issuer)
    }

    fn verify_with_ca(
        &mut self,
        kind: VerifyContainerType,
        blob: &SignedBlobReader,
        ca: Handle,
        ca_cert: &CertReader,
        issuer_cert: &CertReader,
    ) -> Result<Handle, EsError> {
        self.iosc
            .import_certificate(ca_cert, HANDLE_ROOT_KEY, ca, pid::ES)
            .inspect_err(|e| log::error!("Failed to import CA certificate: {e}"))?;

        let issuer = self
            .iosc
            .create_object(ObjectType::PublicKey, kind.issuer_subtype(), pid::ES)?;
        let checked = self
            .iosc
            .import_certificate(issuer_cert, ca, issuer, pid::ES)
            .inspect_err(|e| log::error!("Failed to import issuer certificate: {e}"))
            .and_then(|()| {
                self.iosc
                    .verify_public_key_sign(&blob.sha1(), issuer, blob.signature(), pid::ES)
                    .inspect_err(|e| log::error!("Container signature check failed: {e}"))
            });
        match checked {
            Ok(()) => Ok(issuer),
            Err(e) => {
                self.release(issuer);
                Err(e.into())
            }
        }
    }

    fn release(&mut self, handle: Handle) {
        if let Err(e) = self.iosc.delete_object(handle, pid::ES) {
            log::warn!("Failed to release IOSC handle {handle}: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Certificate store
    // -----------------------------------------------------------------------

    /// Contents of `/sys/cert.sys`, read as the kernel.
    pub fn read_cert_store(&mut self) -> Result<Vec<u8>, EsError> {
        let fd = self
            .fs
            .open_file(pid::KERNEL, 0, CERT_STORE_PATH, Mode::Read)?;
        let result = self.read_open_file(fd);
        let _ = self.fs.close(fd);
        result
    }

    fn read_open_file(&mut self, fd: u32) -> Result<Vec<u8>, EsError> {
        let size = self.fs.get_file_status(fd)?.size;
        let mut data = vec![0u8; size as usize];
        let read = self.fs.read_bytes_from_file(fd, &mut data)?;
        if read != size {
            return Err(EsError::ShortRead);
        }
        Ok(data)
    }

    /// Append `cert` to the store unless a certificate with its name is
    /// already present.
    pub fn write_new_cert_to_store(&mut self, cert: &CertReader) -> Result<(), EsError> {
        let name = cert.name();
        if let Ok(store) = self.read_cert_store() {
            if parse_cert_chain(&store).contains_key(&name) {
                return Ok(());
            }
        }

        let uid = pid::KERNEL;
        let created = self
            .fs
            .create_full_path(uid, 0, CERT_STORE_PATH, 0, CERT_STORE_MODES)
            .and_then(|()| {
                match self.fs.create_file(uid, 0, CERT_STORE_PATH, 0, CERT_STORE_MODES) {
                    Err(FsError::AlreadyExists) => Ok(()),
                    other => other,
                }
            });
        if let Err(e) = created {
            log::error!("Failed to create {CERT_STORE_PATH}: {e}");
            return Err(EsError::CertStoreWrite);
        }

        let fd = self
            .fs
            .open_file(uid, 0, CERT_STORE_PATH, Mode::ReadWrite)
            .map_err(|_| EsError::CertStoreWrite)?;
        let written = self
            .fs
            .seek_file(fd, 0, SeekMode::End)
            .and_then(|_| self.fs.write_bytes_to_file(fd, cert.bytes()));
        let _ = self.fs.close(fd);
        match written {
            Ok(n) if n as usize == cert.bytes().len() => {
                log::info!("Added {name} to {CERT_STORE_PATH}");
                Ok(())
            }
            _ => Err(EsError::CertStoreWrite),
        }
    }

    // -----------------------------------------------------------------------
    // Title keys
    // -----------------------------------------------------------------------

    /// Unwrap a ticket's title key with the common key it names.
    pub fn decrypt_title_key(&self, ticket: &TicketReader) -> Result<[u8; 16], EsError> {
        if !ticket.is_valid() {
            return Err(EsError::InvalidTicket);
        }
        let mut iv = ticket.title_key_iv();
        let key = self.iosc.decrypt(
            ticket.common_key_handle(),
            &mut iv,
            &ticket.encrypted_title_key(),
            pid::ES,
        )?;
        key.as_slice()
            .try_into()
            .map_err(|_| EsError::InvalidTicket)
    }

    /// Unwrap a ticket's title key directly into a new ES-owned AES object.
    pub fn import_title_key(&mut self, ticket: &TicketReader) -> Result<Handle, EsError> {
        if !ticket.is_valid() {
            return Err(EsError::InvalidTicket);
        }
        let handle = self
            .iosc
            .create_object(ObjectType::SecretKey, ObjectSubType::Aes128, pid::ES)?;
        let mut iv = ticket.title_key_iv();
        let imported = self.iosc.import_secret_key(
            handle,
            ticket.common_key_handle(),
            &mut iv,
            &ticket.encrypted_title_key(),
            pid::ES,
        );
        if let Err(e) = imported {
            self.release(handle);
            return Err(e.into());
        }
        Ok(handle)
    }
}

#[cfg(test)]
#[path = "tests/es_tests.rs"]
mod tests;
