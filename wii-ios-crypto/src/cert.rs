//! Signed blob and certificate readers.
//!
//! Every signed structure (ticket, TMD, certificate) starts with a signature
//! block: a big-endian signature type, the signature, padding to a 0x40
//! boundary, and a 64-byte issuer string. The signed region runs from the
//! issuer to the end of the structure.
//!
//! A certificate follows its signature block with a 0x48-byte header
//! (`key type`, `name[0x40]`, `id`) and the public key.

use std::collections::BTreeMap;

use wii_ios_core::util::{put_u32_be, read_ascii, read_u32_be, write_fixed_ascii};

use crate::hash::{Sha1Digest, sha1};

pub const ISSUER_SIZE: usize = 0x40;
pub const NAME_SIZE: usize = 0x40;
const CERT_HEADER_SIZE: usize = 0x48;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SignatureType {
    Rsa4096 = 0x0001_0000,
    Rsa2048 = 0x0001_0001,
    Ecc = 0x0001_0002,
}

impl SignatureType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x0001_0000 => Some(Self::Rsa4096),
            0x0001_0001 => Some(Self::Rsa2048),
            0x0001_0002 => Some(Self::Ecc),
            _ => None,
        }
    }

    pub fn signature_size(self) -> usize {
        match self {
            Self::Rsa4096 => 0x200,
            Self::Rsa2048 => 0x100,
            Self::Ecc => 0x3C,
        }
    }

    /// Offset of the issuer string (type, signature and padding before it).
    pub fn issuer_offset(self) -> usize {
        match self {
            Self::Rsa4096 => 0x240,
            Self::Rsa2048 => 0x140,
            Self::Ecc => 0x80,
        }
    }

    /// Size of the whole signature block including the issuer.
    pub fn block_size(self) -> usize {
        self.issuer_offset() + ISSUER_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PublicKeyType {
    Rsa4096 = 0,
    Rsa2048 = 1,
    Ecc = 2,
}

impl PublicKeyType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Rsa4096),
            1 => Some(Self::Rsa2048),
            2 => Some(Self::Ecc),
            _ => None,
        }
    }

    /// Size of the raw key (RSA modulus or ECC point).
    pub fn key_size(self) -> usize {
        match self {
            Self::Rsa4096 => 0x200,
            Self::Rsa2048 => 0x100,
            Self::Ecc => 0x3C,
        }
    }

    /// Size of the key area in a certificate, padding included.
    fn key_block_size(self) -> usize {
        match self {
            Self::Rsa4096 => 0x238,
            Self::Rsa2048 => 0x138,
            Self::Ecc => 0x78,
        }
    }
}

/// Certificate size for a signer/key combination, `None` if the pairing
/// never occurs on a console.
pub fn certificate_size(signature: SignatureType, key: PublicKeyType) -> Option<usize> {
    match (signature, key) {
        (SignatureType::Rsa4096, PublicKeyType::Rsa2048) => Some(0x400),
        (SignatureType::Rsa2048, PublicKeyType::Rsa2048) => Some(0x300),
        (SignatureType::Rsa2048, PublicKeyType::Ecc) => Some(0x240),
        (SignatureType::Ecc, PublicKeyType::Ecc) => Some(0x180),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Signed blobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBlobReader {
    bytes: Vec<u8>,
}

impl SignedBlobReader {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn signature_type(&self) -> Option<SignatureType> {
        if self.bytes.len() < 4 {
            return None;
        }
        SignatureType::from_u32(read_u32_be(&self.bytes, 0))
    }

    /// Known signature type and enough bytes for the whole signature block.
    pub fn is_signature_valid(&self) -> bool {
        self.signature_type()
            .is_some_and(|t| self.bytes.len() >= t.block_size())
    }

    pub fn signature(&self) -> &[u8] {
        match self.signature_type() {
            Some(t) if self.is_signature_valid() => &self.bytes[4..4 + t.signature_size()],
            _ => &[],
        }
    }

    pub fn issuer(&self) -> String {
        match self.signature_type() {
            Some(t) if self.is_signature_valid() => {
                let off = t.issuer_offset();
                read_ascii(&self.bytes[off..off + ISSUER_SIZE])
            }
            _ => String::new(),
        }
    }

    /// SHA-1 over the signed region, issuer included.
    pub fn sha1(&self) -> Sha1Digest {
        match self.signature_type() {
            Some(t) if self.is_signature_valid() => sha1(&self.bytes[t.issuer_offset()..]),
            _ => sha1(&[]),
        }
    }

    /// Bytes following the signature block.
    pub fn body(&self) -> &[u8] {
        match self.signature_type() {
            Some(t) if self.is_signature_valid() => &self.bytes[t.block_size()..],
            _ => &[],
        }
    }

    fn body_offset(&self) -> Option<usize> {
        self.signature_type()
            .filter(|_| self.is_signature_valid())
            .map(SignatureType::block_size)
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReader {
    blob: SignedBlobReader,
    valid: bool,
}

impl CertReader {
    /// Wrap raw bytes; anything past the certificate's natural size is
    /// dropped.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        let size = SignedBlobReader::new(bytes.clone()).expected_cert_size();
        let valid = match size {
            Some(size) if bytes.len() >= size => {
                bytes.truncate(size);
                true
            }
            _ => false,
        };
        Self {
            blob: SignedBlobReader::new(bytes),
            valid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn blob(&self) -> &SignedBlobReader {
        &self.blob
    }

    pub fn bytes(&self) -> &[u8] {
        self.blob.bytes()
    }

    pub fn size(&self) -> usize {
        self.blob.bytes().len()
    }

    pub fn issuer(&self) -> String {
        self.blob.issuer()
    }

    pub fn public_key_type(&self) -> Option<PublicKeyType> {
        let off = self.blob.body_offset()?;
        let bytes = self.blob.bytes();
        if bytes.len() < off + 4 {
            return None;
        }
        PublicKeyType::from_u32(read_u32_be(bytes, off))
    }

    pub fn name(&self) -> String {
        match self.header_offset() {
            Some(off) => read_ascii(&self.blob.bytes()[off + 4..off + 4 + NAME_SIZE]),
            None => String::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.header_offset()
            .map_or(0, |off| read_u32_be(self.blob.bytes(), off + 0x44))
    }

    pub fn public_key(&self) -> &[u8] {
        match (self.header_offset(), self.public_key_type()) {
            (Some(off), Some(t)) => {
                let start = off + CERT_HEADER_SIZE;
                &self.blob.bytes()[start..start + t.key_size()]
            }
            _ => &[],
        }
    }

    /// RSA exponent stored right after the modulus; 0 for ECC keys.
    pub fn public_key_exponent(&self) -> u32 {
        match (self.header_offset(), self.public_key_type()) {
            (Some(off), Some(t @ (PublicKeyType::Rsa2048 | PublicKeyType::Rsa4096))) => {
                read_u32_be(self.blob.bytes(), off + CERT_HEADER_SIZE + t.key_size())
            }
            _ => 0,
        }
    }

    fn header_offset(&self) -> Option<usize> {
        if !self.valid {
            return None;
        }
        self.blob.body_offset()
    }
}

impl SignedBlobReader {
    fn expected_cert_size(&self) -> Option<usize> {
        let sig = self.signature_type().filter(|_| self.is_signature_valid())?;
        let off = sig.block_size();
        if self.bytes.len() < off + 4 {
            return None;
        }
        let key = PublicKeyType::from_u32(read_u32_be(&self.bytes, off))?;
        certificate_size(sig, key)
    }
}

/// Split a concatenated certificate chain into certificates keyed by name.
/// Parsing stops at the first malformed certificate.
pub fn parse_cert_chain(bytes: &[u8]) -> BTreeMap<String, CertReader> {
    let mut certs = BTreeMap::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let cert = CertReader::new(&bytes[offset..]);
        if !cert.is_valid() {
            log::debug!("Stopping certificate chain parse at offset {offset:#x}");
            break;
        }
        offset += cert.size();
        certs.insert(cert.name(), cert);
    }
    certs
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Assemble an unsigned certificate. The signature field is left zeroed for
/// the caller to fill with [`set_signature`].
pub fn build_certificate(
    signature_type: SignatureType,
    issuer: &str,
    key_type: PublicKeyType,
    name: &str,
    id: u32,
    public_key: &[u8],
    exponent: u32,
) -> Option<Vec<u8>> {
    let size = certificate_size(signature_type, key_type)?;
    if public_key.len() != key_type.key_size() {
        return None;
    }
    let mut cert = vec![0u8; size];
    put_u32_be(&mut cert, 0, signature_type as u32);
    let issuer_off = signature_type.issuer_offset();
    write_fixed_ascii(&mut cert[issuer_off..issuer_off + ISSUER_SIZE], issuer);

    let hdr = signature_type.block_size();
    put_u32_be(&mut cert, hdr, key_type as u32);
    write_fixed_ascii(&mut cert[hdr + 4..hdr + 4 + NAME_SIZE], name);
    put_u32_be(&mut cert, hdr + 0x44, id);

    let key_off = hdr + CERT_HEADER_SIZE;
    cert[key_off..key_off + public_key.len()].copy_from_slice(public_key);
    if key_type != PublicKeyType::Ecc {
        put_u32_be(&mut cert, key_off + public_key.len(), exponent);
    }
    debug_assert_eq!(key_off + key_type.key_block_size(), size);
    Some(cert)
}

/// Write `signature` into a signed blob whose type field is already set.
/// Returns false if the sizes disagree.
pub fn set_signature(blob: &mut [u8], signature: &[u8]) -> bool {
    let Some(t) = SignedBlobReader::new(blob.to_vec()).signature_type() else {
        return false;
    };
    if signature.len() != t.signature_size() || blob.len() < t.block_size() {
        return false;
    }
    blob[4..4 + signature.len()].copy_from_slice(signature);
    true
}

#[cfg(test)]
#[path = "tests/cert_tests.rs"]
mod tests;
