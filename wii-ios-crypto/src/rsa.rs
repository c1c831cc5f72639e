//! RSA public-key operations for certificate and blob signatures.
//!
//! IOS itself only verifies. Signing exists for building synthetic chains.

use num_bigint::BigUint;
use num_traits::Zero;

/// DER prefix of a SHA-1 `DigestInfo`.
const SHA1_DIGEST_INFO: [u8; 15] = [
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];

/// `signature ^ exponent mod modulus`, left-padded to the modulus length.
///
/// Returns `None` for a zero modulus or a signature that is not smaller than
/// the modulus.
pub fn raw_public_op(modulus: &[u8], exponent: u32, signature: &[u8]) -> Option<Vec<u8>> {
    let n = BigUint::from_bytes_be(modulus);
    if n.is_zero() {
        return None;
    }
    let s = BigUint::from_bytes_be(signature);
    if s >= n {
        return None;
    }
    let m = s.modpow(&BigUint::from(exponent), &n);
    let raw = m.to_bytes_be();
    let mut out = vec![0u8; modulus.len()];
    if raw.len() > out.len() {
        return None;
    }
    let start = out.len() - raw.len();
    out[start..].copy_from_slice(&raw);
    Some(out)
}

/// Build the EMSA-PKCS1-v1_5 encoding of a SHA-1 digest for a modulus of
/// `len` bytes.
fn pkcs1_sha1_encoding(len: usize, digest: &[u8; 20]) -> Option<Vec<u8>> {
    let t_len = SHA1_DIGEST_INFO.len() + digest.len();
    if len < t_len + 11 {
        return None;
    }
    let mut em = vec![0xFFu8; len];
    em[0] = 0x00;
    em[1] = 0x01;
    em[len - t_len - 1] = 0x00;
    em[len - t_len..len - 20].copy_from_slice(&SHA1_DIGEST_INFO);
    em[len - 20..].copy_from_slice(digest);
    Some(em)
}

/// Strict PKCS#1 v1.5 verification of a SHA-1 digest.
pub fn verify_pkcs1v15_sha1(
    modulus: &[u8],
    exponent: u32,
    signature: &[u8],
    digest: &[u8; 20],
) -> bool {
    if signature.len() != modulus.len() {
        return false;
    }
    let Some(decoded) = raw_public_op(modulus, exponent, signature) else {
        return false;
    };
    pkcs1_sha1_encoding(modulus.len(), digest).is_some_and(|expected| expected == decoded)
}

/// Development-signed content often lacks valid padding; only the trailing
/// digest of the raw power is compared.
pub fn verify_digest_suffix(
    modulus: &[u8],
    exponent: u32,
    signature: &[u8],
    digest: &[u8; 20],
) -> bool {
    match raw_public_op(modulus, exponent, signature) {
        Some(decoded) if decoded.len() >= 20 => decoded[decoded.len() - 20..] == digest[..],
        _ => false,
    }
}

/// Produce a PKCS#1 v1.5 SHA-1 signature. Used by tests and tooling that
/// build synthetic certificate chains.
pub fn sign_pkcs1v15_sha1(
    modulus: &[u8],
    private_exponent: &[u8],
    digest: &[u8; 20],
) -> Option<Vec<u8>> {
    let n = BigUint::from_bytes_be(modulus);
    if n.is_zero() {
        return None;
    }
    let em = pkcs1_sha1_encoding(modulus.len(), digest)?;
    let d = BigUint::from_bytes_be(private_exponent);
    let s = BigUint::from_bytes_be(&em).modpow(&d, &n).to_bytes_be();
    let mut out = vec![0u8; modulus.len()];
    let start = out.len().checked_sub(s.len())?;
    out[start..].copy_from_slice(&s);
    Some(out)
}
