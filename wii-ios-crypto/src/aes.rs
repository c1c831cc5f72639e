//! AES-128 in the two modes IOS uses.

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};

pub const BLOCK_SIZE: usize = 16;

type CbcEnc = cbc::Encryptor<Aes128>;
type CbcDec = cbc::Decryptor<Aes128>;
type Ofb = ofb::Ofb<Aes128>;

/// Whole blocks only; a trailing partial block is dropped.
fn whole_blocks(input: &[u8]) -> &[u8] {
    &input[..input.len() - input.len() % BLOCK_SIZE]
}

/// AES-128-CBC encrypt. `iv` is replaced by the last ciphertext block so a
/// following call continues the chain.
pub fn cbc_encrypt(key: &[u8; 16], iv: &mut [u8; 16], input: &[u8]) -> Vec<u8> {
    let mut buf = whole_blocks(input).to_vec();
    if buf.is_empty() {
        return buf;
    }
    let len = buf.len();
    // Length is a block multiple, so NoPadding cannot fail.
    let _ = CbcEnc::new(key.into(), (&*iv).into()).encrypt_padded_mut::<NoPadding>(&mut buf, len);
    iv.copy_from_slice(&buf[len - BLOCK_SIZE..]);
    buf
}

/// AES-128-CBC decrypt. `iv` is replaced by the last ciphertext block of
/// the input.
pub fn cbc_decrypt(key: &[u8; 16], iv: &mut [u8; 16], input: &[u8]) -> Vec<u8> {
    let input = whole_blocks(input);
    if input.is_empty() {
        return Vec::new();
    }
    let mut buf = input.to_vec();
    let _ = CbcDec::new(key.into(), (&*iv).into()).decrypt_padded_mut::<NoPadding>(&mut buf);
    iv.copy_from_slice(&input[input.len() - BLOCK_SIZE..]);
    buf
}

/// AES-128-OFB keystream applied in place.
pub fn ofb_apply(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut cipher = Ofb::new(key.into(), iv.into());
    cipher.apply_keystream(data);
}
