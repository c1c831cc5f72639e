//! BootMii `keys.bin` (OTP + SEEPROM dump).

use std::path::Path;

use thiserror::Error;
use wii_ios_core::util::{put_u32_be, read_ascii, read_u32_be};

pub const KEYS_BIN_SIZE: usize = 0x400;

#[derive(Debug, Error)]
pub enum KeysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("keys.bin too small: expected {expected} bytes, got {actual}")]
    TooSmall { expected: usize, actual: usize },
}

/// Counter record stored twice in SEEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counter {
    pub boot2_version: u8,
    pub unknown: [u8; 7],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootMiiKeys {
    pub creator: [u8; 0x100],
    pub boot1_hash: [u8; 0x14],
    pub common_key: [u8; 0x10],
    pub ng_id: u32,
    pub ng_private_key: [u8; 0x1E],
    /// Overlaps the last two bytes of the private key area in the OTP.
    pub nand_hmac: [u8; 0x14],
    pub nand_key: [u8; 0x10],
    pub backup_key: [u8; 0x10],
    pub unknown: [u8; 8],
    pub ms_id: u32,
    pub ca_id: u32,
    pub ng_key_id: u32,
    pub ng_signature: [u8; 0x3C],
    pub counters: [Counter; 2],
    pub korean_key: [u8; 0x10],
    /// SEEPROM regions that are carried through untouched.
    pub eeprom_pad: [u8; 0x80],
    pub fill: [u8; 0x18],
    pub tail: Vec<u8>,
}

impl Default for BootMiiKeys {
    fn default() -> Self {
        Self {
            creator: [0; 0x100],
            boot1_hash: [0; 0x14],
            common_key: [0; 0x10],
            ng_id: 0,
            ng_private_key: [0; 0x1E],
            nand_hmac: [0; 0x14],
            nand_key: [0; 0x10],
            backup_key: [0; 0x10],
            unknown: [0; 8],
            ms_id: 0,
            ca_id: 0,
            ng_key_id: 0,
            ng_signature: [0; 0x3C],
            counters: [Counter::default(); 2],
            korean_key: [0; 0x10],
            eeprom_pad: [0; 0x80],
            fill: [0; 0x18],
            tail: vec![0; KEYS_BIN_SIZE - 0x280],
        }
    }
}

fn copy_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

impl BootMiiKeys {
    pub fn parse(buf: &[u8]) -> Result<Self, KeysError> {
        if buf.len() < KEYS_BIN_SIZE {
            return Err(KeysError::TooSmall {
                expected: KEYS_BIN_SIZE,
                actual: buf.len(),
            });
        }
        let counter = |off: usize| Counter {
            boot2_version: buf[off],
            unknown: copy_array(buf, off + 1),
        };
        Ok(Self {
            creator: copy_array(buf, 0x000),
            boot1_hash: copy_array(buf, 0x100),
            common_key: copy_array(buf, 0x114),
            ng_id: read_u32_be(buf, 0x124),
            // The HMAC key starts two bytes before the end of this field.
            ng_private_key: copy_array(buf, 0x128),
            nand_hmac: copy_array(buf, 0x144),
            nand_key: copy_array(buf, 0x158),
            backup_key: copy_array(buf, 0x168),
            unknown: copy_array(buf, 0x178),
            eeprom_pad: copy_array(buf, 0x180),
            ms_id: read_u32_be(buf, 0x200),
            ca_id: read_u32_be(buf, 0x204),
            ng_key_id: read_u32_be(buf, 0x208),
            ng_signature: copy_array(buf, 0x20C),
            counters: [counter(0x248), counter(0x250)],
            fill: copy_array(buf, 0x258),
            korean_key: copy_array(buf, 0x270),
            tail: buf[0x280..KEYS_BIN_SIZE].to_vec(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, KeysError> {
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; KEYS_BIN_SIZE];
        buf[0x000..0x100].copy_from_slice(&self.creator);
        buf[0x100..0x114].copy_from_slice(&self.boot1_hash);
        buf[0x114..0x124].copy_from_slice(&self.common_key);
        put_u32_be(&mut buf, 0x124, self.ng_id);
        buf[0x128..0x146].copy_from_slice(&self.ng_private_key);
        buf[0x144..0x158].copy_from_slice(&self.nand_hmac);
        buf[0x158..0x168].copy_from_slice(&self.nand_key);
        buf[0x168..0x178].copy_from_slice(&self.backup_key);
        buf[0x178..0x180].copy_from_slice(&self.unknown);
        buf[0x180..0x200].copy_from_slice(&self.eeprom_pad);
        put_u32_be(&mut buf, 0x200, self.ms_id);
        put_u32_be(&mut buf, 0x204, self.ca_id);
        put_u32_be(&mut buf, 0x208, self.ng_key_id);
        buf[0x20C..0x248].copy_from_slice(&self.ng_signature);
        for (i, counter) in self.counters.iter().enumerate() {
            let off = 0x248 + i * 8;
            buf[off] = counter.boot2_version;
            buf[off + 1..off + 8].copy_from_slice(&counter.unknown);
        }
        buf[0x258..0x270].copy_from_slice(&self.fill);
        buf[0x270..0x280].copy_from_slice(&self.korean_key);
        let tail_len = self.tail.len().min(KEYS_BIN_SIZE - 0x280);
        buf[0x280..0x280 + tail_len].copy_from_slice(&self.tail[..tail_len]);
        buf
    }

    /// Dump creator banner, e.g. "BackupMii v1, ConsoleID: ...".
    pub fn creator_string(&self) -> String {
        read_ascii(&self.creator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut buf = vec![0u8; KEYS_BIN_SIZE];
        buf[..14].copy_from_slice(b"BackupMii v1, ");
        put_u32_be(&mut buf, 0x124, 0x0411_2233);
        buf[0x128] = 0x01;
        buf[0x144..0x158].fill(0x44);
        buf[0x158..0x168].fill(0x58);
        put_u32_be(&mut buf, 0x200, 2);
        put_u32_be(&mut buf, 0x204, 1);
        put_u32_be(&mut buf, 0x208, 0x1234_5678);
        buf[0x20C..0x248].fill(0x5C);
        buf[0x248] = 9;
        buf[0x270..0x280].fill(0x70);
        buf
    }

    #[test]
    fn parses_fields_at_fixed_offsets() {
        let keys = BootMiiKeys::parse(&sample()).unwrap();
        assert_eq!(keys.creator_string(), "BackupMii v1, ");
        assert_eq!(keys.ng_id, 0x0411_2233);
        assert_eq!(keys.ng_private_key[0], 0x01);
        assert_eq!(keys.ng_private_key[0x1C..], [0x44, 0x44]);
        assert_eq!(keys.nand_hmac, [0x44; 0x14]);
        assert_eq!(keys.nand_key, [0x58; 0x10]);
        assert_eq!(keys.ms_id, 2);
        assert_eq!(keys.ca_id, 1);
        assert_eq!(keys.ng_key_id, 0x1234_5678);
        assert_eq!(keys.ng_signature, [0x5C; 0x3C]);
        assert_eq!(keys.counters[0].boot2_version, 9);
        assert_eq!(keys.korean_key, [0x70; 0x10]);
    }

    #[test]
    fn serializes_back_to_the_same_bytes() {
        let raw = sample();
        let keys = BootMiiKeys::parse(&raw).unwrap();
        assert_eq!(keys.to_bytes(), raw);
    }

    #[test]
    fn rejects_short_input() {
        assert!(matches!(
            BootMiiKeys::parse(&[0; 0x200]),
            Err(KeysError::TooSmall { actual: 0x200, .. })
        ));
    }
}
