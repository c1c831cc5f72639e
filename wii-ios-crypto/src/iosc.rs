//! IOSC: the IOS crypto object store.
//!
//! Key material never leaves this module. Callers refer to keys by handle,
//! and every operation is gated on the caller's process id being set in the
//! handle's owner mask. The table has a fixed 32 slots; the first twelve
//! hold console keys and cannot be deleted.

use std::path::Path;

use wii_ios_core::{StateError, StateReader, StateWriter, Stateful};

use crate::aes;
use crate::cert::{self, CertReader, PublicKeyType, SignatureType};
use crate::ec;
use crate::error::IoscError;
use crate::hash::{hmac_sha1, sha1};
use crate::keys::{BootMiiKeys, KeysError};
use crate::rsa;

pub type Handle = u32;

pub const HANDLE_CONSOLE_KEY: Handle = 0;
pub const HANDLE_CONSOLE_ID: Handle = 1;
pub const HANDLE_FS_KEY: Handle = 2;
pub const HANDLE_FS_MAC: Handle = 3;
pub const HANDLE_COMMON_KEY: Handle = 4;
pub const HANDLE_PRNG_KEY: Handle = 5;
pub const HANDLE_SD_KEY: Handle = 6;
pub const HANDLE_BOOT2_VERSION: Handle = 7;
pub const HANDLE_UNKNOWN_8: Handle = 8;
pub const HANDLE_UNKNOWN_9: Handle = 9;
pub const HANDLE_FS_VERSION: Handle = 10;
pub const HANDLE_NEW_COMMON_KEY: Handle = 11;
pub const HANDLE_ROOT_KEY: Handle = 0x0FFF_FFFF;

/// Common keys selectable by a ticket's `common_key_index`.
pub const COMMON_KEY_HANDLES: [Handle; 2] = [HANDLE_COMMON_KEY, HANDLE_NEW_COMMON_KEY];

pub const MAX_KEYS: usize = 32;
const NUM_DEFAULT_HANDLES: u32 = 12;

pub const DEFAULT_DEVICE_ID: u32 = 0x0403_AC68;
pub const DEFAULT_KEY_ID: u32 = 0x6AAB_8C59;
const DEFAULT_MS_ID: u32 = 2;
const DEFAULT_CA_ID: u32 = 1;

const DEFAULT_PRIVATE_KEY: [u8; 30] = [
    0x00, 0xAB, 0xEE, 0xC1, 0xDD, 0xB4, 0xA6, 0x16, 0x6B, 0x70, 0xFD, 0x7E, 0x56, 0x67, 0x70, 0x57,
    0x55, 0x27, 0x38, 0xA3, 0x26, 0xC5, 0x46, 0x16, 0xF7, 0x62, 0xC9, 0xED, 0x73, 0xF2,
];
const RETAIL_COMMON_KEY: [u8; 16] = [
    0xEB, 0xE4, 0x2A, 0x22, 0x5E, 0x85, 0x93, 0xE4, 0x48, 0xD9, 0xC5, 0x45, 0x73, 0x81, 0xAA, 0xF7,
];
const RVT_COMMON_KEY: [u8; 16] = [
    0xA1, 0x60, 0x4A, 0x6A, 0x71, 0x23, 0xB5, 0x29, 0xAE, 0x8B, 0xEC, 0x32, 0xC8, 0x16, 0xFC, 0xAA,
];
const SD_KEY: [u8; 16] = [
    0xAB, 0x01, 0xB9, 0xD8, 0xE1, 0x62, 0x2B, 0x08, 0xAF, 0xBA, 0xD8, 0x4D, 0xBF, 0xC2, 0xA5, 0x5D,
];
const KOREAN_COMMON_KEY: [u8; 16] = [
    0x63, 0xB8, 0x2B, 0xB4, 0xF4, 0x61, 0x4E, 0x2E, 0x13, 0xF2, 0xFE, 0xFB, 0xBA, 0x4C, 0x9B, 0x7E,
];

pub const ROOT_KEY_EXPONENT: u32 = 0x10001;
pub const ROOT_KEY_SIZE: usize = 0x200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleType {
    #[default]
    Retail,
    /// Development hardware; accepts debug-signed RSA signatures.
    Rvt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ObjectType {
    #[default]
    SecretKey = 0,
    PublicKey = 1,
    Data = 3,
}

impl ObjectType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::SecretKey),
            1 => Some(Self::PublicKey),
            3 => Some(Self::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ObjectSubType {
    #[default]
    Aes128 = 0,
    Mac = 1,
    Rsa2048 = 2,
    Rsa4096 = 3,
    Ecc233 = 4,
    Data = 5,
    Version = 6,
}

impl ObjectSubType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Aes128),
            1 => Some(Self::Mac),
            2 => Some(Self::Rsa2048),
            3 => Some(Self::Rsa4096),
            4 => Some(Self::Ecc233),
            5 => Some(Self::Data),
            6 => Some(Self::Version),
            _ => None,
        }
    }

    /// Expected key size; 0 means the subtype carries no importable key.
    /// ECC public keys are a full point, private keys a single scalar.
    pub fn key_size(self, object_type: ObjectType) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Mac => 20,
            Self::Ecc233 if object_type == ObjectType::PublicKey => 60,
            Self::Ecc233 => 30,
            Self::Rsa2048 => 0x100,
            Self::Rsa4096 => 0x200,
            Self::Data | Self::Version => 0,
        }
    }

    fn for_public_key(key_type: PublicKeyType) -> Self {
        match key_type {
            PublicKeyType::Rsa4096 => Self::Rsa4096,
            PublicKeyType::Rsa2048 => Self::Rsa2048,
            PublicKeyType::Ecc => Self::Ecc233,
        }
    }

    fn is_rsa(self) -> bool {
        matches!(self, Self::Rsa2048 | Self::Rsa4096)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyEntry {
    pub in_use: bool,
    pub object_type: ObjectType,
    pub subtype: ObjectSubType,
    pub data: Vec<u8>,
    /// RSA exponent, console id or version number depending on subtype.
    pub misc_data: u32,
    pub owner_mask: u32,
}

impl KeyEntry {
    fn new(
        object_type: ObjectType,
        subtype: ObjectSubType,
        data: Vec<u8>,
        misc_data: u32,
        owner_mask: u32,
    ) -> Self {
        Self {
            in_use: true,
            object_type,
            subtype,
            data,
            misc_data,
            owner_mask,
        }
    }

    fn is(&self, object_type: ObjectType, subtype: ObjectSubType) -> bool {
        self.object_type == object_type && self.subtype == subtype
    }
}

fn is_default_handle(handle: Handle) -> bool {
    handle == HANDLE_ROOT_KEY || handle < NUM_DEFAULT_HANDLES
}

/// Build a blank ECC-signed certificate for an ECC public key derived from
/// `private_key`.
fn make_blank_ecc_cert(
    issuer: &str,
    name: &str,
    private_key: &ec::PrivateKey,
    key_id: u32,
) -> Result<Vec<u8>, IoscError> {
    if private_key.iter().all(|&b| b == 0) {
        log::error!("Refusing to build certificate {name} from a zero ECC private key");
        return Err(IoscError::Invalid);
    }
    let public_key = ec::priv_to_public(private_key);
    cert::build_certificate(
        SignatureType::Ecc,
        issuer,
        PublicKeyType::Ecc,
        name,
        key_id,
        &public_key,
        0,
    )
    .ok_or(IoscError::FailInternal)
}

fn private_key_array(data: &[u8]) -> Result<ec::PrivateKey, IoscError> {
    data.try_into().map_err(|_| {
        log::error!("ECC private key has {} bytes", data.len());
        IoscError::FailInternal
    })
}

fn public_key_array(data: &[u8]) -> Result<ec::PublicKey, IoscError> {
    data.try_into().map_err(|_| {
        log::error!("ECC public key has {} bytes", data.len());
        IoscError::FailInternal
    })
}

#[derive(Debug, Clone)]
pub struct Iosc {
    key_entries: Vec<KeyEntry>,
    root_key_entry: KeyEntry,
    console_signature: ec::Signature,
    console_key_id: u32,
    ms_id: u32,
    ca_id: u32,
    console_type: ConsoleType,
}

impl Iosc {
    pub fn new(console_type: ConsoleType) -> Self {
        let mut iosc = Self {
            key_entries: vec![KeyEntry::default(); MAX_KEYS],
            root_key_entry: KeyEntry::new(
                ObjectType::PublicKey,
                ObjectSubType::Rsa4096,
                vec![0; ROOT_KEY_SIZE],
                ROOT_KEY_EXPONENT,
                0,
            ),
            console_signature: [0; 60],
            console_key_id: DEFAULT_KEY_ID,
            ms_id: DEFAULT_MS_ID,
            ca_id: DEFAULT_CA_ID,
            console_type,
        };
        iosc.load_default_entries();
        iosc
    }

    /// Replace the RSA-4096 root public key modulus.
    pub fn with_root_key(mut self, modulus: &[u8]) -> Result<Self, IoscError> {
        self.set_root_key(modulus)?;
        Ok(self)
    }

    pub fn set_root_key(&mut self, modulus: &[u8]) -> Result<(), IoscError> {
        if modulus.len() != ROOT_KEY_SIZE {
            return Err(IoscError::InvalidFormat);
        }
        self.root_key_entry.data = modulus.to_vec();
        Ok(())
    }

    pub fn console_type(&self) -> ConsoleType {
        self.console_type
    }

    fn load_default_entries(&mut self) {
        use ObjectSubType as S;
        use ObjectType as T;

        let common_key = match self.console_type {
            ConsoleType::Retail => RETAIL_COMMON_KEY,
            ConsoleType::Rvt => RVT_COMMON_KEY,
        };
        let defaults = [
            KeyEntry::new(T::SecretKey, S::Ecc233, DEFAULT_PRIVATE_KEY.to_vec(), 0, 3),
            KeyEntry::new(T::Data, S::Data, Vec::new(), DEFAULT_DEVICE_ID, 0x0FFF_FFFF),
            KeyEntry::new(T::SecretKey, S::Aes128, vec![0; 16], 0, 5),
            KeyEntry::new(T::SecretKey, S::Mac, vec![0; 20], 0, 5),
            KeyEntry::new(T::SecretKey, S::Aes128, common_key.to_vec(), 0, 3),
            KeyEntry::new(T::SecretKey, S::Aes128, vec![0; 16], 0, 3),
            KeyEntry::new(T::SecretKey, S::Aes128, SD_KEY.to_vec(), 0, 3),
            KeyEntry::new(T::Data, S::Version, Vec::new(), 0, 3),
            KeyEntry::new(T::Data, S::Version, Vec::new(), 0, 3),
            KeyEntry::new(T::Data, S::Version, Vec::new(), 0, 3),
            KeyEntry::new(T::Data, S::Version, Vec::new(), 0, 3),
            KeyEntry::new(T::SecretKey, S::Aes128, KOREAN_COMMON_KEY.to_vec(), 0, 3),
        ];
        for (slot, entry) in self.key_entries.iter_mut().zip(defaults) {
            *slot = entry;
        }
    }

    /// Override console keys from a parsed `keys.bin`.
    pub fn load_keys(&mut self, keys: &BootMiiKeys) {
        self.key_entries[HANDLE_CONSOLE_KEY as usize].data = keys.ng_private_key.to_vec();
        self.console_signature = keys.ng_signature;
        self.ms_id = keys.ms_id;
        self.ca_id = keys.ca_id;
        self.console_key_id = keys.ng_key_id;
        self.key_entries[HANDLE_CONSOLE_ID as usize].misc_data = keys.ng_id;
        self.key_entries[HANDLE_FS_KEY as usize].data = keys.nand_key.to_vec();
        self.key_entries[HANDLE_FS_MAC as usize].data = keys.nand_hmac.to_vec();
        self.key_entries[HANDLE_PRNG_KEY as usize].data = keys.backup_key.to_vec();
        self.key_entries[HANDLE_BOOT2_VERSION as usize].misc_data =
            keys.counters[0].boot2_version as u32;
    }

    /// Load `keys.bin` if it exists. Returns whether keys were loaded; a
    /// missing file keeps the defaults.
    pub fn load_keys_bin(&mut self, path: &Path) -> Result<bool, KeysError> {
        if !path.exists() {
            log::warn!(
                "{} could not be found. Default values will be used.",
                path.display()
            );
            return Ok(false);
        }
        let keys = BootMiiKeys::from_file(path).inspect_err(|e| {
            log::error!("Failed to read {}: {e}", path.display());
        })?;
        self.load_keys(&keys);
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Handle lookup
    // -----------------------------------------------------------------------

    fn find_entry(&self, handle: Handle) -> Option<&KeyEntry> {
        self.key_entries.get(handle as usize)
    }

    fn find_entry_or_root(&self, handle: Handle) -> Option<&KeyEntry> {
        if handle == HANDLE_ROOT_KEY {
            return Some(&self.root_key_entry);
        }
        self.find_entry(handle)
    }

    fn find_entry_mut(&mut self, handle: Handle) -> Option<&mut KeyEntry> {
        self.key_entries.get_mut(handle as usize)
    }

    fn has_ownership(&self, handle: Handle, pid: u32) -> bool {
        handle == HANDLE_ROOT_KEY
            || self
                .get_ownership(handle)
                .is_ok_and(|mask| 1u32.checked_shl(pid).is_some_and(|bit| mask & bit != 0))
    }

    // -----------------------------------------------------------------------
    // Object lifecycle
    // -----------------------------------------------------------------------

    pub fn create_object(
        &mut self,
        object_type: ObjectType,
        subtype: ObjectSubType,
        pid: u32,
    ) -> Result<Handle, IoscError> {
        let Some(owner_mask) = 1u32.checked_shl(pid) else {
            return Err(IoscError::Invalid);
        };
        let Some(index) = self.key_entries.iter().position(|e| !e.in_use) else {
            return Err(IoscError::FailAlloc);
        };
        self.key_entries[index] = KeyEntry::new(
            object_type,
            subtype,
            vec![0; subtype.key_size(object_type)],
            0,
            owner_mask,
        );
        Ok(index as Handle)
    }

    pub fn delete_object(&mut self, handle: Handle, pid: u32) -> Result<(), IoscError> {
        if is_default_handle(handle) {
            return Err(IoscError::AccessDenied);
        }
        match self.find_entry(handle) {
            Some(entry) if entry.in_use => {}
            _ => return Err(IoscError::InvalidHandle),
        }
        if !self.has_ownership(handle, pid) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self
            .find_entry_mut(handle)
            .ok_or(IoscError::InvalidHandle)?;
        entry.in_use = false;
        entry.data.clear();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Key import
    // -----------------------------------------------------------------------

    /// Decrypt a 16-byte AES key with `decrypt_handle` and store it in
    /// `dest`. `iv` is advanced like any other CBC call.
    pub fn import_secret_key(
        &mut self,
        dest: Handle,
        decrypt_handle: Handle,
        iv: &mut [u8; 16],
        encrypted_key: &[u8; 16],
        pid: u32,
    ) -> Result<(), IoscError> {
        let decrypted = self.decrypt(decrypt_handle, iv, encrypted_key, pid)?;
        let mut key = [0u8; 16];
        key.copy_from_slice(&decrypted);
        self.import_plain_secret_key(dest, &key, pid)
    }

    fn import_plain_secret_key(
        &mut self,
        dest: Handle,
        key: &[u8; 16],
        pid: u32,
    ) -> Result<(), IoscError> {
        if !self.has_ownership(dest, pid) || is_default_handle(dest) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self.find_entry_mut(dest).ok_or(IoscError::InvalidHandle)?;
        if !entry.is(ObjectType::SecretKey, ObjectSubType::Aes128) {
            return Err(IoscError::InvalidObjectType);
        }
        entry.data = key.to_vec();
        Ok(())
    }

    /// Store a public key. RSA subtypes need an exponent.
    pub fn import_public_key(
        &mut self,
        dest: Handle,
        public_key: &[u8],
        exponent: Option<u32>,
        pid: u32,
    ) -> Result<(), IoscError> {
        if !self.has_ownership(dest, pid) || is_default_handle(dest) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self.find_entry_mut(dest).ok_or(IoscError::InvalidHandle)?;
        if entry.object_type != ObjectType::PublicKey {
            return Err(IoscError::InvalidObjectType);
        }
        let size = entry.subtype.key_size(ObjectType::PublicKey);
        if size == 0 {
            return Err(IoscError::InvalidObjectType);
        }
        if public_key.len() < size {
            return Err(IoscError::InvalidFormat);
        }
        let misc_data = if entry.subtype.is_rsa() {
            exponent.ok_or(IoscError::FailInternal)?
        } else {
            entry.misc_data
        };
        entry.data = public_key[..size].to_vec();
        entry.misc_data = misc_data;
        Ok(())
    }

    /// ECDH between an ECC-233 private and public key. The AES key stored in
    /// `dest` is the first 16 bytes of SHA-1 over the shared X coordinate.
    pub fn compute_shared_key(
        &mut self,
        dest: Handle,
        private_handle: Handle,
        public_handle: Handle,
        pid: u32,
    ) -> Result<(), IoscError> {
        if !self.has_ownership(dest, pid)
            || !self.has_ownership(private_handle, pid)
            || !self.has_ownership(public_handle, pid)
            || is_default_handle(dest)
        {
            return Err(IoscError::AccessDenied);
        }
        let (Some(dest_entry), Some(private_entry), Some(public_entry)) = (
            self.find_entry(dest),
            self.find_entry(private_handle),
            self.find_entry(public_handle),
        ) else {
            return Err(IoscError::InvalidHandle);
        };
        if !dest_entry.is(ObjectType::SecretKey, ObjectSubType::Aes128)
            || !private_entry.is(ObjectType::SecretKey, ObjectSubType::Ecc233)
            || !public_entry.is(ObjectType::PublicKey, ObjectSubType::Ecc233)
        {
            return Err(IoscError::InvalidObjectType);
        }

        let private_key = private_key_array(&private_entry.data)?;
        let public_key = public_key_array(&public_entry.data)?;
        let shared = ec::compute_shared_secret(&private_key, &public_key);
        let digest = sha1(&shared[..shared.len() / 2]);

        let dest_entry = self.find_entry_mut(dest).ok_or(IoscError::InvalidHandle)?;
        dest_entry.data = digest[..16].to_vec();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Symmetric crypto
    // -----------------------------------------------------------------------

    fn aes_key(&self, handle: Handle, pid: u32) -> Result<[u8; 16], IoscError> {
        if !self.has_ownership(handle, pid) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self.find_entry(handle).ok_or(IoscError::InvalidHandle)?;
        if !entry.is(ObjectType::SecretKey, ObjectSubType::Aes128) {
            return Err(IoscError::InvalidObjectType);
        }
        entry.data.as_slice().try_into().map_err(|_| {
            log::error!("AES key in handle {handle} has {} bytes", entry.data.len());
            IoscError::FailInternal
        })
    }

    pub fn encrypt(
        &self,
        handle: Handle,
        iv: &mut [u8; 16],
        input: &[u8],
        pid: u32,
    ) -> Result<Vec<u8>, IoscError> {
        let key = self.aes_key(handle, pid)?;
        Ok(aes::cbc_encrypt(&key, iv, input))
    }

    pub fn decrypt(
        &self,
        handle: Handle,
        iv: &mut [u8; 16],
        input: &[u8],
        pid: u32,
    ) -> Result<Vec<u8>, IoscError> {
        let key = self.aes_key(handle, pid)?;
        Ok(aes::cbc_decrypt(&key, iv, input))
    }

    /// HMAC-SHA1 with a MAC key (the NAND HMAC key, typically).
    pub fn compute_mac(
        &self,
        handle: Handle,
        data: &[u8],
        pid: u32,
    ) -> Result<[u8; 20], IoscError> {
        if !self.has_ownership(handle, pid) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self.find_entry(handle).ok_or(IoscError::InvalidHandle)?;
        if !entry.is(ObjectType::SecretKey, ObjectSubType::Mac) {
            return Err(IoscError::InvalidObjectType);
        }
        if entry.data.len() != ObjectSubType::Mac.key_size(ObjectType::SecretKey) {
            return Err(IoscError::FailInternal);
        }
        Ok(hmac_sha1(&entry.data, data))
    }

    // -----------------------------------------------------------------------
    // Signatures and certificates
    // -----------------------------------------------------------------------

    pub fn verify_public_key_sign(
        &self,
        digest: &[u8; 20],
        signer: Handle,
        signature: &[u8],
        pid: u32,
    ) -> Result<(), IoscError> {
        if !self.has_ownership(signer, pid) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self
            .find_entry_or_root(signer)
            .ok_or(IoscError::InvalidHandle)?;
        if entry.object_type != ObjectType::PublicKey {
            return Err(IoscError::InvalidObjectType);
        }

        match entry.subtype {
            ObjectSubType::Rsa2048 | ObjectSubType::Rsa4096 => {
                let size = entry.subtype.key_size(ObjectType::PublicKey);
                if entry.data.len() != size {
                    log::error!(
                        "RSA key in handle {signer:#x} has {} bytes",
                        entry.data.len()
                    );
                    return Err(IoscError::FailInternal);
                }
                if signature.len() != size {
                    return Err(IoscError::FailCheckValue);
                }
                if rsa::verify_pkcs1v15_sha1(&entry.data, entry.misc_data, signature, digest) {
                    return Ok(());
                }
                if self.console_type == ConsoleType::Rvt
                    && rsa::verify_digest_suffix(&entry.data, entry.misc_data, signature, digest)
                {
                    return Ok(());
                }
                log::warn!("RSA signature verification with handle {signer:#x} failed");
                Err(IoscError::FailCheckValue)
            }
            ObjectSubType::Ecc233 => {
                let public_key = public_key_array(&entry.data)?;
                let Ok(signature) = <&ec::Signature>::try_from(signature) else {
                    return Err(IoscError::FailCheckValue);
                };
                if ec::verify(&public_key, signature, digest) {
                    Ok(())
                } else {
                    Err(IoscError::FailCheckValue)
                }
            }
            _ => Err(IoscError::InvalidObjectType),
        }
    }

    /// Verify `cert` against `signer` and import its public key into `dest`.
    /// Nothing is written unless every check passes.
    pub fn import_certificate(
        &mut self,
        cert: &CertReader,
        signer: Handle,
        dest: Handle,
        pid: u32,
    ) -> Result<(), IoscError> {
        if !self.has_ownership(signer, pid) || !self.has_ownership(dest, pid) {
            return Err(IoscError::AccessDenied);
        }
        let (Some(signer_entry), Some(dest_entry)) =
            (self.find_entry_or_root(signer), self.find_entry_or_root(dest))
        else {
            return Err(IoscError::InvalidHandle);
        };
        if signer_entry.object_type != ObjectType::PublicKey
            || dest_entry.object_type != ObjectType::PublicKey
        {
            return Err(IoscError::InvalidObjectType);
        }
        if !cert.is_valid() {
            return Err(IoscError::InvalidFormat);
        }
        let key_type = cert.public_key_type().ok_or(IoscError::InvalidFormat)?;
        if ObjectSubType::for_public_key(key_type) != dest_entry.subtype {
            return Err(IoscError::InvalidObjectType);
        }

        self.verify_public_key_sign(&cert.blob().sha1(), signer, cert.blob().signature(), pid)
            .map_err(|_| IoscError::FailCheckValue)?;

        let exponent = (key_type != PublicKeyType::Ecc).then(|| cert.public_key_exponent());
        self.import_public_key(dest, cert.public_key(), exponent, pid)
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    pub fn get_ownership(&self, handle: Handle) -> Result<u32, IoscError> {
        match self.find_entry(handle) {
            Some(entry) if entry.in_use => Ok(entry.owner_mask),
            _ => Err(IoscError::InvalidHandle),
        }
    }

    /// Hand a handle to other processes. Only a sole owner may do this, and
    /// the kernel, ES and FS bits can never be granted.
    pub fn set_ownership(
        &mut self,
        handle: Handle,
        new_owner: u32,
        pid: u32,
    ) -> Result<(), IoscError> {
        if !self.has_ownership(handle, pid) {
            return Err(IoscError::AccessDenied);
        }
        let entry = self.find_entry_mut(handle).ok_or(IoscError::InvalidHandle)?;
        let caller_bit = 1u32 << pid;
        let mask = entry.owner_mask | caller_bit;
        if mask != caller_bit {
            return Err(IoscError::AccessDenied);
        }
        entry.owner_mask = (new_owner & !7) | mask;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Console identity
    // -----------------------------------------------------------------------

    pub fn get_device_id(&self) -> u32 {
        self.key_entries[HANDLE_CONSOLE_ID as usize].misc_data
    }

    pub fn is_using_default_id(&self) -> bool {
        self.get_device_id() == DEFAULT_DEVICE_ID
    }

    fn console_private_key(&self) -> Result<ec::PrivateKey, IoscError> {
        private_key_array(&self.key_entries[HANDLE_CONSOLE_KEY as usize].data)
    }

    /// The console's NG certificate, signed by the manufacturing signer.
    pub fn get_device_certificate(&self) -> Result<Vec<u8>, IoscError> {
        let issuer = format!("Root-CA{:08x}-MS{:08x}", self.ca_id, self.ms_id);
        let name = format!("NG{:08x}", self.get_device_id());
        let mut cert = make_blank_ecc_cert(
            &issuer,
            &name,
            &self.console_private_key()?,
            self.console_key_id,
        )?;
        if !cert::set_signature(&mut cert, &self.console_signature) {
            return Err(IoscError::FailInternal);
        }
        Ok(cert)
    }

    /// Sign `data` for a title. Returns the signature and a freshly made AP
    /// certificate that is itself signed by the console key.
    pub fn sign(
        &self,
        title_id: u64,
        data: &[u8],
    ) -> Result<(ec::Signature, Vec<u8>), IoscError> {
        let ap_private = ec::generate_private_key();
        let issuer = format!(
            "Root-CA{:08x}-MS{:08x}-NG{:08x}",
            self.ca_id,
            self.ms_id,
            self.get_device_id()
        );
        let name = format!("AP{title_id:016x}");
        let mut ap_cert = make_blank_ecc_cert(&issuer, &name, &ap_private, 0)?;

        let cert_digest = sha1(&ap_cert[SignatureType::Ecc.issuer_offset()..]);
        let cert_signature = ec::sign(&self.console_private_key()?, &cert_digest);
        if !cert::set_signature(&mut ap_cert, &cert_signature) {
            return Err(IoscError::FailInternal);
        }

        let signature = ec::sign(&ap_private, &sha1(data));
        Ok((signature, ap_cert))
    }
}

impl Default for Iosc {
    fn default() -> Self {
        Self::new(ConsoleType::Retail)
    }
}

impl Stateful for Iosc {
    fn save_state(&self, w: &mut StateWriter) {
        for entry in &self.key_entries {
            w.write_bool(entry.in_use);
            w.write_u8(entry.object_type as u8);
            w.write_u8(entry.subtype as u8);
            w.write_bytes(&entry.data);
            w.write_u32(entry.misc_data);
            w.write_u32(entry.owner_mask);
        }
        w.write_raw(&self.console_signature);
        w.write_u32(self.ms_id);
        w.write_u32(self.ca_id);
        w.write_u32(self.console_key_id);
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut entries = Vec::with_capacity(MAX_KEYS);
        for _ in 0..MAX_KEYS {
            let in_use = r.read_bool("key_entry.in_use")?;
            let raw_type = r.read_u8("key_entry.type")?;
            let raw_subtype = r.read_u8("key_entry.subtype")?;
            entries.push(KeyEntry {
                in_use,
                object_type: ObjectType::from_u8(raw_type)
                    .ok_or(StateError::invalid("key_entry.type", raw_type))?,
                subtype: ObjectSubType::from_u8(raw_subtype)
                    .ok_or(StateError::invalid("key_entry.subtype", raw_subtype))?,
                data: r.read_bytes("key_entry.data")?,
                misc_data: r.read_u32("key_entry.misc_data")?,
                owner_mask: r.read_u32("key_entry.owner_mask")?,
            });
        }
        let mut signature = [0u8; 60];
        r.read_raw(&mut signature, "console_signature")?;
        let ms_id = r.read_u32("ms_id")?;
        let ca_id = r.read_u32("ca_id")?;
        let console_key_id = r.read_u32("console_key_id")?;

        self.key_entries = entries;
        self.console_signature = signature;
        self.ms_id = ms_id;
        self.ca_id = ca_id;
        self.console_key_id = console_key_id;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/iosc_tests.rs"]
mod tests;
