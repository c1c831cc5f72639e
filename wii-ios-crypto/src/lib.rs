//! Cryptography for the IOS emulation: primitives, certificate parsing and
//! the IOSC key store.

pub mod aes;
pub mod cert;
pub mod ec;
pub mod error;
pub mod hash;
pub mod iosc;
pub mod keys;
pub mod rsa;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cert::{CertReader, PublicKeyType, SignatureType, SignedBlobReader, parse_cert_chain};
pub use error::IoscError;
pub use iosc::{ConsoleType, Handle, Iosc, ObjectSubType, ObjectType};
pub use keys::{BootMiiKeys, KeysError};
