use thiserror::Error;
use wii_ios_core::codes;

/// Failures returned by IOSC operations.
///
/// None of these are fatal to the emulated console; callers branch on them
/// and hand the matching IOS code back to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IoscError {
    /// The caller does not own the handle, or the handle is protected
    #[error("access denied")]
    AccessDenied,

    /// Handle out of range or not in use
    #[error("invalid handle")]
    InvalidHandle,

    /// Argument outside what IOSC accepts
    #[error("invalid argument")]
    Invalid,

    /// Type or subtype does not fit the operation
    #[error("invalid object type")]
    InvalidObjectType,

    /// Malformed certificate or key blob
    #[error("invalid format")]
    InvalidFormat,

    /// Signature did not verify
    #[error("check value mismatch")]
    FailCheckValue,

    /// Stored key material has an impossible shape
    #[error("internal failure")]
    FailInternal,

    /// No free slot left in the key table
    #[error("no free key slot")]
    FailAlloc,
}

impl IoscError {
    /// IOS return code written back to the guest.
    pub fn code(self) -> i32 {
        match self {
            Self::AccessDenied => codes::IOSC_EACCES,
            Self::InvalidHandle | Self::Invalid => codes::IOSC_EINVAL,
            Self::InvalidObjectType => codes::IOSC_INVALID_OBJTYPE,
            Self::InvalidFormat => codes::IOSC_INVALID_FORMAT,
            Self::FailCheckValue => codes::IOSC_FAIL_CHECKVALUE,
            Self::FailInternal => codes::IOSC_FAIL_INTERNAL,
            Self::FailAlloc => codes::IOSC_FAIL_ALLOC,
        }
    }
}

/// Convert an IOSC result into the raw return value an IPC reply carries.
pub fn to_return_code<T>(result: Result<T, IoscError>) -> i32 {
    match result {
        Ok(_) => codes::IPC_SUCCESS,
        Err(e) => e.code(),
    }
}
