//! IOS IPC command numbers and return codes.
//!
//! Return codes are plain `i32` constants because they are written verbatim
//! into guest memory; the typed error enums of the individual subsystems
//! convert into these values.

/// IPC command written by the guest at offset 0 of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IpcCommand {
    Open = 1,
    Close = 2,
    Read = 3,
    Write = 4,
    Seek = 5,
    Ioctl = 6,
    Ioctlv = 7,
    Reply = 8,
}

impl IpcCommand {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::Open,
            2 => Self::Close,
            3 => Self::Read,
            4 => Self::Write,
            5 => Self::Seek,
            6 => Self::Ioctl,
            7 => Self::Ioctlv,
            8 => Self::Reply,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Generic IPC
// ---------------------------------------------------------------------------

pub const IPC_SUCCESS: i32 = 0;
pub const IPC_EACCES: i32 = -1;
pub const IPC_EEXIST: i32 = -2;
pub const IPC_EINVAL: i32 = -4;
pub const IPC_EMAX: i32 = -5;
pub const IPC_ENOENT: i32 = -6;
pub const IPC_EQUEUEFULL: i32 = -8;
pub const IPC_EIO: i32 = -12;
pub const IPC_ENOMEM: i32 = -22;

// ---------------------------------------------------------------------------
// ES
// ---------------------------------------------------------------------------

pub const ES_SHORT_READ: i32 = -1009;
pub const ES_EIO: i32 = -1010;
pub const ES_EINVAL: i32 = -1017;
pub const ES_UNKNOWN_ISSUER: i32 = -1027;
pub const ES_INVALID_TICKET: i32 = -1028;

// ---------------------------------------------------------------------------
// IOSC
// ---------------------------------------------------------------------------

pub const IOSC_EACCES: i32 = -2000;
pub const IOSC_EEXIST: i32 = -2001;
pub const IOSC_EINVAL: i32 = -2002;
pub const IOSC_EMAX: i32 = -2003;
pub const IOSC_ENOENT: i32 = -2004;
pub const IOSC_INVALID_OBJTYPE: i32 = -2005;
pub const IOSC_INVALID_RNG: i32 = -2006;
pub const IOSC_INVALID_FLAG: i32 = -2007;
pub const IOSC_INVALID_FORMAT: i32 = -2008;
pub const IOSC_INVALID_VERSION: i32 = -2009;
pub const IOSC_INVALID_SIGNER: i32 = -2010;
pub const IOSC_FAIL_CHECKVALUE: i32 = -2011;
pub const IOSC_FAIL_INTERNAL: i32 = -2012;
pub const IOSC_FAIL_ALLOC: i32 = -2013;
pub const IOSC_INVALID_SIZE: i32 = -2014;
pub const IOSC_INVALID_ADDR: i32 = -2015;
pub const IOSC_INVALID_ALIGN: i32 = -2016;
