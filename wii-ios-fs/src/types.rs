use thiserror::Error;

pub type Uid = u32;
pub type Gid = u16;
pub type FileAttribute = u8;
/// Index into the handle table.
pub type Fd = u32;

pub const MAX_HANDLES: usize = 16;
pub const MAX_PATH_DEPTH: usize = 8;
pub const MAX_PATH_LENGTH: usize = 64;
pub const MAX_FILENAME_LENGTH: usize = 12;
pub const CLUSTER_SIZE: u32 = 0x4000;

/// IOS FS failures. The guest sees `-(index + 100)` where `Success` is
/// index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("invalid argument")]
    Invalid,
    #[error("access denied")]
    AccessDenied,
    #[error("superblock write failed")]
    SuperblockWriteFailed,
    #[error("superblock init failed")]
    SuperblockInitFailed,
    #[error("already exists")]
    AlreadyExists,
    #[error("not found")]
    NotFound,
    #[error("FST full")]
    FstFull,
    #[error("no free space")]
    NoFreeSpace,
    #[error("no free handle")]
    NoFreeHandle,
    #[error("too many path components")]
    TooManyPathComponents,
    #[error("in use")]
    InUse,
    #[error("bad block")]
    BadBlock,
    #[error("ECC error")]
    EccError,
    #[error("critical ECC error")]
    CriticalEccError,
    #[error("file not empty")]
    FileNotEmpty,
    #[error("check failed")]
    CheckFailed,
    #[error("unknown error")]
    UnknownError,
    #[error("short read")]
    ShortRead,
}

impl FsError {
    fn index(self) -> i32 {
        match self {
            Self::Invalid => 1,
            Self::AccessDenied => 2,
            Self::SuperblockWriteFailed => 3,
            Self::SuperblockInitFailed => 4,
            Self::AlreadyExists => 5,
            Self::NotFound => 6,
            Self::FstFull => 7,
            Self::NoFreeSpace => 8,
            Self::NoFreeHandle => 9,
            Self::TooManyPathComponents => 10,
            Self::InUse => 11,
            Self::BadBlock => 12,
            Self::EccError => 13,
            Self::CriticalEccError => 14,
            Self::FileNotEmpty => 15,
            Self::CheckFailed => 16,
            Self::UnknownError => 17,
            Self::ShortRead => 18,
        }
    }

    pub fn code(self) -> i32 {
        -(self.index() + 100)
    }
}

/// Guest return value for an FS result.
pub fn result_code<T>(result: &Result<T, FsError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    #[default]
    None = 0,
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl Mode {
    pub fn from_u8(value: u8) -> Self {
        match value & 3 {
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::ReadWrite,
            _ => Self::None,
        }
    }

    /// True if every bit of `requested` is granted by `self`.
    pub fn allows(self, requested: Mode) -> bool {
        (requested as u8 & self as u8) == requested as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modes {
    pub owner: Mode,
    pub group: Mode,
    pub other: Mode,
}

impl Modes {
    pub const fn new(owner: Mode, group: Mode, other: Mode) -> Self {
        Self {
            owner,
            group,
            other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metadata {
    pub uid: Uid,
    pub gid: Gid,
    pub attribute: FileAttribute,
    pub modes: Modes,
    pub is_file: bool,
    pub size: u32,
    pub fst_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandStats {
    pub cluster_size: u32,
    pub free_clusters: u32,
    pub used_clusters: u32,
    pub bad_clusters: u32,
    pub reserved_clusters: u32,
    pub free_inodes: u32,
    pub used_inodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryStats {
    pub used_clusters: u32,
    pub used_inodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStatus {
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    Set = 0,
    Current = 1,
    End = 2,
}

impl SeekMode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Set),
            1 => Some(Self::Current),
            2 => Some(Self::End),
            _ => None,
        }
    }
}
