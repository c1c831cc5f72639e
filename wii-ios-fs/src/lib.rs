//! Wii NAND filesystem emulated on top of a host directory.
//!
//! [`HostFileSystem`] reproduces IOS FS semantics (owner/group/other
//! permissions, 16 file handles, clamped reads, no seeking past EOF) while
//! the file bytes live in ordinary host files. Metadata that the host cannot
//! store is kept in an FST persisted as `sys/fst.bin` under the NAND root.

pub mod fst;
pub mod host_fs;
pub mod path;
pub mod types;

pub use host_fs::{HostFileSystem, NoRetry, OpenRetryPrompt};
pub use types::{
    DirectoryStats, Fd, FileAttribute, FileStatus, FsError, Gid, Metadata, Mode, Modes,
    NandStats, SeekMode, Uid,
};
