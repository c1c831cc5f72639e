//! `/dev/fs` and every file opened by path.
//!
//! Opening `/dev/fs` itself yields a control descriptor for the ioctls;
//! opening any other path opens that file through [`HostFileSystem`] and
//! the descriptor then accepts read, write and seek.

use std::collections::BTreeMap;

use wii_ios_core::codes::IPC_SUCCESS;
use wii_ios_core::ipc::MAX_OPEN_PATH;
use wii_ios_core::{
    IoctlRequest, IoctlvRequest, IpcReply, Memory, OpenMode, OpenRequest, ReadWriteRequest,
    SeekRequest, StateError, StateReader, StateWriter,
};
use wii_ios_fs::types::result_code;
use wii_ios_fs::{Fd, FsError, Gid, HostFileSystem, Mode, Modes, SeekMode, Uid};

use crate::device::{Device, DeviceEnv};

pub const ISFS_IOCTL_FORMAT: u32 = 1;
pub const ISFS_IOCTL_GET_STATS: u32 = 2;
pub const ISFS_IOCTL_CREATE_DIR: u32 = 3;
pub const ISFS_IOCTLV_READ_DIR: u32 = 4;
pub const ISFS_IOCTL_SET_ATTR: u32 = 5;
pub const ISFS_IOCTL_GET_ATTR: u32 = 6;
pub const ISFS_IOCTL_DELETE: u32 = 7;
pub const ISFS_IOCTL_RENAME: u32 = 8;
pub const ISFS_IOCTL_CREATE_FILE: u32 = 9;
pub const ISFS_IOCTL_SET_FILE_VERSION_CONTROL: u32 = 10;
pub const ISFS_IOCTL_GET_FILE_STATS: u32 = 11;
pub const ISFS_IOCTLV_GET_USAGE: u32 = 12;
pub const ISFS_IOCTL_SHUTDOWN: u32 = 13;

/// `{owner u32, group u16, path[64], modes[3], attribute u8}`.
pub const ISFS_PARAMS_SIZE: u32 = 0x4A;
const NAND_STATS_SIZE: u32 = 7 * 4;
const FILE_STATS_SIZE: u32 = 8;

/// The parameter block shared by create, get-attribute and set-attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsfsParams {
    pub owner: Uid,
    pub group: Gid,
    pub path: String,
    pub modes: Modes,
    pub attribute: u8,
}

impl IsfsParams {
    pub fn read(memory: &dyn Memory, address: u32) -> Self {
        Self {
            owner: memory.read_u32(address),
            group: memory.read_u16(address + 4),
            path: memory.read_cstring(address + 6, MAX_OPEN_PATH),
            modes: Modes::new(
                Mode::from_u8(memory.read_u8(address + 0x46)),
                Mode::from_u8(memory.read_u8(address + 0x47)),
                Mode::from_u8(memory.read_u8(address + 0x48)),
            ),
            attribute: memory.read_u8(address + 0x49),
        }
    }

    pub fn write(&self, memory: &mut dyn Memory, address: u32) {
        memory.write_u32(self.owner, address);
        memory.write_u16(self.group, address + 4);
        let mut path = [0u8; MAX_OPEN_PATH];
        let len = self.path.len().min(MAX_OPEN_PATH - 1);
        path[..len].copy_from_slice(&self.path.as_bytes()[..len]);
        memory.copy_to_emu(address + 6, &path);
        memory.write_u8(self.modes.owner as u8, address + 0x46);
        memory.write_u8(self.modes.group as u8, address + 0x47);
        memory.write_u8(self.modes.other as u8, address + 0x48);
        memory.write_u8(self.attribute, address + 0x49);
    }
}

/// Caller identity and, for file descriptors, the FS handle behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handle {
    uid: Uid,
    gid: Gid,
    file: Option<Fd>,
}

#[derive(Debug, Default)]
pub struct FsDevice {
    handles: BTreeMap<u32, Handle>,
}

fn fs_mode(flags: OpenMode) -> Mode {
    match flags {
        OpenMode::None => Mode::None,
        OpenMode::Read => Mode::Read,
        OpenMode::Write => Mode::Write,
        OpenMode::ReadWrite => Mode::ReadWrite,
    }
}

fn invalid() -> Option<IpcReply> {
    Some(IpcReply::new(FsError::Invalid.code()))
}

fn reply<T>(result: &Result<T, FsError>) -> Option<IpcReply> {
    Some(IpcReply::new(result_code(result)))
}

impl FsDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn file(&self, fd: u32) -> Option<(Handle, Fd)> {
        let handle = *self.handles.get(&fd)?;
        Some((handle, handle.file?))
    }

    fn get_stats(fs: &HostFileSystem, memory: &mut dyn Memory, request: &IoctlRequest) -> i32 {
        if request.buffer_out_size < NAND_STATS_SIZE {
            return FsError::Invalid.code();
        }
        let stats = fs.get_nand_stats();
        let fields = [
            stats.cluster_size,
            stats.free_clusters,
            stats.used_clusters,
            stats.bad_clusters,
            stats.reserved_clusters,
            stats.free_inodes,
            stats.used_inodes,
        ];
        for (i, value) in fields.into_iter().enumerate() {
            memory.write_u32(value, request.buffer_out + 4 * i as u32);
        }
        IPC_SUCCESS
    }

    fn create(
        fs: &mut HostFileSystem,
        memory: &dyn Memory,
        handle: Handle,
        request: &IoctlRequest,
        is_file: bool,
    ) -> i32 {
        if request.buffer_in_size < ISFS_PARAMS_SIZE {
            return FsError::Invalid.code();
        }
        let params = IsfsParams::read(memory, request.buffer_in);
        let result = if is_file {
            fs.create_file(handle.uid, handle.gid, &params.path, params.attribute, params.modes)
        } else {
            fs.create_directory(
                handle.uid,
                handle.gid,
                &params.path,
                params.attribute,
                params.modes,
            )
        };
        log::debug!(
            "{} {}: {:?}",
            if is_file { "CreateFile" } else { "CreateDirectory" },
            params.path,
            result
        );
        result_code(&result)
    }

    fn set_attribute(
        fs: &mut HostFileSystem,
        memory: &dyn Memory,
        handle: Handle,
        request: &IoctlRequest,
    ) -> i32 {
        if request.buffer_in_size < ISFS_PARAMS_SIZE {
            return FsError::Invalid.code();
        }
        let params = IsfsParams::read(memory, request.buffer_in);
        let result = fs.set_metadata(
            handle.uid,
            &params.path,
            params.owner,
            params.group,
            params.attribute,
            params.modes,
        );
        result_code(&result)
    }

    fn get_attribute(
        fs: &mut HostFileSystem,
        memory: &mut dyn Memory,
        handle: Handle,
        request: &IoctlRequest,
    ) -> i32 {
        if request.buffer_in_size < MAX_OPEN_PATH as u32
            || request.buffer_out_size < ISFS_PARAMS_SIZE
        {
            return FsError::Invalid.code();
        }
        let path = memory.read_cstring(request.buffer_in, MAX_OPEN_PATH);
        match fs.get_metadata(handle.uid, handle.gid, &path) {
            Ok(metadata) => {
                let params = IsfsParams {
                    owner: metadata.uid,
                    group: metadata.gid,
                    path,
                    modes: metadata.modes,
                    attribute: metadata.attribute,
                };
                params.write(memory, request.buffer_out);
                IPC_SUCCESS
            }
            Err(e) => e.code(),
        }
    }

    fn delete(
        fs: &mut HostFileSystem,
        memory: &dyn Memory,
        handle: Handle,
        request: &IoctlRequest,
    ) -> i32 {
        if request.buffer_in_size < MAX_OPEN_PATH as u32 {
            return FsError::Invalid.code();
        }
        let path = memory.read_cstring(request.buffer_in, MAX_OPEN_PATH);
        result_code(&fs.delete(handle.uid, handle.gid, &path))
    }

    fn rename(
        fs: &mut HostFileSystem,
        memory: &dyn Memory,
        handle: Handle,
        request: &IoctlRequest,
    ) -> i32 {
        if request.buffer_in_size < 2 * MAX_OPEN_PATH as u32 {
            return FsError::Invalid.code();
        }
        let old_path = memory.read_cstring(request.buffer_in, MAX_OPEN_PATH);
        let new_path = memory.read_cstring(request.buffer_in + MAX_OPEN_PATH as u32, MAX_OPEN_PATH);
        result_code(&fs.rename(handle.uid, handle.gid, &old_path, &new_path))
    }

    fn get_file_stats(&self, env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let Some((_, fd)) = self.file(request.header.fd) else {
            return FsError::Invalid.code();
        };
        if request.buffer_out_size < FILE_STATS_SIZE {
            return FsError::Invalid.code();
        }
        match env.fs.get_file_status(fd) {
            Ok(status) => {
                env.memory.write_u32(status.size, request.buffer_out);
                env.memory.write_u32(status.offset, request.buffer_out + 4);
                IPC_SUCCESS
            }
            Err(e) => e.code(),
        }
    }

    /// One input (path) and one output gives the entry count; two of each
    /// fills a NUL-separated name list limited by the count in `in[1]`.
    fn read_directory(env: &mut DeviceEnv<'_>, handle: Handle, request: &IoctlvRequest) -> i32 {
        let vectors = request.in_vectors.len();
        if vectors == 0
            || vectors > 2
            || vectors != request.io_vectors.len()
            || request.in_size(0) != MAX_OPEN_PATH as u32
        {
            return FsError::Invalid.code();
        }
        let path = env.memory.read_cstring(request.in_address(0), MAX_OPEN_PATH);
        let names = match env.fs.read_directory(handle.uid, handle.gid, &path) {
            Ok(names) => names,
            Err(e) => return e.code(),
        };

        if vectors == 1 {
            env.memory.write_u32(names.len() as u32, request.io_address(0));
            return IPC_SUCCESS;
        }

        let max_count = env.memory.read_u32(request.in_address(1));
        let mut output = request.io_address(0);
        let written = names.iter().take(max_count as usize).count() as u32;
        for name in names.iter().take(max_count as usize) {
            env.memory.copy_to_emu(output, name.as_bytes());
            env.memory.write_u8(0, output + name.len() as u32);
            output += name.len() as u32 + 1;
        }
        env.memory.write_u32(written, request.io_address(1));
        IPC_SUCCESS
    }

    fn get_usage(env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> i32 {
        if !request.has_number_of_valid_vectors(1, 2)
            || request.in_size(0) != MAX_OPEN_PATH as u32
        {
            return FsError::Invalid.code();
        }
        let path = env.memory.read_cstring(request.in_address(0), MAX_OPEN_PATH);
        match env.fs.get_directory_stats(&path) {
            Ok(stats) => {
                env.memory.write_u32(stats.used_clusters, request.io_address(0));
                env.memory.write_u32(stats.used_inodes, request.io_address(1));
                IPC_SUCCESS
            }
            Err(e) => e.code(),
        }
    }
}

impl Device for FsDevice {
    fn name(&self) -> &'static str {
        "/dev/fs"
    }

    fn open(&mut self, env: &mut DeviceEnv<'_>, request: &OpenRequest) -> Option<IpcReply> {
        let mut handle = Handle {
            uid: request.uid,
            gid: request.gid,
            file: None,
        };
        if request.path != "/dev/fs" {
            match env.fs.open_file(handle.uid, handle.gid, &request.path, fs_mode(request.flags)) {
                Ok(fd) => handle.file = Some(fd),
                Err(e) => {
                    log::debug!("Opening {} failed: {e}", request.path);
                    return Some(IpcReply::new(e.code()));
                }
            }
        }
        self.handles.insert(request.header.fd, handle);
        Some(IpcReply::new(IPC_SUCCESS))
    }

    fn close(&mut self, env: &mut DeviceEnv<'_>, fd: u32) -> Option<IpcReply> {
        let Some(handle) = self.handles.remove(&fd) else {
            return invalid();
        };
        match handle.file {
            Some(file) => reply(&env.fs.close(file)),
            None => Some(IpcReply::new(IPC_SUCCESS)),
        }
    }

    fn read(&mut self, env: &mut DeviceEnv<'_>, request: &ReadWriteRequest) -> Option<IpcReply> {
        let Some((_, fd)) = self.file(request.header.fd) else {
            return invalid();
        };
        if !env.memory.is_valid_range(request.buffer, request.size as usize) {
            log::warn!(
                "FS: read of {} bytes into unmapped buffer {:#010x}",
                request.size,
                request.buffer
            );
            return invalid();
        }
        let remaining = env
            .fs
            .get_file_status(fd)
            .map_or(0, |status| status.size.saturating_sub(status.offset));
        let mut buf = vec![0u8; request.size.min(remaining) as usize];
        match env.fs.read_bytes_from_file(fd, &mut buf) {
            Ok(count) => {
                env.memory.copy_to_emu(request.buffer, &buf[..count as usize]);
                Some(IpcReply::new(count as i32))
            }
            Err(e) => Some(IpcReply::new(e.code())),
        }
    }

    fn write(&mut self, env: &mut DeviceEnv<'_>, request: &ReadWriteRequest) -> Option<IpcReply> {
        let Some((_, fd)) = self.file(request.header.fd) else {
            return invalid();
        };
        if !env.memory.is_valid_range(request.buffer, request.size as usize) {
            log::warn!(
                "FS: write of {} bytes from unmapped buffer {:#010x}",
                request.size,
                request.buffer
            );
            return invalid();
        }
        let data = env.memory.copy_from_emu(request.buffer, request.size as usize);
        match env.fs.write_bytes_to_file(fd, &data) {
            Ok(count) => Some(IpcReply::new(count as i32)),
            Err(e) => Some(IpcReply::new(e.code())),
        }
    }

    fn seek(&mut self, env: &mut DeviceEnv<'_>, request: &SeekRequest) -> Option<IpcReply> {
        let Some((_, fd)) = self.file(request.header.fd) else {
            return invalid();
        };
        let Some(mode) = SeekMode::from_u32(request.mode) else {
            return invalid();
        };
        match env.fs.seek_file(fd, request.offset, mode) {
            Ok(position) => Some(IpcReply::new(position as i32)),
            Err(e) => Some(IpcReply::new(e.code())),
        }
    }

    fn ioctl(&mut self, env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> Option<IpcReply> {
        let Some(handle) = self.handles.get(&request.header.fd).copied() else {
            return invalid();
        };
        let ret = match request.request {
            ISFS_IOCTL_FORMAT => result_code(&env.fs.format(handle.uid)),
            ISFS_IOCTL_GET_STATS => Self::get_stats(env.fs, env.memory, request),
            ISFS_IOCTL_CREATE_DIR => Self::create(env.fs, &*env.memory, handle, request, false),
            ISFS_IOCTL_SET_ATTR => Self::set_attribute(env.fs, &*env.memory, handle, request),
            ISFS_IOCTL_GET_ATTR => Self::get_attribute(env.fs, env.memory, handle, request),
            ISFS_IOCTL_DELETE => Self::delete(env.fs, &*env.memory, handle, request),
            ISFS_IOCTL_RENAME => Self::rename(env.fs, &*env.memory, handle, request),
            ISFS_IOCTL_CREATE_FILE => Self::create(env.fs, &*env.memory, handle, request, true),
            ISFS_IOCTL_SET_FILE_VERSION_CONTROL => IPC_SUCCESS,
            ISFS_IOCTL_GET_FILE_STATS => self.get_file_stats(env, request),
            ISFS_IOCTL_SHUTDOWN => {
                log::info!("/dev/fs: shutdown");
                IPC_SUCCESS
            }
            other => {
                log::warn!("/dev/fs: unknown ioctl {other:#x}");
                FsError::Invalid.code()
            }
        };
        Some(IpcReply::new(ret))
    }

    fn ioctlv(&mut self, env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> Option<IpcReply> {
        let Some(handle) = self.handles.get(&request.header.fd).copied() else {
            return invalid();
        };
        let ret = match request.request {
            ISFS_IOCTLV_READ_DIR => Self::read_directory(env, handle, request),
            ISFS_IOCTLV_GET_USAGE => Self::get_usage(env, request),
            other => {
                log::warn!("/dev/fs: unknown ioctlv {other:#x}");
                FsError::Invalid.code()
            }
        };
        Some(IpcReply::new(ret))
    }

    fn save_state(&self, w: &mut StateWriter) {
        w.write_u32(self.handles.len() as u32);
        for (ipc_fd, handle) in &self.handles {
            w.write_u32(*ipc_fd);
            w.write_u32(handle.uid);
            w.write_u16(handle.gid);
            w.write_bool(handle.file.is_some());
            w.write_u32(handle.file.unwrap_or(0));
        }
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let count = r.read_u32("fs handle count")?;
        if count > 24 {
            return Err(StateError::invalid("fs handle count", count));
        }
        let mut handles = BTreeMap::new();
        for _ in 0..count {
            let ipc_fd = r.read_u32("fs ipc fd")?;
            let uid = r.read_u32("fs uid")?;
            let gid = r.read_u16("fs gid")?;
            let has_file = r.read_bool("fs has file")?;
            let fd = r.read_u32("fs file fd")?;
            handles.insert(
                ipc_fd,
                Handle {
                    uid,
                    gid,
                    file: has_file.then_some(fd),
                },
            );
        }
        self.handles = handles;
        Ok(())
    }
}
