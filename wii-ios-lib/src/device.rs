//! The interface every emulated `/dev/...` node implements.

use wii_ios_core::codes::IPC_EINVAL;
use wii_ios_core::{
    IoctlRequest, IoctlvRequest, IpcReply, Memory, OpenRequest, ReadWriteRequest, SeekRequest,
    StateError, StateReader, StateWriter,
};
use wii_ios_crypto::Iosc;
use wii_ios_fs::HostFileSystem;
use wii_ios_net::WiiSockMan;

/// Kernel-owned state a device may touch while handling a request.
pub struct DeviceEnv<'a> {
    pub memory: &'a mut dyn Memory,
    pub iosc: &'a mut Iosc,
    pub fs: &'a mut HostFileSystem,
    pub sockets: &'a mut WiiSockMan,
}

/// A device node reachable through IPC.
///
/// Handlers return `None` when the reply is deferred; it is then delivered
/// later through a reply queue. The defaults reject every command except
/// `open` and `close`.
pub trait Device {
    fn name(&self) -> &'static str;

    fn open(&mut self, _env: &mut DeviceEnv<'_>, request: &OpenRequest) -> Option<IpcReply> {
        log::info!("{}: opened as fd {}", self.name(), request.header.fd);
        Some(IpcReply::new(0))
    }

    fn close(&mut self, _env: &mut DeviceEnv<'_>, fd: u32) -> Option<IpcReply> {
        log::debug!("{}: closed fd {fd}", self.name());
        Some(IpcReply::new(0))
    }

    fn read(&mut self, _env: &mut DeviceEnv<'_>, _request: &ReadWriteRequest) -> Option<IpcReply> {
        self.unsupported("read")
    }

    fn write(&mut self, _env: &mut DeviceEnv<'_>, _request: &ReadWriteRequest) -> Option<IpcReply> {
        self.unsupported("write")
    }

    fn seek(&mut self, _env: &mut DeviceEnv<'_>, _request: &SeekRequest) -> Option<IpcReply> {
        self.unsupported("seek")
    }

    fn ioctl(&mut self, _env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> Option<IpcReply> {
        log::warn!("{}: unknown ioctl {:#x}", self.name(), request.request);
        Some(IpcReply::new(IPC_EINVAL))
    }

    fn ioctlv(&mut self, _env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> Option<IpcReply> {
        log::warn!("{}: unknown ioctlv {:#x}", self.name(), request.request);
        Some(IpcReply::new(IPC_EINVAL))
    }

    /// Per-device save-state; most devices keep nothing worth saving.
    fn save_state(&self, _writer: &mut StateWriter) {}

    fn load_state(&mut self, _reader: &mut StateReader<'_>) -> Result<(), StateError> {
        Ok(())
    }

    fn unsupported(&self, command: &str) -> Option<IpcReply> {
        log::warn!("{}: {command} is not supported", self.name());
        Some(IpcReply::new(IPC_EINVAL))
    }
}
