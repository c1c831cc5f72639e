//! The IPC entry point: fd table, device lookup and reply delivery.

use wii_ios_core::codes::{IPC_EINVAL, IPC_EMAX, IPC_ENOENT};
use wii_ios_core::{
    IoctlRequest, IoctlvRequest, IpcCommand, IpcReply, Memory, OpenRequest, ReadWriteRequest,
    ReplyQueue, Request, SeekRequest, StateError, StateReader, StateWriter, Stateful,
};
use wii_ios_crypto::Iosc;
use wii_ios_fs::HostFileSystem;
use wii_ios_net::WiiSockMan;

use crate::device::{Device, DeviceEnv};
use crate::devices::{AesDevice, FsDevice, NetIpTopDevice, NetSslDevice};
use crate::error::KernelError;
use crate::es::EsCore;
use crate::settings::{Settings, keys_path};

/// Guest-visible IPC descriptors are `0..IPC_MAX_FDS`.
pub const IPC_MAX_FDS: usize = 24;
/// Fixed descriptor that always reaches `/dev/aes` without an open.
pub const AES_FD_ALIAS: u32 = 0x10000;

pub struct EmulationKernel {
    devices: Vec<Box<dyn Device>>,
    fd_map: [Option<usize>; IPC_MAX_FDS],
    iosc: Iosc,
    fs: HostFileSystem,
    sockets: WiiSockMan,
}

impl EmulationKernel {
    /// Kernel with the standard device set registered.
    pub fn new(iosc: Iosc, fs: HostFileSystem) -> Self {
        let mut kernel = Self::empty(iosc, fs);
        kernel
            .register(AesDevice)
            .register(FsDevice::new())
            .register(NetIpTopDevice)
            .register(NetSslDevice);
        kernel
    }

    /// Kernel without any devices; see [`register`](Self::register).
    pub fn empty(iosc: Iosc, fs: HostFileSystem) -> Self {
        Self {
            devices: Vec::new(),
            fd_map: [None; IPC_MAX_FDS],
            iosc,
            fs,
            sockets: WiiSockMan::new(),
        }
    }

    /// Build a kernel from persisted settings: console type, optional root
    /// key, `keys.bin` from the NAND root and the network options.
    pub fn from_settings(settings: &Settings) -> Result<Self, KernelError> {
        let nand_root = settings.nand_root();
        let mut iosc = Iosc::new(settings.console_type.into());
        if let Some(path) = &settings.root_key {
            let modulus = std::fs::read(path).map_err(|source| KernelError::RootKeyFile {
                path: path.clone(),
                source,
            })?;
            iosc.set_root_key(&modulus).map_err(KernelError::RootKey)?;
        }
        iosc.load_keys_bin(&keys_path(&nand_root))?;

        std::fs::create_dir_all(&nand_root)?;
        let mut kernel = Self::new(iosc, HostFileSystem::new(nand_root));
        kernel.sockets.set_connect_timeout(settings.network_timeout());
        kernel.sockets.set_ssl_verify(settings.ssl_verify);
        Ok(kernel)
    }

    /// Add a device. Names must be unique; the first registration wins.
    pub fn register<D: Device + 'static>(&mut self, device: D) -> &mut Self {
        if self.device_index(device.name()).is_some() {
            log::warn!("Device {} is already registered", device.name());
        } else {
            self.devices.push(Box::new(device));
        }
        self
    }

    pub fn device_names(&self) -> Vec<&'static str> {
        self.devices.iter().map(|d| d.name()).collect()
    }

    pub fn iosc(&self) -> &Iosc {
        &self.iosc
    }

    pub fn iosc_mut(&mut self) -> &mut Iosc {
        &mut self.iosc
    }

    pub fn fs(&self) -> &HostFileSystem {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut HostFileSystem {
        &mut self.fs
    }

    pub fn sockets(&self) -> &WiiSockMan {
        &self.sockets
    }

    pub fn sockets_mut(&mut self) -> &mut WiiSockMan {
        &mut self.sockets
    }

    /// ES operations against this kernel's key store and NAND.
    pub fn es(&mut self) -> EsCore<'_> {
        EsCore::new(&mut self.iosc, &mut self.fs)
    }

    pub fn open_fd_count(&self) -> usize {
        self.fd_map.iter().filter(|fd| fd.is_some()).count()
    }

    fn device_index(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name() == name)
    }

    fn device_for_fd(&self, fd: u32) -> Option<usize> {
        match fd {
            AES_FD_ALIAS => self.device_index("/dev/aes"),
            fd => self.fd_map.get(fd as usize).copied().flatten(),
        }
    }

    /// Handle the request at `address`. An immediate reply is written back
    /// to guest memory and also returned; deferred replies arrive through
    /// [`update`](Self::update).
    pub fn execute_ipc_command(&mut self, memory: &mut dyn Memory, address: u32) -> Option<i32> {
        let request = Request::parse(memory, address);
        let reply = self.handle_ipc_command(memory, &request)?;
        ReplyQueue::write_reply(memory, &request, reply.return_value);
        Some(reply.return_value)
    }

    pub fn handle_ipc_command(
        &mut self,
        memory: &mut dyn Memory,
        request: &Request,
    ) -> Option<IpcReply> {
        let Some(command) = request.ipc_command().filter(|c| *c != IpcCommand::Reply) else {
            log::warn!("Invalid IPC command {:#x} at {:#010x}", request.command, request.address);
            return Some(IpcReply::new(IPC_EINVAL));
        };
        if command == IpcCommand::Open {
            let open = OpenRequest::parse(memory, request.address);
            return self.open_device(memory, open);
        }

        let Some(index) = self.device_for_fd(request.fd) else {
            log::warn!("IPC command {command:?} on unknown fd {:#x}", request.fd);
            return Some(IpcReply::new(IPC_EINVAL));
        };

        let Self {
            devices,
            fd_map,
            iosc,
            fs,
            sockets,
        } = self;
        let device = &mut devices[index];
        let mut env = DeviceEnv {
            memory,
            iosc,
            fs,
            sockets,
        };
        match command {
            IpcCommand::Close => {
                if let Some(slot) = fd_map.get_mut(request.fd as usize) {
                    *slot = None;
                }
                device.close(&mut env, request.fd)
            }
            IpcCommand::Read => {
                let rw = ReadWriteRequest::parse(&*env.memory, request.address);
                device.read(&mut env, &rw)
            }
            IpcCommand::Write => {
                let rw = ReadWriteRequest::parse(&*env.memory, request.address);
                device.write(&mut env, &rw)
            }
            IpcCommand::Seek => {
                let seek = SeekRequest::parse(&*env.memory, request.address);
                device.seek(&mut env, &seek)
            }
            IpcCommand::Ioctl => {
                let ioctl = IoctlRequest::parse(&*env.memory, request.address);
                device.ioctl(&mut env, &ioctl)
            }
            IpcCommand::Ioctlv => {
                let ioctlv = IoctlvRequest::parse(&*env.memory, request.address);
                device.ioctlv(&mut env, &ioctlv)
            }
            IpcCommand::Open | IpcCommand::Reply => Some(IpcReply::new(IPC_EINVAL)),
        }
    }

    fn open_device(&mut self, memory: &mut dyn Memory, mut open: OpenRequest) -> Option<IpcReply> {
        let Some(new_fd) = self.fd_map.iter().position(Option::is_none) else {
            log::error!("Couldn't get a free fd for {}, too many open files", open.path);
            return Some(IpcReply::new(IPC_EMAX));
        };
        log::info!("Opening {} (mode {:?}, fd {new_fd})", open.path, open.flags);

        let index = if open.path.starts_with("/dev/") {
            self.device_index(&open.path)
        } else if open.path.starts_with('/') {
            self.device_index("/dev/fs")
        } else {
            None
        };
        let Some(index) = index else {
            log::error!("Unknown device: {}", open.path);
            return Some(IpcReply::new(IPC_ENOENT));
        };

        open.header.fd = new_fd as u32;
        let mut env = DeviceEnv {
            memory,
            iosc: &mut self.iosc,
            fs: &mut self.fs,
            sockets: &mut self.sockets,
        };
        let mut reply = self.devices[index].open(&mut env, &open)?;
        if reply.return_value >= 0 {
            self.fd_map[new_fd] = Some(index);
            reply.return_value = new_fd as i32;
        }
        Some(reply)
    }

    /// Advance the socket manager and deliver every deferred reply. Returns
    /// the number of replies written.
    pub fn update(&mut self, memory: &mut dyn Memory) -> usize {
        self.sockets.update(memory);
        self.sockets.replies().flush(memory)
    }

    /// Drop every open descriptor and socket, as an IOS reload does.
    pub fn reset(&mut self) {
        self.fd_map = [None; IPC_MAX_FDS];
        self.sockets.clean();
    }
}

impl Stateful for EmulationKernel {
    fn save_state(&self, w: &mut StateWriter) {
        for slot in &self.fd_map {
            match slot {
                Some(index) => {
                    w.write_bool(true);
                    w.write_str(self.devices[*index].name());
                }
                None => w.write_bool(false),
            }
        }
        self.iosc.save_state(w);
        self.fs.save_state(w);
        self.sockets.save_state(w);
        for device in &self.devices {
            device.save_state(w);
        }
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut fd_map = [None; IPC_MAX_FDS];
        for (fd, slot) in fd_map.iter_mut().enumerate() {
            if r.read_bool("fd in use")? {
                let name = r.read_string("device name")?;
                let Some(index) = self.device_index(&name) else {
                    log::error!("Save-state names unknown device {name} for fd {fd}");
                    return Err(StateError::invalid("device name", fd as u64));
                };
                *slot = Some(index);
            }
        }
        self.fd_map = fd_map;
        self.iosc.load_state(r)?;
        self.fs.load_state(r)?;
        self.sockets.load_state(r)?;
        for device in &mut self.devices {
            device.load_state(r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/kernel_tests.rs"]
mod tests;
