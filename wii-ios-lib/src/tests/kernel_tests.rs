use super::*;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::thread;
use std::time::Duration;

use wii_ios_core::codes::{IPC_SUCCESS, IpcCommand};
use wii_ios_core::GuestMemory;
use wii_ios_core::ipc::MAX_OPEN_PATH;
use wii_ios_crypto::aes;
use wii_ios_fs::{FsError, Mode, Modes};
use wii_ios_net::NetIoctl;
use wii_ios_net::errno::SO_ENOPROTOOPT;

use crate::devices::fs::{
    ISFS_IOCTL_CREATE_DIR, ISFS_IOCTL_CREATE_FILE, ISFS_IOCTL_GET_ATTR,
    ISFS_IOCTL_GET_FILE_STATS, ISFS_IOCTLV_READ_DIR, ISFS_PARAMS_SIZE, IsfsParams,
};

const BASE: u32 = 0x1000_0000;

/// Guest RAM with a bump allocator for building IPC requests.
struct Guest {
    mem: GuestMemory,
    next: u32,
}

impl Guest {
    fn new() -> Self {
        Self {
            mem: GuestMemory::new(BASE, 0x20000),
            next: BASE,
        }
    }

    fn alloc(&mut self, size: u32) -> u32 {
        let addr = self.next;
        self.next += (size.max(4) + 0x1F) & !0x1F;
        addr
    }

    fn data(&mut self, bytes: &[u8]) -> u32 {
        let addr = self.alloc(bytes.len() as u32);
        self.mem.copy_to_emu(addr, bytes);
        addr
    }

    fn request(&mut self, command: IpcCommand, fd: u32) -> u32 {
        let addr = self.alloc(0x40);
        self.mem.write_u32(command as u32, addr);
        self.mem.write_u32(fd, addr + 8);
        addr
    }

    fn open_request(&mut self, path: &str, mode: u32) -> u32 {
        let mut raw = path.as_bytes().to_vec();
        raw.push(0);
        let path_ptr = self.data(&raw);
        let addr = self.request(IpcCommand::Open, 0);
        self.mem.write_u32(path_ptr, addr + 0xC);
        self.mem.write_u32(mode, addr + 0x10);
        addr
    }

    fn ioctl_request(&mut self, fd: u32, request: u32, input: &[u8], out: u32) -> (u32, u32) {
        let buffer_in = self.data(input);
        let buffer_out = if out > 0 { self.alloc(out) } else { 0 };
        let addr = self.request(IpcCommand::Ioctl, fd);
        self.mem.write_u32(request, addr + 0xC);
        self.mem.write_u32(buffer_in, addr + 0x10);
        self.mem.write_u32(input.len() as u32, addr + 0x14);
        self.mem.write_u32(buffer_out, addr + 0x18);
        self.mem.write_u32(out, addr + 0x1C);
        (addr, buffer_out)
    }

    fn ioctlv_request(
        &mut self,
        fd: u32,
        request: u32,
        inputs: &[&[u8]],
        io_sizes: &[u32],
    ) -> (u32, Vec<u32>) {
        let table = self.alloc(8 * (inputs.len() + io_sizes.len()) as u32);
        let mut entry = table;
        for input in inputs {
            let data = self.data(input);
            self.mem.write_u32(data, entry);
            self.mem.write_u32(input.len() as u32, entry + 4);
            entry += 8;
        }
        let mut outputs = Vec::new();
        for &size in io_sizes {
            let data = if size > 0 { self.alloc(size) } else { 0 };
            self.mem.write_u32(data, entry);
            self.mem.write_u32(size, entry + 4);
            outputs.push(data);
            entry += 8;
        }
        let addr = self.request(IpcCommand::Ioctlv, fd);
        self.mem.write_u32(request, addr + 0xC);
        self.mem.write_u32(inputs.len() as u32, addr + 0x10);
        self.mem.write_u32(io_sizes.len() as u32, addr + 0x14);
        self.mem.write_u32(table, addr + 0x18);
        (addr, outputs)
    }

    /// Return value of a request once IOS has replied to it.
    fn reply(&self, addr: u32) -> Option<i32> {
        (self.mem.read_u32(addr) == IpcCommand::Reply as u32)
            .then(|| self.mem.read_u32(addr + 4) as i32)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    kernel: EmulationKernel,
    guest: Guest,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let kernel = EmulationKernel::new(Iosc::default(), HostFileSystem::new(dir.path()));
        Self {
            _dir: dir,
            kernel,
            guest: Guest::new(),
        }
    }

    fn exec(&mut self, addr: u32) -> Option<i32> {
        self.kernel.execute_ipc_command(&mut self.guest.mem, addr)
    }

    fn open(&mut self, path: &str, mode: u32) -> i32 {
        let addr = self.guest.open_request(path, mode);
        self.exec(addr).unwrap()
    }

    fn close(&mut self, fd: i32) -> i32 {
        let addr = self.guest.request(IpcCommand::Close, fd as u32);
        self.exec(addr).unwrap()
    }

    fn ioctl(&mut self, fd: i32, request: u32, input: &[u8], out: u32) -> (Option<i32>, u32) {
        let (addr, buffer) = self.guest.ioctl_request(fd as u32, request, input, out);
        (self.exec(addr), buffer)
    }

    fn read_write(&mut self, command: IpcCommand, fd: i32, buffer: u32, size: u32) -> i32 {
        let addr = self.guest.request(command, fd as u32);
        self.guest.mem.write_u32(buffer, addr + 0xC);
        self.guest.mem.write_u32(size, addr + 0x10);
        self.exec(addr).unwrap()
    }

    fn seek(&mut self, fd: i32, offset: u32, mode: u32) -> i32 {
        let addr = self.guest.request(IpcCommand::Seek, fd as u32);
        self.guest.mem.write_u32(offset, addr + 0xC);
        self.guest.mem.write_u32(mode, addr + 0x10);
        self.exec(addr).unwrap()
    }

    /// Tick the kernel until every request in `addrs` has a reply or about
    /// two seconds passed.
    fn run_until(&mut self, addrs: &[u32]) {
        for _ in 0..400 {
            self.kernel.update(&mut self.guest.mem);
            if addrs.iter().all(|&a| self.guest.reply(a).is_some()) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn sockaddr(addr: SocketAddrV4) -> Vec<u8> {
    let mut out = vec![8, 2];
    out.extend(addr.port().to_be_bytes());
    out.extend(addr.ip().octets());
    out
}

fn path_field(path: &str) -> Vec<u8> {
    let mut raw = vec![0u8; MAX_OPEN_PATH];
    raw[..path.len()].copy_from_slice(path.as_bytes());
    raw
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[test]
fn standard_devices_are_registered() {
    let fx = Fixture::new();
    assert_eq!(
        fx.kernel.device_names(),
        ["/dev/aes", "/dev/fs", "/dev/net/ip/top", "/dev/net/ssl"]
    );
}

#[test]
fn duplicate_registration_keeps_first() {
    let mut fx = Fixture::new();
    fx.kernel.register(AesDevice);
    assert_eq!(fx.kernel.device_names().len(), 4);
}

#[test]
fn open_writes_reply_into_request() {
    let mut fx = Fixture::new();
    let addr = fx.guest.open_request("/dev/aes", 0);
    assert_eq!(fx.exec(addr), Some(0));
    assert_eq!(fx.guest.mem.read_u32(addr), IpcCommand::Reply as u32);
    assert_eq!(fx.guest.mem.read_u32(addr + 4), 0);
    assert_eq!(fx.guest.mem.read_u32(addr + 8), IpcCommand::Open as u32);
}

#[test]
fn unknown_paths_are_enoent() {
    let mut fx = Fixture::new();
    assert_eq!(fx.open("/dev/nothing", 0), IPC_ENOENT);
    assert_eq!(fx.open("relative", 0), IPC_ENOENT);
    assert_eq!(fx.kernel.open_fd_count(), 0);
}

#[test]
fn descriptors_run_out_after_twenty_four() {
    let mut fx = Fixture::new();
    for expected in 0..IPC_MAX_FDS as i32 {
        assert_eq!(fx.open("/dev/aes", 0), expected);
    }
    assert_eq!(fx.open("/dev/aes", 0), IPC_EMAX);

    assert_eq!(fx.close(5), 0);
    assert_eq!(fx.open("/dev/net/ssl", 0), 5);
}

#[test]
fn bad_descriptors_and_commands_are_einval() {
    let mut fx = Fixture::new();
    let (ret, _) = fx.ioctl(7, 0, &[], 0);
    assert_eq!(ret, Some(IPC_EINVAL));
    assert_eq!(fx.close(30), IPC_EINVAL);

    let addr = fx.guest.request(IpcCommand::Open, 0);
    fx.guest.mem.write_u32(0x55, addr);
    assert_eq!(fx.exec(addr), Some(IPC_EINVAL));
}

#[test]
fn closed_descriptor_is_released() {
    let mut fx = Fixture::new();
    let fd = fx.open("/dev/aes", 0);
    assert_eq!(fx.kernel.open_fd_count(), 1);
    assert_eq!(fx.close(fd), 0);
    assert_eq!(fx.kernel.open_fd_count(), 0);
    assert_eq!(fx.close(fd), IPC_EINVAL);
}

// ---------------------------------------------------------------------------
// /dev/aes
// ---------------------------------------------------------------------------

fn aes_crypt(
    fx: &mut Fixture,
    fd: u32,
    request: u32,
    data: &[u8],
    key: &[u8; 16],
    iv: &[u8; 16],
) -> (Vec<u8>, [u8; 16]) {
    let sizes = [data.len() as u32, 16];
    let (addr, outputs) = fx
        .guest
        .ioctlv_request(fd, request, &[data, key.as_slice()], &sizes);
    fx.guest.mem.copy_to_emu(outputs[1], iv);
    assert_eq!(fx.exec(addr), Some(IPC_SUCCESS));
    let out = fx.guest.mem.copy_from_emu(outputs[0], data.len());
    let mut iv_out = [0u8; 16];
    iv_out.copy_from_slice(&fx.guest.mem.copy_from_emu(outputs[1], 16));
    (out, iv_out)
}

#[test]
fn aes_device_encrypts_and_decrypts() {
    let mut fx = Fixture::new();
    let fd = fx.open("/dev/aes", 0) as u32;
    let key = [0x11u8; 16];
    let iv = [0x22u8; 16];
    let plain: Vec<u8> = (0..48).collect();

    let (cipher, iv_after) = aes_crypt(&mut fx, fd, 2, &plain, &key, &iv);
    let mut expected_iv = iv;
    assert_eq!(cipher, aes::cbc_encrypt(&key, &mut expected_iv, &plain));
    assert_eq!(iv_after, expected_iv);

    // The fixed alias reaches /dev/aes without an open.
    let (decrypted, _) = aes_crypt(&mut fx, AES_FD_ALIAS, 3, &cipher, &key, &iv);
    assert_eq!(decrypted, plain);
}

#[test]
fn aes_device_rejects_partial_blocks() {
    let mut fx = Fixture::new();
    let (addr, _) = fx
        .guest
        .ioctlv_request(AES_FD_ALIAS, 2, &[&[0u8; 20], &[0u8; 16]], &[20, 16]);
    assert_eq!(fx.exec(addr), Some(IPC_EINVAL));

    let (addr, _) = fx.guest.ioctlv_request(AES_FD_ALIAS, 9, &[], &[]);
    assert_eq!(fx.exec(addr), Some(IPC_EINVAL));
}

// ---------------------------------------------------------------------------
// /dev/fs
// ---------------------------------------------------------------------------

fn params(path: &str) -> Vec<u8> {
    let mut mem = GuestMemory::new(0, ISFS_PARAMS_SIZE as usize);
    IsfsParams {
        owner: 0,
        group: 0,
        path: path.to_string(),
        modes: Modes::new(Mode::ReadWrite, Mode::ReadWrite, Mode::Read),
        attribute: 0,
    }
    .write(&mut mem, 0);
    mem.copy_from_emu(0, ISFS_PARAMS_SIZE as usize)
}

#[test]
fn fs_device_creates_writes_and_reads_files() {
    let mut fx = Fixture::new();
    let control = fx.open("/dev/fs", 0);
    let (ret, _) = fx.ioctl(control, ISFS_IOCTL_CREATE_DIR, &params("/shared2"), 0);
    assert_eq!(ret, Some(0));
    assert_eq!(
        fx.ioctl(control, ISFS_IOCTL_CREATE_FILE, &params("/shared2/test.bin"), 0).0,
        Some(0)
    );

    let file = fx.open("/shared2/test.bin", 3);
    assert!(file > control);
    let text = fx.guest.data(b"hello wii");
    assert_eq!(fx.read_write(IpcCommand::Write, file, text, 9), 9);

    let (ret, stats) = fx.ioctl(file, ISFS_IOCTL_GET_FILE_STATS, &[], 8);
    assert_eq!(ret, Some(0));
    assert_eq!(fx.guest.mem.read_u32(stats), 9);
    assert_eq!(fx.guest.mem.read_u32(stats + 4), 9);

    assert_eq!(fx.seek(file, 0, 0), 0);
    let buf = fx.guest.alloc(32);
    assert_eq!(fx.read_write(IpcCommand::Read, file, buf, 32), 9);
    assert_eq!(fx.guest.mem.copy_from_emu(buf, 9), b"hello wii");
    assert_eq!(fx.close(file), 0);

    let target = path_field("/shared2/test.bin");
    let (ret, out) = fx.ioctl(control, ISFS_IOCTL_GET_ATTR, &target, ISFS_PARAMS_SIZE);
    assert_eq!(ret, Some(0));
    let attr = IsfsParams::read(&fx.guest.mem, out);
    assert_eq!(attr.modes, Modes::new(Mode::ReadWrite, Mode::ReadWrite, Mode::Read));

    let (addr, outputs) = fx.guest.ioctlv_request(
        control as u32,
        ISFS_IOCTLV_READ_DIR,
        &[&path_field("/shared2")],
        &[4],
    );
    assert_eq!(fx.exec(addr), Some(0));
    assert_eq!(fx.guest.mem.read_u32(outputs[0]), 1);
}

#[test]
fn fs_device_reports_missing_files() {
    let mut fx = Fixture::new();
    assert_eq!(fx.open("/title/missing.bin", 1), FsError::NotFound.code());
    assert_eq!(fx.kernel.open_fd_count(), 0);
}

#[test]
fn fs_device_bounds_buffers_by_guest_ram() {
    let mut fx = Fixture::new();
    let control = fx.open("/dev/fs", 0);
    fx.ioctl(control, ISFS_IOCTL_CREATE_DIR, &params("/shared2"), 0);
    let created = fx.ioctl(control, ISFS_IOCTL_CREATE_FILE, &params("/shared2/data.bin"), 0);
    assert_eq!(created.0, Some(0));
    let file = fx.open("/shared2/data.bin", 3);

    let invalid = FsError::Invalid.code();
    assert_eq!(fx.read_write(IpcCommand::Write, file, 0x0000_1000, 16), invalid);
    assert_eq!(fx.read_write(IpcCommand::Write, file, BASE + 0x20000 - 2, 4), invalid);
    let (_, stats) = fx.ioctl(file, ISFS_IOCTL_GET_FILE_STATS, &[], 8);
    assert_eq!(fx.guest.mem.read_u32(stats), 0);

    let text = fx.guest.data(b"abcd");
    assert_eq!(fx.read_write(IpcCommand::Write, file, text, 4), 4);
    assert_eq!(fx.seek(file, 0, 0), 0);

    let buf = fx.guest.alloc(0x1000);
    fx.guest.mem.write_u32(0xAAAA_AAAA, buf + 4);
    assert_eq!(fx.read_write(IpcCommand::Read, file, buf, 0x1000), 4);
    assert_eq!(fx.guest.mem.copy_from_emu(buf, 4), b"abcd");
    assert_eq!(fx.guest.mem.read_u32(buf + 4), 0xAAAA_AAAA);

    assert_eq!(fx.seek(file, 1, 0), 1);
    assert_eq!(fx.read_write(IpcCommand::Read, file, buf, 0xFFFF_0000), invalid);
    assert_eq!(fx.read_write(IpcCommand::Read, file, buf, 2), 2);
    assert_eq!(fx.guest.mem.copy_from_emu(buf, 2), b"bc");
}

// ---------------------------------------------------------------------------
// /dev/net/ip/top
// ---------------------------------------------------------------------------

#[test]
fn loopback_tcp_through_ip_top() {
    let mut fx = Fixture::new();
    let top = fx.open("/dev/net/ip/top", 0);
    let socket = NetIoctl::Socket as u32;
    let listener = fx.ioctl(top, socket, &words(&[2, 1, 0]), 0).0.unwrap();
    let client = fx.ioctl(top, socket, &words(&[2, 1, 0]), 0).0.unwrap();
    assert_eq!((listener, client), (0, 1));

    let mut bind_args = words(&[listener as u32, 1]);
    bind_args.extend(sockaddr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)));
    let (bind, _) = fx.guest.ioctl_request(top as u32, NetIoctl::Bind as u32, &bind_args, 0);
    assert_eq!(fx.exec(bind), None);
    fx.run_until(&[bind]);
    assert_eq!(fx.guest.reply(bind), Some(0));

    let listen = NetIoctl::Listen as u32;
    assert_eq!(fx.ioctl(top, listen, &words(&[listener as u32, 4]), 0).0, Some(0));

    let listener_arg = words(&[listener as u32]);
    let (ret, name) = fx.ioctl(top, NetIoctl::GetSockName as u32, &listener_arg, 8);
    assert_eq!(ret, Some(0));
    assert_eq!(fx.guest.mem.read_u8(name + 1), 2);
    let port = fx.guest.mem.read_u16(name + 2);
    assert_ne!(port, 0);

    let (accept, _) = fx
        .guest
        .ioctl_request(top as u32, NetIoctl::Accept as u32, &listener_arg, 8);
    assert_eq!(fx.exec(accept), None);
    let mut connect_args = words(&[client as u32, 1]);
    connect_args.extend(sockaddr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)));
    let (connect, _) = fx
        .guest
        .ioctl_request(top as u32, NetIoctl::Connect as u32, &connect_args, 0);
    assert_eq!(fx.exec(connect), None);
    fx.run_until(&[accept, connect]);
    assert_eq!(fx.guest.reply(connect), Some(0));
    let server = fx.guest.reply(accept).unwrap();
    assert_eq!(server, 2);

    let send_params = words(&[client as u32, 0, 0, 0, 0]);
    let (send, _) = fx.guest.ioctlv_request(
        top as u32,
        NetIoctl::SendTo as u32,
        &[b"ping".as_slice(), send_params.as_slice()],
        &[],
    );
    let recv_params = words(&[server as u32, 0]);
    let (recv, outputs) = fx.guest.ioctlv_request(
        top as u32,
        NetIoctl::RecvFrom as u32,
        &[recv_params.as_slice()],
        &[16, 0],
    );
    assert_eq!(fx.exec(recv), None);
    assert_eq!(fx.exec(send), None);
    fx.run_until(&[send, recv]);
    assert_eq!(fx.guest.reply(send), Some(4));
    assert_eq!(fx.guest.reply(recv), Some(4));
    assert_eq!(fx.guest.mem.copy_from_emu(outputs[0], 4), b"ping");

    let server_arg = words(&[server as u32]);
    let (ret, peer) = fx.ioctl(top, NetIoctl::GetPeerName as u32, &server_arg, 8);
    assert_eq!(ret, Some(0));
    assert_eq!(fx.guest.mem.read_u32(peer + 4), u32::from(Ipv4Addr::LOCALHOST));

    let close = NetIoctl::Close as u32;
    for fd in [server, client, listener] {
        assert_eq!(fx.ioctl(top, close, &words(&[fd as u32]), 0).0, Some(0));
    }
}

#[test]
fn inet_pton_and_ntop_use_guest_layouts() {
    let mut fx = Fixture::new();
    let top = fx.open("/dev/net/ip/top", 0);

    let (ret, out) = fx.ioctl(top, NetIoctl::InetPton as u32, b"192.168.1.20\0", 8);
    assert_eq!(ret, Some(1));
    assert_eq!(fx.guest.mem.copy_from_emu(out + 4, 4), [192, 168, 1, 20]);
    assert_eq!(fx.ioctl(top, NetIoctl::InetPton as u32, b"1.2.3\0", 8).0, Some(0));

    let mut input = vec![0u8; 8];
    input.extend([10, 0, 1, 30]);
    let (ret, out) = fx.ioctl(top, NetIoctl::InetNtop as u32, &input, 16);
    assert_eq!(ret, Some(0));
    assert_eq!(fx.guest.mem.read_cstring(out, 16), "10.0.1.30");
}

#[test]
fn socket_options_reach_the_host_socket() {
    let mut fx = Fixture::new();
    let top = fx.open("/dev/net/ip/top", 0);
    let fd = fx.ioctl(top, NetIoctl::Socket as u32, &words(&[2, 1, 0]), 0).0.unwrap();
    let fd = fd as u32;

    let set = NetIoctl::SetSockOpt as u32;
    assert_eq!(fx.ioctl(top, set, &words(&[fd, 0xFFFF, 0x4, 4, 1]), 0).0, Some(0));
    assert_eq!(
        fx.ioctl(top, set, &words(&[fd, 0xFFFF, 0x1003, 4, 1]), 0).0,
        Some(-SO_ENOPROTOOPT)
    );

    let (addr, out) = fx.guest.ioctl_request(top as u32, NetIoctl::GetSockOpt as u32, &[], 0x20);
    fx.guest.mem.copy_to_emu(out, &words(&[fd, 0xFFFF, 0x4]));
    assert_eq!(fx.exec(addr), Some(0));
    assert_eq!(fx.guest.mem.read_u32(out + 0xC), 4);
    assert_eq!(fx.guest.mem.read_u32(out + 0x10), 1);
}

#[test]
fn unimplemented_ip_top_ioctls_succeed() {
    let mut fx = Fixture::new();
    let top = fx.open("/dev/net/ip/top", 0);
    let (ret, _) = fx.ioctl(top, NetIoctl::GetInterfaceOpt as u32, &[], 0);
    assert_eq!(ret, Some(IPC_SUCCESS));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn save_state_restores_descriptor_table() {
    let mut fx = Fixture::new();
    let aes_fd = fx.open("/dev/aes", 0);
    let fs_fd = fx.open("/dev/fs", 0);
    let mut writer = StateWriter::new();
    fx.kernel.save_state(&mut writer);
    let bytes = writer.into_bytes();

    fx.kernel.reset();
    assert_eq!(fx.kernel.open_fd_count(), 0);

    fx.kernel.load_state(&mut StateReader::new(&bytes)).unwrap();
    assert_eq!(fx.kernel.open_fd_count(), 2);
    assert_eq!(
        fx.ioctl(fs_fd, ISFS_IOCTL_CREATE_DIR, &params("/restored"), 0).0,
        Some(0)
    );
    let (addr, _) = fx.guest.ioctlv_request(aes_fd as u32, 9, &[], &[]);
    assert_eq!(fx.exec(addr), Some(IPC_EINVAL));
}

#[test]
fn truncated_state_is_an_error() {
    let mut fx = Fixture::new();
    fx.open("/dev/aes", 0);
    let mut writer = StateWriter::new();
    fx.kernel.save_state(&mut writer);
    let bytes = writer.into_bytes();
    let mut reader = StateReader::new(&bytes[..bytes.len() / 2]);
    assert!(fx.kernel.load_state(&mut reader).is_err());
}

#[test]
fn kernel_from_settings_uses_nand_root() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        nand_root: Some(dir.path().join("nand")),
        ..Settings::default()
    };
    let kernel = EmulationKernel::from_settings(&settings).unwrap();
    assert_eq!(kernel.fs().root_path(), dir.path().join("nand"));
    assert!(dir.path().join("nand").is_dir());
}

#[test]
fn short_root_key_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let key = dir.path().join("root.bin");
    std::fs::write(&key, [0u8; 16]).unwrap();
    let settings = Settings {
        nand_root: Some(dir.path().join("nand")),
        root_key: Some(key),
        ..Settings::default()
    };
    assert!(matches!(
        EmulationKernel::from_settings(&settings),
        Err(KernelError::RootKey(_))
    ));
}
