//! `/dev/net/ip/top`: the BSD socket API.
//!
//! Calls that can block (accept, connect, send, receive, poll) are handed
//! to the [`WiiSockMan`](wii_ios_net::WiiSockMan) and answered later;
//! everything else completes immediately.

use std::net::{Ipv4Addr, ToSocketAddrs};

use wii_ios_core::codes::IPC_SUCCESS;
use wii_ios_core::{IoctlRequest, IoctlvRequest, IpcReply, Memory};
use wii_ios_net::errno::SO_EINVAL;
use wii_ios_net::sys::{self, SockOption};
use wii_ios_net::{NetIoctl, PollCommand, SockOp, WII_SOCKET_FD_MAX, WiiSockMan};

use super::read_array;
use crate::device::{Device, DeviceEnv};

/// Reported by `GETHOSTID` when the host has no usable IPv4 interface.
pub const FALLBACK_HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 30);

const WII_SOL_SOCKET: u32 = 0xFFFF;
const WII_SO_ERROR: u32 = 0x1009;
const WII_IPPROTO_TCP: u32 = 6;
const MAX_OPTVAL: usize = 20;

#[derive(Debug, Default, Clone, Copy)]
pub struct NetIpTopDevice;

/// Guest `(level, optname)` to the host option it names. Send/receive
/// low-water marks and unknown options have no host counterpart.
fn map_option(level: u32, name: u32) -> Option<SockOption> {
    if level != WII_SOL_SOCKET {
        log::info!("SO_*SOCKOPT: unknown level {level:#x}");
        return None;
    }
    let option = match name {
        0x4 => SockOption::ReuseAddr,
        0x80 => SockOption::Linger,
        0x100 => SockOption::OobInline,
        0x1001 => SockOption::SendBuffer,
        0x1002 => SockOption::RecvBuffer,
        0x1008 => SockOption::Type,
        WII_SO_ERROR => SockOption::Error,
        other => {
            log::info!("SO_*SOCKOPT: unsupported optname {other:#x}");
            return None;
        }
    };
    Some(option)
}

fn unsupported_option() -> std::io::Error {
    std::io::Error::from_raw_os_error(libc::ENOPROTOOPT)
}

/// Dotted-quad parser that accepts exactly four decimal octets.
pub fn parse_dotted_quad(src: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = src.split('.');
    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u32 = part.parse().ok()?;
        *octet = u8::try_from(value).ok()?;
    }
    parts.next().is_none().then_some(octets)
}

/// Option values are exchanged as big-endian guest words.
fn option_to_guest(words: &[i32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn option_from_guest(value: &[u8]) -> Vec<i32> {
    value
        .chunks_exact(4)
        .map(|w| i32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

/// `{len, family, sa_data[14]}` truncated to the guest buffer.
fn write_sockaddr(memory: &mut dyn Memory, request: &IoctlRequest, addr: std::net::SocketAddrV4) {
    let out = request.buffer_out;
    let size = request.buffer_out_size;
    if size < 16 {
        log::warn!("Socket address output buffer is too small ({size} bytes), truncating");
    }
    if size > 0 {
        memory.write_u8(size as u8, out);
    }
    if size > 1 {
        memory.write_u8(libc::AF_INET as u8, out + 1);
    }
    if size > 2 {
        let mut sa_data = [0u8; 14];
        sa_data[..2].copy_from_slice(&addr.port().to_be_bytes());
        sa_data[2..6].copy_from_slice(&addr.ip().octets());
        let len = (size as usize - 2).min(sa_data.len());
        memory.copy_to_emu(out + 2, &sa_data[..len]);
    }
}

impl NetIpTopDevice {
    fn socket(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let af = env.memory.read_u32(request.buffer_in);
        let ty = env.memory.read_u32(request.buffer_in + 4);
        let protocol = env.memory.read_u32(request.buffer_in + 8);
        let ret = env.sockets.new_socket(af, ty, protocol);
        log::info!("IOCTL_SO_SOCKET({af}, {ty}, {protocol}) = {ret}");
        ret
    }

    fn close(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let fd = env.memory.read_u32(request.buffer_in) as i32;
        let ret = env.sockets.delete_socket(fd);
        log::info!("IOCTL_SO_CLOSE({fd}) = {ret}");
        ret
    }

    fn shutdown(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        if request.buffer_in == 0 || request.buffer_in_size < 8 {
            log::error!(
                "IOCTL_SO_SHUTDOWN = EINVAL, buffer_in ({:#010x}, {})",
                request.buffer_in,
                request.buffer_in_size
            );
            return -SO_EINVAL;
        }
        let fd = env.memory.read_u32(request.buffer_in) as i32;
        let how = env.memory.read_u32(request.buffer_in + 4);
        let ret = env.sockets.shutdown_socket(fd, how);
        log::info!("IOCTL_SO_SHUTDOWN(fd={fd}, how={how}) = {ret}");
        ret
    }

    fn listen(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let fd = env.memory.read_u32(request.buffer_in) as i32;
        let backlog = env.memory.read_u32(request.buffer_in + 4) as i32;
        let result = env
            .sockets
            .host_socket_or_ebadf(fd)
            .and_then(|host| host.listen(backlog))
            .map(|()| 0);
        env.sockets.get_net_error_code(result, "SO_LISTEN", false)
    }

    fn get_sock_opt(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let out = request.buffer_out;
        let fd = env.memory.read_u32(out) as i32;
        let level = env.memory.read_u32(out + 4);
        let name = env.memory.read_u32(out + 8);

        let result = env.sockets.host_socket_or_ebadf(fd).and_then(|host| {
            map_option(level, name)
                .ok_or_else(unsupported_option)
                .and_then(|option| option.get(host))
        });
        let value = result.as_deref().map(option_to_guest).unwrap_or_default();
        let ret = env
            .sockets
            .get_net_error_code(result.map(|_| 0), "SO_GETSOCKOPT", false);

        let value = &value[..value.len().min(MAX_OPTVAL)];
        env.memory.write_u32(value.len() as u32, out + 0xC);
        env.memory.copy_to_emu(out + 0x10, value);

        if name == WII_SO_ERROR {
            let last_error = env.sockets.last_net_error();
            env.memory.write_u32(4, out + 0xC);
            env.memory.write_u32(last_error as u32, out + 0x10);
        }
        ret
    }

    fn set_sock_opt(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let input = request.buffer_in;
        let fd = env.memory.read_u32(input) as i32;
        let level = env.memory.read_u32(input + 4);
        let name = env.memory.read_u32(input + 8);
        let optlen = (env.memory.read_u32(input + 0xC) as usize).min(MAX_OPTVAL);
        let optval = env.memory.copy_from_emu(input + 0x10, optlen);
        log::info!("IOCTL_SO_SETSOCKOPT({fd}, {level:#x}, {name:#x}, {optlen}) {optval:02x?}");

        // Timeout and no-delay tweaks have no host counterpart worth applying.
        if level == WII_IPPROTO_TCP && (name == 0x2005 || name == 0x2001) {
            return 0;
        }

        let value = option_from_guest(&optval);
        let result = env
            .sockets
            .host_socket_or_ebadf(fd)
            .and_then(|host| {
                map_option(level, name)
                    .ok_or_else(unsupported_option)
                    .and_then(|option| option.set(host, &value))
            })
            .map(|()| 0);
        env.sockets.get_net_error_code(result, "SO_SETSOCKOPT", false)
    }

    fn sock_name(env: &mut DeviceEnv<'_>, request: &IoctlRequest, peer: bool) -> i32 {
        let fd = env.memory.read_u32(request.buffer_in) as i32;
        let result = env.sockets.host_socket_or_ebadf(fd).and_then(|host| {
            if peer {
                sys::getpeername(host)
            } else {
                sys::getsockname(host)
            }
        });
        let caller = if peer { "SO_GETPEERNAME" } else { "SO_GETSOCKNAME" };
        match result {
            Ok(addr) => {
                write_sockaddr(env.memory, request, addr);
                log::info!("IOCTL_{caller}({fd}) = {addr}");
                0
            }
            Err(e) => env.sockets.get_net_error_code(Err(e), caller, false),
        }
    }

    fn get_host_id() -> i32 {
        let ip = sys::default_interface_ipv4().unwrap_or(FALLBACK_HOST_IP);
        log::info!("IOCTL_SO_GETHOSTID = {ip}");
        u32::from(ip) as i32
    }

    fn inet_aton(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let max = request.buffer_in_size.max(1) as usize;
        let hostname = env.memory.read_cstring(request.buffer_in, max);
        let found = (hostname.as_str(), 0)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| {
                addrs.find_map(|addr| match addr.ip() {
                    std::net::IpAddr::V4(ip) => Some(ip),
                    std::net::IpAddr::V6(_) => None,
                })
            });
        match found {
            Some(ip) => {
                env.memory.write_u32(u32::from(ip), request.buffer_out);
                log::info!("IOCTL_SO_INETATON({hostname}) = {ip}");
                1
            }
            None => {
                log::info!("IOCTL_SO_INETATON({hostname}): no address found");
                0
            }
        }
    }

    fn inet_pton(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let max = request.buffer_in_size.max(1) as usize;
        let address = env.memory.read_cstring(request.buffer_in, max);
        log::info!("IOCTL_SO_INETPTON({address})");
        match parse_dotted_quad(&address) {
            Some(octets) => {
                env.memory.copy_to_emu(request.buffer_out + 4, &octets);
                1
            }
            None => 0,
        }
    }

    fn inet_ntop(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> i32 {
        let raw: [u8; 4] = read_array(&*env.memory, request.buffer_in + 8);
        let text = format!("{}.{}.{}.{}", raw[0], raw[1], raw[2], raw[3]);
        log::info!("IOCTL_SO_INETNTOP {text}");
        let mut bytes = text.into_bytes();
        if (request.buffer_out_size as usize) > bytes.len() {
            bytes.push(0);
        }
        env.memory.copy_to_emu(request.buffer_out, &bytes);
        0
    }

    fn poll(env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> Option<i32> {
        if request.buffer_in == 0 || request.buffer_out == 0 {
            return Some(-SO_EINVAL);
        }
        // Negative means wait forever.
        let timeout = env.memory.read_u64(request.buffer_in) as i64;
        let nfds = request.buffer_out_size / 0xC;
        if nfds == 0 || nfds > WII_SOCKET_FD_MAX as u32 {
            log::error!("IOCTL_SO_POLL failed: invalid array size {nfds}");
            return Some(-SO_EINVAL);
        }
        let cmd = PollCommand::read(
            &*env.memory,
            request.header.address,
            request.buffer_out,
            nfds,
            timeout,
        );
        env.sockets.add_poll_command(cmd);
        None
    }

    fn do_sock_ioctl(
        sockets: &mut WiiSockMan,
        memory: &dyn Memory,
        request: &IoctlRequest,
        op: NetIoctl,
    ) {
        let fd = memory.read_u32(request.buffer_in) as i32;
        sockets.do_sock(fd, request.header, SockOp::Net(op));
    }
}

impl Device for NetIpTopDevice {
    fn name(&self) -> &'static str {
        "/dev/net/ip/top"
    }

    fn ioctl(&mut self, env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> Option<IpcReply> {
        let Some(op) = NetIoctl::from_u32(request.request) else {
            log::warn!("/dev/net/ip/top: unknown ioctl {:#x}", request.request);
            return Some(IpcReply::new(IPC_SUCCESS));
        };
        let ret = match op {
            NetIoctl::InitInterface => IPC_SUCCESS,
            NetIoctl::Socket => Self::socket(env, request),
            NetIoctl::Close => Self::close(env, request),
            NetIoctl::Accept | NetIoctl::Bind | NetIoctl::Connect | NetIoctl::Fcntl => {
                Self::do_sock_ioctl(env.sockets, &*env.memory, request, op);
                return None;
            }
            NetIoctl::Shutdown => Self::shutdown(env, request),
            NetIoctl::Listen => Self::listen(env, request),
            NetIoctl::GetSockOpt => Self::get_sock_opt(env, request),
            NetIoctl::SetSockOpt => Self::set_sock_opt(env, request),
            NetIoctl::GetSockName => Self::sock_name(env, request, false),
            NetIoctl::GetPeerName => Self::sock_name(env, request, true),
            NetIoctl::GetHostId => Self::get_host_id(),
            NetIoctl::InetAton => Self::inet_aton(env, request),
            NetIoctl::InetPton => Self::inet_pton(env, request),
            NetIoctl::InetNtop => Self::inet_ntop(env, request),
            NetIoctl::Poll => return Self::poll(env, request).map(IpcReply::new),
            other => {
                log::warn!("/dev/net/ip/top: unhandled ioctl {other:?}");
                IPC_SUCCESS
            }
        };
        Some(IpcReply::new(ret))
    }

    fn ioctlv(&mut self, env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> Option<IpcReply> {
        let (op, fd_address) = match NetIoctl::from_u32(request.request) {
            Some(NetIoctl::SendTo) => (NetIoctl::SendTo, request.in_address(1)),
            Some(NetIoctl::RecvFrom) => (NetIoctl::RecvFrom, request.in_address(0)),
            _ => {
                log::warn!("/dev/net/ip/top: unhandled ioctlv {:#x}", request.request);
                return Some(IpcReply::new(IPC_SUCCESS));
            }
        };
        let fd = env.memory.read_u32(fd_address) as i32;
        env.sockets.do_sock(fd, request.header, SockOp::Net(op));
        None
    }
}
