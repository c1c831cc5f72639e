//! Host socket calls the emulation needs, over `socket2` sockets.
//!
//! `nix` covers the two calls `socket2` only offers on uninitialised
//! buffers or not at all: flag-aware receives and `poll`. Every wrapper
//! returns `io::Result` carrying the host `errno`; turning that into a Wii
//! error number is the caller's job.

use std::io::{self, IoSliceMut, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

use nix::poll::{PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{MsgFlags, SockaddrIn, recvmsg};
use socket2::{Domain, SockAddr, Socket, Type};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

pub fn bad_fd() -> io::Error {
    io::Error::from_raw_os_error(libc::EBADF)
}

fn no_such_option() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOPROTOOPT)
}

fn unspecified() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)
}

fn ipv4_or_unspecified(addr: SockAddr) -> SocketAddrV4 {
    addr.as_socket_ipv4().unwrap_or_else(unspecified)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn set_nosigpipe(socket: &Socket) {
    if let Err(e) = socket.set_nosigpipe(true) {
        log::warn!("Failed to set SO_NOSIGPIPE on {}: {e}", socket.as_raw_fd());
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn set_nosigpipe(_socket: &Socket) {}

pub fn socket(domain: Domain, ty: Type) -> io::Result<Socket> {
    let socket = Socket::new(domain, ty, None)?;
    set_nosigpipe(&socket);
    Ok(socket)
}

pub fn bind(socket: &Socket, addr: SocketAddrV4) -> io::Result<()> {
    socket.bind(&addr.into())
}

pub fn connect(socket: &Socket, addr: SocketAddrV4) -> io::Result<()> {
    socket.connect(&addr.into())
}

/// Accept one pending connection. Non-IPv4 peers report `0.0.0.0:0`.
pub fn accept(socket: &Socket) -> io::Result<(Socket, SocketAddrV4)> {
    let (accepted, peer) = socket.accept()?;
    set_nosigpipe(&accepted);
    Ok((accepted, ipv4_or_unspecified(peer)))
}

pub fn send_to(
    socket: &Socket,
    data: &[u8],
    flags: i32,
    dest: Option<SocketAddrV4>,
) -> io::Result<usize> {
    let flags = flags | SEND_FLAGS;
    match dest {
        Some(addr) => socket.send_to_with_flags(data, &addr.into(), flags),
        None => socket.send_with_flags(data, flags),
    }
}

/// Receive into `buf`, returning the byte count and the sender when the
/// socket reports an IPv4 one.
pub fn recv_from(
    socket: &Socket,
    buf: &mut [u8],
    flags: i32,
) -> io::Result<(usize, Option<SocketAddrV4>)> {
    let mut iov = [IoSliceMut::new(buf)];
    let msg = recvmsg::<SockaddrIn>(
        socket.as_raw_fd(),
        &mut iov,
        None,
        MsgFlags::from_bits_truncate(flags),
    )
    .map_err(io::Error::from)?;
    Ok((msg.bytes, msg.address.map(SocketAddrV4::from)))
}

pub fn getsockname(socket: &Socket) -> io::Result<SocketAddrV4> {
    socket.local_addr().map(ipv4_or_unspecified)
}

pub fn getpeername(socket: &Socket) -> io::Result<SocketAddrV4> {
    socket.peer_addr().map(ipv4_or_unspecified)
}

pub fn is_stream(socket: &Socket) -> bool {
    socket.r#type().is_ok_and(|ty| ty == Type::STREAM)
}

/// Options a guest can read or change with `SO_GETSOCKOPT` and
/// `SO_SETSOCKOPT`. Values travel as 32-bit words; `Linger` is the
/// `{l_onoff, l_linger}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOption {
    ReuseAddr,
    Linger,
    OobInline,
    SendBuffer,
    RecvBuffer,
    Type,
    Error,
}

impl SockOption {
    pub fn get(self, socket: &Socket) -> io::Result<Vec<i32>> {
        let word = match self {
            SockOption::ReuseAddr => i32::from(socket.reuse_address()?),
            SockOption::Linger => {
                return Ok(match socket.linger()? {
                    Some(time) => vec![1, time.as_secs().min(i32::MAX as u64) as i32],
                    None => vec![0, 0],
                });
            }
            SockOption::OobInline => i32::from(socket.out_of_band_inline()?),
            SockOption::SendBuffer => socket.send_buffer_size()?.min(i32::MAX as usize) as i32,
            SockOption::RecvBuffer => socket.recv_buffer_size()?.min(i32::MAX as usize) as i32,
            SockOption::Type => i32::from(socket.r#type()?),
            SockOption::Error => socket
                .take_error()?
                .and_then(|e| e.raw_os_error())
                .unwrap_or(0),
        };
        Ok(vec![word])
    }

    pub fn set(self, socket: &Socket, value: &[i32]) -> io::Result<()> {
        let Some(&first) = value.first() else {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        };
        match self {
            SockOption::ReuseAddr => socket.set_reuse_address(first != 0),
            SockOption::Linger => {
                let seconds = value.get(1).copied().unwrap_or(0).max(0) as u64;
                socket.set_linger((first != 0).then(|| Duration::from_secs(seconds)))
            }
            SockOption::OobInline => socket.set_out_of_band_inline(first != 0),
            SockOption::SendBuffer => socket.set_send_buffer_size(first.max(0) as usize),
            SockOption::RecvBuffer => socket.set_recv_buffer_size(first.max(0) as usize),
            SockOption::Type | SockOption::Error => Err(no_such_option()),
        }
    }
}

/// Non-blocking `poll` over borrowed host sockets.
pub fn poll(fds: &mut [PollFd<'_>]) -> io::Result<usize> {
    if fds.is_empty() {
        return Ok(0);
    }
    nix::poll::poll(fds, PollTimeout::ZERO)
        .map(|n| n as usize)
        .map_err(io::Error::from)
}

/// True if writing to `socket` would not block right now.
pub fn is_writable(socket: &Socket) -> io::Result<bool> {
    let mut fds = [PollFd::new(socket.as_fd(), PollFlags::POLLOUT)];
    let ready = poll(&mut fds)?;
    let done = PollFlags::POLLOUT | PollFlags::POLLERR | PollFlags::POLLHUP;
    Ok(ready > 0 && fds[0].revents().is_some_and(|r| r.intersects(done)))
}

/// IPv4 address of the interface that routes to the internet, found by
/// "connecting" a UDP socket and asking which local address it picked.
pub fn default_interface_ipv4() -> Option<Ipv4Addr> {
    let udp = Socket::new(Domain::IPV4, Type::DGRAM, None).ok()?;
    connect(&udp, SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 53)).ok()?;
    getsockname(&udp)
        .ok()
        .map(|addr| *addr.ip())
        .filter(|ip| !ip.is_unspecified())
}

/// `Read`/`Write` over a borrowed host socket, used to drive TLS records.
#[derive(Debug, Clone, Copy)]
pub struct HostStream<'a>(pub &'a Socket);

impl Read for HostStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut socket = self.0;
        socket.read(buf)
    }
}

impl Write for HostStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        send_to(self.0, buf, 0, None)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
