//! The table of emulated sockets, the pending `poll` requests and the
//! deferred replies they produce.

use std::collections::BTreeMap;
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::time::{Duration, Instant};

use nix::poll::{PollFd, PollFlags};
use socket2::{Domain, Socket, Type};

use wii_ios_core::{Memory, ReplyQueue, Request, StateError, StateReader, StateWriter, Stateful};

use crate::addr::{WII_AF_INET, WII_AF_INET6};
use crate::context::NetContext;
use crate::errno::{
    SO_EAFNOSUPPORT, SO_EBADF, SO_EMFILE, SO_EPROTONOSUPPORT, SO_EPROTOTYPE,
};
use crate::ioctl::SockOp;
use crate::poll::{ConvertDirection, PollCommand, WII_POLLFD_SIZE, convert_events};
use crate::socket::{SocketEnv, WiiSocket};
use crate::ssl::SslSessions;
use crate::sys;

/// Wii fds are `0..WII_SOCKET_FD_MAX`.
pub const WII_SOCKET_FD_MAX: i32 = 24;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const WII_SOCK_STREAM: u32 = 1;
const WII_SOCK_DGRAM: u32 = 2;

#[derive(Debug)]
pub struct WiiSockMan {
    sockets: BTreeMap<i32, WiiSocket>,
    polls: Vec<PollCommand>,
    last_poll_time: Instant,
    ctx: NetContext,
    ssl: SslSessions,
    connect_timeout: Duration,
}

impl Default for WiiSockMan {
    fn default() -> Self {
        Self::new()
    }
}

impl WiiSockMan {
    pub fn new() -> Self {
        Self {
            sockets: BTreeMap::new(),
            polls: Vec::new(),
            last_poll_time: Instant::now(),
            ctx: NetContext::new(),
            ssl: SslSessions::new(true),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// How long a blocking `connect` may stay in progress before it fails
    /// with `ENETUNREACH`.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    pub fn set_ssl_verify(&mut self, verify: bool) {
        self.ssl.set_verify_peers(verify);
    }

    pub fn ssl(&self) -> &SslSessions {
        &self.ssl
    }

    pub fn ssl_mut(&mut self) -> &mut SslSessions {
        &mut self.ssl
    }

    pub fn replies(&mut self) -> &mut ReplyQueue {
        &mut self.ctx.replies
    }

    pub fn get_net_error_code(
        &mut self,
        result: io::Result<i32>,
        caller: &str,
        is_rw: bool,
    ) -> i32 {
        self.ctx.get_net_error_code(result, caller, is_rw)
    }

    pub fn last_net_error(&self) -> i32 {
        self.ctx.last_error()
    }

    pub fn socket(&self, wii_fd: i32) -> Option<&WiiSocket> {
        self.sockets.get(&wii_fd)
    }

    pub fn socket_mut(&mut self, wii_fd: i32) -> Option<&mut WiiSocket> {
        self.sockets.get_mut(&wii_fd)
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn pending_poll_count(&self) -> usize {
        self.polls.len()
    }

    /// `SOCKET(af, type, protocol)` with the guest's constants. Guest
    /// socket addresses are IPv4 only, so `AF_INET6` is refused.
    pub fn new_socket(&mut self, af: u32, ty: u32, protocol: u32) -> i32 {
        if af == WII_AF_INET6 {
            log::warn!("SO_SOCKET: AF_INET6 sockets are not supported");
            return -SO_EAFNOSUPPORT;
        }
        if af != WII_AF_INET as u32 {
            return -SO_EAFNOSUPPORT;
        }
        if protocol != 0 {
            log::error!("SO_SOCKET: unsupported protocol {protocol}");
            return -SO_EPROTONOSUPPORT;
        }
        let native_type = match ty {
            WII_SOCK_STREAM => Type::STREAM,
            WII_SOCK_DGRAM => Type::DGRAM,
            _ => return -SO_EPROTOTYPE,
        };
        let host = sys::socket(Domain::IPV4, native_type);
        self.add_socket(host, false)
    }

    /// Register a host socket under the first free Wii fd. `is_rw` marks
    /// sockets produced by `accept`.
    pub fn add_socket(&mut self, host: io::Result<Socket>, is_rw: bool) -> i32 {
        let caller = if is_rw { "SO_ACCEPT" } else { "NewSocket" };
        let host = match host {
            Ok(host) => host,
            Err(e) => return self.ctx.get_net_error_code(Err(e), caller, is_rw),
        };
        let host_fd = host.as_raw_fd();

        let Some(wii_fd) = (0..WII_SOCKET_FD_MAX).find(|fd| !self.sockets.contains_key(fd)) else {
            log::error!("{caller}: all {WII_SOCKET_FD_MAX} Wii sockets are in use");
            drop(host);
            self.ctx.set_last_error(-SO_EMFILE);
            return -SO_EMFILE;
        };

        if !is_rw && !sys::is_stream(&host) {
            // Guests expect UDP sockets to be able to broadcast.
            if let Err(e) = host.set_broadcast(true) {
                log::error!("Failed to enable broadcast on socket {wii_fd}: {e}");
            }
        }
        self.sockets.insert(wii_fd, WiiSocket::new(host, wii_fd));
        log::debug!("{caller}: host socket {host_fd} is Wii socket {wii_fd}");
        self.ctx.get_net_error_code(Ok(wii_fd), caller, is_rw)
    }

    pub fn get_host_socket(&self, wii_fd: i32) -> Option<&Socket> {
        self.sockets.get(&wii_fd).and_then(WiiSocket::host_socket)
    }

    /// Host socket, or `EBADF` ready to go through
    /// [`get_net_error_code`](Self::get_net_error_code).
    pub fn host_socket_or_ebadf(&self, wii_fd: i32) -> io::Result<&Socket> {
        self.get_host_socket(wii_fd).ok_or_else(sys::bad_fd)
    }

    /// `SSL_SHUTDOWN`: drop an SSL context, saying goodbye over its socket
    /// if that is still open.
    pub fn shutdown_ssl(&mut self, ssl_id: i32) -> i32 {
        let host = self
            .ssl
            .wii_fd(ssl_id)
            .and_then(|fd| self.sockets.get(&fd))
            .and_then(WiiSocket::host_socket);
        self.ssl.shutdown(ssl_id, host)
    }

    pub fn is_socket_blocking(&self, wii_fd: i32) -> bool {
        self.sockets.get(&wii_fd).is_some_and(|s| !s.is_non_blocking())
    }

    pub fn shutdown_socket(&mut self, wii_fd: i32, how: u32) -> i32 {
        match self.sockets.get_mut(&wii_fd) {
            Some(socket) => socket.shutdown(how, &mut self.ctx),
            None => -SO_EBADF,
        }
    }

    pub fn delete_socket(&mut self, wii_fd: i32) -> i32 {
        match self.sockets.remove(&wii_fd) {
            Some(mut socket) => socket.close_fd(&mut self.ctx),
            None => -SO_EBADF,
        }
    }

    /// Queue an operation on a socket; the reply comes from [`update`](Self::update).
    pub fn do_sock(&mut self, wii_fd: i32, request: Request, op: SockOp) {
        match self.sockets.get_mut(&wii_fd) {
            Some(socket) => socket.do_sock(request, op),
            None => {
                log::error!("DoSock: socket {wii_fd} not found for {op:?}");
                self.ctx.replies.enqueue(request, -SO_EBADF);
            }
        }
    }

    pub fn add_poll_command(&mut self, cmd: PollCommand) {
        self.polls.push(cmd);
    }

    /// Advance every socket and poll request.
    pub fn update(&mut self, memory: &mut dyn Memory) {
        self.sockets.retain(|_, socket| socket.is_valid());

        let mut accepted = Vec::new();
        {
            let mut env = SocketEnv {
                memory: &mut *memory,
                ctx: &mut self.ctx,
                ssl: &mut self.ssl,
                accepted: &mut accepted,
                connect_timeout: self.connect_timeout,
            };
            for socket in self.sockets.values_mut() {
                socket.update(&mut env);
            }
        }
        for (request, host) in accepted {
            let ret = self.add_socket(Ok(host), true);
            self.ctx.replies.enqueue(request, ret);
        }

        let sockets = &self.sockets;
        self.ssl
            .flush_all(|fd| sockets.get(&fd).and_then(WiiSocket::host_socket));
        self.update_poll_commands(memory);
    }

    pub fn update_poll_commands(&mut self, memory: &mut dyn Memory) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_poll_time).as_millis() as i64;
        self.last_poll_time = now;
        if self.polls.is_empty() {
            return;
        }

        let hangup = (libc::POLLHUP | libc::POLLERR) as i16;
        let mut index = 0;
        while index < self.polls.len() {
            let cmd = &mut self.polls[index];
            if cmd.timeout > 0 {
                cmd.timeout = (cmd.timeout - elapsed).max(0);
            }

            let ret = if cmd.fds.first().is_some_and(|fd| fd.revents & hangup == hangup) {
                // Restored from a save-state: the host sockets are gone.
                cmd.fds.len() as i32
            } else {
                let mut host_fds = Vec::with_capacity(cmd.fds.len());
                let mut slots = Vec::with_capacity(cmd.fds.len());
                for (i, fd) in cmd.fds.iter_mut().enumerate() {
                    fd.revents = 0;
                    let host = self.sockets.get(&fd.wii_fd).and_then(WiiSocket::host_socket);
                    if let Some(host) = host {
                        let events = PollFlags::from_bits_truncate(fd.events);
                        host_fds.push(PollFd::new(host.as_fd(), events));
                        slots.push(i);
                    }
                }
                match sys::poll(&mut host_fds) {
                    Ok(n) => {
                        for (pfd, &i) in host_fds.iter().zip(&slots) {
                            cmd.fds[i].revents = pfd.revents().map_or(0, |r| r.bits());
                        }
                        n as i32
                    }
                    Err(e) => self.ctx.get_net_error_code(Err(e), "SO_POLL", false),
                }
            };

            if ret == 0 && cmd.timeout != 0 {
                index += 1;
                continue;
            }

            for (i, fd) in cmd.fds.iter().enumerate() {
                let revents = convert_events(fd.revents as i32, ConvertDirection::NativeToWii);
                memory.write_u32(revents as u32, cmd.buffer_out + WII_POLLFD_SIZE * i as u32 + 8);
            }
            let request = Request::parse(memory, cmd.request_addr);
            log::debug!("SO_POLL at {:#010x} completed with {ret}", cmd.request_addr);
            self.ctx.replies.enqueue(request, ret);
            self.polls.remove(index);
        }
    }

    /// Close every socket and forget every SSL context and poll, as an IOS
    /// reload does. Queued operations are answered with `ENOTCONN`.
    pub fn clean(&mut self) {
        let sockets = std::mem::take(&mut self.sockets);
        for (_, mut socket) in sockets {
            socket.close_fd(&mut self.ctx);
        }
        self.polls.clear();
        self.ssl.clear();
    }
}

impl Stateful for WiiSockMan {
    /// Only pending polls are saved; host sockets cannot survive a
    /// save-state.
    fn save_state(&self, writer: &mut StateWriter) {
        writer.write_u32(self.polls.len() as u32);
        for cmd in &self.polls {
            cmd.save(writer);
        }
    }

    fn load_state(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        let count = reader.read_u32("poll count")?;
        let mut polls = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            let mut cmd = PollCommand::load(reader)?;
            for fd in &mut cmd.fds {
                fd.revents = (libc::POLLHUP | libc::POLLERR) as i16;
            }
            polls.push(cmd);
        }
        self.polls = polls;
        self.last_poll_time = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
