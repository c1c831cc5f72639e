//! One emulated socket and its queue of operations waiting to complete.

use std::io;
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use socket2::{Socket, Type};

use wii_ios_core::{IoctlRequest, IoctlvRequest, IpcCommand, Memory, Request};

use crate::addr::WiiSockAddrIn;
use crate::context::{NetContext, is_in_progress};
use crate::errno::{
    SO_EAGAIN, SO_EBADF, SO_EFAULT, SO_EINVAL, SO_EISCONN, SO_ENETUNREACH, SO_ENOTCONN,
    SO_MSG_NONBLOCK, SO_MSG_OOB, SO_MSG_PEEK,
};
use crate::ioctl::{NetIoctl, SockOp, SslIoctl};
use crate::ssl::{SSL_ERR_ID, SSL_ERR_RAGAIN, SSL_ERR_SYSCALL, SSL_ERR_WAGAIN, SslSessions};
use crate::sys;

// fcntl commands and flags as the guest numbers them.
pub const WII_F_GETFL: u32 = 3;
pub const WII_F_SETFL: u32 = 4;
pub const WII_O_NONBLOCK: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectingState {
    #[default]
    None,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingOp {
    pub request: Request,
    pub op: SockOp,
    /// Already answered by `shutdown`; dropped silently on the next update.
    pub is_aborted: bool,
}

/// Everything a socket needs from its manager while servicing its queue.
pub(crate) struct SocketEnv<'a> {
    pub memory: &'a mut dyn Memory,
    pub ctx: &'a mut NetContext,
    pub ssl: &'a mut SslSessions,
    /// Connections accepted this update, registered by the manager once
    /// every socket has been serviced.
    pub accepted: &'a mut Vec<(Request, Socket)>,
    pub connect_timeout: Duration,
}

fn native_shutdown_how(how: u32) -> Shutdown {
    match how {
        0 => Shutdown::Read,
        1 => Shutdown::Write,
        _ => Shutdown::Both,
    }
}

fn native_msg_flags(flags: u32) -> i32 {
    let mut native = 0;
    if flags & SO_MSG_OOB != 0 {
        native |= libc::MSG_OOB;
    }
    if flags & SO_MSG_PEEK != 0 {
        native |= libc::MSG_PEEK;
    }
    native
}

#[derive(Debug)]
pub struct WiiSocket {
    socket: Option<Socket>,
    wii_fd: i32,
    non_block: bool,
    connecting_state: ConnectingState,
    pending_ops: Vec<PendingOp>,
    timeout: Option<Instant>,
}

impl WiiSocket {
    pub fn new(host: Socket, wii_fd: i32) -> Self {
        let mut socket = Self {
            socket: None,
            wii_fd,
            non_block: false,
            connecting_state: ConnectingState::None,
            pending_ops: Vec::new(),
            timeout: None,
        };
        socket.set_fd(host);
        socket
    }

    /// Adopt a host socket, closing the previous one. The host side is
    /// always non-blocking; the guest-visible blocking mode starts out
    /// blocking.
    pub fn set_fd(&mut self, host: Socket) {
        if let Err(e) = host.set_nonblocking(true) {
            log::error!("Failed to make host socket {} non-blocking: {e}", host.as_raw_fd());
        }
        self.socket = Some(host);
        self.non_block = false;
        self.connecting_state = ConnectingState::None;
        self.timeout = None;
    }

    pub fn host_socket(&self) -> Option<&Socket> {
        self.socket.as_ref()
    }

    fn sock(&self) -> io::Result<&Socket> {
        self.socket.as_ref().ok_or_else(sys::bad_fd)
    }

    pub fn wii_fd(&self) -> i32 {
        self.wii_fd
    }

    pub fn is_valid(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_block
    }

    pub fn pending_count(&self) -> usize {
        self.pending_ops.iter().filter(|op| !op.is_aborted).count()
    }

    pub fn is_tcp(&self) -> bool {
        self.socket.as_ref().is_some_and(sys::is_stream)
    }

    /// Current connection progress. A socket in `Connecting` is re-checked
    /// against the host: writable with no pending error and a peer means
    /// connected.
    pub fn connecting_state(&mut self) -> ConnectingState {
        if self.connecting_state != ConnectingState::Connecting {
            return self.connecting_state;
        }
        let Ok(host) = self.sock() else {
            self.connecting_state = ConnectingState::Error;
            return ConnectingState::Error;
        };
        let state = match sys::is_writable(host) {
            Ok(false) => ConnectingState::Connecting,
            Ok(true) => match host.take_error() {
                Ok(None) if sys::getpeername(host).is_ok() => ConnectingState::Connected,
                Ok(None) => ConnectingState::Error,
                Ok(Some(err)) => {
                    log::debug!("Socket {} failed to connect: {err}", self.wii_fd);
                    ConnectingState::Error
                }
                Err(_) => ConnectingState::Error,
            },
            Err(e) => {
                log::warn!("Polling socket {} for connect progress failed: {e}", self.wii_fd);
                ConnectingState::Error
            }
        };
        self.connecting_state = state;
        state
    }

    fn update_connecting_state(&mut self, connect_ret: i32) {
        self.connecting_state = if is_in_progress(connect_ret) {
            ConnectingState::Connecting
        } else if connect_ret >= 0 {
            ConnectingState::Connected
        } else {
            ConnectingState::Error
        };
    }

    fn connect_timed_out(&mut self, limit: Duration) -> bool {
        let deadline = *self.timeout.get_or_insert_with(|| Instant::now() + limit);
        Instant::now() > deadline
    }

    fn reset_timeout(&mut self) {
        self.timeout = None;
    }

    pub fn fcntl(&mut self, cmd: u32, arg: u32) -> i32 {
        match cmd {
            WII_F_GETFL => {
                if self.non_block {
                    WII_O_NONBLOCK as i32
                } else {
                    0
                }
            }
            WII_F_SETFL => {
                self.non_block = arg & WII_O_NONBLOCK == WII_O_NONBLOCK;
                0
            }
            _ => {
                log::error!(
                    "SO_FCNTL: unknown command {cmd} (arg {arg:#x}) on socket {}",
                    self.wii_fd
                );
                0
            }
        }
    }

    fn abort(op: &mut PendingOp, ctx: &mut NetContext, value: i32) {
        if op.is_aborted {
            return;
        }
        op.is_aborted = true;
        ctx.replies.enqueue(op.request, value);
    }

    /// `shutdown(how)`: stop the host socket and answer the queued
    /// operations that can no longer finish.
    pub fn shutdown(&mut self, how: u32, ctx: &mut NetContext) -> i32 {
        if how > 2 {
            return -SO_EINVAL;
        }
        let Some(host) = self.socket.as_ref() else {
            return -SO_EBADF;
        };
        match host.r#type() {
            Ok(ty) if ty == Type::STREAM => {}
            Ok(ty) if ty == Type::DGRAM => return 0,
            _ => return -SO_EBADF,
        }

        let ret = ctx.get_net_error_code(
            host.shutdown(native_shutdown_how(how)).map(|()| 0),
            "SO_SHUTDOWN",
            false,
        );

        let shut_read = how == 0 || how == 2;
        let shut_write = how == 1 || how == 2;
        let non_block = self.non_block;
        for op in &mut self.pending_ops {
            let SockOp::Net(net) = op.op else {
                continue;
            };
            match net {
                NetIoctl::Accept if shut_write => Self::abort(op, ctx, -SO_EINVAL),
                NetIoctl::Connect if shut_write && !non_block => {
                    Self::abort(op, ctx, -SO_ENETUNREACH)
                }
                NetIoctl::RecvFrom if shut_read => Self::abort(op, ctx, -SO_ENOTCONN),
                NetIoctl::SendTo if shut_write => Self::abort(op, ctx, -SO_ENOTCONN),
                _ => {}
            }
        }
        ret
    }

    /// Close the host socket and fail everything still queued.
    pub fn close_fd(&mut self, ctx: &mut NetContext) -> i32 {
        let result = match self.socket.take() {
            Some(host) => {
                drop(host);
                Ok(0)
            }
            None => Err(sys::bad_fd()),
        };
        let ret = ctx.get_net_error_code(result, "CloseFd", false);

        for op in self.pending_ops.drain(..) {
            if !op.is_aborted {
                ctx.replies.enqueue(op.request, -SO_ENOTCONN);
            }
        }
        self.connecting_state = ConnectingState::None;
        ret
    }

    pub fn do_sock(&mut self, request: Request, op: SockOp) {
        self.pending_ops.push(PendingOp {
            request,
            op,
            is_aborted: false,
        });
    }

    /// Try every queued operation once. Completed ones get their reply
    /// queued; the rest wait for the next update.
    pub(crate) fn update(&mut self, env: &mut SocketEnv<'_>) {
        let mut index = 0;
        while index < self.pending_ops.len() {
            let pending = self.pending_ops[index];
            if pending.is_aborted {
                self.pending_ops.remove(index);
                continue;
            }

            let mut force_non_block = false;
            let serviced = match (pending.op, pending.request.ipc_command()) {
                (SockOp::Net(op), Some(IpcCommand::Ioctl)) => {
                    self.service_ioctl(op, &pending.request, env)
                }
                (SockOp::Net(op), Some(IpcCommand::Ioctlv)) => {
                    Some(self.service_ioctlv(op, &pending.request, env, &mut force_non_block))
                }
                (SockOp::Ssl(op), Some(IpcCommand::Ioctlv)) => {
                    Some(self.service_ssl(op, &pending.request, env))
                }
                (op, command) => {
                    log::warn!("Socket {}: cannot service {op:?} via {command:?}", self.wii_fd);
                    Some(0)
                }
            };
            let Some(mut ret) = serviced else {
                // Handed to the manager as a new socket.
                self.pending_ops.remove(index);
                continue;
            };

            if !self.non_block && pending.op == SockOp::Net(NetIoctl::Connect) {
                if is_in_progress(ret) {
                    if self.connect_timed_out(env.connect_timeout) {
                        log::info!("Socket {}: blocking connect timed out", self.wii_fd);
                        ret = -SO_ENETUNREACH;
                        self.reset_timeout();
                        self.connecting_state = ConnectingState::Error;
                    }
                } else if ret == -SO_EISCONN {
                    ret = 0;
                    self.reset_timeout();
                    self.connecting_state = ConnectingState::Connected;
                } else {
                    self.reset_timeout();
                }
            }

            let complete = self.non_block
                || force_non_block
                || match pending.op {
                    SockOp::Net(_) => !is_in_progress(ret),
                    SockOp::Ssl(_) => ret != SSL_ERR_WAGAIN && ret != SSL_ERR_RAGAIN,
                };
            if complete {
                log::debug!("Socket {}: {:?} completed with {ret}", self.wii_fd, pending.op);
                env.ctx.replies.enqueue(pending.request, ret);
                self.pending_ops.remove(index);
            } else {
                index += 1;
            }
        }
    }

    /// `None` when an accepted connection was handed to the manager.
    fn service_ioctl(
        &mut self,
        op: NetIoctl,
        request: &Request,
        env: &mut SocketEnv<'_>,
    ) -> Option<i32> {
        let ioctl = IoctlRequest::parse(env.memory, request.address);
        let ret = match op {
            NetIoctl::Fcntl => {
                let cmd = env.memory.read_u32(ioctl.buffer_in + 4);
                let arg = env.memory.read_u32(ioctl.buffer_in + 8);
                self.fcntl(cmd, arg)
            }
            NetIoctl::Bind => {
                let addr = WiiSockAddrIn::read(env.memory, ioctl.buffer_in + 8).to_host();
                let result = self.sock().and_then(|host| sys::bind(host, addr));
                let ret = env.ctx.get_net_error_code(result.map(|()| 0), "SO_BIND", false);
                log::info!("SO_BIND: socket {} to {addr} = {ret}", self.wii_fd);
                ret
            }
            NetIoctl::Connect => {
                let addr = WiiSockAddrIn::read(env.memory, ioctl.buffer_in + 8).to_host();
                let result = self.sock().and_then(|host| sys::connect(host, addr));
                let ret = env.ctx.get_net_error_code(result.map(|()| 0), "SO_CONNECT", false);
                self.update_connecting_state(ret);
                log::debug!("SO_CONNECT: socket {} to {addr} = {ret}", self.wii_fd);
                ret
            }
            NetIoctl::Accept => match self.sock().and_then(sys::accept) {
                Ok((accepted, peer)) => {
                    if ioctl.buffer_out_size > 0 {
                        WiiSockAddrIn::from(peer).write(env.memory, ioctl.buffer_out);
                    }
                    log::info!("SO_ACCEPT: socket {} accepted {peer}", self.wii_fd);
                    env.accepted.push((*request, accepted));
                    return None;
                }
                Err(e) => env.ctx.get_net_error_code(Err(e), "SO_ACCEPT", true),
            },
            other => {
                log::warn!("Socket {}: {other:?} is not a deferred ioctl", self.wii_fd);
                0
            }
        };
        Some(ret)
    }

    fn service_ioctlv(
        &mut self,
        op: NetIoctl,
        request: &Request,
        env: &mut SocketEnv<'_>,
        force_non_block: &mut bool,
    ) -> i32 {
        let v = IoctlvRequest::parse(env.memory, request.address);
        match op {
            NetIoctl::SendTo => {
                if self.non_block
                    && self.is_tcp()
                    && self.connecting_state() == ConnectingState::Connecting
                {
                    return -SO_EAGAIN;
                }
                let params = v.in_address(1);
                let flags = env.memory.read_u32(params + 4);
                let has_destaddr = env.memory.read_u32(params + 8) != 0;
                *force_non_block = flags & SO_MSG_NONBLOCK == SO_MSG_NONBLOCK;
                let dest = has_destaddr
                    .then(|| WiiSockAddrIn::read(env.memory, params + 0xC).to_host());

                let (data_addr, data_len) = (v.in_address(0), v.in_size(0) as usize);
                if !env.memory.is_valid_range(data_addr, data_len) {
                    return -SO_EFAULT;
                }
                let data = env.memory.copy_from_emu(data_addr, data_len);
                let native_flags = native_msg_flags(flags & SO_MSG_OOB);
                let result = self
                    .sock()
                    .and_then(|host| sys::send_to(host, &data, native_flags, dest));
                let ret = env
                    .ctx
                    .get_net_error_code(result.map(|n| n as i32), "SO_SENDTO", true);
                log::debug!(
                    "SO_SENDTO: socket {}, {} bytes to {dest:?} = {ret}",
                    self.wii_fd,
                    data.len()
                );
                ret
            }
            NetIoctl::RecvFrom => {
                if self.non_block
                    && self.is_tcp()
                    && self.connecting_state() == ConnectingState::Connecting
                {
                    return -SO_EAGAIN;
                }
                let flags = env.memory.read_u32(v.in_address(0) + 4);
                *force_non_block = flags & SO_MSG_NONBLOCK == SO_MSG_NONBLOCK;

                let len = env.memory.mapped_len(v.io_address(0), v.io_size(0) as usize);
                let mut buf = vec![0u8; len];
                let native_flags = native_msg_flags(flags & (SO_MSG_PEEK | SO_MSG_OOB));
                let result = self
                    .sock()
                    .and_then(|host| sys::recv_from(host, &mut buf, native_flags));
                let ret = match result {
                    Ok((n, from)) => {
                        env.memory.copy_to_emu(v.io_address(0), &buf[..n]);
                        if v.io_size(1) != 0 {
                            if let Some(from) = from {
                                WiiSockAddrIn::from(from).write(env.memory, v.io_address(1));
                            }
                        }
                        env.ctx.get_net_error_code(Ok(n as i32), "SO_RECVFROM", true)
                    }
                    Err(e) => env.ctx.get_net_error_code(Err(e), "SO_RECVFROM", true),
                };
                log::debug!("SO_RECVFROM: socket {} = {ret}", self.wii_fd);
                ret
            }
            other => {
                log::warn!("Socket {}: {other:?} is not a deferred ioctlv", self.wii_fd);
                0
            }
        }
    }

    /// SSL operations report their result through the first input buffer;
    /// the IPC return value only carries "try again" for blocking sockets.
    fn service_ssl(&mut self, op: SslIoctl, request: &Request, env: &mut SocketEnv<'_>) -> i32 {
        let v = IoctlvRequest::parse(env.memory, request.address);
        let result_addr = v.in_address(0);
        let ssl_id = env.memory.read_u32(v.io_address(0)) as i32 - 1;
        if !env.ssl.is_valid_id(ssl_id) {
            env.memory.write_u32(SSL_ERR_ID as u32, result_addr);
            return 0;
        }

        let mut ret = 0;
        let result = match op {
            SslIoctl::DoHandshake => match self.connecting_state() {
                ConnectingState::Connecting => {
                    ret = SSL_ERR_RAGAIN;
                    SSL_ERR_RAGAIN
                }
                ConnectingState::None | ConnectingState::Error => SSL_ERR_SYSCALL,
                ConnectingState::Connected => match self.socket.as_ref() {
                    Some(host) => env.ssl.handshake(ssl_id, host),
                    None => SSL_ERR_SYSCALL,
                },
            },
            SslIoctl::Write => {
                let len = env.memory.mapped_len(v.io_address(1), v.io_size(1) as usize);
                let data = env.memory.copy_from_emu(v.io_address(1), len);
                match self.socket.as_ref() {
                    Some(host) => env.ssl.write(ssl_id, host, &data),
                    None => SSL_ERR_SYSCALL,
                }
            }
            SslIoctl::Read => {
                let Some(host) = self.socket.as_ref() else {
                    env.memory.write_u32(SSL_ERR_SYSCALL as u32, result_addr);
                    return 0;
                };
                let len = env.memory.mapped_len(v.in_address(1), v.in_size(1) as usize);
                let mut buf = vec![0u8; len];
                let n = env.ssl.read(ssl_id, host, &mut buf);
                if n > 0 {
                    env.memory.copy_to_emu(v.in_address(1), &buf[..n as usize]);
                }
                n
            }
            other => {
                log::warn!("Socket {}: {other:?} is not a deferred SSL ioctl", self.wii_fd);
                return 0;
            }
        };
        if (result == SSL_ERR_RAGAIN || result == SSL_ERR_WAGAIN) && !self.non_block {
            ret = result;
        }
        log::debug!("SSL {op:?} on context {} = {result}", ssl_id + 1);
        env.memory.write_u32(result as u32, result_addr);
        ret
    }
}
