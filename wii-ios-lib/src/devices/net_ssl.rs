//! `/dev/net/ssl`: TLS client contexts layered over `/dev/net/ip/top`
//! sockets.
//!
//! Every ioctlv takes the context id (1-based) in `io[0]` and reports its
//! SSL result code in `in[0]`; the IPC return value itself is success
//! unless the operation was deferred to the socket manager.

use wii_ios_core::codes::IPC_SUCCESS;
use wii_ios_core::{IoctlRequest, IoctlvRequest, IpcReply};
use wii_ios_net::ssl::{SSL_ERR_FAILED, SSL_ERR_ID, SSL_OK};
use wii_ios_net::{SockOp, SslIoctl};

use crate::device::{Device, DeviceEnv};

const MAX_HOSTNAME: usize = 0x100;

#[derive(Debug, Default, Clone, Copy)]
pub struct NetSslDevice;

impl NetSslDevice {
    fn new_context(env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> i32 {
        let verify_option = env.memory.read_u32(request.io_address(0));
        let max = (request.io_size(1) as usize).clamp(1, MAX_HOSTNAME);
        let hostname = env.memory.read_cstring(request.io_address(1), max);
        let ret = env.sockets.ssl_mut().create(&hostname, verify_option);
        log::info!("IOCTLV_NET_SSL_NEW({hostname}, verify {verify_option}) = {ret}");
        ret
    }

    fn connect(env: &mut DeviceEnv<'_>, ssl_id: i32, request: &IoctlvRequest) -> i32 {
        let wii_fd = env.memory.read_u32(request.io_address(1)) as i32;
        if env.sockets.get_host_socket(wii_fd).is_none() {
            log::warn!("IOCTLV_NET_SSL_CONNECT: socket {wii_fd} is not open");
            return SSL_ERR_FAILED;
        }
        let ret = env.sockets.ssl_mut().connect(ssl_id, wii_fd);
        log::info!("IOCTLV_NET_SSL_CONNECT({}, {wii_fd}) = {ret}", ssl_id + 1);
        ret
    }
}

impl Device for NetSslDevice {
    fn name(&self) -> &'static str {
        "/dev/net/ssl"
    }

    fn ioctl(&mut self, _env: &mut DeviceEnv<'_>, request: &IoctlRequest) -> Option<IpcReply> {
        log::info!("/dev/net/ssl: ioctl {:#x} ignored", request.request);
        Some(IpcReply::new(IPC_SUCCESS))
    }

    fn ioctlv(&mut self, env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> Option<IpcReply> {
        let Some(op) = SslIoctl::from_u32(request.request) else {
            log::warn!("/dev/net/ssl: unknown ioctlv {:#x}", request.request);
            return Some(IpcReply::new(IPC_SUCCESS));
        };
        let result_addr = request.in_address(0);

        if op == SslIoctl::New {
            let ret = Self::new_context(env, request);
            env.memory.write_u32(ret as u32, result_addr);
            return Some(IpcReply::new(IPC_SUCCESS));
        }

        let ssl_id = env.memory.read_u32(request.io_address(0)) as i32 - 1;
        if !env.sockets.ssl().is_valid_id(ssl_id) {
            log::warn!("/dev/net/ssl: {op:?} on unknown context {}", ssl_id + 1);
            env.memory.write_u32(SSL_ERR_ID as u32, result_addr);
            return Some(IpcReply::new(IPC_SUCCESS));
        }

        let ret = match op {
            SslIoctl::Connect => Self::connect(env, ssl_id, request),
            SslIoctl::Shutdown => env.sockets.shutdown_ssl(ssl_id),
            SslIoctl::DoHandshake | SslIoctl::Read | SslIoctl::Write => {
                let wii_fd = env.sockets.ssl().wii_fd(ssl_id).unwrap_or(-1);
                env.sockets.do_sock(wii_fd, request.header, SockOp::Ssl(op));
                return None;
            }
            other => {
                // Certificates are managed by the host TLS stack.
                log::info!("/dev/net/ssl: {other:?} accepted without effect");
                SSL_OK
            }
        };
        env.memory.write_u32(ret as u32, result_addr);
        Some(IpcReply::new(IPC_SUCCESS))
    }
}
