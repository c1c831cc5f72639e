//! BSD socket emulation for `/dev/net/ip/top` and `/dev/net/ssl`.
//!
//! Guest sockets map onto non-blocking host sockets. Requests that would
//! block are queued on their [`WiiSocket`] and answered later, when
//! [`WiiSockMan::update`] finds they can complete; their replies collect in
//! the manager's [`ReplyQueue`](wii_ios_core::ReplyQueue).

#[cfg(not(unix))]
compile_error!("wii-ios-net drives host sockets through the Unix socket API");

pub mod addr;
pub mod context;
pub mod errno;
pub mod ioctl;
pub mod manager;
pub mod poll;
pub mod socket;
pub mod ssl;
pub mod sys;

pub use addr::WiiSockAddrIn;
pub use context::NetContext;
pub use errno::translate_error_code;
pub use ioctl::{NetIoctl, SockOp, SslIoctl};
pub use manager::{WII_SOCKET_FD_MAX, WiiSockMan};
pub use poll::{ConvertDirection, PollCommand, PollFd, convert_events};
pub use socket::{ConnectingState, WiiSocket};
pub use ssl::SslSessions;
