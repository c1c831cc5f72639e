//! Wii socket error numbers and translation from host `errno`.
//!
//! The Wii's socket library uses its own errno numbering, unrelated to the
//! host's. Guest-visible failures are the negated Wii value.

pub const SO_SUCCESS: i32 = 0;
pub const SO_E2BIG: i32 = 1;
pub const SO_EACCES: i32 = 2;
pub const SO_EADDRINUSE: i32 = 3;
pub const SO_EADDRNOTAVAIL: i32 = 4;
pub const SO_EAFNOSUPPORT: i32 = 5;
pub const SO_EAGAIN: i32 = 6;
pub const SO_EALREADY: i32 = 7;
pub const SO_EBADF: i32 = 8;
pub const SO_EBADMSG: i32 = 9;
pub const SO_EBUSY: i32 = 10;
pub const SO_ECANCELED: i32 = 11;
pub const SO_ECHILD: i32 = 12;
pub const SO_ECONNABORTED: i32 = 13;
pub const SO_ECONNREFUSED: i32 = 14;
pub const SO_ECONNRESET: i32 = 15;
pub const SO_EDEADLK: i32 = 16;
pub const SO_EDESTADDRREQ: i32 = 17;
pub const SO_EDOM: i32 = 18;
pub const SO_EDQUOT: i32 = 19;
pub const SO_EEXIST: i32 = 20;
pub const SO_EFAULT: i32 = 21;
pub const SO_EFBIG: i32 = 22;
pub const SO_EHOSTUNREACH: i32 = 23;
pub const SO_EIDRM: i32 = 24;
pub const SO_EILSEQ: i32 = 25;
pub const SO_EINPROGRESS: i32 = 26;
pub const SO_EINTR: i32 = 27;
pub const SO_EINVAL: i32 = 28;
pub const SO_EIO: i32 = 29;
pub const SO_EISCONN: i32 = 30;
pub const SO_EISDIR: i32 = 31;
pub const SO_ELOOP: i32 = 32;
pub const SO_EMFILE: i32 = 33;
pub const SO_EMLINK: i32 = 34;
pub const SO_EMSGSIZE: i32 = 35;
pub const SO_EMULTIHOP: i32 = 36;
pub const SO_ENAMETOOLONG: i32 = 37;
pub const SO_ENETDOWN: i32 = 38;
pub const SO_ENETRESET: i32 = 39;
pub const SO_ENETUNREACH: i32 = 40;
pub const SO_ENFILE: i32 = 41;
pub const SO_ENOBUFS: i32 = 42;
pub const SO_ENODATA: i32 = 43;
pub const SO_ENODEV: i32 = 44;
pub const SO_ENOENT: i32 = 45;
pub const SO_ENOEXEC: i32 = 46;
pub const SO_ENOLCK: i32 = 47;
pub const SO_ENOLINK: i32 = 48;
pub const SO_ENOMEM: i32 = 49;
pub const SO_ENOMSG: i32 = 50;
pub const SO_ENOPROTOOPT: i32 = 51;
pub const SO_ENOSPC: i32 = 52;
pub const SO_ENOSR: i32 = 53;
pub const SO_ENOSTR: i32 = 54;
pub const SO_ENOSYS: i32 = 55;
pub const SO_ENOTCONN: i32 = 56;
pub const SO_ENOTDIR: i32 = 57;
pub const SO_ENOTEMPTY: i32 = 58;
pub const SO_ENOTSOCK: i32 = 59;
pub const SO_ENOTSUP: i32 = 60;
pub const SO_ENOTTY: i32 = 61;
pub const SO_ENXIO: i32 = 62;
pub const SO_EOPNOTSUPP: i32 = 63;
pub const SO_EOVERFLOW: i32 = 64;
pub const SO_EPERM: i32 = 65;
pub const SO_EPIPE: i32 = 66;
pub const SO_EPROTO: i32 = 67;
pub const SO_EPROTONOSUPPORT: i32 = 68;
pub const SO_EPROTOTYPE: i32 = 69;
pub const SO_ERANGE: i32 = 70;
pub const SO_EROFS: i32 = 71;
pub const SO_ESPIPE: i32 = 72;
pub const SO_ESRCH: i32 = 73;
pub const SO_ESTALE: i32 = 74;
pub const SO_ETIME: i32 = 75;
pub const SO_ETIMEDOUT: i32 = 76;
pub const SO_ETXTBSY: i32 = 77;
pub const SO_EXDEV: i32 = 78;

// Message flags accepted by sendto/recvfrom.
pub const SO_MSG_OOB: u32 = 0x01;
pub const SO_MSG_PEEK: u32 = 0x02;
pub const SO_MSG_NONBLOCK: u32 = 0x04;

/// Negated Wii errno for a host `errno`.
///
/// `EAGAIN` means "try the read/write again" for data transfers but
/// "still connecting" for everything else, so callers say which one they
/// are with `is_rw`. Unknown codes become `-1`.
pub fn translate_error_code(native: i32, is_rw: bool) -> i32 {
    if native == libc::EAGAIN || native == libc::EWOULDBLOCK {
        return if is_rw { -SO_EAGAIN } else { -SO_EINPROGRESS };
    }
    if native == libc::ENOTSUP || native == libc::EOPNOTSUPP {
        return -SO_EOPNOTSUPP;
    }
    let wii = match native {
        libc::EMSGSIZE => {
            log::error!("Host socket reported EMSGSIZE");
            return -1;
        }
        libc::EBADF | libc::ENOTSOCK => SO_EBADF,
        libc::EADDRINUSE => SO_EADDRINUSE,
        libc::EADDRNOTAVAIL => SO_EADDRNOTAVAIL,
        libc::EAFNOSUPPORT => SO_EAFNOSUPPORT,
        libc::ECONNRESET => SO_ECONNRESET,
        libc::ECONNABORTED => SO_ECONNABORTED,
        libc::EISCONN => SO_EISCONN,
        libc::ENOTCONN => SO_ENOTCONN,
        libc::EINPROGRESS => SO_EINPROGRESS,
        libc::EALREADY => SO_EALREADY,
        libc::EACCES => SO_EACCES,
        libc::EPERM => SO_EPERM,
        libc::ECONNREFUSED => SO_ECONNREFUSED,
        libc::ENETUNREACH => SO_ENETUNREACH,
        libc::EHOSTUNREACH => SO_EHOSTUNREACH,
        libc::ENETDOWN => SO_ENETDOWN,
        libc::ENETRESET => SO_ENETRESET,
        libc::ENOMEM | libc::ENOBUFS => SO_ENOMEM,
        libc::ETIMEDOUT => SO_ETIMEDOUT,
        libc::EPIPE => SO_EPIPE,
        libc::EINTR => SO_EINTR,
        libc::EINVAL => SO_EINVAL,
        libc::EFAULT => SO_EFAULT,
        libc::EMFILE => SO_EMFILE,
        libc::ENFILE => SO_ENFILE,
        libc::EDESTADDRREQ => SO_EDESTADDRREQ,
        libc::ENOPROTOOPT => SO_ENOPROTOOPT,
        libc::EPROTONOSUPPORT => SO_EPROTONOSUPPORT,
        libc::EPROTOTYPE => SO_EPROTOTYPE,
        _ => return -1,
    };
    -wii
}
