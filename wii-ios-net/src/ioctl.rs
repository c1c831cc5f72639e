//! Ioctl numbers of `/dev/net/ip/top` and `/dev/net/ssl`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum NetIoctl {
    Accept = 1,
    Bind = 2,
    Close = 3,
    Connect = 4,
    Fcntl = 5,
    GetPeerName = 6,
    GetSockName = 7,
    GetSockOpt = 8,
    SetSockOpt = 9,
    Listen = 10,
    Poll = 11,
    RecvFrom = 12,
    SendTo = 13,
    Shutdown = 14,
    Socket = 15,
    GetHostId = 16,
    GetHostByName = 17,
    GetHostByAddr = 18,
    GetNameInfo = 19,
    Unk14 = 20,
    InetAton = 21,
    InetPton = 22,
    InetNtop = 23,
    GetAddrInfo = 24,
    SockAtMark = 25,
    Unk1A = 26,
    Unk1B = 27,
    GetInterfaceOpt = 28,
    SetInterfaceOpt = 29,
    SetInterface = 30,
    InitInterface = 31,
    IcmpSocket = 0x30,
    IcmpPing = 0x31,
    IcmpCancel = 0x32,
    IcmpClose = 0x33,
}

impl NetIoctl {
    pub fn from_u32(value: u32) -> Option<Self> {
        use NetIoctl::*;
        Some(match value {
            1 => Accept,
            2 => Bind,
            3 => Close,
            4 => Connect,
            5 => Fcntl,
            6 => GetPeerName,
            7 => GetSockName,
            8 => GetSockOpt,
            9 => SetSockOpt,
            10 => Listen,
            11 => Poll,
            12 => RecvFrom,
            13 => SendTo,
            14 => Shutdown,
            15 => Socket,
            16 => GetHostId,
            17 => GetHostByName,
            18 => GetHostByAddr,
            19 => GetNameInfo,
            20 => Unk14,
            21 => InetAton,
            22 => InetPton,
            23 => InetNtop,
            24 => GetAddrInfo,
            25 => SockAtMark,
            26 => Unk1A,
            27 => Unk1B,
            28 => GetInterfaceOpt,
            29 => SetInterfaceOpt,
            30 => SetInterface,
            31 => InitInterface,
            0x30 => IcmpSocket,
            0x31 => IcmpPing,
            0x32 => IcmpCancel,
            0x33 => IcmpClose,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SslIoctl {
    New = 1,
    Connect = 2,
    DoHandshake = 3,
    Read = 4,
    Write = 5,
    Shutdown = 6,
    SetClientCert = 7,
    SetClientCertDefault = 8,
    RemoveClientCert = 9,
    SetRootCa = 0xA,
    SetRootCaDefault = 0xB,
    DoHandshakeEx = 0xC,
    SetBuiltinRootCa = 0xD,
    SetBuiltinClientCert = 0xE,
    DisableVerifyOptionForDebug = 0xF,
    DebugGetVersion = 0x14,
    DebugGetTime = 0x15,
}

impl SslIoctl {
    pub fn from_u32(value: u32) -> Option<Self> {
        use SslIoctl::*;
        Some(match value {
            1 => New,
            2 => Connect,
            3 => DoHandshake,
            4 => Read,
            5 => Write,
            6 => Shutdown,
            7 => SetClientCert,
            8 => SetClientCertDefault,
            9 => RemoveClientCert,
            0xA => SetRootCa,
            0xB => SetRootCaDefault,
            0xC => DoHandshakeEx,
            0xD => SetBuiltinRootCa,
            0xE => SetBuiltinClientCert,
            0xF => DisableVerifyOptionForDebug,
            0x14 => DebugGetVersion,
            0x15 => DebugGetTime,
            _ => return None,
        })
    }
}

/// Operation queued on a socket until it can complete without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOp {
    Net(NetIoctl),
    Ssl(SslIoctl),
}

impl SockOp {
    pub fn is_ssl(self) -> bool {
        matches!(self, SockOp::Ssl(_))
    }

    /// Encoding used in save-states: the ioctl number with bit 31 set for
    /// SSL operations.
    pub fn to_raw(self) -> u32 {
        match self {
            SockOp::Net(op) => op as u32,
            SockOp::Ssl(op) => op as u32 | 0x8000_0000,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw & 0x8000_0000 != 0 {
            SslIoctl::from_u32(raw & 0x7FFF_FFFF).map(SockOp::Ssl)
        } else {
            NetIoctl::from_u32(raw).map(SockOp::Net)
        }
    }
}
