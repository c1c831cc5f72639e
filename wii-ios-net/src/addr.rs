use std::net::{Ipv4Addr, SocketAddrV4};

use wii_ios_core::Memory;

pub const WII_AF_INET: u8 = 2;
pub const WII_AF_INET6: u32 = 23;
pub const WII_SOCKADDR_IN_SIZE: u32 = 8;

/// Guest `sockaddr_in`: `{len u8, family u8, port u16, addr u32}`, port
/// and address in network order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WiiSockAddrIn {
    pub len: u8,
    pub family: u8,
    pub port: u16,
    pub addr: Ipv4Addr,
}

impl WiiSockAddrIn {
    pub fn read(memory: &dyn Memory, address: u32) -> Self {
        Self {
            len: memory.read_u8(address),
            family: memory.read_u8(address + 1),
            port: memory.read_u16(address + 2),
            addr: Ipv4Addr::from(memory.read_u32(address + 4)),
        }
    }

    pub fn write(&self, memory: &mut dyn Memory, address: u32) {
        memory.write_u8(self.len, address);
        memory.write_u8(self.family, address + 1);
        memory.write_u16(self.port, address + 2);
        memory.write_u32(u32::from(self.addr), address + 4);
    }

    pub fn to_host(self) -> SocketAddrV4 {
        SocketAddrV4::new(self.addr, self.port)
    }
}

impl From<SocketAddrV4> for WiiSockAddrIn {
    fn from(addr: SocketAddrV4) -> Self {
        Self {
            len: WII_SOCKADDR_IN_SIZE as u8,
            family: WII_AF_INET,
            port: addr.port(),
            addr: *addr.ip(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wii_ios_core::GuestMemory;

    #[test]
    fn guest_layout_is_network_order() {
        let mut mem = GuestMemory::new(0x1000, 0x100);
        let addr = WiiSockAddrIn::from(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 0x1234));
        addr.write(&mut mem, 0x1010);
        assert_eq!(
            mem.copy_from_emu(0x1010, 8),
            vec![8, 2, 0x12, 0x34, 192, 168, 1, 2]
        );
        assert_eq!(WiiSockAddrIn::read(&mem, 0x1010), addr);
        assert_eq!(addr.to_host().port(), 0x1234);
    }
}
