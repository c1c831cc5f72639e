//! Device nodes registered by [`EmulationKernel::new`](crate::EmulationKernel::new).

pub mod aes;
pub mod fs;
pub mod net_ip_top;
pub mod net_ssl;

pub use aes::AesDevice;
pub use fs::FsDevice;
pub use net_ip_top::NetIpTopDevice;
pub use net_ssl::NetSslDevice;

use wii_ios_core::Memory;

/// Fixed-size read from guest memory.
pub(crate) fn read_array<const N: usize>(memory: &dyn Memory, address: u32) -> [u8; N] {
    let mut out = [0u8; N];
    let data = memory.copy_from_emu(address, N);
    let n = data.len().min(N);
    out[..n].copy_from_slice(&data[..n]);
    out
}
