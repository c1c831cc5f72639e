//! Guest memory access.
//!
//! The Wii is big-endian, so every multi-byte accessor here reads and writes
//! big-endian values. Devices only ever see guest memory through the
//! [`Memory`] trait.

/// Big-endian view of emulated guest memory.
pub trait Memory {
    /// Copy `len` bytes starting at `address` out of guest memory.
    fn copy_from_emu(&self, address: u32, len: usize) -> Vec<u8>;

    /// Copy `data` into guest memory at `address`.
    fn copy_to_emu(&mut self, address: u32, data: &[u8]);

    /// How many of the `len` bytes starting at `address` are backed by
    /// guest RAM, counting from `address`.
    fn mapped_len(&self, _address: u32, len: usize) -> usize {
        len
    }

    fn is_valid_range(&self, address: u32, len: usize) -> bool {
        self.mapped_len(address, len) == len
    }

    fn read_u8(&self, address: u32) -> u8 {
        self.copy_from_emu(address, 1)[0]
    }

    fn read_u16(&self, address: u32) -> u16 {
        let b = self.copy_from_emu(address, 2);
        u16::from_be_bytes([b[0], b[1]])
    }

    fn read_u32(&self, address: u32) -> u32 {
        let b = self.copy_from_emu(address, 4);
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }

    fn read_u64(&self, address: u32) -> u64 {
        let b = self.copy_from_emu(address, 8);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b);
        u64::from_be_bytes(raw)
    }

    fn write_u8(&mut self, value: u8, address: u32) {
        self.copy_to_emu(address, &[value]);
    }

    fn write_u16(&mut self, value: u16, address: u32) {
        self.copy_to_emu(address, &value.to_be_bytes());
    }

    fn write_u32(&mut self, value: u32, address: u32) {
        self.copy_to_emu(address, &value.to_be_bytes());
    }

    fn write_u64(&mut self, value: u64, address: u32) {
        self.copy_to_emu(address, &value.to_be_bytes());
    }

    /// Fill `len` bytes at `address` with `value`.
    fn memset(&mut self, address: u32, value: u8, len: usize) {
        self.copy_to_emu(address, &vec![value; len]);
    }

    /// Read a NUL-terminated string of at most `max_len` bytes. The read
    /// stops at the end of mapped memory.
    fn read_cstring(&self, address: u32, max_len: usize) -> String {
        let raw = self.copy_from_emu(address, self.mapped_len(address, max_len));
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }
}

/// A flat block of guest RAM mapped at `base`.
///
/// Accesses outside the block are logged and behave like open bus: reads
/// return zero, writes are dropped.
#[derive(Debug, Clone)]
pub struct GuestMemory {
    base: u32,
    data: Vec<u8>,
}

impl GuestMemory {
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn range(&self, address: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = address.checked_sub(self.base)? as usize;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

impl Memory for GuestMemory {
    fn mapped_len(&self, address: u32, len: usize) -> usize {
        match address.checked_sub(self.base) {
            Some(offset) => self.data.len().saturating_sub(offset as usize).min(len),
            None => 0,
        }
    }

    fn copy_from_emu(&self, address: u32, len: usize) -> Vec<u8> {
        match self.range(address, len) {
            Some(range) => self.data[range].to_vec(),
            None => {
                log::warn!("Invalid guest read of {len} bytes at {address:#010x}");
                vec![0; len]
            }
        }
    }

    fn copy_to_emu(&mut self, address: u32, data: &[u8]) {
        match self.range(address, data.len()) {
            Some(range) => self.data[range].copy_from_slice(data),
            None => log::warn!(
                "Invalid guest write of {} bytes at {address:#010x}",
                data.len()
            ),
        }
    }
}
