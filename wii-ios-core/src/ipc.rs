//! IPC request parsing and reply queueing.
//!
//! A guest request is a small big-endian structure in guest memory. The
//! common header is `{command, return_value, fd}` followed by
//! command-specific arguments starting at offset `0xC`.

use std::collections::VecDeque;

use crate::codes::IpcCommand;
use crate::memory::Memory;

/// Maximum length of a path passed to `Open`.
pub const MAX_OPEN_PATH: usize = 64;

/// Common request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub address: u32,
    /// Raw command; may not be a valid [`IpcCommand`].
    pub command: u32,
    pub fd: u32,
}

impl Request {
    pub fn parse(memory: &dyn Memory, address: u32) -> Self {
        Self {
            address,
            command: memory.read_u32(address),
            fd: memory.read_u32(address + 8),
        }
    }

    pub fn ipc_command(&self) -> Option<IpcCommand> {
        IpcCommand::from_u32(self.command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    None = 0,
    Read = 1,
    Write = 2,
    ReadWrite = 3,
}

impl OpenMode {
    pub fn from_u32(value: u32) -> Self {
        match value & 3 {
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::ReadWrite,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub header: Request,
    pub path: String,
    pub flags: OpenMode,
    /// Caller identity; the emulated PPC always opens as uid/gid 0 here
    /// unless a title context says otherwise.
    pub uid: u32,
    pub gid: u16,
}

impl OpenRequest {
    pub fn parse(memory: &dyn Memory, address: u32) -> Self {
        let path_ptr = memory.read_u32(address + 0xC);
        Self {
            header: Request::parse(memory, address),
            path: memory.read_cstring(path_ptr, MAX_OPEN_PATH),
            flags: OpenMode::from_u32(memory.read_u32(address + 0x10)),
            uid: 0,
            gid: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWriteRequest {
    pub header: Request,
    pub buffer: u32,
    pub size: u32,
}

impl ReadWriteRequest {
    pub fn parse(memory: &dyn Memory, address: u32) -> Self {
        Self {
            header: Request::parse(memory, address),
            buffer: memory.read_u32(address + 0xC),
            size: memory.read_u32(address + 0x10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub header: Request,
    pub offset: u32,
    pub mode: u32,
}

impl SeekRequest {
    pub fn parse(memory: &dyn Memory, address: u32) -> Self {
        Self {
            header: Request::parse(memory, address),
            offset: memory.read_u32(address + 0xC),
            mode: memory.read_u32(address + 0x10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlRequest {
    pub header: Request,
    pub request: u32,
    pub buffer_in: u32,
    pub buffer_in_size: u32,
    pub buffer_out: u32,
    pub buffer_out_size: u32,
}

impl IoctlRequest {
    pub fn parse(memory: &dyn Memory, address: u32) -> Self {
        Self {
            header: Request::parse(memory, address),
            request: memory.read_u32(address + 0xC),
            buffer_in: memory.read_u32(address + 0x10),
            buffer_in_size: memory.read_u32(address + 0x14),
            buffer_out: memory.read_u32(address + 0x18),
            buffer_out_size: memory.read_u32(address + 0x1C),
        }
    }
}

/// One `{address, size}` entry of an ioctlv vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoVector {
    pub address: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoctlvRequest {
    pub header: Request,
    pub request: u32,
    pub in_vectors: Vec<IoVector>,
    pub io_vectors: Vec<IoVector>,
}

impl IoctlvRequest {
    pub fn parse(memory: &dyn Memory, address: u32) -> Self {
        let in_count = memory.read_u32(address + 0x10);
        let io_count = memory.read_u32(address + 0x14);
        let table = memory.read_u32(address + 0x18);

        let read_vector = |index: u32| IoVector {
            address: memory.read_u32(table + index * 8),
            size: memory.read_u32(table + index * 8 + 4),
        };
        // Guard against garbage counts; real requests never come close.
        let in_count = in_count.min(32);
        let io_count = io_count.min(32);

        Self {
            header: Request::parse(memory, address),
            request: memory.read_u32(address + 0xC),
            in_vectors: (0..in_count).map(read_vector).collect(),
            io_vectors: (in_count..in_count + io_count).map(read_vector).collect(),
        }
    }

    /// True if the request has exactly the given vector counts and every
    /// non-empty vector points somewhere.
    pub fn has_number_of_valid_vectors(&self, in_count: usize, io_count: usize) -> bool {
        if self.in_vectors.len() != in_count || self.io_vectors.len() != io_count {
            return false;
        }
        self.in_vectors
            .iter()
            .chain(self.io_vectors.iter())
            .all(|v| v.size == 0 || v.address != 0)
    }

    /// Address of input vector `index`, or 0 if absent.
    pub fn in_address(&self, index: usize) -> u32 {
        self.in_vectors.get(index).map_or(0, |v| v.address)
    }

    pub fn in_size(&self, index: usize) -> u32 {
        self.in_vectors.get(index).map_or(0, |v| v.size)
    }

    pub fn io_address(&self, index: usize) -> u32 {
        self.io_vectors.get(index).map_or(0, |v| v.address)
    }

    pub fn io_size(&self, index: usize) -> u32 {
        self.io_vectors.get(index).map_or(0, |v| v.size)
    }
}

/// Immediate result of handling a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcReply {
    pub return_value: i32,
}

impl IpcReply {
    pub fn new(return_value: i32) -> Self {
        Self { return_value }
    }
}

/// A reply that still has to be written back to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedReply {
    pub request: Request,
    pub return_value: i32,
}

/// FIFO of replies produced outside the synchronous dispatch path.
#[derive(Debug, Default)]
pub struct ReplyQueue {
    pending: VecDeque<QueuedReply>,
}

impl ReplyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request, return_value: i32) {
        log::trace!(
            "Queueing reply {return_value} for request at {:#010x}",
            request.address
        );
        self.pending.push_back(QueuedReply {
            request,
            return_value,
        });
    }

    pub fn pop(&mut self) -> Option<QueuedReply> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Write one reply into guest memory the way IOS does: return value at
    /// `+4`, the answered command at `+8`, and the reply marker at `+0`.
    pub fn write_reply(memory: &mut dyn Memory, request: &Request, return_value: i32) {
        memory.write_u32(return_value as u32, request.address + 4);
        memory.write_u32(request.command, request.address + 8);
        memory.write_u32(IpcCommand::Reply as u32, request.address);
    }

    /// Drain every queued reply into guest memory, returning how many were
    /// delivered.
    pub fn flush(&mut self, memory: &mut dyn Memory) -> usize {
        let mut count = 0;
        while let Some(reply) = self.pop() {
            Self::write_reply(memory, &reply.request, reply.return_value);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
#[path = "tests/ipc_tests.rs"]
mod tests;
