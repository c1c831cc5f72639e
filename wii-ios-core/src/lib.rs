//! Shared building blocks for the IOS high-level emulation crates.
//!
//! This crate holds everything that more than one subsystem needs: the IPC
//! request/reply model, IOS return codes, the guest memory abstraction and
//! the save-state codec.

pub mod codes;
pub mod ipc;
pub mod memory;
pub mod state;
pub mod util;

pub use codes::IpcCommand;
pub use ipc::{
    IoVector, IoctlRequest, IoctlvRequest, IpcReply, OpenMode, OpenRequest, QueuedReply,
    ReadWriteRequest, ReplyQueue, Request, SeekRequest,
};
pub use memory::{GuestMemory, Memory};
pub use state::{StateError, StateReader, StateWriter};

/// Process IDs used by IOS modules when talking to IOSC and the filesystem.
pub mod pid {
    pub const KERNEL: u32 = 0;
    pub const ES: u32 = 1;
    pub const FS: u32 = 2;
    pub const DI: u32 = 3;
    pub const OH0: u32 = 4;
    pub const OH1: u32 = 5;
    pub const EHCI: u32 = 6;
    pub const SDI: u32 = 7;
    pub const USBETH: u32 = 8;
    pub const NET: u32 = 9;
    pub const WD: u32 = 10;
    pub const WL: u32 = 11;
    pub const KD: u32 = 12;
    pub const NCD: u32 = 13;
    pub const STM: u32 = 14;
    pub const PPCBOOT: u32 = 15;
    pub const SSL: u32 = 16;
    pub const USB: u32 = 17;
    pub const P2P: u32 = 18;
    pub const UNKNOWN: u32 = 19;
}

/// Types that serialize themselves into a save-state.
pub trait Stateful {
    fn save_state(&self, writer: &mut StateWriter);
    fn load_state(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError>;
}
