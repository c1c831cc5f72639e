use super::*;
use crate::memory::GuestMemory;

fn memory() -> GuestMemory {
    GuestMemory::new(0x1000_0000, 0x1000)
}

#[test]
fn parses_ioctl_request() {
    let mut mem = memory();
    let addr = 0x1000_0100;
    mem.write_u32(IpcCommand::Ioctl as u32, addr);
    mem.write_u32(3, addr + 8);
    mem.write_u32(0x0F, addr + 0xC);
    mem.write_u32(0x1000_0200, addr + 0x10);
    mem.write_u32(0x20, addr + 0x14);
    mem.write_u32(0x1000_0300, addr + 0x18);
    mem.write_u32(0x10, addr + 0x1C);

    let req = IoctlRequest::parse(&mem, addr);
    assert_eq!(req.header.ipc_command(), Some(IpcCommand::Ioctl));
    assert_eq!(req.header.fd, 3);
    assert_eq!(req.request, 0x0F);
    assert_eq!(req.buffer_in, 0x1000_0200);
    assert_eq!(req.buffer_in_size, 0x20);
    assert_eq!(req.buffer_out, 0x1000_0300);
    assert_eq!(req.buffer_out_size, 0x10);
}

#[test]
fn parses_ioctlv_vectors() {
    let mut mem = memory();
    let addr = 0x1000_0100;
    let table = 0x1000_0400;
    mem.write_u32(IpcCommand::Ioctlv as u32, addr);
    mem.write_u32(2, addr + 0xC);
    mem.write_u32(2, addr + 0x10);
    mem.write_u32(1, addr + 0x14);
    mem.write_u32(table, addr + 0x18);
    for (i, (a, s)) in [(0x1000_0500u32, 4u32), (0, 0), (0x1000_0600, 8)]
        .iter()
        .enumerate()
    {
        mem.write_u32(*a, table + i as u32 * 8);
        mem.write_u32(*s, table + i as u32 * 8 + 4);
    }

    let req = IoctlvRequest::parse(&mem, addr);
    assert_eq!(req.in_vectors.len(), 2);
    assert_eq!(req.io_vectors.len(), 1);
    assert_eq!(req.io_address(0), 0x1000_0600);
    assert_eq!(req.io_size(0), 8);
    assert!(req.has_number_of_valid_vectors(2, 1));
    assert!(!req.has_number_of_valid_vectors(1, 1));
    assert_eq!(req.in_address(5), 0);
}

#[test]
fn vector_with_size_but_null_address_is_invalid() {
    let req = IoctlvRequest {
        header: Request {
            address: 0,
            command: IpcCommand::Ioctlv as u32,
            fd: 0,
        },
        request: 0,
        in_vectors: vec![IoVector { address: 0, size: 4 }],
        io_vectors: vec![],
    };
    assert!(!req.has_number_of_valid_vectors(1, 0));
}

#[test]
fn open_request_reads_path() {
    let mut mem = memory();
    let addr = 0x1000_0100;
    mem.write_u32(IpcCommand::Open as u32, addr);
    mem.write_u32(0x1000_0800, addr + 0xC);
    mem.write_u32(3, addr + 0x10);
    mem.copy_to_emu(0x1000_0800, b"/shared2/sys/SYSCONF\0");

    let req = OpenRequest::parse(&mem, addr);
    assert_eq!(req.path, "/shared2/sys/SYSCONF");
    assert_eq!(req.flags, OpenMode::ReadWrite);
}

#[test]
fn reply_queue_writes_ios_layout() {
    let mut mem = memory();
    let request = Request {
        address: 0x1000_0100,
        command: IpcCommand::Ioctl as u32,
        fd: 5,
    };
    let mut queue = ReplyQueue::new();
    queue.enqueue(request, -4);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.flush(&mut mem), 1);
    assert!(queue.is_empty());

    assert_eq!(mem.read_u32(0x1000_0100), IpcCommand::Reply as u32);
    assert_eq!(mem.read_u32(0x1000_0104) as i32, -4);
    assert_eq!(mem.read_u32(0x1000_0108), IpcCommand::Ioctl as u32);
}
