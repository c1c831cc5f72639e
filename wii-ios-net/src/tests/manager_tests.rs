use super::*;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::thread;

use wii_ios_core::{GuestMemory, IpcCommand, QueuedReply};

use crate::addr::WiiSockAddrIn;
use crate::errno::{SO_EAGAIN, SO_EFAULT, SO_EINVAL, SO_ENETUNREACH, SO_ENOTCONN};
use crate::ioctl::NetIoctl;

const BASE: u32 = 0x1000_0000;

/// Guest RAM with a bump allocator for building IPC requests.
struct Guest {
    mem: GuestMemory,
    next: u32,
}

impl Guest {
    fn new() -> Self {
        Self {
            mem: GuestMemory::new(BASE, 0x10000),
            next: BASE,
        }
    }

    fn alloc(&mut self, size: u32) -> u32 {
        let addr = self.next;
        self.next += (size.max(4) + 0x1F) & !0x1F;
        addr
    }

    fn ioctl(&mut self, fd: i32, request: NetIoctl, input: &[u8], out_size: u32) -> (Request, u32) {
        let addr = self.alloc(0x20);
        let buffer_in = self.alloc(input.len() as u32);
        self.mem.copy_to_emu(buffer_in, input);
        let buffer_out = if out_size > 0 { self.alloc(out_size) } else { 0 };

        self.mem.write_u32(IpcCommand::Ioctl as u32, addr);
        self.mem.write_u32(fd as u32, addr + 8);
        self.mem.write_u32(request as u32, addr + 0xC);
        self.mem.write_u32(buffer_in, addr + 0x10);
        self.mem.write_u32(input.len() as u32, addr + 0x14);
        self.mem.write_u32(buffer_out, addr + 0x18);
        self.mem.write_u32(out_size, addr + 0x1C);
        (Request::parse(&self.mem, addr), buffer_out)
    }

    fn ioctlv(
        &mut self,
        fd: i32,
        request: NetIoctl,
        inputs: &[&[u8]],
        io_sizes: &[u32],
    ) -> (Request, Vec<u32>) {
        let addr = self.alloc(0x20);
        let table = self.alloc(8 * (inputs.len() + io_sizes.len()) as u32);
        let mut entry = table;
        for input in inputs {
            let data = self.alloc(input.len() as u32);
            self.mem.copy_to_emu(data, input);
            self.mem.write_u32(data, entry);
            self.mem.write_u32(input.len() as u32, entry + 4);
            entry += 8;
        }
        let mut outputs = Vec::new();
        for &size in io_sizes {
            let data = if size > 0 { self.alloc(size) } else { 0 };
            self.mem.write_u32(data, entry);
            self.mem.write_u32(size, entry + 4);
            outputs.push(data);
            entry += 8;
        }

        self.mem.write_u32(IpcCommand::Ioctlv as u32, addr);
        self.mem.write_u32(fd as u32, addr + 8);
        self.mem.write_u32(request as u32, addr + 0xC);
        self.mem.write_u32(inputs.len() as u32, addr + 0x10);
        self.mem.write_u32(io_sizes.len() as u32, addr + 0x14);
        self.mem.write_u32(table, addr + 0x18);
        (Request::parse(&self.mem, addr), outputs)
    }

    /// A poll request over `fds` given as `(wii fd, wii events)`.
    fn poll(&mut self, fds: &[(i32, u32)], timeout: i64) -> (PollCommand, u32) {
        let addr = self.alloc(0x20);
        self.mem.write_u32(IpcCommand::Ioctl as u32, addr);
        let buffer_out = self.alloc(WII_POLLFD_SIZE * fds.len() as u32);
        for (i, &(fd, events)) in fds.iter().enumerate() {
            let entry = buffer_out + WII_POLLFD_SIZE * i as u32;
            self.mem.write_u32(fd as u32, entry);
            self.mem.write_u32(events, entry + 4);
        }
        let cmd = PollCommand::read(&self.mem, addr, buffer_out, fds.len() as u32, timeout);
        (cmd, buffer_out)
    }
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn sockaddr(addr: SocketAddrV4) -> Vec<u8> {
    let mut out = vec![8, 2];
    out.extend(addr.port().to_be_bytes());
    out.extend(addr.ip().octets());
    out
}

fn fake_request(address: u32, command: IpcCommand) -> Request {
    Request {
        address,
        command: command as u32,
        fd: 0,
    }
}

fn drain(mgr: &mut WiiSockMan) -> Vec<QueuedReply> {
    std::iter::from_fn(|| mgr.replies().pop()).collect()
}

/// Update until at least `want` replies arrived or about two seconds passed.
fn run_until(mgr: &mut WiiSockMan, guest: &mut Guest, want: usize) -> Vec<QueuedReply> {
    let mut replies = Vec::new();
    for _ in 0..400 {
        mgr.update(&mut guest.mem);
        replies.extend(drain(mgr));
        if replies.len() >= want {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    replies
}

fn reply_for(replies: &[QueuedReply], request: Request) -> Option<i32> {
    replies
        .iter()
        .find(|r| r.request == request)
        .map(|r| r.return_value)
}

#[test]
fn new_socket_validates_arguments() {
    let mut mgr = WiiSockMan::new();
    assert_eq!(mgr.new_socket(3, 1, 0), -SO_EAFNOSUPPORT);
    assert_eq!(mgr.new_socket(WII_AF_INET6, 1, 0), -SO_EAFNOSUPPORT);
    assert_eq!(mgr.socket_count(), 0);
    assert_eq!(mgr.new_socket(2, 1, 6), -SO_EPROTONOSUPPORT);
    assert_eq!(mgr.new_socket(2, 3, 0), -SO_EPROTOTYPE);
    assert_eq!(mgr.new_socket(2, 1, 0), 0);
    assert_eq!(mgr.new_socket(2, 2, 0), 1);
    assert_eq!(mgr.last_net_error(), 1);
    assert!(mgr.socket(0).is_some_and(WiiSocket::is_tcp));
    assert!(mgr.socket(1).is_some_and(|s| !s.is_tcp()));
}

#[test]
fn wii_fds_run_out_after_twenty_four() {
    let mut mgr = WiiSockMan::new();
    for expected in 0..WII_SOCKET_FD_MAX {
        assert_eq!(mgr.new_socket(2, 2, 0), expected);
    }
    assert_eq!(mgr.new_socket(2, 2, 0), -SO_EMFILE);
    assert_eq!(mgr.last_net_error(), -SO_EMFILE);
    assert_eq!(mgr.socket_count(), WII_SOCKET_FD_MAX as usize);

    assert_eq!(mgr.delete_socket(5), 0);
    assert_eq!(mgr.new_socket(2, 2, 0), 5);
}

#[test]
fn unknown_wii_fds_are_bad_descriptors() {
    let mut mgr = WiiSockMan::new();
    assert_eq!(mgr.delete_socket(3), -SO_EBADF);
    assert_eq!(mgr.shutdown_socket(3, 2), -SO_EBADF);
    assert!(mgr.get_host_socket(3).is_none());
    assert!(mgr.host_socket_or_ebadf(3).is_err());

    let request = fake_request(0x100, IpcCommand::Ioctl);
    mgr.do_sock(7, request, SockOp::Net(NetIoctl::Connect));
    let replies = drain(&mut mgr);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].return_value, -SO_EBADF);
}

#[test]
fn udp_shutdown_succeeds_without_aborting() {
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 2, 0);
    mgr.do_sock(fd, fake_request(0x100, IpcCommand::Ioctlv), SockOp::Net(NetIoctl::RecvFrom));

    assert_eq!(mgr.shutdown_socket(fd, 2), 0);
    assert!(drain(&mut mgr).is_empty());
    assert_eq!(mgr.socket(fd).map(WiiSocket::pending_count), Some(1));
}

#[test]
fn tcp_shutdown_aborts_blocked_operations() {
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 1, 0);
    assert_eq!(mgr.shutdown_socket(fd, 3), -SO_EINVAL);

    let accept = fake_request(0x100, IpcCommand::Ioctl);
    let connect = fake_request(0x200, IpcCommand::Ioctl);
    let recv = fake_request(0x300, IpcCommand::Ioctlv);
    let send = fake_request(0x400, IpcCommand::Ioctlv);
    mgr.do_sock(fd, accept, SockOp::Net(NetIoctl::Accept));
    mgr.do_sock(fd, connect, SockOp::Net(NetIoctl::Connect));
    mgr.do_sock(fd, recv, SockOp::Net(NetIoctl::RecvFrom));
    mgr.do_sock(fd, send, SockOp::Net(NetIoctl::SendTo));

    // Never connected, so the host shutdown itself fails.
    assert_eq!(mgr.shutdown_socket(fd, 2), -SO_ENOTCONN);

    let replies = drain(&mut mgr);
    assert_eq!(reply_for(&replies, accept), Some(-SO_EINVAL));
    assert_eq!(reply_for(&replies, connect), Some(-SO_ENETUNREACH));
    assert_eq!(reply_for(&replies, recv), Some(-SO_ENOTCONN));
    assert_eq!(reply_for(&replies, send), Some(-SO_ENOTCONN));
    assert_eq!(mgr.socket(fd).map(WiiSocket::pending_count), Some(0));

    // Aborted operations are dropped without a second reply.
    let mut guest = Guest::new();
    mgr.update(&mut guest.mem);
    assert!(drain(&mut mgr).is_empty());
}

#[test]
fn read_shutdown_only_aborts_receives() {
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 1, 0);
    let recv = fake_request(0x300, IpcCommand::Ioctlv);
    let send = fake_request(0x400, IpcCommand::Ioctlv);
    mgr.do_sock(fd, recv, SockOp::Net(NetIoctl::RecvFrom));
    mgr.do_sock(fd, send, SockOp::Net(NetIoctl::SendTo));

    mgr.shutdown_socket(fd, 0);
    let replies = drain(&mut mgr);
    assert_eq!(replies.len(), 1);
    assert_eq!(reply_for(&replies, recv), Some(-SO_ENOTCONN));
    assert_eq!(mgr.socket(fd).map(WiiSocket::pending_count), Some(1));
}

#[test]
fn closing_a_socket_fails_queued_operations() {
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 1, 0);
    let recv = fake_request(0x300, IpcCommand::Ioctlv);
    mgr.do_sock(fd, recv, SockOp::Net(NetIoctl::RecvFrom));

    assert_eq!(mgr.delete_socket(fd), 0);
    let replies = drain(&mut mgr);
    assert_eq!(reply_for(&replies, recv), Some(-SO_ENOTCONN));
    assert!(mgr.socket(fd).is_none());
}

#[test]
fn fcntl_switches_guest_blocking_mode() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 2, 0);
    assert!(mgr.is_socket_blocking(fd));

    let (request, _) = guest.ioctl(fd, NetIoctl::Fcntl, &words(&[fd as u32, 4, 4]), 0);
    mgr.do_sock(fd, request, SockOp::Net(NetIoctl::Fcntl));
    let replies = run_until(&mut mgr, &mut guest, 1);
    assert_eq!(reply_for(&replies, request), Some(0));
    assert!(!mgr.is_socket_blocking(fd));

    let socket = mgr.socket_mut(fd).unwrap();
    assert_eq!(socket.fcntl(3, 0), 4);
    assert_eq!(socket.fcntl(4, 0), 0);
    assert_eq!(socket.fcntl(3, 0), 0);
    assert_eq!(socket.fcntl(99, 0), 0);
}

#[test]
fn loopback_tcp_connect_accept_send_recv() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let listener = mgr.new_socket(2, 1, 0);
    let client = mgr.new_socket(2, 1, 0);
    assert_eq!((listener, client), (0, 1));

    let mut bind_args = words(&[listener as u32, 1]);
    bind_args.extend(sockaddr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)));
    let (bind, _) = guest.ioctl(listener, NetIoctl::Bind, &bind_args, 0);
    mgr.do_sock(listener, bind, SockOp::Net(NetIoctl::Bind));
    let replies = run_until(&mut mgr, &mut guest, 1);
    assert_eq!(reply_for(&replies, bind), Some(0));

    let host = mgr.get_host_socket(listener).unwrap();
    host.listen(4).unwrap();
    let port = sys::getsockname(host).unwrap().port();

    let listener_arg = words(&[listener as u32]);
    let (accept, accept_out) = guest.ioctl(listener, NetIoctl::Accept, &listener_arg, 8);
    mgr.do_sock(listener, accept, SockOp::Net(NetIoctl::Accept));
    let mut connect_args = words(&[client as u32, 1]);
    connect_args.extend(sockaddr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)));
    let (connect, _) = guest.ioctl(client, NetIoctl::Connect, &connect_args, 0);
    mgr.do_sock(client, connect, SockOp::Net(NetIoctl::Connect));

    let replies = run_until(&mut mgr, &mut guest, 2);
    assert_eq!(reply_for(&replies, connect), Some(0));
    let server = reply_for(&replies, accept).unwrap();
    assert_eq!(server, 2);
    let peer = WiiSockAddrIn::read(&guest.mem, accept_out);
    assert_eq!(peer.family, 2);
    assert_eq!(peer.addr, Ipv4Addr::LOCALHOST);

    let send_params = words(&[client as u32, 0, 0, 0, 0]);
    let send_inputs = [b"ping".as_slice(), send_params.as_slice()];
    let (send, _) = guest.ioctlv(client, NetIoctl::SendTo, &send_inputs, &[]);
    let recv_params = words(&[server as u32, 0]);
    let recv_inputs = [recv_params.as_slice()];
    let (recv, outputs) = guest.ioctlv(server, NetIoctl::RecvFrom, &recv_inputs, &[16, 0]);
    mgr.do_sock(server, recv, SockOp::Net(NetIoctl::RecvFrom));
    mgr.do_sock(client, send, SockOp::Net(NetIoctl::SendTo));

    let replies = run_until(&mut mgr, &mut guest, 2);
    assert_eq!(reply_for(&replies, send), Some(4));
    assert_eq!(reply_for(&replies, recv), Some(4));
    assert_eq!(guest.mem.copy_from_emu(outputs[0], 4), b"ping");

    mgr.clean();
    assert_eq!(mgr.socket_count(), 0);
}

#[test]
fn non_blocking_receive_completes_immediately() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 2, 0);
    let mut bind_args = words(&[fd as u32, 1]);
    bind_args.extend(sockaddr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)));
    let (bind, _) = guest.ioctl(fd, NetIoctl::Bind, &bind_args, 0);
    mgr.do_sock(fd, bind, SockOp::Net(NetIoctl::Bind));
    run_until(&mut mgr, &mut guest, 1);

    // SO_MSG_NONBLOCK on a blocking socket.
    let params = words(&[fd as u32, 4]);
    let (recv, _) = guest.ioctlv(fd, NetIoctl::RecvFrom, &[params.as_slice()], &[16, 8]);
    mgr.do_sock(fd, recv, SockOp::Net(NetIoctl::RecvFrom));
    let replies = run_until(&mut mgr, &mut guest, 1);
    assert_eq!(reply_for(&replies, recv), Some(-SO_EAGAIN));
}

#[test]
fn poll_reports_writable_socket() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 2, 0);

    let (cmd, buffer_out) = guest.poll(&[(fd, 0x08)], 1000);
    let request_addr = cmd.request_addr;
    mgr.add_poll_command(cmd);
    mgr.update(&mut guest.mem);

    let replies = drain(&mut mgr);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].request.address, request_addr);
    assert_eq!(replies[0].return_value, 1);
    assert_eq!(guest.mem.read_u32(buffer_out + 8) & 0x08, 0x08);
    assert_eq!(mgr.pending_poll_count(), 0);
}

#[test]
fn poll_waits_until_its_timeout() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 2, 0);

    let (cmd, buffer_out) = guest.poll(&[(fd, 0x01)], 20);
    mgr.add_poll_command(cmd);
    mgr.update(&mut guest.mem);
    assert!(drain(&mut mgr).is_empty());
    assert_eq!(mgr.pending_poll_count(), 1);

    thread::sleep(Duration::from_millis(40));
    mgr.update(&mut guest.mem);
    let replies = drain(&mut mgr);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].return_value, 0);
    assert_eq!(guest.mem.read_u32(buffer_out + 8), 0);
}

#[test]
fn poll_skips_unknown_descriptors() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let (cmd, _) = guest.poll(&[(17, 0x01)], 0);
    mgr.add_poll_command(cmd);
    mgr.update(&mut guest.mem);
    let replies = drain(&mut mgr);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].return_value, 0);
}

#[test]
fn restored_polls_complete_with_hangup() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let fd = mgr.new_socket(2, 2, 0);
    let (cmd, buffer_out) = guest.poll(&[(fd, 0x01)], -1);
    mgr.add_poll_command(cmd);
    mgr.update(&mut guest.mem);
    assert_eq!(mgr.pending_poll_count(), 1);

    let mut writer = StateWriter::new();
    mgr.save_state(&mut writer);
    let bytes = writer.into_bytes();

    let mut restored = WiiSockMan::new();
    restored.load_state(&mut StateReader::new(&bytes)).unwrap();
    assert_eq!(restored.pending_poll_count(), 1);
    restored.update(&mut guest.mem);
    let replies = drain(&mut restored);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].return_value, 1);
    assert_eq!(guest.mem.read_u32(buffer_out + 8), 0x60);

    let mut truncated = WiiSockMan::new();
    assert!(matches!(
        truncated.load_state(&mut StateReader::new(&bytes[..bytes.len() - 1])),
        Err(StateError::Truncated(_))
    ));
}

#[test]
fn datagram_buffers_are_bounded_by_guest_ram() {
    let mut guest = Guest::new();
    let mut mgr = WiiSockMan::new();
    let sender = mgr.new_socket(2, 2, 0);
    let receiver = mgr.new_socket(2, 2, 0);
    for fd in [sender, receiver] {
        let mut bind_args = words(&[fd as u32, 1]);
        bind_args.extend(sockaddr(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)));
        let (bind, _) = guest.ioctl(fd, NetIoctl::Bind, &bind_args, 0);
        mgr.do_sock(fd, bind, SockOp::Net(NetIoctl::Bind));
    }
    run_until(&mut mgr, &mut guest, 2);
    let dest = sys::getsockname(mgr.get_host_socket(receiver).unwrap()).unwrap();

    // A payload pointer outside guest RAM is a fault, not a send of zeros.
    let mut params = words(&[sender as u32, 0, 1]);
    params.extend(sockaddr(dest));
    let inputs = [b"ping".as_slice(), params.as_slice()];
    let (bad_send, _) = guest.ioctlv(sender, NetIoctl::SendTo, &inputs, &[]);
    let table = guest.mem.read_u32(bad_send.address + 0x18);
    guest.mem.write_u32(0x0000_1000, table);
    mgr.do_sock(sender, bad_send, SockOp::Net(NetIoctl::SendTo));
    let replies = run_until(&mut mgr, &mut guest, 1);
    assert_eq!(reply_for(&replies, bad_send), Some(-SO_EFAULT));

    let (send, _) = guest.ioctlv(sender, NetIoctl::SendTo, &inputs, &[]);
    mgr.do_sock(sender, send, SockOp::Net(NetIoctl::SendTo));

    // The receive buffer claims far more space than the guest has.
    let recv_params = words(&[receiver as u32, 0]);
    let (recv, outputs) =
        guest.ioctlv(receiver, NetIoctl::RecvFrom, &[recv_params.as_slice()], &[16, 8]);
    let table = guest.mem.read_u32(recv.address + 0x18);
    guest.mem.write_u32(0xFFFF_0000, table + 8 + 4);
    mgr.do_sock(receiver, recv, SockOp::Net(NetIoctl::RecvFrom));

    let replies = run_until(&mut mgr, &mut guest, 2);
    assert_eq!(reply_for(&replies, send), Some(4));
    assert_eq!(reply_for(&replies, recv), Some(4));
    assert_eq!(guest.mem.copy_from_emu(outputs[0], 4), b"ping");
    let from = WiiSockAddrIn::read(&guest.mem, outputs[1]);
    assert_eq!(from.to_host(), sys::getsockname(mgr.get_host_socket(sender).unwrap()).unwrap());
}
