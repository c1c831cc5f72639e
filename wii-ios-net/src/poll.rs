//! Deferred `poll` requests and Wii/host poll event conversion.

use wii_ios_core::{Memory, StateError, StateReader, StateWriter};

/// Bytes per entry of the guest pollfd array: `{fd, events, revents}`.
pub const WII_POLLFD_SIZE: u32 = 0xC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertDirection {
    WiiToNative,
    NativeToWii,
}

const EVENT_MAP: [(libc::c_short, i32); 8] = [
    (libc::POLLRDNORM, 0x0001),
    (libc::POLLRDBAND, 0x0002),
    (libc::POLLPRI, 0x0004),
    (libc::POLLWRNORM, 0x0008),
    (libc::POLLWRBAND, 0x0010),
    (libc::POLLERR, 0x0020),
    (libc::POLLHUP, 0x0040),
    (libc::POLLNVAL, 0x0080),
];

/// Translate poll event bits between the guest and host encodings.
/// Bits without a counterpart are dropped.
pub fn convert_events(events: i32, direction: ConvertDirection) -> i32 {
    EVENT_MAP
        .iter()
        .fold(0, |acc, &(native, wii)| match direction {
            ConvertDirection::WiiToNative if events & wii != 0 => acc | native as i32,
            ConvertDirection::NativeToWii if events & native as i32 != 0 => acc | wii,
            _ => acc,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollFd {
    pub wii_fd: i32,
    /// Host encoding.
    pub events: i16,
    /// Host encoding.
    pub revents: i16,
}

/// A `poll` request waiting for one of its descriptors to become ready or
/// for its timeout to run out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollCommand {
    pub request_addr: u32,
    pub buffer_out: u32,
    pub fds: Vec<PollFd>,
    /// Milliseconds left; negative waits forever.
    pub timeout: i64,
}

impl PollCommand {
    /// Read `nfds` guest pollfd entries from `buffer_out`. Error and hangup
    /// bits are always reported, so they are not requested from the host.
    pub fn read(
        memory: &dyn Memory,
        request_addr: u32,
        buffer_out: u32,
        nfds: u32,
        timeout: i64,
    ) -> Self {
        let ignored = (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) as i32;
        let fds = (0..nfds)
            .map(|i| {
                let entry = buffer_out + WII_POLLFD_SIZE * i;
                let wii_fd = memory.read_u32(entry) as i32;
                let wii_events = memory.read_u32(entry + 4) as i32;
                if wii_events & !0xFF != 0 {
                    log::warn!("SO_POLL: unhandled Wii event bits {:#x}", wii_events & !0xFF);
                }
                let events = convert_events(wii_events, ConvertDirection::WiiToNative) & !ignored;
                log::debug!(
                    "SO_POLL({i}): fd {wii_fd}, wii events {wii_events:#x}, host {events:#x}"
                );
                PollFd {
                    wii_fd,
                    events: events as i16,
                    revents: 0,
                }
            })
            .collect();
        Self {
            request_addr,
            buffer_out,
            fds,
            timeout,
        }
    }

    pub(crate) fn save(&self, writer: &mut StateWriter) {
        writer.write_u32(self.request_addr);
        writer.write_u32(self.buffer_out);
        writer.write_i64(self.timeout);
        writer.write_u32(self.fds.len() as u32);
        for fd in &self.fds {
            writer.write_i32(fd.wii_fd);
            writer.write_u16(fd.events as u16);
            writer.write_u16(fd.revents as u16);
        }
    }

    pub(crate) fn load(reader: &mut StateReader<'_>) -> Result<Self, StateError> {
        let request_addr = reader.read_u32("poll request")?;
        let buffer_out = reader.read_u32("poll buffer")?;
        let timeout = reader.read_i64("poll timeout")?;
        let count = reader.read_u32("poll fd count")?;
        if count > crate::manager::WII_SOCKET_FD_MAX as u32 {
            return Err(StateError::invalid("poll fd count", count));
        }
        let mut fds = Vec::with_capacity(count as usize);
        for _ in 0..count {
            fds.push(PollFd {
                wii_fd: reader.read_i32("poll fd")?,
                events: reader.read_u16("poll events")? as i16,
                revents: reader.read_u16("poll revents")? as i16,
            });
        }
        Ok(Self {
            request_addr,
            buffer_out,
            fds,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wii_ios_core::GuestMemory;

    #[test]
    fn wii_events_round_trip() {
        for wii in 0..=0xFF {
            let native = convert_events(wii, ConvertDirection::WiiToNative);
            assert_eq!(convert_events(native, ConvertDirection::NativeToWii), wii);
        }
    }

    #[test]
    fn native_events_round_trip() {
        for (native, _) in EVENT_MAP {
            let native = native as i32;
            let wii = convert_events(native, ConvertDirection::NativeToWii);
            assert_eq!(convert_events(wii, ConvertDirection::WiiToNative), native);
        }
        assert_eq!(convert_events(0x100, ConvertDirection::WiiToNative), 0);
    }

    #[test]
    fn reading_a_request_drops_error_bits() {
        let mut mem = GuestMemory::new(0, 0x100);
        mem.write_u32(3, 0x40);
        mem.write_u32(0x01 | 0x20 | 0x40, 0x44);
        mem.write_u32(5, 0x4C);
        mem.write_u32(0x08, 0x50);

        let cmd = PollCommand::read(&mem, 0x10, 0x40, 2, -1);
        assert_eq!(cmd.fds.len(), 2);
        assert_eq!(cmd.fds[0].wii_fd, 3);
        assert_eq!(cmd.fds[0].events, libc::POLLRDNORM);
        assert_eq!(cmd.fds[1].events, libc::POLLWRNORM);
    }
}
