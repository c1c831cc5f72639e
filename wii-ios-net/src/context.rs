use std::io;

use wii_ios_core::ReplyQueue;

use crate::errno::{SO_EAGAIN, SO_EALREADY, SO_EINPROGRESS, translate_error_code};

/// State shared by every socket: the queue of deferred replies and the
/// last result reported through `SO_ERROR`-style queries.
#[derive(Debug, Default)]
pub struct NetContext {
    pub replies: ReplyQueue,
    last_error: i32,
}

/// True for the results that mean "not done yet" on a socket operation.
pub fn is_in_progress(ret: i32) -> bool {
    ret == -SO_EAGAIN || ret == -SO_EINPROGRESS || ret == -SO_EALREADY
}

impl NetContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a host call result into the guest return value and remember
    /// it as the last network error.
    pub fn get_net_error_code(
        &mut self,
        result: io::Result<i32>,
        caller: &str,
        is_rw: bool,
    ) -> i32 {
        let ret = match result {
            Ok(value) => value,
            Err(e) => {
                let code = translate_error_code(e.raw_os_error().unwrap_or(0), is_rw);
                if is_in_progress(code) {
                    log::debug!("{caller} would block: {e} ({code})");
                } else {
                    log::warn!("{caller} failed: {e} ({code})");
                }
                code
            }
        };
        self.last_error = ret;
        ret
    }

    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    pub fn set_last_error(&mut self, value: i32) {
        self.last_error = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errno::SO_ECONNREFUSED;

    #[test]
    fn results_are_recorded() {
        let mut ctx = NetContext::new();
        assert_eq!(ctx.get_net_error_code(Ok(5), "test", false), 5);
        assert_eq!(ctx.last_error(), 5);

        let refused = io::Error::from_raw_os_error(libc::ECONNREFUSED);
        assert_eq!(ctx.get_net_error_code(Err(refused), "test", false), -SO_ECONNREFUSED);
        assert_eq!(ctx.last_error(), -SO_ECONNREFUSED);

        let again = io::Error::from_raw_os_error(libc::EAGAIN);
        assert_eq!(ctx.get_net_error_code(Err(again), "test", true), -SO_EAGAIN);
        assert!(is_in_progress(ctx.last_error()));
    }
}
