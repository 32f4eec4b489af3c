use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Polls `fd` for readability for up to `timeout_ms` milliseconds.
/// Returns `Ok(true)` if the fd became readable, `Ok(false)` on timeout, and
/// `Err` if the fd reports an error/invalid/hangup condition.
pub fn wait_readable(fd: RawFd, timeout_ms: i32) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    // SAFETY: `pollfd` is a single well-formed entry on the stack and `poll`
    // does not retain the pointer past the call.
    let rc = unsafe { libc::poll(&mut pollfd as *mut libc::pollfd, 1, timeout_ms) };

    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if rc == 0 {
        return Ok(false);
    }
    if pollfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "descriptor reported error or invalid during poll",
        ));
    }
    if pollfd.revents & libc::POLLHUP != 0 && pollfd.revents & libc::POLLIN == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "descriptor hung up with no data available",
        ));
    }
    Ok(true)
}

/// Maximum single poll slice: long enough to be efficient, short enough that
/// a cancellation flag set from another thread is noticed promptly.
pub const MAX_POLL_SLICE: Duration = Duration::from_millis(200);

/// Clamps the remaining time until `deadline` into a poll-friendly
/// millisecond slice in `[0, 200]`.
pub fn clamp_to_poll_slice(deadline: Instant) -> i32 {
    let now = Instant::now();
    let remaining = deadline.saturating_duration_since(now);
    remaining.min(MAX_POLL_SLICE).as_millis().try_into().unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_caps_at_poll_slice() {
        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(clamp_to_poll_slice(deadline), 200);
    }

    #[test]
    fn clamp_floors_at_zero_for_past_deadline() {
        let deadline = Instant::now() - Duration::from_secs(1);
        assert_eq!(clamp_to_poll_slice(deadline), 0);
    }

    #[test]
    fn wait_readable_times_out_on_idle_pipe() {
        let (read_fd, _write_fd) = {
            let mut fds = [0; 2];
            assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
            (fds[0], fds[1])
        };
        let readable = wait_readable(read_fd, 20).expect("poll should not error");
        assert!(!readable);
        unsafe {
            libc::close(read_fd);
            libc::close(_write_fd);
        }
    }

    #[test]
    fn wait_readable_detects_hangup_as_error() {
        let (read_fd, write_fd) = {
            let mut fds = [0; 2];
            assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
            (fds[0], fds[1])
        };
        unsafe {
            libc::close(write_fd);
        }
        let result = wait_readable(read_fd, 50);
        assert!(result.is_err());
        unsafe {
            libc::close(read_fd);
        }
    }
}
