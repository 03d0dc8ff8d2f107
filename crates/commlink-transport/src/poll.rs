//! Bounded-timeout readiness polling.
//!
//! Receive loops never block on a bare `read`: they first wait for the
//! socket to become readable for at most one poll interval, so a stop
//! request is noticed within that interval.

use std::time::Duration;

/// Outcome of one readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Data (or EOF / a pending socket error) is available to read.
    Ready,
    /// Nothing arrived within the timeout.
    Idle,
}

/// Wait until `fd` is readable or `timeout` elapses.
///
/// Hang-up and error conditions count as readable: the following read
/// surfaces them.
#[cfg(unix)]
pub fn wait_readable(fd: std::os::fd::RawFd, timeout: Duration) -> std::io::Result<Readiness> {
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of 1.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(Readiness::Idle);
        }
        return Err(err);
    }
    if rc == 0 {
        return Ok(Readiness::Idle);
    }

    if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
        Ok(Readiness::Ready)
    } else {
        Ok(Readiness::Idle)
    }
}

/// Map the result of a timed `peek` onto a readiness outcome.
///
/// Used where no native poll is available: the socket's read timeout is set
/// to the poll interval and a one-byte peek stands in for `poll(2)`.
#[cfg_attr(unix, allow(dead_code))]
pub(crate) fn peek_outcome(result: std::io::Result<usize>) -> std::io::Result<Readiness> {
    match result {
        Ok(_) => Ok(Readiness::Ready),
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ) =>
        {
            Ok(Readiness::Idle)
        }
        Err(err) => Err(err),
    }
}
