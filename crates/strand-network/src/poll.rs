use std::{io, os::fd::AsRawFd};

use strand_timing::Millis;

use crate::NetError;

/// Socket waits never spin (floor) and never wedge on the infinite
/// sentinel (ceiling). A zero timeout gets the default.
pub const MIN_IO_WAIT: Millis = Millis(10);
pub const MAX_IO_WAIT: Millis = Millis::from_secs(30);
pub const DEFAULT_IO_WAIT: Millis = Millis::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Waits until `fd` is readable, up to the (clamped) timeout.
pub fn wait_readable(fd: &impl AsRawFd, timeout: Millis) -> Result<Readiness, NetError> {
    poll_fd(fd.as_raw_fd(), libc::POLLIN, timeout)
}

/// Waits until `fd` is writable, up to the (clamped) timeout.
pub fn wait_writable(fd: &impl AsRawFd, timeout: Millis) -> Result<Readiness, NetError> {
    poll_fd(fd.as_raw_fd(), libc::POLLOUT, timeout)
}

fn normalize(timeout: Millis) -> Millis {
    if timeout == Millis::ZERO {
        return DEFAULT_IO_WAIT;
    }
    timeout.clamp_to(MIN_IO_WAIT, MAX_IO_WAIT)
}

fn poll_fd(fd: i32, events: i16, timeout: Millis) -> Result<Readiness, NetError> {
    let timeout = normalize(timeout);
    let mut pfd = libc::pollfd { fd, events, revents: 0 };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout.as_u64() as libc::c_int) };
    match rc {
        -1 => {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                // Signal delivery; the caller's loop re-checks shutdown.
                return Ok(Readiness::TimedOut);
            }
            Err(NetError::Poll(err))
        }
        0 => Ok(Readiness::TimedOut),
        // POLLERR/POLLHUP surface through the following read or write.
        _ => Ok(Readiness::Ready),
    }
}

#[cfg(test)]
mod test {
    use std::net::UdpSocket;

    use super::*;

    #[test]
    fn timeout_clamps() {
        assert_eq!(normalize(Millis::ZERO), DEFAULT_IO_WAIT);
        assert_eq!(normalize(Millis(1)), MIN_IO_WAIT);
        assert_eq!(normalize(Millis::INFINITE), MAX_IO_WAIT);
        assert_eq!(normalize(Millis(500)), Millis(500));
    }

    #[test]
    fn idle_socket_times_out_readable() {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let t0 = std::time::Instant::now();
        assert_eq!(wait_readable(&sock, Millis(30)).unwrap(), Readiness::TimedOut);
        assert!(t0.elapsed() >= std::time::Duration::from_millis(25));
    }

    #[test]
    fn udp_socket_is_promptly_writable() {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        assert_eq!(wait_writable(&sock, Millis(100)).unwrap(), Readiness::Ready);
    }

    #[test]
    fn data_makes_socket_readable() {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        b.send_to(b"x", a.local_addr().unwrap()).unwrap();
        assert_eq!(wait_readable(&a, Millis::from_secs(2)).unwrap(), Readiness::Ready);
    }
}
