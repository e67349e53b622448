//! Thin wrapper over `poll(2)` plus a socketpair waker.

use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

pub(crate) const READABLE: libc::c_short = libc::POLLIN;
pub(crate) const WRITABLE: libc::c_short = libc::POLLOUT;

/// The set of descriptors watched by one readiness wait.
///
/// Rebuilt before every wait; the index returned by `register` addresses
/// the entry in [`PollSet::readiness`].
#[derive(Default)]
pub(crate) struct PollSet {
    fds: Vec<libc::pollfd>,
}

impl PollSet {
    pub(crate) fn clear(&mut self) {
        self.fds.clear();
    }

    pub(crate) fn register(&mut self, fd: RawFd, events: libc::c_short) -> usize {
        self.fds.push(libc::pollfd {
            fd,
            events,
            revents: 0,
        });
        self.fds.len() - 1
    }

    /// Block until a registered descriptor is ready or `timeout` passes.
    ///
    /// Returns the number of ready descriptors; an interrupted wait counts as
    /// zero.
    pub(crate) fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        // SAFETY: `fds` is an exclusively borrowed, initialised slice of
        // pollfd structs and its exact length is passed with the pointer.
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(rc as usize)
    }

    pub(crate) fn readiness(&self, index: usize) -> Readiness {
        Readiness(self.fds.get(index).map_or(0, |fd| fd.revents))
    }
}

/// Events reported for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Readiness(libc::c_short);

impl Readiness {
    /// Readable, or hung up with data possibly still buffered.
    pub(crate) fn is_readable(self) -> bool {
        self.0 & (libc::POLLIN | libc::POLLHUP) != 0
    }

    pub(crate) fn is_writable(self) -> bool {
        self.0 & libc::POLLOUT != 0
    }

    pub(crate) fn is_error(self) -> bool {
        self.0 & (libc::POLLERR | libc::POLLNVAL) != 0
    }
}

/// Wakes a blocked [`PollSet::wait`] from another thread.
pub(crate) struct Waker {
    rx: UnixStream,
    tx: UnixStream,
}

impl Waker {
    pub(crate) fn new() -> io::Result<Self> {
        let (rx, tx) = UnixStream::pair()?;
        rx.set_nonblocking(true)?;
        tx.set_nonblocking(true)?;
        Ok(Self { rx, tx })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }

    pub(crate) fn wake(&self) {
        match (&self.tx).write(&[1]) {
            Ok(_) => {}
            // A full pipe already guarantees a pending wakeup.
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => tracing::warn!(error = %err, "waker write failed"),
        }
    }

    pub(crate) fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.rx).read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_times_out_with_nothing_ready() {
        let waker = Waker::new().unwrap();
        let mut set = PollSet::default();
        let idx = set.register(waker.fd(), READABLE);
        assert_eq!(set.wait(Duration::from_millis(10)).unwrap(), 0);
        assert!(!set.readiness(idx).is_readable());
    }

    #[test]
    fn wake_makes_waker_readable_until_drained() {
        let waker = Waker::new().unwrap();
        waker.wake();
        waker.wake();

        let mut set = PollSet::default();
        let idx = set.register(waker.fd(), READABLE);
        assert_eq!(set.wait(Duration::from_secs(1)).unwrap(), 1);
        assert!(set.readiness(idx).is_readable());

        waker.drain();
        set.clear();
        let idx = set.register(waker.fd(), READABLE);
        assert_eq!(set.wait(Duration::from_millis(10)).unwrap(), 0);
        assert!(!set.readiness(idx).is_readable());
    }

    #[test]
    fn connected_socket_is_writable() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut set = PollSet::default();
        let idx = set.register(a.as_raw_fd(), READABLE | WRITABLE);
        assert_eq!(set.wait(Duration::from_secs(1)).unwrap(), 1);
        let ready = set.readiness(idx);
        assert!(ready.is_writable());
        assert!(!ready.is_readable());
        assert!(!ready.is_error());
    }

    #[test]
    fn unknown_index_reports_nothing() {
        let set = PollSet::default();
        assert_eq!(set.readiness(3), Readiness(0));
    }
}
