//! Readiness notification for the agent socket.
//!
//! The channel never polls by itself. It hands its descriptor to an
//! [`EventSource`] on connect and takes it back on disconnect; the host loop
//! calls [`AgentChannel::run`](crate::AgentChannel::run) whenever the
//! descriptor is readable.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Facility that wakes the host loop when a registered descriptor is ready.
pub trait EventSource {
    /// Start watching `fd` for readability.
    fn register_wait_fd(&mut self, fd: RawFd);

    /// Stop watching `fd`.
    fn deregister_wait_fd(&mut self, fd: RawFd);
}

impl<E: EventSource + ?Sized> EventSource for &mut E {
    fn register_wait_fd(&mut self, fd: RawFd) {
        (**self).register_wait_fd(fd);
    }

    fn deregister_wait_fd(&mut self, fd: RawFd) {
        (**self).deregister_wait_fd(fd);
    }
}

impl<E: EventSource + ?Sized> EventSource for Box<E> {
    fn register_wait_fd(&mut self, fd: RawFd) {
        (**self).register_wait_fd(fd);
    }

    fn deregister_wait_fd(&mut self, fd: RawFd) {
        (**self).deregister_wait_fd(fd);
    }
}

/// Readiness of one registered descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub fd: RawFd,
    /// Data (or EOF) can be read.
    pub readable: bool,
    /// The peer hung up or the descriptor is in an error state.
    pub hangup: bool,
}

/// [`EventSource`] backed by `poll(2)`.
///
/// Suitable for a simple host loop that owns nothing but the agent channel.
#[derive(Debug, Default)]
pub struct PollEventSource {
    fds: Vec<RawFd>,
}

impl PollEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered descriptors, in registration order.
    pub fn fds(&self) -> &[RawFd] {
        &self.fds
    }

    /// Wait up to `timeout` for any registered descriptor to become ready.
    ///
    /// Returns an empty list on timeout or when interrupted by a signal.
    ///
    /// # Errors
    ///
    /// Returns the OS error if `poll(2)` fails for another reason.
    pub fn wait(&self, timeout: Duration) -> io::Result<Vec<Readiness>> {
        let mut pollfds: Vec<libc::pollfd> = self
            .fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: `pollfds` is a valid, exclusively borrowed array of
        // `pollfds.len()` entries for the duration of the call.
        let ret = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(pollfds
            .iter()
            .filter(|p| p.revents != 0)
            .map(|p| Readiness {
                fd: p.fd,
                readable: p.revents & libc::POLLIN != 0,
                hangup: p.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0,
            })
            .collect())
    }
}

impl EventSource for PollEventSource {
    fn register_wait_fd(&mut self, fd: RawFd) {
        if !self.fds.contains(&fd) {
            self.fds.push(fd);
        }
    }

    fn deregister_wait_fd(&mut self, fd: RawFd) {
        self.fds.retain(|&registered| registered != fd);
    }
}
