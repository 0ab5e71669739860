//! Client-side Unix domain socket bound to a per-process path.
//!
//! The agent identifies clients by their bound path, so unlike
//! [`UnixStream::connect`] the socket is bound before it connects. The bound
//! path is removed again when the [`ClientSocket`] is dropped, whether or not
//! the connect ever succeeded.

use std::fs;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ChannelError;

/// Permission bits applied to the client socket path (owner rwx).
pub const CLIENT_SOCKET_MODE: u32 = 0o700;

/// Longest path that fits into `sockaddr_un.sun_path` with its NUL.
pub fn max_path_len() -> usize {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len() - 1
}

/// Fail early with [`ChannelError::PathTooLong`] if `path` cannot be used as
/// a socket address.
pub fn check_path(path: &Path) -> Result<(), ChannelError> {
    sockaddr_un(path).map(|_| ())
}

fn sockaddr_un(path: &Path) -> Result<(libc::sockaddr_un, libc::socklen_t), ChannelError> {
    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    // Leave room for the trailing NUL
    let max = addr.sun_path.len() - 1;
    if bytes.len() > max {
        return Err(ChannelError::PathTooLong {
            path: path.to_path_buf(),
            len: bytes.len(),
            max,
        });
    }
    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
    Ok((addr, len))
}

fn set_nonblocking_cloexec(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no pointers are passed.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd_flags = libc::fcntl(fd, libc::F_GETFD);
        if fd_flags < 0 || libc::fcntl(fd, libc::F_SETFD, fd_flags | libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Non-blocking stream socket bound to its own filesystem path.
#[derive(Debug)]
pub struct ClientSocket {
    stream: UnixStream,
    path: PathBuf,
}

impl ClientSocket {
    /// Open a non-blocking stream socket and bind it to `path`.
    ///
    /// Any stale file at `path` is removed first and the bound path is
    /// restricted to [`CLIENT_SOCKET_MODE`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Socket`], [`ChannelError::Bind`],
    /// [`ChannelError::PathTooLong`] or [`ChannelError::Permissions`]. The
    /// path is removed again on every error after the socket was opened.
    pub fn bind(path: &Path) -> Result<Self, ChannelError> {
        let (addr, len) = sockaddr_un(path)?;

        // SAFETY: plain socket(2) call; the result is checked below.
        let raw = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
        if raw < 0 {
            return Err(ChannelError::Socket(io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // From here on Drop closes the descriptor and unlinks the path
        let socket = ClientSocket {
            stream: UnixStream::from(fd),
            path: path.to_path_buf(),
        };
        set_nonblocking_cloexec(socket.as_raw_fd()).map_err(ChannelError::Socket)?;

        let _ = fs::remove_file(path);

        // SAFETY: `addr` is a fully initialised sockaddr_un of length `len`.
        let ret = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        if ret < 0 {
            return Err(ChannelError::Bind {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        fs::set_permissions(path, fs::Permissions::from_mode(CLIENT_SOCKET_MODE)).map_err(
            |source| ChannelError::Permissions {
                path: path.to_path_buf(),
                source,
            },
        )?;

        debug!("Bound client socket at {}", path.display());
        Ok(socket)
    }

    /// Make one connect attempt to the listening socket at `peer`.
    ///
    /// # Errors
    ///
    /// Returns the OS error of the failed attempt (typically `ENOENT` or
    /// `ECONNREFUSED` while the agent is not up yet).
    pub fn connect(&self, peer: &Path) -> io::Result<()> {
        let (addr, len) =
            sockaddr_un(peer).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `addr` is a fully initialised sockaddr_un of length `len`.
        let ret = unsafe {
            libc::connect(
                self.as_raw_fd(),
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                len,
            )
        };
        if ret == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    /// Filesystem path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for ClientSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for ClientSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl AsRawFd for ClientSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

impl AsFd for ClientSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl Drop for ClientSocket {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                debug!("Failed to remove client socket {}: {e}", self.path.display());
            }
        }
    }
}
