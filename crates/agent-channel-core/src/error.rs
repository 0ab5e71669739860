//! Error types for the agent channel

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while connecting to or talking to the agent
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to create the client socket
    #[error("Failed to open socket: {0}")]
    Socket(#[source] std::io::Error),

    /// Socket path does not fit into `sockaddr_un`
    #[error("Socket path {path} is too long ({len} bytes, max {max})")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Failed to bind the client socket to its filesystem path
    #[error("Failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to restrict permissions on the client socket path
    #[error("Failed to chmod socket path {path}: {source}")]
    Permissions {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The agent socket could not be reached within the retry budget
    #[error("Failed to connect to {path} after {retries} retries: {source}")]
    ConnectRetriesExhausted {
        path: PathBuf,
        retries: u32,
        source: std::io::Error,
    },

    /// A send or receive buffer could not be allocated
    #[error("Out of memory allocating {size} byte buffer")]
    OutOfMemory { size: usize },

    /// A connect attempt handed out earlier is still outstanding
    #[error("A connect attempt is already in progress")]
    ConnectPending,

    /// The channel has not completed the handshake
    #[error("Agent not connected")]
    NotConnected,

    /// Writing a frame to the socket failed
    #[error("Send message write error: {0}")]
    Write(#[source] std::io::Error),

    /// The socket accepted zero bytes too many times in a row
    #[error("Send message: too many zero writes ({count})")]
    TooManyZeroWrites { count: u32 },
}
