//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::{Backoff, CONNECT_RETRIES_MAX, INITIAL_RETRY_WAIT};
use crate::framing::{RECV_BUF_SIZE, SEND_BUF_SIZE};

/// Well-known path the agent listens on.
pub const DEFAULT_PEER_SOCKET_PATH: &str = "/tmp/enebular-local-agent.socket";

/// Prefix of the per-process client socket path; the pid is appended.
pub const DEFAULT_CLIENT_SOCKET_BASE: &str = "/tmp/enebular-local-agent-client.socket-";

/// Channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Socket the agent listens on
    pub peer_socket_path: PathBuf,
    /// Client socket path prefix
    pub client_socket_base: String,
    /// Connect retries after the first failed attempt
    pub connect_retries: u32,
    /// Wait before the first retry, doubled on each further retry
    pub initial_backoff_ms: u64,
    /// Send buffer capacity in bytes
    pub send_buffer_size: usize,
    /// Receive buffer capacity in bytes
    pub recv_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            peer_socket_path: PathBuf::from(DEFAULT_PEER_SOCKET_PATH),
            client_socket_base: DEFAULT_CLIENT_SOCKET_BASE.to_string(),
            connect_retries: CONNECT_RETRIES_MAX,
            initial_backoff_ms: INITIAL_RETRY_WAIT.as_millis() as u64,
            send_buffer_size: SEND_BUF_SIZE,
            recv_buffer_size: RECV_BUF_SIZE,
        }
    }
}

impl ChannelConfig {
    /// Client socket path for the process `pid`.
    pub fn client_socket_path(&self, pid: u32) -> PathBuf {
        PathBuf::from(format!("{}{pid}", self.client_socket_base))
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Fresh retry schedule for one connect.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_backoff(), self.connect_retries)
    }

    /// Check values that would make the channel unusable.
    pub fn validate(&self) -> Result<(), String> {
        if self.send_buffer_size < 2 {
            return Err(format!(
                "send_buffer_size must be at least 2 bytes (got {})",
                self.send_buffer_size
            ));
        }
        if self.recv_buffer_size < 1 {
            return Err("recv_buffer_size must be at least 1 byte".to_string());
        }
        if self.client_socket_base.is_empty() {
            return Err("client_socket_base must not be empty".to_string());
        }

        #[cfg(unix)]
        {
            let max = crate::socket::max_path_len();
            let peer_len = self.peer_socket_path.as_os_str().len();
            if peer_len > max {
                return Err(format!(
                    "peer_socket_path is too long for a socket address ({peer_len} bytes, max {max})"
                ));
            }
            let client_len = self
                .client_socket_path(std::process::id())
                .as_os_str()
                .len();
            if client_len > max {
                return Err(format!(
                    "client_socket_base is too long for a socket address ({client_len} bytes with pid, max {max})"
                ));
            }
        }
        Ok(())
    }
}
