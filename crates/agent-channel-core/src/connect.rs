//! Connect retry state machine.
//!
//! [`ConnectAttempt`] owns a bound [`ClientSocket`] and the [`Backoff`]
//! schedule. Each call to [`ConnectAttempt::attempt`] makes one connect try
//! and says how long to wait before the next one, so the schedule can be
//! driven by a blocking sleep, a tokio timer, or a host event loop's own
//! timers. Dropping an unfinished attempt closes the socket and unlinks its
//! path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{error, info};

use crate::backoff::Backoff;
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::socket::{self, ClientSocket};

/// Outcome of one connect try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    /// The socket is connected at the OS level.
    Connected,
    /// The try failed; call [`ConnectAttempt::attempt`] again after this wait.
    RetryAfter(Duration),
}

/// An in-progress connection to the agent socket.
#[derive(Debug)]
pub struct ConnectAttempt {
    socket: ClientSocket,
    peer_path: PathBuf,
    backoff: Backoff,
    connected: bool,
    // Lets the channel see whether this attempt is still alive
    alive: Arc<()>,
}

impl ConnectAttempt {
    /// Open and bind the client socket described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be created, bound or chmod'ed.
    pub fn start(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let client_path = config.client_socket_path(std::process::id());
        Self::with_client_path(config, &client_path)
    }

    /// Like [`start`](Self::start) with an explicit client path.
    ///
    /// An agent path that cannot be a socket address is rejected here, before
    /// anything is bound, rather than retried.
    pub fn with_client_path(config: &ChannelConfig, client_path: &Path) -> Result<Self, ChannelError> {
        socket::check_path(&config.peer_socket_path)?;
        let socket = ClientSocket::bind(client_path)?;
        Ok(Self {
            socket,
            peer_path: config.peer_socket_path.clone(),
            backoff: config.backoff(),
            connected: false,
            alive: Arc::new(()),
        })
    }

    /// Make one connect try.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectRetriesExhausted`] once the try fails
    /// with no retries left. The attempt should then be dropped.
    pub fn attempt(&mut self) -> Result<AttemptStatus, ChannelError> {
        if self.connected {
            return Ok(AttemptStatus::Connected);
        }

        match self.socket.connect(&self.peer_path) {
            Ok(()) => {
                self.connected = true;
                Ok(AttemptStatus::Connected)
            }
            Err(e) => self.retry_after(e),
        }
    }

    fn retry_after(&mut self, cause: io::Error) -> Result<AttemptStatus, ChannelError> {
        match self.backoff.next() {
            Some(wait) => {
                info!(
                    "Agent connect failed ({cause}), retrying in {}ms",
                    wait.as_millis()
                );
                Ok(AttemptStatus::RetryAfter(wait))
            }
            None => {
                error!("Failed to connect to agent: {cause}");
                Err(ChannelError::ConnectRetriesExhausted {
                    path: self.peer_path.clone(),
                    retries: self.backoff.retries(),
                    source: cause,
                })
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Retries used so far.
    pub fn retries(&self) -> u32 {
        self.backoff.retries()
    }

    pub fn client_path(&self) -> &Path {
        self.socket.path()
    }

    /// Handle that stays upgradable until this attempt is dropped or consumed.
    pub(crate) fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }

    /// Hand over the connected socket.
    pub(crate) fn into_socket(self) -> ClientSocket {
        self.socket
    }
}
