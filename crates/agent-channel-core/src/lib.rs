//! Core client for the local enebular agent channel.
//!
//! This crate owns one client-side Unix domain socket connection to the
//! enebular agent, found at a well-known path (by default
//! `/tmp/enebular-local-agent.socket`). Messages in both directions are text
//! frames terminated by a single ASCII Record Separator byte (`0x1E`).
//!
//! The connection only counts as established once the agent has answered the
//! connect with the literal message `ok`; see [`AgentChannel`] for the state
//! machine and [`ConnectAttempt`] for the retry schedule.
//!
//! The channel is single-threaded: readiness of the socket is reported by an
//! external [`EventSource`] and the host calls [`AgentChannel::run`] whenever
//! the descriptor becomes readable.
//!
//! The socket-facing modules are only compiled on Unix platforms.

pub mod backoff;
#[cfg(unix)]
pub mod channel;
pub mod config;
#[cfg(unix)]
pub mod connect;
pub mod error;
#[cfg(unix)]
pub mod event_source;
pub mod framing;
pub mod home;
pub mod logging;
pub mod message;
pub mod observer;
#[cfg(unix)]
pub mod socket;
pub mod state;

pub use backoff::{Backoff, Sleeper, ThreadSleeper};
#[cfg(unix)]
pub use channel::AgentChannel;
pub use config::{ChannelConfig, ConfigError, ConfigOverrides};
#[cfg(unix)]
pub use connect::{AttemptStatus, ConnectAttempt};
pub use error::ChannelError;
#[cfg(unix)]
pub use event_source::{EventSource, PollEventSource, Readiness};
pub use message::{InboundMessage, OutboundMessage};
pub use state::ConnectionState;
