//! The agent channel: one framed connection to the local enebular agent.
//!
//! # State machine
//!
//! ```text
//!              connect()                 "ok" received
//! Disconnected ─────────▶ Connecting ─────────────────▶ Connected
//!      ▲                      │                             │
//!      └──────────────────────┴──────── disconnect() ───────┘
//! ```
//!
//! The socket, the send buffer and the receive buffer are one [`Connection`]
//! value carried by the `Connecting` and `Connected` variants, so they are
//! always allocated and released together.
//!
//! Observers registered with
//! [`register_connection_state_observer`](AgentChannel::register_connection_state_observer)
//! are told about every move into `Connected` or back to `Disconnected`.
//! Entering `Connecting` is not reported.
//!
//! # Failure model
//!
//! Nothing here reconnects on its own. Read errors and zero-byte reads are
//! logged (or ignored) and the channel keeps its state; an owner that detects
//! a dead agent by other means calls [`disconnect`](AgentChannel::disconnect)
//! and [`connect`](AgentChannel::connect) again.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Weak;

use tracing::{debug, error, info};

use crate::backoff::{Sleeper, ThreadSleeper};
use crate::config::ChannelConfig;
use crate::connect::{AttemptStatus, ConnectAttempt};
use crate::error::ChannelError;
use crate::event_source::EventSource;
use crate::framing::{encode_frame, Decoded, FrameDecoder, SendBuffer};
use crate::message::{InboundMessage, OutboundMessage};
use crate::observer::ObserverRegistry;
use crate::socket::ClientSocket;
use crate::state::ConnectionState;

/// Consecutive zero-length writes tolerated before a send is abandoned.
pub const MAX_ZERO_WRITES: u32 = 5;

/// Socket plus the buffers that share its lifetime.
#[derive(Debug)]
struct Connection {
    socket: ClientSocket,
    send_buf: SendBuffer,
    decoder: FrameDecoder,
}

impl Connection {
    fn open(socket: ClientSocket, config: &ChannelConfig) -> Result<Self, ChannelError> {
        let send_buf = SendBuffer::with_capacity(config.send_buffer_size)?;
        let decoder = FrameDecoder::with_capacity(config.recv_buffer_size)?;
        Ok(Self {
            socket,
            send_buf,
            decoder,
        })
    }
}

#[derive(Debug, Default)]
enum Link {
    #[default]
    Disconnected,
    Connecting(Connection),
    Connected(Connection),
}

impl Link {
    fn state(&self) -> ConnectionState {
        match self {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting(_) => ConnectionState::Connecting,
            Link::Connected(_) => ConnectionState::Connected,
        }
    }

    fn connection(&self) -> Option<&Connection> {
        match self {
            Link::Disconnected => None,
            Link::Connecting(c) | Link::Connected(c) => Some(c),
        }
    }

    fn connection_mut(&mut self) -> Option<&mut Connection> {
        match self {
            Link::Disconnected => None,
            Link::Connecting(c) | Link::Connected(c) => Some(c),
        }
    }

    fn into_connection(self) -> Option<Connection> {
        match self {
            Link::Disconnected => None,
            Link::Connecting(c) | Link::Connected(c) => Some(c),
        }
    }
}

/// Client side of the agent socket.
///
/// Single-threaded: every method runs synchronously on the caller's thread and
/// observers fire before the triggering call returns.
pub struct AgentChannel<E: EventSource> {
    config: ChannelConfig,
    event_source: E,
    link: Link,
    observers: ObserverRegistry,
    pending: Weak<()>,
}

impl<E: EventSource> AgentChannel<E> {
    pub fn new(event_source: E, config: ChannelConfig) -> Self {
        Self {
            config,
            event_source,
            link: Link::Disconnected,
            observers: ObserverRegistry::new(),
            pending: Weak::new(),
        }
    }

    /// Channel using the well-known agent socket paths.
    pub fn with_defaults(event_source: E) -> Self {
        Self::new(event_source, ChannelConfig::default())
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// `true` once the agent has acknowledged the connect.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Like [`is_connected`](Self::is_connected), but logs an error when not.
    pub fn connected_check(&self) -> bool {
        if !self.is_connected() {
            error!("Agent not connected");
            return false;
        }
        true
    }

    pub fn event_source(&self) -> &E {
        &self.event_source
    }

    /// Bound client socket path while a socket is held.
    pub fn client_socket_path(&self) -> Option<&Path> {
        self.link.connection().map(|c| c.socket.path())
    }

    /// Descriptor registered with the event source while a socket is held.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.link.connection().map(|c| c.socket.as_raw_fd())
    }

    /// Append an observer. Observers cannot be removed.
    pub fn register_connection_state_observer<F>(&mut self, observer: F)
    where
        F: FnMut(ConnectionState) + 'static,
    {
        self.observers.register(observer);
    }

    /// Connect to the agent, blocking through the retry backoff.
    ///
    /// Returns immediately with `Ok(())` if already connecting or connected.
    /// On success the channel is `Connecting`; it becomes `Connected` once
    /// [`run`](Self::run) receives the agent's `ok`.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be set up, the agent cannot be reached
    /// within the retry budget, or the buffers cannot be allocated. The
    /// channel stays `Disconnected` and the client path is removed.
    pub fn connect(&mut self) -> Result<(), ChannelError> {
        self.connect_with(&mut ThreadSleeper)
    }

    /// [`connect`](Self::connect) with a caller-supplied sleeper.
    pub fn connect_with<S: Sleeper + ?Sized>(&mut self, sleeper: &mut S) -> Result<(), ChannelError> {
        let Some(mut attempt) = self.begin_connect()? else {
            return Ok(());
        };

        loop {
            match attempt.attempt() {
                Ok(AttemptStatus::Connected) => break,
                Ok(AttemptStatus::RetryAfter(wait)) => sleeper.sleep(wait),
                Err(e) => return Err(self.connect_failed(e)),
            }
        }

        self.complete_connect(attempt)
    }

    /// [`connect`](Self::connect) waiting on tokio timers instead of
    /// blocking the thread.
    pub async fn connect_async(&mut self) -> Result<(), ChannelError> {
        let Some(mut attempt) = self.begin_connect()? else {
            return Ok(());
        };

        loop {
            match attempt.attempt() {
                Ok(AttemptStatus::Connected) => break,
                Ok(AttemptStatus::RetryAfter(wait)) => tokio::time::sleep(wait).await,
                Err(e) => return Err(self.connect_failed(e)),
            }
        }

        self.complete_connect(attempt)
    }

    /// First half of a connect driven by the host's own timers.
    ///
    /// Returns `Ok(None)` if already connecting or connected. Otherwise the
    /// returned attempt is driven with [`ConnectAttempt::attempt`] and handed
    /// back through [`complete_connect`](Self::complete_connect).
    ///
    /// Only one attempt may be outstanding, since every attempt binds the same
    /// client path. Dropping an attempt releases the slot.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectPending`] while an earlier attempt is
    /// still alive, or the socket setup error.
    pub fn begin_connect(&mut self) -> Result<Option<ConnectAttempt>, ChannelError> {
        debug!("Agent connect...");

        if self.state().is_active() {
            return Ok(None);
        }
        if self.pending.strong_count() > 0 {
            return Err(self.connect_failed(ChannelError::ConnectPending));
        }

        let attempt = ConnectAttempt::start(&self.config).map_err(|e| self.connect_failed(e))?;
        self.pending = attempt.liveness();
        Ok(Some(attempt))
    }

    /// Second half of a connect: allocate buffers, register the descriptor
    /// and wait for the agent's acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotConnected`] if the attempt has not
    /// connected yet, or [`ChannelError::OutOfMemory`] if a buffer cannot be
    /// allocated. In both cases the attempt is dropped and cleaned up.
    pub fn complete_connect(&mut self, attempt: ConnectAttempt) -> Result<(), ChannelError> {
        if self.state().is_active() {
            debug!("Agent already connecting, discarding connect attempt");
            return Ok(());
        }
        if !attempt.is_connected() {
            return Err(self.connect_failed(ChannelError::NotConnected));
        }

        let connection = Connection::open(attempt.into_socket(), &self.config)
            .map_err(|e| self.connect_failed(e))?;

        self.event_source
            .register_wait_fd(connection.socket.as_raw_fd());
        self.link = Link::Connecting(connection);

        debug!("Agent waiting for connect confirmation...");
        Ok(())
    }

    fn connect_failed(&self, e: ChannelError) -> ChannelError {
        error!("Agent connect failed: {e}");
        e
    }

    /// Tear down the connection.
    ///
    /// Deregisters the descriptor, frees both buffers, closes the socket and
    /// removes the client path, then notifies observers once. No-op when
    /// already disconnected.
    pub fn disconnect(&mut self) {
        if !self.state().is_active() {
            return;
        }

        debug!("Agent disconnect...");
        self.release();
        self.observers.notify(ConnectionState::Disconnected);
    }

    fn release(&mut self) {
        if let Some(connection) = std::mem::take(&mut self.link).into_connection() {
            self.event_source
                .deregister_wait_fd(connection.socket.as_raw_fd());
            // Closes the descriptor, frees the buffers and unlinks the path
            drop(connection);
        }
    }

    /// Service a readable socket: at most one read.
    pub fn run(&mut self) {
        self.recv();
    }

    fn recv(&mut self) {
        let Some(connection) = self.link.connection_mut() else {
            return;
        };
        let Some(message) = read_message(&mut connection.socket, &mut connection.decoder) else {
            return;
        };

        self.handle_message(message);
    }

    fn handle_message(&mut self, message: InboundMessage) {
        debug!("Agent received message: {message:?}");

        match message {
            InboundMessage::ConnectAck => {
                if self.mark_connected() {
                    self.observers.notify(ConnectionState::Connected);
                }
            }
            InboundMessage::Unsupported(text) => {
                info!("Agent unsupported message: [{text}]");
            }
        }
    }

    fn mark_connected(&mut self) -> bool {
        match std::mem::take(&mut self.link) {
            Link::Connecting(connection) => {
                self.link = Link::Connected(connection);
                true
            }
            other => {
                self.link = other;
                false
            }
        }
    }

    fn connected_connection(&mut self) -> Result<&mut Connection, ChannelError> {
        match &mut self.link {
            Link::Connected(connection) => Ok(connection),
            _ => {
                error!("Agent not connected");
                Err(ChannelError::NotConnected)
            }
        }
    }

    /// Frame `message` and write it to the agent.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::NotConnected`] before the handshake has
    /// completed (nothing is written), or the write failure. Failed sends are
    /// not retried or queued.
    pub fn send_raw(&mut self, message: &str) -> Result<(), ChannelError> {
        let connection = self.connected_connection()?;

        debug!("Agent send message: [{message}] ({})", message.len());

        let frame = encode_frame(message.as_bytes());
        write_frame(&mut connection.socket, &frame).inspect_err(|e| error!("Agent {e}"))
    }

    /// Format `message` into the send buffer and write it.
    ///
    /// Text longer than the send buffer is truncated.
    pub fn send(&mut self, message: OutboundMessage<'_>) -> Result<(), ChannelError> {
        let connection = self.connected_connection()?;

        if connection.send_buf.format(message) {
            debug!(
                "Agent message truncated to {} bytes",
                connection.send_buf.capacity() - 1
            );
        }
        debug!(
            "Agent send message: [{}]",
            String::from_utf8_lossy(connection.send_buf.message())
        );

        let Connection {
            socket, send_buf, ..
        } = connection;
        write_frame(socket, send_buf.frame()).inspect_err(|e| error!("Agent {e}"))
    }

    /// Send an application message; `content` must already be valid JSON.
    pub fn send_message(&mut self, message_type: &str, content: &str) -> Result<(), ChannelError> {
        self.send(OutboundMessage::Message {
            message_type,
            content,
        })
    }

    /// Forward a log line. The text is not escaped.
    pub fn send_log_message(
        &mut self,
        level: &str,
        prefix: &str,
        message: &str,
    ) -> Result<(), ChannelError> {
        self.send(OutboundMessage::Log {
            level,
            prefix,
            text: message,
        })
    }

    /// Report the cloud connector's connection state.
    pub fn notify_connector_connection_state(&mut self, connected: bool) -> Result<(), ChannelError> {
        self.send(OutboundMessage::ConnectorState { connected })
    }

    /// Report the device registration state.
    pub fn notify_registration_state(
        &mut self,
        registered: bool,
        device_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.send(OutboundMessage::Registration {
            registered,
            device_id,
        })
    }
}

impl<E: EventSource> Drop for AgentChannel<E> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<E: EventSource> std::fmt::Debug for AgentChannel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentChannel")
            .field("state", &self.state())
            .field("client_socket_path", &self.client_socket_path())
            .field("observers", &self.observers)
            .finish()
    }
}

/// One read into `decoder`; returns the message if the read completed a frame.
///
/// Zero-byte reads and `WouldBlock` are ignored, other read errors are logged.
/// None of them change what is buffered.
fn read_message<R: Read>(reader: &mut R, decoder: &mut FrameDecoder) -> Option<InboundMessage> {
    let n = match reader.read(decoder.spare_mut()) {
        Ok(0) => return None,
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
        Err(e) => {
            error!("Agent receive read error: {e}");
            return None;
        }
    };

    debug!("Agent received data ({n})");

    match decoder.advance(n) {
        Decoded::Frame(frame) => Some(InboundMessage::parse(frame)),
        Decoded::Pending => None,
        Decoded::Overflow => {
            debug!("Agent receive buffer full, clearing");
            None
        }
    }
}

/// Write the whole frame, tolerating partial writes, `EINTR` and up to
/// [`MAX_ZERO_WRITES`] consecutive zero-length writes.
fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<(), ChannelError> {
    let mut written = 0;
    let mut zero_writes = 0;

    while written < frame.len() {
        match writer.write(&frame[written..]) {
            Ok(0) => {
                zero_writes += 1;
                if zero_writes > MAX_ZERO_WRITES {
                    return Err(ChannelError::TooManyZeroWrites { count: zero_writes });
                }
            }
            Ok(n) => {
                zero_writes = 0;
                written += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ChannelError::Write(e)),
        }
    }

    Ok(())
}
