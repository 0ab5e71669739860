//! Channel setup and the poll-driven host loop shared by the commands

use agent_channel_core::config::{resolve_config, ConfigOverrides};
use agent_channel_core::home::get_home_dir;
use agent_channel_core::{AgentChannel, ChannelError, PollEventSource};
use anyhow::{bail, Context, Result};
use clap::Args;
use std::time::{Duration, Instant};

use crate::commands::GlobalArgs;

pub type Channel = AgentChannel<PollEventSource>;

/// Handshake options for commands that talk to the agent
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// How long to wait for the agent's `ok` after connecting
    #[arg(long, default_value_t = 5000)]
    pub handshake_timeout_ms: u64,
}

impl SessionArgs {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Outcome of one pass of the host loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// Nothing became ready before the timeout
    Idle,
    /// The socket was readable and `run()` was called
    Serviced,
    /// The agent hung up
    PeerClosed,
}

/// Build a channel from the resolved configuration.
pub fn open_channel(global: &GlobalArgs) -> Result<Channel> {
    let home_dir = get_home_dir()?;
    let overrides = ConfigOverrides {
        config_path: global.config.clone(),
        peer_socket_path: global.peer_socket.clone(),
        client_socket_base: global.client_base.clone(),
    };
    let config = resolve_config(&overrides, &home_dir)?;
    Ok(AgentChannel::new(PollEventSource::new(), config))
}

/// Wait up to `timeout` for the socket and service it once.
///
/// Pending data is read before a hangup is reported, so an agent that answers
/// and closes straight away still completes the handshake.
pub fn pump_once(channel: &mut Channel, timeout: Duration) -> Result<Pump> {
    let ready = channel
        .event_source()
        .wait(timeout)
        .context("Failed to poll the agent socket")?;

    let mut outcome = Pump::Idle;
    for readiness in ready {
        if readiness.readable {
            channel.run();
            outcome = Pump::Serviced;
        }
        if readiness.hangup {
            return Ok(Pump::PeerClosed);
        }
    }
    Ok(outcome)
}

/// Pump the channel until the agent acknowledges the connect.
pub fn wait_for_handshake(channel: &mut Channel, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    while !channel.is_connected() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("Timed out after {}ms waiting for the agent handshake", timeout.as_millis());
        }
        if pump_once(channel, remaining)? == Pump::PeerClosed && !channel.is_connected() {
            bail!("Agent closed the connection before the handshake");
        }
    }
    Ok(())
}

/// Connect, wait for the handshake, run `send`, then disconnect.
pub fn with_connected_channel<F>(global: &GlobalArgs, session: &SessionArgs, send: F) -> Result<()>
where
    F: FnOnce(&mut Channel) -> Result<(), ChannelError>,
{
    let mut channel = open_channel(global)?;
    channel.connect()?;

    let result = wait_for_handshake(&mut channel, session.handshake_timeout())
        .and_then(|()| send(&mut channel).map_err(Into::into));

    channel.disconnect();
    result
}
