//! One-shot notification commands

use anyhow::{Context, Result};
use clap::Args;

use super::GlobalArgs;
use crate::util::session::{with_connected_channel, SessionArgs};

/// Send an application message
#[derive(Args, Debug)]
pub struct MessageArgs {
    /// Message type, e.g. `status`
    #[arg(long = "type")]
    message_type: String,

    /// Message content; must be valid JSON
    #[arg(long)]
    content: String,

    #[command(flatten)]
    session: SessionArgs,
}

/// Forward a log line
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log level reported to the agent
    #[arg(long, default_value = "info")]
    level: String,

    /// Prefix placed before the text, e.g. a module name
    #[arg(long)]
    prefix: String,

    /// Log text
    text: String,

    #[command(flatten)]
    session: SessionArgs,
}

/// Report the cloud connector connection state
#[derive(Args, Debug)]
pub struct ConnectorStateArgs {
    /// The connector is connected
    #[arg(long, conflicts_with = "disconnected", required_unless_present = "disconnected")]
    connected: bool,

    /// The connector is disconnected
    #[arg(long)]
    disconnected: bool,

    #[command(flatten)]
    session: SessionArgs,
}

/// Report the device registration state
#[derive(Args, Debug)]
pub struct RegistrationArgs {
    /// Device id to report (sent as an empty string when omitted)
    #[arg(long)]
    device_id: Option<String>,

    /// Report the device as not registered
    #[arg(long)]
    unregistered: bool,

    #[command(flatten)]
    session: SessionArgs,
}

pub fn execute_message(global: &GlobalArgs, args: MessageArgs) -> Result<()> {
    // The content is spliced into the frame verbatim
    serde_json::from_str::<serde_json::Value>(&args.content)
        .context("--content is not valid JSON")?;

    with_connected_channel(global, &args.session, |channel| {
        channel.send_message(&args.message_type, &args.content)
    })
}

pub fn execute_log(global: &GlobalArgs, args: LogArgs) -> Result<()> {
    with_connected_channel(global, &args.session, |channel| {
        channel.send_log_message(&args.level, &args.prefix, &args.text)
    })
}

pub fn execute_connector_state(global: &GlobalArgs, args: ConnectorStateArgs) -> Result<()> {
    let connected = args.connected && !args.disconnected;
    with_connected_channel(global, &args.session, |channel| {
        channel.notify_connector_connection_state(connected)
    })
}

pub fn execute_registration(global: &GlobalArgs, args: RegistrationArgs) -> Result<()> {
    with_connected_channel(global, &args.session, |channel| {
        channel.notify_registration_state(!args.unregistered, args.device_id.as_deref())
    })
}
