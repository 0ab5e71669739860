//! Listen command implementation

use anyhow::Result;
use clap::Args;
use std::time::{Duration, Instant};
use tracing::info;

use super::GlobalArgs;
use crate::util::session::{open_channel, pump_once, wait_for_handshake, Pump, SessionArgs};

/// Poll interval when no deadline is closer
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Stay connected and print state changes
#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Stop after this many seconds (default: until the agent goes away)
    #[arg(long)]
    duration_secs: Option<u64>,

    #[command(flatten)]
    session: SessionArgs,
}

pub fn execute(global: &GlobalArgs, args: ListenArgs) -> Result<()> {
    let mut channel = open_channel(global)?;
    channel.register_connection_state_observer(|state| println!("{state}"));

    channel.connect()?;
    wait_for_handshake(&mut channel, args.session.handshake_timeout())?;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                remaining.min(POLL_INTERVAL)
            }
            None => POLL_INTERVAL,
        };

        if pump_once(&mut channel, timeout)? == Pump::PeerClosed {
            info!("Agent closed the connection");
            break;
        }
    }

    channel.disconnect();
    Ok(())
}
