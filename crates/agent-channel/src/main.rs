//! agent-channel - talk to the local enebular agent from the command line
//!
//! A thin CLI over `agent-channel-core`: each sending subcommand connects to
//! the agent socket, waits for the `ok` handshake, sends one notification and
//! disconnects. `listen` keeps the channel open and reports state changes.

use clap::Parser;

mod commands;
mod util;

use commands::Cli;

fn main() {
    agent_channel_core::logging::init();
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
