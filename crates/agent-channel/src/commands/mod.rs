//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod listen;
mod send;

/// agent-channel - notifications for the local enebular agent
#[derive(Parser, Debug)]
#[command(
    name = "agent-channel",
    version,
    about = "Send notifications to the local enebular agent",
    long_about = "Connects to the enebular agent over its Unix domain socket and sends status, log, connector-state and registration notifications"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: ~/.config/agent-channel/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Agent socket path
    #[arg(long, global = true)]
    pub peer_socket: Option<PathBuf>,

    /// Client socket path prefix; the process id is appended
    #[arg(long, global = true)]
    pub client_base: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send an application message with JSON content
    Message(send::MessageArgs),

    /// Forward a log line to the agent
    Log(send::LogArgs),

    /// Report the cloud connector connection state
    ConnectorState(send::ConnectorStateArgs),

    /// Report the device registration state
    Registration(send::RegistrationArgs),

    /// Stay connected and print connection state changes
    Listen(listen::ListenArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Message(args) => send::execute_message(&self.global, args),
            Commands::Log(args) => send::execute_log(&self.global, args),
            Commands::ConnectorState(args) => send::execute_connector_state(&self.global, args),
            Commands::Registration(args) => send::execute_registration(&self.global, args),
            Commands::Listen(args) => listen::execute(&self.global, args),
        }
    }
}
