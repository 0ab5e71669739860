//! Configuration resolution
//!
//! Resolves channel configuration from multiple sources with priority:
//! 1. Command-line flags (passed as overrides)
//! 2. Environment variables
//! 3. Config file (explicit path, else `~/.config/agent-channel/config.toml`)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{
    default_config_path, resolve_config, ConfigError, ConfigOverrides, CLIENT_BASE_ENV,
    PEER_SOCKET_ENV,
};
pub use types::{ChannelConfig, DEFAULT_CLIENT_SOCKET_BASE, DEFAULT_PEER_SOCKET_PATH};
