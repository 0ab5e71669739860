//! Home directory resolution
//!
//! The default config file lives under the user's home directory. Tests and
//! custom deployments redirect it with `AGENT_CHANNEL_HOME`.
//!
//! # Precedence
//!
//! 1. `AGENT_CHANNEL_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "AGENT_CHANNEL_HOME";

/// Get the home directory used for agent-channel configuration.
///
/// # Errors
///
/// Returns an error if `AGENT_CHANNEL_HOME` is not set and the platform home
/// directory cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}
