//! Configuration discovery and resolution

use super::types::ChannelConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Environment variable overriding the agent socket path.
pub const PEER_SOCKET_ENV: &str = "AGENT_CHANNEL_PEER_SOCKET";

/// Environment variable overriding the client socket path prefix.
pub const CLIENT_BASE_ENV: &str = "AGENT_CHANNEL_CLIENT_BASE";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading a config file
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Values that cannot work
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override agent socket path
    pub peer_socket_path: Option<PathBuf>,
    /// Override client socket path prefix
    pub client_socket_base: Option<String>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Config file: `overrides.config_path` if given (errors are fatal),
///    otherwise `<home>/.config/agent-channel/config.toml` if present
///    (errors are logged and the file is skipped)
/// 4. Defaults
pub fn resolve_config(
    overrides: &ConfigOverrides,
    home_dir: &Path,
) -> Result<ChannelConfig, ConfigError> {
    let mut config = match &overrides.config_path {
        Some(path) => load_config_file(path)?,
        None => {
            let default_path = default_config_path(home_dir);
            if default_path.exists() {
                match load_config_file(&default_path) {
                    Ok(file_config) => file_config,
                    Err(e) => {
                        warn!("Failed to load config at {default_path:?}: {e}");
                        ChannelConfig::default()
                    }
                }
            } else {
                ChannelConfig::default()
            }
        }
    };

    apply_env_overrides(&mut config);
    apply_cli_overrides(&mut config, overrides);

    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

/// Default config file location under `home_dir`.
pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/agent-channel/config.toml")
}

/// Load config from a TOML file
fn load_config_file(path: &Path) -> Result<ChannelConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut ChannelConfig) {
    if let Ok(path) = std::env::var(PEER_SOCKET_ENV) {
        if !path.trim().is_empty() {
            config.peer_socket_path = PathBuf::from(path.trim());
        }
    }

    if let Ok(base) = std::env::var(CLIENT_BASE_ENV) {
        if !base.trim().is_empty() {
            config.client_socket_base = base.trim().to_string();
        }
    }
}

/// Apply command-line overrides
fn apply_cli_overrides(config: &mut ChannelConfig, overrides: &ConfigOverrides) {
    if let Some(ref path) = overrides.peer_socket_path {
        config.peer_socket_path = path.clone();
    }

    if let Some(ref base) = overrides.client_socket_base {
        config.client_socket_base = base.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            env::remove_var(PEER_SOCKET_ENV);
            env::remove_var(CLIENT_BASE_ENV);
        }
    }

    fn write_default_config(home: &Path, contents: &str) {
        let path = default_config_path(home);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    #[serial]
    fn test_resolve_defaults_without_file() {
        clear_env();
        let home = TempDir::new().unwrap();
        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert_eq!(config, ChannelConfig::default());
    }

    #[test]
    #[serial]
    fn test_resolve_reads_default_file() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_default_config(home.path(), "peer_socket_path = \"/run/agent.sock\"\n");

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert_eq!(config.peer_socket_path, PathBuf::from("/run/agent.sock"));
    }

    #[test]
    #[serial]
    fn test_resolve_skips_broken_default_file() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_default_config(home.path(), "peer_socket_path = [not toml");

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert_eq!(config, ChannelConfig::default());
    }

    #[test]
    #[serial]
    fn test_resolve_explicit_file_errors_are_fatal() {
        clear_env();
        let home = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(home.path().join("missing.toml")),
            ..Default::default()
        };
        let err = resolve_config(&overrides, home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file_and_cli_overrides_env() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_default_config(
            home.path(),
            "peer_socket_path = \"/from/file.sock\"\nclient_socket_base = \"/from/file-\"\n",
        );
        unsafe {
            env::set_var(PEER_SOCKET_ENV, "/from/env.sock");
            env::set_var(CLIENT_BASE_ENV, "/from/env-");
        }

        let overrides = ConfigOverrides {
            client_socket_base: Some("/from/cli-".to_string()),
            ..Default::default()
        };
        let config = resolve_config(&overrides, home.path()).unwrap();
        clear_env();

        assert_eq!(config.peer_socket_path, PathBuf::from("/from/env.sock"));
        assert_eq!(config.client_socket_base, "/from/cli-");
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();
        let home = TempDir::new().unwrap();
        write_default_config(home.path(), "send_buffer_size = 1\n");
        let overrides = ConfigOverrides {
            config_path: Some(default_config_path(home.path())),
            ..Default::default()
        };
        let err = resolve_config(&overrides, home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
