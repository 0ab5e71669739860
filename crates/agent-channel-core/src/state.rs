//! Connection state of the agent channel

use std::fmt;

/// Externally observable state of an [`AgentChannel`](crate::AgentChannel).
///
/// `Connecting` means the socket is connected at the OS level but the agent
/// has not yet acknowledged the connect with `ok`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Returns `true` once the handshake has completed.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Returns `true` while a socket is held (`Connecting` or `Connected`).
    pub fn is_active(self) -> bool {
        self != ConnectionState::Disconnected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_predicates() {
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
