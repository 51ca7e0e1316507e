//! Connection status register

use serde::Serialize;
use std::fmt;

/// Connection status exposed on the device bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Connecting,
    Disconnecting,
}

impl ConnectionStatus {
    /// Register value
    pub fn code(self) -> u16 {
        match self {
            ConnectionStatus::Connected => 1,
            ConnectionStatus::Disconnected => 2,
            ConnectionStatus::Connecting => 3,
            ConnectionStatus::Disconnecting => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Disconnecting => "DISCONNECTING",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_codes() {
        assert_eq!(ConnectionStatus::Connected.code(), 1);
        assert_eq!(ConnectionStatus::Disconnected.code(), 2);
        assert_eq!(ConnectionStatus::Connecting.code(), 3);
        assert_eq!(ConnectionStatus::Disconnecting.code(), 4);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "CONNECTED");
        assert_eq!(ConnectionStatus::Disconnecting.to_string(), "DISCONNECTING");
    }

    #[test]
    fn test_serializes_as_name() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Connecting).unwrap(),
            "\"CONNECTING\""
        );
    }
}
