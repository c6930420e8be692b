//! Home Assistant connection configuration.

use std::time::Duration;

use serde::Deserialize;

/// Where and how to reach the home-automation server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    /// WebSocket endpoint, e.g. `ws://homeassistant.local:8123/api/websocket`.
    pub url: String,
    /// Long-lived access token.
    pub token: String,
    /// How long one receive may block before the session re-checks for
    /// shutdown, in seconds.
    pub recv_timeout_secs: u64,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8123/api/websocket".to_string(),
            token: String::new(),
            recv_timeout_secs: 5,
        }
    }
}

impl HomeAssistantConfig {
    #[must_use]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_secs(self.recv_timeout_secs)
    }
}
