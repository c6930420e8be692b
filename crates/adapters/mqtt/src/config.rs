//! MQTT bus configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the MQTT connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long to wait for the broker to acknowledge the connection.
    pub connection_timeout_secs: u16,
    /// Topic prefix the front end watches for discovery descriptors.
    pub discovery_prefix: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "smartish".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            connection_timeout_secs: 10,
            discovery_prefix: "homeassistant".to_string(),
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.connection_timeout_secs))
    }

    /// Username and password, when both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}
