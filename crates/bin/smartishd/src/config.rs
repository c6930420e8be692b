//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `smartish.toml` in the working directory, or the file named by
//! `SMARTISH_CONFIG`. Every field except the access token has a sensible
//! default. Environment variables take precedence over file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use smartish_adapter_hass_ws::HomeAssistantConfig;
use smartish_adapter_mqtt::MqttConfig;
use smartish_domain::climate::ClimateSettings;

const DEFAULT_PATH: &str = "smartish.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub home_assistant: HomeAssistantConfig,
    pub mqtt: MqttConfig,
    pub climate: ClimateConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Thermostat tunables.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub min_temp: f64,
    pub max_temp: f64,
    pub temp_step: f64,
    /// Delay between a controller connecting and its first recompute.
    pub initial_recompute_delay_secs: u64,
    /// How close an actuator must be to `max_temp` to report heating.
    pub heating_tolerance: f64,
}

/// Persisted state location.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SMARTISH_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SMARTISH_HA_URL") {
            self.home_assistant.url = val;
        }
        if let Some(val) = lookup("SMARTISH_HA_TOKEN") {
            self.home_assistant.token = val;
        }
        if let Some(val) = lookup("SMARTISH_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = lookup("SMARTISH_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = lookup("SMARTISH_MQTT_USERNAME") {
            self.mqtt.username = Some(val);
        }
        if let Some(val) = lookup("SMARTISH_MQTT_PASSWORD") {
            self.mqtt.password = Some(val);
        }
        if let Some(val) = lookup("SMARTISH_STATE_PATH") {
            self.state.path = PathBuf::from(val);
        }
        if let Some(val) = lookup("SMARTISH_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.home_assistant.token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "home_assistant.token must be set".to_string(),
            ));
        }
        if self.home_assistant.recv_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "home_assistant.recv_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "mqtt.broker_port must be non-zero".to_string(),
            ));
        }
        if !(self.climate.temp_step.is_finite() && self.climate.temp_step > 0.0) {
            return Err(ConfigError::Validation(
                "climate.temp_step must be positive".to_string(),
            ));
        }
        if !(self.climate.heating_tolerance.is_finite() && self.climate.heating_tolerance >= 0.0) {
            return Err(ConfigError::Validation(
                "climate.heating_tolerance must not be negative".to_string(),
            ));
        }
        self.climate
            .settings()
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))
    }
}

impl ClimateConfig {
    #[must_use]
    pub fn settings(&self) -> ClimateSettings {
        ClimateSettings {
            min_temp: self.min_temp,
            max_temp: self.max_temp,
            temp_step: self.temp_step,
            initial_recompute_delay: Duration::from_secs(self.initial_recompute_delay_secs),
            heating_tolerance: self.heating_tolerance,
        }
    }
}

impl Default for ClimateConfig {
    fn default() -> Self {
        let settings = ClimateSettings::default();
        Self {
            min_temp: settings.min_temp,
            max_temp: settings.max_temp,
            temp_step: settings.temp_step,
            initial_recompute_delay_secs: settings.initial_recompute_delay.as_secs(),
            heating_tolerance: settings.heating_tolerance,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "smartishd=info,smartish=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_token() -> Config {
        let mut config = Config::default();
        config.home_assistant.token = "secret".to_string();
        config
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.mqtt.discovery_prefix, "homeassistant");
        assert_eq!(config.state.path, PathBuf::from("state.json"));
        assert_eq!(config.climate.settings(), ClimateSettings::default());
        assert_eq!(config.home_assistant.recv_timeout_secs, 5);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [home_assistant]
            url = 'ws://ha.lan:8123/api/websocket'
            token = 'abc'
            recv_timeout_secs = 2

            [mqtt]
            broker_host = 'broker.lan'
            discovery_prefix = 'ha'

            [climate]
            min_temp = 5.0
            max_temp = 30.0
            temp_step = 0.5
            initial_recompute_delay_secs = 1
            heating_tolerance = 0.1

            [state]
            path = '/var/lib/smartish/state.json'

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.home_assistant.token, "abc");
        assert_eq!(config.home_assistant.recv_timeout_secs, 2);
        assert_eq!(config.mqtt.broker_host, "broker.lan");
        assert_eq!(config.mqtt.discovery_prefix, "ha");
        assert_eq!(config.climate.settings().min_temp, 5.0);
        assert_eq!(
            config.climate.settings().initial_recompute_delay,
            Duration::from_secs(1)
        );
        assert_eq!(config.state.path, PathBuf::from("/var/lib/smartish/state.json"));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let config: Config = toml::from_str("[climate]\nmax_temp = 25.0").unwrap();
        assert_eq!(config.climate.max_temp, 25.0);
        assert_eq!(config.climate.min_temp, 10.0);
        assert_eq!(config.mqtt.client_id, "smartish");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_let_environment_win_over_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SMARTISH_HA_TOKEN", "from-env"),
            ("SMARTISH_MQTT_PORT", "8883"),
            ("SMARTISH_MQTT_USERNAME", "bridge"),
            ("SMARTISH_STATE_PATH", "/tmp/state.json"),
            ("SMARTISH_LOG", "warn"),
            ("RUST_LOG", "trace"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.home_assistant.token, "from-env");
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(config.state.path, PathBuf::from("/tmp/state.json"));
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_ignore_unparseable_port_override() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "SMARTISH_MQTT_PORT").then(|| "nope".to_string()));
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_require_access_token() {
        assert!(Config::default().validate().is_err());
        assert!(with_token().validate().is_ok());
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = with_token();
        config.mqtt.broker_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_inverted_bounds() {
        let mut config = with_token();
        config.climate.min_temp = 30.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_non_positive_step_and_negative_tolerance() {
        let mut config = with_token();
        config.climate.temp_step = 0.0;
        assert!(config.validate().is_err());

        let mut config = with_token();
        config.climate.heating_tolerance = -0.1;
        assert!(config.validate().is_err());
    }
}
