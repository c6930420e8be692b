//! Bus topic names and the discovery descriptor of a virtual thermostat.

use smartish_domain::climate::{ClimateMode, ClimateSettings};
use smartish_domain::zone::Zone;

/// Payload announcing the thermostat is usable.
pub const ONLINE: &str = "online";
/// Payload announcing the thermostat is not usable.
pub const OFFLINE: &str = "offline";

/// Every topic one controller publishes or listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub component_id: String,
    pub config: String,
    pub mode_command: String,
    pub mode_state: String,
    pub action: String,
    pub availability: String,
    pub temperature_command: String,
    pub temperature_state: String,
    pub current_temperature: String,
}

impl Topics {
    /// Topics under `{prefix}/climate/{zone id}-sh-cc`.
    #[must_use]
    pub fn new(prefix: &str, zone: &Zone) -> Self {
        let component_id = format!("{}-sh-cc", zone.id);
        let base = format!("{prefix}/climate/{component_id}");
        Self {
            config: format!("{base}/config"),
            mode_command: format!("{base}/thermostatModeCmd"),
            mode_state: format!("{base}/mode"),
            action: format!("{base}/action"),
            availability: format!("{base}/available"),
            temperature_command: format!("{base}/targetTempCmd"),
            temperature_state: format!("{base}/targetTemp"),
            current_temperature: format!("{base}/currentTemp"),
            component_id,
        }
    }

    /// The discovery descriptor published on [`config`](Self::config).
    #[must_use]
    pub fn discovery_descriptor(&self, zone: &Zone, settings: &ClimateSettings) -> serde_json::Value {
        let modes: Vec<&str> = ClimateMode::ALL.iter().map(|mode| mode.as_str()).collect();
        serde_json::json!({
            "name": zone.name,
            "unique_id": format!("{}-th", self.component_id),
            "mode_command_topic": self.mode_command,
            "mode_state_topic": self.mode_state,
            "action_topic": self.action,
            "availability_topic": self.availability,
            "payload_available": ONLINE,
            "payload_not_available": OFFLINE,
            "temperature_command_topic": self.temperature_command,
            "temperature_state_topic": self.temperature_state,
            "current_temperature_topic": self.current_temperature,
            "min_temp": settings.min_temp,
            "max_temp": settings.max_temp,
            "temp_step": settings.temp_step,
            "modes": modes,
            "device": {
                "manufacturer": "Smartish Home",
                "model": "Room Climate Control",
                "identifiers": [self.component_id],
                "name": "Room Climate Control",
            },
        })
    }
}
