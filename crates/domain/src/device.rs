//! Device — a physical thing exposing one or more entities.
//!
//! Only the fields the bridge reasons about are typed; everything else the
//! device registry reports is kept verbatim in [`Device::metadata`].

use serde::{Deserialize, Serialize};

use crate::id::{DeviceId, ZoneId};

/// A device registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub area_id: Option<ZoneId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Device {
    /// Whether this device is assigned to `zone`.
    #[must_use]
    pub fn belongs_to(&self, zone: &ZoneId) -> bool {
        self.area_id.as_ref() == Some(zone)
    }

    /// Merge a re-delivered registry entry into this one, in place.
    ///
    /// Later values win; merging identical data is a no-op.
    pub fn merge(&mut self, other: Device) {
        self.area_id = other.area_id;
        self.name = other.name;
        self.metadata.extend(other.metadata);
    }

    /// Display name, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(json: serde_json::Value) -> Device {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn should_keep_untyped_fields_as_metadata() {
        let dev = device(serde_json::json!({
            "id": "dev-1",
            "area_id": "kitchen",
            "name": "Radiator valve",
            "manufacturer": "Acme",
            "model": "TRV-2"
        }));
        assert_eq!(dev.metadata["manufacturer"], "Acme");
        assert!(dev.belongs_to(&ZoneId::new("kitchen")));
    }

    #[test]
    fn should_not_belong_to_any_zone_when_area_is_null() {
        let dev = device(serde_json::json!({ "id": "dev-1", "area_id": null }));
        assert!(!dev.belongs_to(&ZoneId::new("kitchen")));
    }

    #[test]
    fn should_be_unchanged_when_merging_identical_entry() {
        let json = serde_json::json!({
            "id": "dev-1",
            "area_id": "kitchen",
            "name": "Valve",
            "sw_version": "1.2"
        });
        let mut dev = device(json.clone());
        dev.merge(device(json.clone()));
        assert_eq!(dev, device(json));
    }

    #[test]
    fn should_update_fields_in_place_when_merging() {
        let mut dev = device(serde_json::json!({
            "id": "dev-1",
            "area_id": "kitchen",
            "name": "Valve",
            "sw_version": "1.2"
        }));
        dev.merge(device(serde_json::json!({
            "id": "dev-1",
            "area_id": "kitchen",
            "name": "Kitchen valve",
            "sw_version": "1.3"
        })));
        assert_eq!(dev.display_name(), "Kitchen valve");
        assert_eq!(dev.metadata["sw_version"], "1.3");
    }
}
