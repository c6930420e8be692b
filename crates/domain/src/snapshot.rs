//! Snapshot — per-zone control state persisted across restarts.
//!
//! Wire shape: `{"rooms": {"<zone id>": {"climate": {"mode": "heat", "target_temperature": 21.5}}}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::climate::ClimateSnapshot;
use crate::id::ZoneId;

/// Everything written to the state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub rooms: BTreeMap<ZoneId, ZoneSnapshot>,
}

/// Persisted state of one zone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climate: Option<ClimateSnapshot>,
}

impl Snapshot {
    /// The persisted climate state for `zone`, if any.
    #[must_use]
    pub fn climate(&self, zone: &ZoneId) -> Option<ClimateSnapshot> {
        self.rooms.get(zone).and_then(|room| room.climate)
    }
}
