//! Zone — a physical area (room) grouping devices and entities.

use serde::{Deserialize, Serialize};

use crate::id::ZoneId;

/// An area as listed by the area registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(rename = "area_id")]
    pub id: ZoneId,
    pub name: String,
}

impl Zone {
    #[must_use]
    pub fn new(id: impl Into<ZoneId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
