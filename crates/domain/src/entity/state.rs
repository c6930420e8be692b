//! Entity state — the latest value and attributes reported for an entity.

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Sentinel value meaning "no usable reading right now".
pub const UNKNOWN: &str = "unknown";

/// A state object as delivered by `get_states` or a `state_changed` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    #[serde(rename = "state")]
    pub value: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A numeric reading extracted from a state value or attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A finite number.
    Value(f64),
    /// The explicit [`UNKNOWN`] sentinel.
    Unknown,
    /// Missing, `null`, or not a finite number.
    Unusable,
}

impl Reading {
    fn parse(raw: &str) -> Self {
        if raw == UNKNOWN {
            return Self::Unknown;
        }
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Value(value),
            _ => Self::Unusable,
        }
    }

    fn from_attribute(raw: Option<&serde_json::Value>) -> Self {
        match raw {
            Some(serde_json::Value::Number(n)) => match n.as_f64() {
                Some(value) if value.is_finite() => Self::Value(value),
                _ => Self::Unusable,
            },
            Some(serde_json::Value::String(s)) => Self::parse(s),
            _ => Self::Unusable,
        }
    }

    /// The number, if there is one.
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(value),
            Self::Unknown | Self::Unusable => None,
        }
    }
}

impl EntityState {
    #[must_use]
    pub fn new(entity_id: impl Into<EntityId>, value: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            value: value.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Builder-style attribute setter, mostly useful in tests.
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Whether the value is the [`UNKNOWN`] sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.value == UNKNOWN
    }

    /// String attribute lookup.
    #[must_use]
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }

    /// The state value read as a number.
    #[must_use]
    pub fn reading(&self) -> Reading {
        Reading::parse(&self.value)
    }

    /// The `temperature` attribute read as a number (the setpoint a climate
    /// actuator reports).
    #[must_use]
    pub fn temperature_attribute(&self) -> Reading {
        Reading::from_attribute(self.attributes.get("temperature"))
    }
}
