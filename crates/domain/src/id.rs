//! Typed identifier newtypes.
//!
//! Zone, device and entity identifiers are opaque strings minted by the
//! home-automation registries. Request identifiers are local integers issued
//! by the session's sequencer.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[doc = $doc:expr])* $name:ident) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a registry-issued identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Identifier of a [`Zone`](crate::zone::Zone) (`area_id` on the wire).
    ZoneId
);

define_id!(
    /// Identifier of a [`Device`](crate::device::Device).
    DeviceId
);

define_id!(
    /// Identifier of an [`Entity`](crate::entity::Entity), e.g. `sensor.kitchen_temperature`.
    EntityId
);

impl EntityId {
    /// The domain prefix before the first `.`, e.g. `sensor` for
    /// `sensor.kitchen_temperature`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

/// Correlation identifier for an outbound protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw request number.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Access the raw request number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_extract_domain_prefix_from_entity_id() {
        let id = EntityId::new("sensor.kitchen_temperature");
        assert_eq!(id.domain(), "sensor");
    }

    #[test]
    fn should_return_whole_id_as_domain_when_no_separator() {
        let id = EntityId::new("thermostat");
        assert_eq!(id.domain(), "thermostat");
    }

    #[test]
    fn should_serialize_as_plain_string() {
        let id = ZoneId::new("living_room");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"living_room\"");
    }

    #[test]
    fn should_serialize_request_id_as_number() {
        let id = RequestId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(id.to_string(), "42");
    }
}
