//! Entity — an individually addressable sensor or actuator.
//!
//! Entities arrive twice: once as an [`EntityRegistration`] from the entity
//! registry, then repeatedly as [`EntityState`] objects. The first state seen
//! fixes the entity's [`Classification`]; later states never change it.

mod state;

pub use state::{EntityState, Reading, UNKNOWN};

use serde::{Deserialize, Serialize};

use crate::id::{DeviceId, EntityId};

/// Unit the `sensor` domain must report to count as a temperature sensor.
pub const CELSIUS: &str = "°C";

/// An entity registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegistration {
    pub entity_id: EntityId,
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub disabled_by: Option<String>,
}

impl EntityRegistration {
    /// Whether the entity has been disabled by a user or integration.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled_by.is_some()
    }
}

/// Inferred semantic category of an entity (e.g. `temperature`, `climate`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceClass(String);

impl DeviceClass {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Which climate-control bucket, if any, this class falls into.
    #[must_use]
    pub fn bucket(&self) -> Option<Bucket> {
        match self.0.as_str() {
            "temperature" => Some(Bucket::TemperatureSensor),
            "climate" => Some(Bucket::ClimateActuator),
            _ => None,
        }
    }

    /// Infer the class of an entity from its first observed state.
    ///
    /// Prefers an explicit `device_class` attribute, otherwise uses the
    /// entity-id domain; a `sensor` reporting degrees Celsius is refined to
    /// `temperature`.
    #[must_use]
    pub fn infer(state: &EntityState) -> Self {
        if let Some(explicit) = state.attribute_str("device_class") {
            return Self::new(explicit);
        }
        let domain = state.entity_id.domain();
        if domain == "sensor" && state.attribute_str("unit_of_measurement") == Some(CELSIUS) {
            return Self::new("temperature");
        }
        Self::new(domain)
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two entity roles the climate controller consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    TemperatureSensor,
    ClimateActuator,
}

/// One-way classification state: once classified, never reclassified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Classification {
    #[default]
    Unclassified,
    Classified(DeviceClass),
}

impl Classification {
    /// The device class, if classified.
    #[must_use]
    pub fn device_class(&self) -> Option<&DeviceClass> {
        match self {
            Self::Unclassified => None,
            Self::Classified(class) => Some(class),
        }
    }
}

/// An entity tracked by a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub registration: EntityRegistration,
    pub classification: Classification,
    pub last_state: Option<EntityState>,
}

impl Entity {
    #[must_use]
    pub fn new(registration: EntityRegistration) -> Self {
        Self {
            registration,
            classification: Classification::Unclassified,
            last_state: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.registration.entity_id
    }

    /// Display name, falling back to the entity id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.registration
            .name
            .as_deref()
            .unwrap_or(self.registration.entity_id.as_str())
    }

    /// Replace the registry data, keeping classification and last state.
    pub fn merge(&mut self, registration: EntityRegistration) {
        self.registration = registration;
    }

    /// Record a new state. Classifies the entity if this is the first state
    /// it has seen and returns `true` when that happened.
    pub fn observe(&mut self, state: EntityState) -> bool {
        let newly_classified = match self.classification {
            Classification::Unclassified => {
                self.classification = Classification::Classified(DeviceClass::infer(&state));
                true
            }
            Classification::Classified(_) => false,
        };
        self.last_state = Some(state);
        newly_classified
    }

    /// The climate-control bucket this entity belongs to, if any.
    #[must_use]
    pub fn bucket(&self) -> Option<Bucket> {
        self.classification.device_class().and_then(DeviceClass::bucket)
    }
}
