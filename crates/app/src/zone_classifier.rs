//! Zone classifier — owns one zone's devices and entities and decides when
//! the zone has what a climate controller needs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use smartish_domain::climate::ClimateSnapshot;
use smartish_domain::device::Device;
use smartish_domain::entity::{Bucket, Entity, EntityRegistration, EntityState};
use smartish_domain::error::SmartishError;
use smartish_domain::id::{DeviceId, EntityId};
use smartish_domain::zone::Zone;

use crate::climate_controller::{ClimateController, ControllerContext};
use crate::fanout::StateListener;
use crate::ports::{MessageBus, ServiceCaller};

struct ZoneState<B, C> {
    devices: BTreeMap<DeviceId, Device>,
    entities: BTreeMap<EntityId, Entity>,
    controller: Option<Arc<ClimateController<B, C>>>,
    shut_down: bool,
}

impl<B, C> ZoneState<B, C> {
    /// Latest states of the classified entities, split by bucket.
    fn bucketed_states(&self) -> (Vec<EntityState>, Vec<EntityState>) {
        let mut sensors = Vec::new();
        let mut actuators = Vec::new();
        for entity in self.entities.values() {
            let Some(state) = entity.last_state.clone() else {
                continue;
            };
            match entity.bucket() {
                Some(Bucket::TemperatureSensor) => sensors.push(state),
                Some(Bucket::ClimateActuator) => actuators.push(state),
                None => {}
            }
        }
        (sensors, actuators)
    }
}

/// Tracks one zone and lazily creates its climate controller.
pub struct ZoneClassifier<B, C> {
    zone: Zone,
    context: ControllerContext<B, C>,
    restored: Option<ClimateSnapshot>,
    state: Mutex<ZoneState<B, C>>,
}

impl<B: MessageBus, C: ServiceCaller> ZoneClassifier<B, C> {
    pub fn new(
        zone: Zone,
        context: ControllerContext<B, C>,
        restored: Option<ClimateSnapshot>,
    ) -> Self {
        Self {
            zone,
            context,
            restored,
            state: Mutex::new(ZoneState {
                devices: BTreeMap::new(),
                entities: BTreeMap::new(),
                controller: None,
                shut_down: false,
            }),
        }
    }

    #[must_use]
    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    /// Keep the devices assigned to this zone, merging re-delivered ones.
    /// Returns how many devices matched.
    pub async fn add_devices(&self, devices: &[Device]) -> usize {
        let mut state = self.state.lock().await;
        let mut matched = 0;
        for device in devices.iter().filter(|d| d.belongs_to(&self.zone.id)) {
            matched += 1;
            match state.devices.get_mut(&device.id) {
                Some(known) => known.merge(device.clone()),
                None => {
                    tracing::debug!(zone = %self.zone.id, device = device.display_name(), "adding device");
                    state.devices.insert(device.id.clone(), device.clone());
                }
            }
        }
        matched
    }

    /// Keep the enabled entities whose device belongs to this zone, merging
    /// re-delivered ones. Returns the ids of every entity kept.
    pub async fn add_entities(&self, registrations: &[EntityRegistration]) -> Vec<EntityId> {
        let mut state = self.state.lock().await;
        let mut kept = Vec::new();
        for registration in registrations {
            let Some(device_id) = registration.device_id.as_ref() else {
                continue;
            };
            if !state.devices.contains_key(device_id) || registration.is_disabled() {
                continue;
            }
            let entity_id = registration.entity_id.clone();
            match state.entities.get_mut(&entity_id) {
                Some(known) => known.merge(registration.clone()),
                None => {
                    tracing::debug!(zone = %self.zone.id, %entity_id, "tracking entity");
                    state
                        .entities
                        .insert(entity_id.clone(), Entity::new(registration.clone()));
                }
            }
            kept.push(entity_id);
        }
        kept
    }

    /// The controller, once one has been created.
    pub async fn controller(&self) -> Option<Arc<ClimateController<B, C>>> {
        self.state.lock().await.controller.clone()
    }

    /// Shut the controller down, if any, and return its state to persist.
    pub async fn shutdown(&self) -> Option<ClimateSnapshot> {
        let controller = {
            let mut state = self.state.lock().await;
            state.shut_down = true;
            state.controller.take()
        };
        match controller {
            Some(controller) => Some(controller.shutdown().await),
            None => None,
        }
    }
}

impl<B: MessageBus, C: ServiceCaller> StateListener for ZoneClassifier<B, C> {
    fn label(&self) -> &str {
        self.zone.id.as_str()
    }

    async fn on_state_change(&self, new_state: &EntityState) -> Result<(), SmartishError> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Ok(());
        }
        let Some(entity) = state.entities.get_mut(&new_state.entity_id) else {
            return Ok(());
        };
        if entity.observe(new_state.clone()) {
            tracing::debug!(
                zone = %self.zone.id,
                entity_id = %new_state.entity_id,
                device_class = entity.classification.device_class().map(|class| class.as_str()),
                "classified entity"
            );
        }
        if entity.bucket().is_none() {
            return Ok(());
        }

        let (sensors, actuators) = state.bucketed_states();
        if sensors.is_empty() || actuators.is_empty() {
            return Ok(());
        }

        let controller = Arc::clone(state.controller.get_or_insert_with(|| {
            ClimateController::new(self.zone.clone(), self.context.clone(), self.restored)
        }));
        // No-op once connected; retries a connect whose subscriptions failed.
        controller.connect().await?;
        controller.update_entities(sensors, actuators).await;
        Ok(())
    }
}
