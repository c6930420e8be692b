//! Zone registry — every zone of the installation and the fan-out that feeds
//! them entity state changes.

use std::sync::Arc;

use smartish_domain::device::Device;
use smartish_domain::entity::{EntityRegistration, EntityState};
use smartish_domain::id::ZoneId;
use smartish_domain::snapshot::Snapshot;
use smartish_domain::zone::Zone;

use crate::climate_controller::ControllerContext;
use crate::fanout::FanoutRegistry;
use crate::ports::{MessageBus, ServiceCaller};
use crate::zone_classifier::ZoneClassifier;

pub struct ZoneRegistry<B, C> {
    context: ControllerContext<B, C>,
    restored: Snapshot,
    zones: Vec<Arc<ZoneClassifier<B, C>>>,
    fanout: FanoutRegistry<ZoneClassifier<B, C>>,
}

impl<B: MessageBus, C: ServiceCaller> ZoneRegistry<B, C> {
    /// `restored` seeds the controllers created later on.
    pub fn new(context: ControllerContext<B, C>, restored: Snapshot) -> Self {
        Self {
            context,
            restored,
            zones: Vec::new(),
            fanout: FanoutRegistry::new(),
        }
    }

    /// Register the zones from the area registry. Zones already known are
    /// left as they are.
    pub fn set_zones(&mut self, zones: Vec<Zone>) {
        for zone in zones {
            if self.zone(&zone.id).is_some() {
                continue;
            }
            tracing::info!(zone = %zone.id, name = %zone.name, "adding zone");
            let restored = self.restored.climate(&zone.id);
            self.zones.push(Arc::new(ZoneClassifier::new(
                zone,
                self.context.clone(),
                restored,
            )));
        }
    }

    #[must_use]
    pub fn zone(&self, id: &ZoneId) -> Option<&Arc<ZoneClassifier<B, C>>> {
        self.zones.iter().find(|classifier| &classifier.zone().id == id)
    }

    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Hand the device registry to every zone.
    pub async fn add_devices(&self, devices: &[Device]) {
        for zone in &self.zones {
            zone.add_devices(devices).await;
        }
    }

    /// Hand the entity registry to every zone and subscribe each zone to the
    /// entities it kept.
    pub async fn add_entities(&mut self, registrations: &[EntityRegistration]) {
        for zone in &self.zones {
            for entity_id in zone.add_entities(registrations).await {
                self.fanout.subscribe(entity_id, zone);
            }
        }
    }

    /// Deliver a state to the zones interested in its entity.
    pub async fn dispatch(&self, state: &EntityState) -> usize {
        self.fanout.dispatch(state).await
    }

    /// Shut every zone down and collect the state to persist.
    ///
    /// Every known zone gets an entry. A zone that never created a controller
    /// keeps whatever was restored for it.
    pub async fn shutdown(&self) -> Snapshot {
        let mut snapshot = self.restored.clone();
        for zone in &self.zones {
            let entry = snapshot.rooms.entry(zone.zone().id.clone()).or_default();
            if let Some(climate) = zone.shutdown().await {
                entry.climate = Some(climate);
            }
        }
        snapshot
    }
}
