//! Protocol session — authenticates, walks the bootstrap chain and turns
//! inbound frames into zone updates.
//!
//! Bootstrap runs strictly in order, each step triggered by the previous
//! step's response:
//!
//! ```text
//! auth_required → auth → auth_ok
//!   → area list → device list → entity list → get_states → subscribe_events
//! ```
//!
//! After that, every `state_changed` event is handed to the [`ZoneRegistry`].

mod correlator;
mod frame;
mod sequencer;

pub use correlator::Correlator;
pub use frame::{EventPayload, InboundFrame, RequestKind, STATE_CHANGED};
pub use sequencer::IdSequencer;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::watch;

use smartish_domain::climate::ClimateSettings;
use smartish_domain::device::Device;
use smartish_domain::entity::{EntityRegistration, EntityState};
use smartish_domain::error::SmartishError;
use smartish_domain::id::RequestId;
use smartish_domain::snapshot::Snapshot;
use smartish_domain::zone::Zone;

use crate::climate_controller::ControllerContext;
use crate::ports::{FrameSink, FrameSource, MessageBus};
use crate::zone_registry::ZoneRegistry;

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub access_token: String,
    /// How long one receive may block before the shutdown flag is checked again.
    pub recv_timeout: Duration,
    pub discovery_prefix: String,
    pub settings: Arc<ClimateSettings>,
}

/// One connection's worth of protocol state.
pub struct Session<S, B> {
    correlator: Correlator<S>,
    zones: ZoneRegistry<B, Correlator<S>>,
    access_token: String,
    recv_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<S: FrameSink, B: MessageBus> Session<S, B> {
    pub fn new(
        sink: S,
        bus: B,
        options: SessionOptions,
        restored: Snapshot,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let correlator = Correlator::new(sink);
        let context = ControllerContext {
            bus,
            caller: correlator.clone(),
            settings: options.settings,
            discovery_prefix: options.discovery_prefix,
            shutdown: shutdown.clone(),
        };
        Self {
            correlator,
            zones: ZoneRegistry::new(context, restored),
            access_token: options.access_token,
            recv_timeout: options.recv_timeout,
            shutdown,
        }
    }

    #[must_use]
    pub fn zones(&self) -> &ZoneRegistry<B, Correlator<S>> {
        &self.zones
    }

    /// Process frames from `source` until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns [`SmartishError::AuthRejected`] when the server refuses the
    /// token, [`SmartishError::ConnectionClosed`] when the source ends, and
    /// any transport error raised while sending.
    pub async fn run<R: FrameSource>(&mut self, source: &mut R) -> Result<(), SmartishError> {
        loop {
            if *self.shutdown.borrow() {
                tracing::info!("shutdown requested, leaving session loop");
                return Ok(());
            }
            let raw = match tokio::time::timeout(self.recv_timeout, source.recv()).await {
                Err(_elapsed) => continue,
                Ok(Ok(Some(raw))) => raw,
                Ok(Ok(None)) => return Err(SmartishError::ConnectionClosed),
                Ok(Err(err)) => return Err(err),
            };
            self.handle_frame(raw).await?;
        }
    }

    /// Shut every zone down and collect the state to persist.
    pub async fn shutdown(&self) -> Snapshot {
        self.zones.shutdown().await
    }

    async fn handle_frame(&mut self, raw: serde_json::Value) -> Result<(), SmartishError> {
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed frame");
                return Ok(());
            }
        };
        match frame {
            InboundFrame::AuthRequired => {
                tracing::debug!("authentication required");
                self.correlator.authenticate(&self.access_token).await?;
            }
            InboundFrame::AuthOk => {
                tracing::info!("authenticated");
                self.correlator
                    .send(RequestKind::AreaRegistryList, None)
                    .await?;
            }
            InboundFrame::AuthInvalid { message } => {
                return Err(SmartishError::AuthRejected(message.unwrap_or_default()));
            }
            InboundFrame::Result {
                id,
                success,
                result,
                error,
            } => {
                self.handle_result(id, success, result, error).await?;
            }
            InboundFrame::Event { id, event } => self.handle_event(id, &event).await,
            InboundFrame::Unsupported => tracing::debug!("ignoring unsupported frame"),
        }
        Ok(())
    }

    async fn handle_result(
        &mut self,
        id: RequestId,
        success: bool,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) -> Result<(), SmartishError> {
        let Some(kind) = self.correlator.lookup(id).await else {
            tracing::debug!(request_id = %id, "result for unknown request");
            return Ok(());
        };
        if !success {
            tracing::warn!(request_id = %id, %kind, error = ?error, "request failed");
        }
        if kind.is_subscription() {
            return Ok(());
        }
        self.correlator.retire(id).await;

        let result = result.unwrap_or(serde_json::Value::Null);
        match kind {
            RequestKind::AreaRegistryList => {
                let zones: Vec<Zone> = decode_list(result, kind);
                tracing::info!(count = zones.len(), "received zones");
                self.zones.set_zones(zones);
                self.correlator
                    .send(RequestKind::DeviceRegistryList, None)
                    .await?;
            }
            RequestKind::DeviceRegistryList => {
                let devices: Vec<Device> = decode_list(result, kind);
                tracing::info!(count = devices.len(), "received devices");
                self.zones.add_devices(&devices).await;
                self.correlator
                    .send(RequestKind::EntityRegistryList, None)
                    .await?;
            }
            RequestKind::EntityRegistryList => {
                let entities: Vec<EntityRegistration> = decode_list(result, kind);
                tracing::info!(count = entities.len(), "received entities");
                self.zones.add_entities(&entities).await;
                self.correlator.send(RequestKind::GetStates, None).await?;
            }
            RequestKind::GetStates => {
                let states: Vec<EntityState> = decode_list(result, kind);
                tracing::info!(count = states.len(), "received initial states");
                for state in &states {
                    self.zones.dispatch(state).await;
                }
                let mut payload = serde_json::Map::new();
                payload.insert(
                    "event_type".to_string(),
                    serde_json::Value::String(STATE_CHANGED.to_string()),
                );
                self.correlator
                    .send(RequestKind::SubscribeEvents, Some(payload))
                    .await?;
            }
            RequestKind::CallService | RequestKind::SubscribeEvents => {}
        }
        Ok(())
    }

    async fn handle_event(&self, id: RequestId, event: &EventPayload) {
        if self.correlator.lookup(id).await != Some(RequestKind::SubscribeEvents) {
            tracing::debug!(request_id = %id, "event for unknown subscription");
            return;
        }
        if event.event_type != STATE_CHANGED {
            return;
        }
        match event.new_state() {
            Ok(Some(state)) => {
                self.zones.dispatch(&state).await;
            }
            Ok(None) => tracing::debug!("entity removed, ignoring event"),
            Err(err) => tracing::warn!(error = %err, "dropping malformed state"),
        }
    }
}

/// Decode a list result item by item, skipping entries that do not fit.
fn decode_list<T: DeserializeOwned>(result: serde_json::Value, kind: RequestKind) -> Vec<T> {
    let serde_json::Value::Array(items) = result else {
        if !result.is_null() {
            tracing::warn!(%kind, "expected a list result");
        }
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(%kind, error = %err, "skipping undecodable entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingBus, RecordingSink, ScriptedSource};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn session(
        restored: Snapshot,
    ) -> (
        Session<RecordingSink, RecordingBus>,
        RecordingSink,
        RecordingBus,
        watch::Sender<bool>,
    ) {
        let sink = RecordingSink::default();
        let bus = RecordingBus::default();
        let (tx, rx) = watch::channel(false);
        let options = SessionOptions {
            access_token: "secret".to_string(),
            recv_timeout: Duration::from_secs(5),
            discovery_prefix: "ha".to_string(),
            settings: Arc::new(ClimateSettings::default()),
        };
        (
            Session::new(sink.clone(), bus.clone(), options, restored, rx),
            sink,
            bus,
            tx,
        )
    }

    fn ok(id: u64, result: serde_json::Value) -> serde_json::Value {
        json!({ "id": id, "type": "result", "success": true, "result": result })
    }

    fn state_changed(id: u64, state: serde_json::Value) -> serde_json::Value {
        json!({
            "id": id,
            "type": "event",
            "event": { "event_type": "state_changed", "data": { "new_state": state } }
        })
    }

    fn bootstrap_frames() -> Vec<serde_json::Value> {
        vec![
            json!({ "type": "auth_required" }),
            json!({ "type": "auth_ok" }),
            ok(1, json!([{ "area_id": "kitchen", "name": "Kitchen" }])),
            ok(
                2,
                json!([
                    { "id": "dev-t", "area_id": "kitchen" },
                    { "id": "dev-v", "area_id": "kitchen" },
                    { "id": "dev-x", "area_id": null }
                ]),
            ),
            ok(
                3,
                json!([
                    { "entity_id": "sensor.t", "device_id": "dev-t" },
                    { "entity_id": "climate.v", "device_id": "dev-v" }
                ]),
            ),
            ok(
                4,
                json!([{
                    "entity_id": "sensor.t",
                    "state": "19.0",
                    "attributes": { "device_class": "temperature" }
                }]),
            ),
            ok(5, serde_json::Value::Null),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn should_walk_bootstrap_chain_in_order() {
        let (mut session, sink, _, _tx) = session(Snapshot::default());
        let mut source = ScriptedSource::closing(bootstrap_frames());

        let result = session.run(&mut source).await;

        assert!(matches!(result, Err(SmartishError::ConnectionClosed)));
        let types: Vec<String> = sink
            .frames()
            .iter()
            .map(|frame| frame["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "auth",
                "config/area_registry/list",
                "config/device_registry/list",
                "config/entity_registry/list",
                "get_states",
                "subscribe_events",
            ]
        );
        assert_eq!(sink.frames()[0]["access_token"], "secret");
        assert_eq!(sink.frames()[5]["event_type"], "state_changed");
        assert_eq!(sink.frames()[5]["id"], 5);
        assert_eq!(session.correlator.pending_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_drive_controller_from_state_changed_events() {
        let mut restored = Snapshot::default();
        restored.rooms.insert(
            "kitchen".into(),
            smartish_domain::snapshot::ZoneSnapshot {
                climate: Some(smartish_domain::climate::ClimateSnapshot {
                    mode: smartish_domain::climate::ClimateMode::Heat,
                    target_temperature: 20.0,
                }),
            },
        );
        let (mut session, sink, bus, _tx) = session(restored);
        let mut frames = bootstrap_frames();
        frames.push(state_changed(
            5,
            json!({ "entity_id": "climate.v", "state": "heat", "attributes": { "temperature": 10.0 } }),
        ));
        frames.push(ok(6, serde_json::Value::Null));
        let mut source = ScriptedSource::closing(frames);

        let _ = session.run(&mut source).await;

        let calls = sink.frames_of_type("call_service");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["id"], 6);
        assert_eq!(calls[0]["service_data"]["entity_id"], "climate.v");
        assert_eq!(calls[0]["service_data"]["temperature"], 28.0);
        assert_eq!(
            bus.last_on("ha/climate/kitchen-sh-cc/currentTemp").as_deref(),
            Some("19.0")
        );
        // The call_service result retired its request; the subscription stays.
        assert_eq!(session.correlator.pending_count().await, 1);
    }

    /// Bus that takes time to publish and notices overlapping publishes.
    #[derive(Clone, Default)]
    struct SlowBus {
        inner: RecordingBus,
        in_flight: Arc<AtomicUsize>,
        overlapped: Arc<AtomicBool>,
    }

    impl MessageBus for SlowBus {
        async fn publish(&self, topic: &str, payload: String) -> Result<(), SmartishError> {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            let result = self.inner.publish(topic, payload).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn subscribe(
            &self,
            filter: &str,
        ) -> Result<crate::ports::Subscription, SmartishError> {
            self.inner.subscribe(filter).await
        }

        async fn unsubscribe(&self, filter: &str) -> Result<(), SmartishError> {
            self.inner.unsubscribe(filter).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_finish_one_event_before_starting_the_next() {
        let sink = RecordingSink::default();
        let bus = SlowBus::default();
        let (_tx, rx) = watch::channel(false);
        let options = SessionOptions {
            access_token: "secret".to_string(),
            recv_timeout: Duration::from_secs(5),
            discovery_prefix: "ha".to_string(),
            settings: Arc::new(ClimateSettings::default()),
        };
        let mut session = Session::new(sink.clone(), bus.clone(), options, Snapshot::default(), rx);
        let valve = |id: &str| {
            json!({ "entity_id": id, "state": "heat", "attributes": { "temperature": 10.0 } })
        };
        let mut source = ScriptedSource::closing(vec![
            json!({ "type": "auth_ok" }),
            ok(
                1,
                json!([
                    { "area_id": "kitchen", "name": "Kitchen" },
                    { "area_id": "hall", "name": "Hall" }
                ]),
            ),
            ok(
                2,
                json!([
                    { "id": "dev-kt", "area_id": "kitchen" },
                    { "id": "dev-kv", "area_id": "kitchen" },
                    { "id": "dev-ht", "area_id": "hall" },
                    { "id": "dev-hv", "area_id": "hall" }
                ]),
            ),
            ok(
                3,
                json!([
                    { "entity_id": "sensor.kitchen", "device_id": "dev-kt" },
                    { "entity_id": "climate.kitchen", "device_id": "dev-kv" },
                    { "entity_id": "sensor.hall", "device_id": "dev-ht" },
                    { "entity_id": "climate.hall", "device_id": "dev-hv" }
                ]),
            ),
            ok(
                4,
                json!([
                    { "entity_id": "sensor.kitchen", "state": "19.0", "attributes": { "device_class": "temperature" } },
                    { "entity_id": "sensor.hall", "state": "18.0", "attributes": { "device_class": "temperature" } }
                ]),
            ),
            ok(5, serde_json::Value::Null),
            state_changed(5, valve("climate.kitchen")),
            state_changed(5, valve("climate.hall")),
        ]);

        let _ = session.run(&mut source).await;

        assert!(!bus.overlapped.load(Ordering::SeqCst));
        let topics: Vec<String> = bus.inner.published().into_iter().map(|(t, _)| t).collect();
        let last_kitchen = topics
            .iter()
            .rposition(|t| t.starts_with("ha/climate/kitchen-sh-cc/"))
            .unwrap();
        let first_hall = topics
            .iter()
            .position(|t| t.starts_with("ha/climate/hall-sh-cc/"))
            .unwrap();
        assert!(last_kitchen < first_hall);

        let calls = sink.frames_of_type("call_service");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["service_data"]["entity_id"], "climate.kitchen");
        assert_eq!(calls[0]["id"], 6);
        assert_eq!(calls[1]["service_data"]["entity_id"], "climate.hall");
        assert_eq!(calls[1]["id"], 7);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fail_when_token_is_rejected() {
        let (mut session, _, _, _tx) = session(Snapshot::default());
        let mut source = ScriptedSource::closing(vec![
            json!({ "type": "auth_required" }),
            json!({ "type": "auth_invalid", "message": "bad token" }),
        ]);
        let result = session.run(&mut source).await;
        assert!(matches!(result, Err(SmartishError::AuthRejected(message)) if message == "bad token"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_drop_malformed_and_uncorrelated_frames() {
        let (mut session, sink, _, _tx) = session(Snapshot::default());
        let mut source = ScriptedSource::closing(vec![
            json!({ "no_type": true }),
            json!("just a string"),
            ok(42, json!([])),
            state_changed(43, json!({ "entity_id": "sensor.t", "state": "1" })),
            json!({ "type": "pong", "id": 7 }),
        ]);
        let result = session.run(&mut source).await;
        assert!(matches!(result, Err(SmartishError::ConnectionClosed)));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_removed_entities() {
        let (mut session, _, _, _tx) = session(Snapshot::default());
        let mut frames = bootstrap_frames();
        frames.push(state_changed(5, serde_json::Value::Null));
        let mut source = ScriptedSource::closing(frames);
        let result = session.run(&mut source).await;
        assert!(matches!(result, Err(SmartishError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_after_shutdown_is_requested_while_idle() {
        let (mut session, _, _, tx) = session(Snapshot::default());
        let mut source = ScriptedSource::idling(vec![]);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            let _ = tx.send(true);
        });

        let result = session.run(&mut source).await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn should_propagate_transport_failure() {
        let (mut session, sink, _, _tx) = session(Snapshot::default());
        sink.fail_sends(true);
        let mut source = ScriptedSource::closing(vec![json!({ "type": "auth_ok" })]);
        let result = session.run(&mut source).await;
        assert!(matches!(result, Err(SmartishError::Transport(_))));
    }
}
