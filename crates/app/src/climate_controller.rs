//! Climate controller — one virtual thermostat per zone.
//!
//! The controller announces itself on the message bus, listens for mode and
//! setpoint commands, and on every recompute publishes its reported state and
//! drives the zone's actuators through the [`ServiceCaller`].
//!
//! All mutation happens under one async lock, so a command handler and a
//! state-triggered recompute never interleave.

pub mod topics;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use smartish_domain::climate::{
    ClimateMode, ClimateSettings, ClimateSnapshot, Decision, evaluate, format_temperature,
    parse_setpoint, same_output,
};
use smartish_domain::entity::{EntityState, Reading};
use smartish_domain::error::SmartishError;
use smartish_domain::id::EntityId;
use smartish_domain::zone::Zone;

use crate::ports::{MessageBus, ServiceCall, ServiceCaller, Subscription};
use topics::{OFFLINE, ONLINE, Topics};

/// Placeholder published on the current-temperature topic while offline.
const UNKNOWN_TEMPERATURE: &str = "unknown";

/// Collaborators and tunables shared by every controller.
#[derive(Clone)]
pub struct ControllerContext<B, C> {
    pub bus: B,
    pub caller: C,
    pub settings: Arc<ClimateSettings>,
    pub discovery_prefix: String,
    /// Flips to `true` when the process is shutting down.
    pub shutdown: watch::Receiver<bool>,
}

struct ControlState {
    mode: ClimateMode,
    target_temperature: f64,
    sensors: BTreeMap<EntityId, EntityState>,
    actuators: BTreeMap<EntityId, EntityState>,
    /// Last output successfully handed to the transport, per actuator.
    commanded: BTreeMap<EntityId, f64>,
    connected: bool,
    shut_down: bool,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Mode,
    Setpoint,
}

/// The virtual thermostat of one zone.
pub struct ClimateController<B, C> {
    zone: Zone,
    topics: Topics,
    context: ControllerContext<B, C>,
    state: Mutex<ControlState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: MessageBus, C: ServiceCaller> ClimateController<B, C> {
    /// Create a controller, restoring mode and setpoint from `restored` when
    /// present. Nothing is published until [`connect`](Self::connect).
    pub fn new(
        zone: Zone,
        context: ControllerContext<B, C>,
        restored: Option<ClimateSnapshot>,
    ) -> Arc<Self> {
        let (mode, target_temperature) = match restored {
            Some(snapshot) => (snapshot.mode, snapshot.target_temperature),
            None => (ClimateMode::Off, context.settings.min_temp),
        };
        tracing::info!(zone = %zone.id, %mode, target_temperature, "creating climate controller");
        Arc::new(Self {
            topics: Topics::new(&context.discovery_prefix, &zone),
            zone,
            context,
            state: Mutex::new(ControlState {
                mode,
                target_temperature,
                sensors: BTreeMap::new(),
                actuators: BTreeMap::new(),
                commanded: BTreeMap::new(),
                connected: false,
                shut_down: false,
            }),
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    #[must_use]
    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Announce the thermostat, start listening for commands and schedule the
    /// first recompute. Calling it again once connected is a no-op; after a
    /// failed subscription it tries again.
    ///
    /// # Errors
    ///
    /// Returns the bus error if a command topic cannot be subscribed.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SmartishError> {
        {
            let mut state = self.state.lock().await;
            if state.connected || state.shut_down {
                return Ok(());
            }
            state.connected = true;
        }

        let descriptor = self
            .topics
            .discovery_descriptor(&self.zone, &self.context.settings);
        self.publish(&self.topics.config, descriptor.to_string())
            .await;
        self.publish(&self.topics.availability, OFFLINE.to_string())
            .await;

        let (mode_commands, setpoint_commands) = match self.subscribe_commands().await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                self.state.lock().await.connected = false;
                tracing::warn!(zone = %self.zone.id, error = %err, "unable to subscribe command topics");
                return Err(err);
            }
        };

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(listen(
            Arc::downgrade(self),
            mode_commands,
            Command::Mode,
            self.context.shutdown.clone(),
        )));
        tasks.push(tokio::spawn(listen(
            Arc::downgrade(self),
            setpoint_commands,
            Command::Setpoint,
            self.context.shutdown.clone(),
        )));
        tasks.push(tokio::spawn(deferred_recompute(
            Arc::downgrade(self),
            self.context.settings.initial_recompute_delay,
            self.context.shutdown.clone(),
        )));
        tracing::debug!(zone = %self.zone.id, "climate controller connected");
        Ok(())
    }

    async fn subscribe_commands(&self) -> Result<(Subscription, Subscription), SmartishError> {
        let bus = &self.context.bus;
        let mode_commands = bus.subscribe(&self.topics.mode_command).await?;
        match bus.subscribe(&self.topics.temperature_command).await {
            Ok(setpoint_commands) => Ok((mode_commands, setpoint_commands)),
            Err(err) => {
                if let Err(unsub) = bus.unsubscribe(&self.topics.mode_command).await {
                    tracing::debug!(zone = %self.zone.id, error = %unsub, "unable to release mode command topic");
                }
                Err(err)
            }
        }
    }

    /// Replace the cached states of the given entities, then recompute.
    pub async fn update_entities(&self, sensors: Vec<EntityState>, actuators: Vec<EntityState>) {
        let mut state = self.state.lock().await;
        for sensor in sensors {
            state.sensors.insert(sensor.entity_id.clone(), sensor);
        }
        for actuator in actuators {
            state.actuators.insert(actuator.entity_id.clone(), actuator);
        }
        self.recompute_locked(&mut state).await;
    }

    /// Handle a payload from the mode command topic.
    ///
    /// # Errors
    ///
    /// Returns a validation error for anything but `heat` or `off`; the state
    /// is left untouched in that case.
    pub async fn handle_mode_command(&self, payload: &str) -> Result<(), SmartishError> {
        let mode: ClimateMode = payload.parse()?;
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Ok(());
        }
        state.mode = mode;
        self.recompute_locked(&mut state).await;
        Ok(())
    }

    /// Handle a payload from the setpoint command topic.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless the payload is a finite number.
    pub async fn handle_setpoint_command(&self, payload: &str) -> Result<(), SmartishError> {
        let target = parse_setpoint(payload)?;
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Ok(());
        }
        state.target_temperature = target;
        self.recompute_locked(&mut state).await;
        Ok(())
    }

    /// Re-evaluate the zone and publish/command accordingly.
    pub async fn recompute(&self) {
        let mut state = self.state.lock().await;
        self.recompute_locked(&mut state).await;
    }

    /// Current mode and setpoint.
    pub async fn snapshot(&self) -> ClimateSnapshot {
        let state = self.state.lock().await;
        ClimateSnapshot {
            mode: state.mode,
            target_temperature: state.target_temperature,
        }
    }

    /// Last output commanded to `actuator`, if any.
    pub async fn commanded_output(&self, actuator: &EntityId) -> Option<f64> {
        self.state.lock().await.commanded.get(actuator).copied()
    }

    /// Stop listening, retract the discovery descriptor and return the state
    /// to persist. Later commands and recomputes are ignored.
    pub async fn shutdown(&self) -> ClimateSnapshot {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let mut state = self.state.lock().await;
        let snapshot = ClimateSnapshot {
            mode: state.mode,
            target_temperature: state.target_temperature,
        };
        if state.shut_down {
            return snapshot;
        }
        state.shut_down = true;
        if state.connected {
            self.publish(&self.topics.config, String::new()).await;
            for filter in [&self.topics.mode_command, &self.topics.temperature_command] {
                if let Err(err) = self.context.bus.unsubscribe(filter).await {
                    tracing::warn!(topic = %filter, error = %err, "unable to unsubscribe");
                }
            }
        }
        tracing::info!(zone = %self.zone.id, mode = %snapshot.mode, "climate controller stopped");
        snapshot
    }

    async fn recompute_locked(&self, state: &mut ControlState) {
        if state.shut_down {
            return;
        }
        let sensors = usable_readings(state.sensors.values(), EntityState::reading);
        let actuators = usable_readings(state.actuators.values(), EntityState::temperature_attribute);
        let decision = evaluate(
            state.mode,
            state.target_temperature,
            &sensors,
            &actuators,
            &self.context.settings,
        );

        let Decision::Online {
            current_temperature,
            action,
            desired_output,
        } = decision
        else {
            tracing::debug!(zone = %self.zone.id, "readings incomplete, reporting offline");
            self.publish(&self.topics.availability, OFFLINE.to_string())
                .await;
            self.publish(
                &self.topics.current_temperature,
                UNKNOWN_TEMPERATURE.to_string(),
            )
            .await;
            return;
        };

        self.publish(&self.topics.availability, ONLINE.to_string())
            .await;
        self.publish(
            &self.topics.current_temperature,
            format_temperature(current_temperature),
        )
        .await;
        self.publish(
            &self.topics.temperature_state,
            format_temperature(state.target_temperature),
        )
        .await;
        self.publish(&self.topics.mode_state, state.mode.to_string())
            .await;
        self.publish(&self.topics.action, action.as_str().to_string())
            .await;

        for actuator in state.actuators.keys() {
            if state
                .commanded
                .get(actuator)
                .is_some_and(|last| same_output(*last, desired_output))
            {
                continue;
            }
            let call = ServiceCall::set_temperature(actuator, desired_output);
            match self.context.caller.call_service(call).await {
                Ok(request_id) => {
                    tracing::debug!(
                        zone = %self.zone.id,
                        %actuator,
                        %request_id,
                        output = desired_output,
                        "commanded actuator"
                    );
                    state.commanded.insert(actuator.clone(), desired_output);
                }
                Err(err) => {
                    tracing::warn!(zone = %self.zone.id, %actuator, error = %err, "unable to command actuator");
                }
            }
        }
    }

    async fn publish(&self, topic: &str, payload: String) {
        if let Err(err) = self.context.bus.publish(topic, payload).await {
            tracing::warn!(%topic, error = %err, "unable to publish");
        }
    }
}

fn usable_readings<'a>(
    states: impl Iterator<Item = &'a EntityState>,
    read: fn(&EntityState) -> Reading,
) -> Vec<f64> {
    states
        .filter_map(|state| match read(state) {
            Reading::Value(value) => Some(value),
            Reading::Unknown => None,
            Reading::Unusable => {
                tracing::debug!(entity_id = %state.entity_id, value = %state.value, "ignoring non-numeric reading");
                None
            }
        })
        .collect()
}

/// Resolves once shutdown is requested or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn listen<B: MessageBus, C: ServiceCaller>(
    controller: Weak<ClimateController<B, C>>,
    mut subscription: Subscription,
    command: Command,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let message = tokio::select! {
            () = shutdown_requested(&mut shutdown) => break,
            message = subscription.recv() => message,
        };
        let Some(message) = message else { break };
        let Some(controller) = controller.upgrade() else {
            break;
        };
        let result = match command {
            Command::Mode => controller.handle_mode_command(&message.payload).await,
            Command::Setpoint => controller.handle_setpoint_command(&message.payload).await,
        };
        if let Err(err) = result {
            tracing::warn!(topic = %message.topic, error = %err, "ignoring command");
        }
    }
}

async fn deferred_recompute<B: MessageBus, C: ServiceCaller>(
    controller: Weak<ClimateController<B, C>>,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        () = tokio::time::sleep(delay) => {}
        () = shutdown_requested(&mut shutdown) => return,
    }
    if let Some(controller) = controller.upgrade() {
        controller.recompute().await;
    }
}
