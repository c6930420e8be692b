//! # smartish-adapter-mqtt
//!
//! MQTT adapter — implements the [`MessageBus`] port on top of rumqttc.
//!
//! ## Responsibilities
//! - Connect to the broker and wait for its acknowledgement
//! - Publish thermostat state and discovery descriptors
//! - Route incoming publishes to the [`Subscription`] whose filter matches
//! - Re-subscribe after the event loop reconnects
//!
//! ## Dependency rule
//! Same as other adapters: depends on `smartish-app` and `smartish-domain`.

pub mod config;
pub mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{RwLock, mpsc, oneshot};

use smartish_app::ports::{BusMessage, MessageBus, Subscription};
use smartish_domain::error::SmartishError;

pub use config::MqttConfig;
pub use error::MqttError;

const REQUEST_CAPACITY: usize = 16;
const SUBSCRIPTION_CAPACITY: usize = 32;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Cheap to clone; clones share the broker connection.
#[derive(Clone)]
pub struct MqttBus {
    inner: Arc<Inner>,
}

struct Inner {
    client: AsyncClient,
    routes: RwLock<HashMap<String, mpsc::Sender<BusMessage>>>,
    connected: AtomicBool,
    closing: AtomicBool,
    host: String,
    port: u16,
}

impl MqttBus {
    /// Connect to the broker described by `config` and wait for it to
    /// acknowledge the session.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Connection`] when the first connection attempt
    /// fails and [`MqttError::Timeout`] when no acknowledgement arrives in time.
    pub async fn connect(config: &MqttConfig) -> Result<Self, MqttError> {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);
        if let Some((username, password)) = config.credentials() {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let bus = Self::from_client(client, &config.broker_host, config.broker_port);

        let (connack_tx, connack_rx) = oneshot::channel();
        tokio::spawn(handle_events(event_loop, bus.clone(), connack_tx));

        let timeout = config.connection_timeout();
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(host = %config.broker_host, port = config.broker_port, "connected to MQTT broker");
                Ok(bus)
            }
            Ok(Ok(Err(err))) => Err(MqttError::Connection(err)),
            Ok(Err(_)) | Err(_) => {
                bus.inner.closing.store(true, Ordering::Release);
                Err(MqttError::Timeout(timeout))
            }
        }
    }

    fn from_client(client: AsyncClient, host: &str, port: u16) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                routes: RwLock::new(HashMap::new()),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                host: host.to_string(),
                port,
            }),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.inner.routes.read().await.len()
    }

    /// Close the broker connection and drop every subscription.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::Client`] when the disconnect request cannot be
    /// queued.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        tracing::info!(host = %self.inner.host, port = self.inner.port, "disconnecting from MQTT broker");
        self.inner.closing.store(true, Ordering::Release);
        self.inner.routes.write().await.clear();
        self.inner
            .client
            .disconnect()
            .await
            .map_err(MqttError::Client)?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }

    /// Deliver an incoming publish to every subscription whose filter matches.
    /// Never blocks: a subscriber that is not keeping up loses the message.
    async fn route(&self, topic: &str, payload: &str) -> usize {
        let routes = self.inner.routes.read().await;
        let mut delivered = 0;
        for (filter, sender) in routes.iter() {
            if !rumqttc::matches(topic, filter) {
                continue;
            }
            let message = BusMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
            };
            match sender.try_send(message) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%topic, %filter, "subscriber lagging, dropping message");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(%topic, %filter, "subscriber gone");
                }
            }
        }
        delivered
    }

    /// Queue a subscribe for every known filter after a reconnect.
    ///
    /// Runs on the event-loop task, the only consumer of the request queue,
    /// so it must not wait for room in that queue.
    async fn resubscribe(&self) -> usize {
        let filters: Vec<String> = self.inner.routes.read().await.keys().cloned().collect();
        let mut queued = 0;
        for filter in filters {
            match self
                .inner
                .client
                .try_subscribe(filter.as_str(), QoS::AtLeastOnce)
            {
                Ok(()) => queued += 1,
                Err(err) => {
                    tracing::warn!(%filter, error = %err, "unable to restore subscription");
                }
            }
        }
        queued
    }
}

impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), SmartishError> {
        tracing::debug!(%topic, %payload, "publishing");
        self.inner
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| MqttError::Client(err).into_domain())
    }

    async fn subscribe(&self, filter: &str) -> Result<Subscription, SmartishError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.inner.routes.write().await.insert(filter.to_string(), tx);
        if let Err(err) = self
            .inner
            .client
            .subscribe(filter, QoS::AtLeastOnce)
            .await
        {
            self.inner.routes.write().await.remove(filter);
            return Err(MqttError::Client(err).into_domain());
        }
        tracing::debug!(%filter, "subscribed");
        Ok(Subscription::new(rx))
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), SmartishError> {
        self.inner.routes.write().await.remove(filter);
        self.inner
            .client
            .unsubscribe(filter)
            .await
            .map_err(|err| MqttError::Client(err).into_domain())?;
        tracing::debug!(%filter, "unsubscribed");
        Ok(())
    }
}

async fn handle_events(
    mut event_loop: EventLoop,
    bus: MqttBus,
    connack_tx: oneshot::Sender<Result<(), rumqttc::ConnectionError>>,
) {
    let mut connack_tx = Some(connack_tx);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                bus.inner.connected.store(true, Ordering::Release);
                match connack_tx.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    None => {
                        let queued = bus.resubscribe().await;
                        tracing::debug!(queued, "restoring subscriptions");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => {
                        tracing::debug!(topic = %publish.topic, %payload, "MQTT message received");
                        bus.route(&publish.topic, &payload).await;
                    }
                    Err(_) => {
                        tracing::debug!(topic = %publish.topic, "ignoring non UTF-8 payload");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                bus.inner.connected.store(false, Ordering::Release);
            }
            Ok(_) => {}
            Err(err) => {
                bus.inner.connected.store(false, Ordering::Release);
                if bus.inner.closing.load(Ordering::Acquire) {
                    tracing::debug!("MQTT event loop stopped");
                    break;
                }
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Err(err));
                    break;
                }
                tracing::error!(error = %err, "MQTT event loop error, reconnecting");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
