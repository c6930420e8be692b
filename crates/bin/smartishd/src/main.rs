//! # smartishd — smartish climate bridge daemon
//!
//! Composition root that wires the adapters together and runs the session.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize logging
//! - Load the persisted snapshot
//! - Connect the MQTT bus and the Home Assistant WebSocket
//! - Run the protocol session until SIGINT/SIGTERM or a fatal error
//! - Shut controllers down, save the snapshot and disconnect
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! Adapters are built and handed to the session here; control logic lives in `smartish-app`.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use smartish_adapter_mqtt::MqttBus;
use smartish_adapter_storage_json::JsonStateStore;
use smartish_app::ports::StateStore;
use smartish_app::session::{Session, SessionOptions};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("unable to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.logging.filter)
                .unwrap_or_else(|_| EnvFilter::new("smartishd=info,smartish=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting smartishd");

    let store = JsonStateStore::new(&config.state.path);
    let restored = store.load().await?;

    let bus = MqttBus::connect(&config.mqtt)
        .await
        .context("unable to connect to the MQTT broker")?;
    let (sink, mut source) = smartish_adapter_hass_ws::connect(&config.home_assistant.url)
        .await
        .context("unable to connect to Home Assistant")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let options = SessionOptions {
        access_token: config.home_assistant.token.clone(),
        recv_timeout: config.home_assistant.recv_timeout(),
        discovery_prefix: config.mqtt.discovery_prefix.clone(),
        settings: Arc::new(config.climate.settings()),
    };
    let mut session = Session::new(sink.clone(), bus.clone(), options, restored, shutdown_rx);

    let outcome = session.run(&mut source).await;
    if let Err(err) = &outcome {
        tracing::error!(error = %err, "session ended");
    }

    let snapshot = session.shutdown().await;
    if let Err(err) = store.save(&snapshot).await {
        tracing::error!(error = %err, "unable to save state");
    }
    if let Err(err) = sink.close().await {
        tracing::debug!(error = %err, "WebSocket already closed");
    }
    if let Err(err) = bus.disconnect().await {
        tracing::warn!(error = %err, "unable to disconnect from the MQTT broker");
    }

    tracing::info!("smartishd stopped");
    outcome.map_err(Into::into)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(err) => tracing::warn!(error = %err, "unable to listen for SIGTERM"),
        }
    }
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "unable to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
