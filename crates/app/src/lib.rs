//! # smartish-app
//!
//! Application layer — use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `FrameSink` / `FrameSource` — the home-automation WebSocket transport
//!   - `MessageBus` — publish/subscribe towards the front end
//!   - `StateStore` — load & save the persisted snapshot
//!   - `ServiceCaller` — issue `call_service` requests
//! - Run the **protocol session**: authentication, the registry bootstrap
//!   chain and request/response correlation
//! - Classify each **zone**'s entities and create its **climate controller**
//!   once the zone has both temperature sensors and climate actuators
//!
//! ## Dependency rule
//! Depends on `smartish-domain` only (plus `tokio` for locks, timers and
//! tasks). Never imports adapter crates. Adapters depend on *this* crate, not
//! the reverse.

pub mod climate_controller;
pub mod fanout;
pub mod ports;
pub mod session;
pub mod zone_classifier;
pub mod zone_registry;

#[cfg(test)]
pub(crate) mod test_support;
