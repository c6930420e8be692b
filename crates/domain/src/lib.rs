//! # smartish-domain
//!
//! Pure domain model for the smartish climate bridge.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers and error conventions
//! - Define **Zones** (areas reported by the home-automation registry)
//! - Define **Devices** and **Entities** as delivered by the registries
//! - Define **Entity state** and the sticky **classification** of entities
//! - Define the **climate control** math (averaging, hysteresis, actions)
//! - Define the **snapshot** shape persisted across restarts
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod climate;
pub mod device;
pub mod entity;
pub mod snapshot;
pub mod zone;
