//! State store port — loads and saves the per-zone snapshot.

use std::future::Future;

use smartish_domain::error::SmartishError;
use smartish_domain::snapshot::Snapshot;

/// Durable storage for the [`Snapshot`].
pub trait StateStore: Send + Sync {
    /// Load the last saved snapshot. A missing store yields an empty snapshot.
    fn load(&self) -> impl Future<Output = Result<Snapshot, SmartishError>> + Send;

    /// Replace the stored snapshot atomically.
    fn save(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), SmartishError>> + Send;
}

impl<T: StateStore> StateStore for std::sync::Arc<T> {
    fn load(&self) -> impl Future<Output = Result<Snapshot, SmartishError>> + Send {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), SmartishError>> + Send {
        (**self).save(snapshot)
    }
}
