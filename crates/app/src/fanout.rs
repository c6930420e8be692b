//! Event fan-out registry — delivers entity state changes to subscribers.
//!
//! An ordered multimap from entity id to listener handles. Delivery is
//! sequential and awaited, so the caller does not see the next event until
//! every listener has finished with the current one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use smartish_domain::entity::EntityState;
use smartish_domain::error::SmartishError;
use smartish_domain::id::EntityId;

/// Something interested in state changes of particular entities.
pub trait StateListener: Send + Sync {
    /// Short label used in logs.
    fn label(&self) -> &str;

    /// Handle one new state.
    fn on_state_change(
        &self,
        state: &EntityState,
    ) -> impl Future<Output = Result<(), SmartishError>> + Send;
}

/// Entity id → listeners, in subscription order.
pub struct FanoutRegistry<L> {
    listeners: HashMap<EntityId, Vec<Arc<L>>>,
}

impl<L> Default for FanoutRegistry<L> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }
}

impl<L: StateListener> FanoutRegistry<L> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `listener` for `entity_id`. Adding the same listener twice is a
    /// no-op; returns whether it was newly added.
    pub fn subscribe(&mut self, entity_id: EntityId, listener: &Arc<L>) -> bool {
        let listeners = self.listeners.entry(entity_id).or_default();
        if listeners.iter().any(|known| Arc::ptr_eq(known, listener)) {
            return false;
        }
        listeners.push(Arc::clone(listener));
        true
    }

    /// Number of listeners subscribed to `entity_id`.
    #[must_use]
    pub fn listener_count(&self, entity_id: &EntityId) -> usize {
        self.listeners.get(entity_id).map_or(0, Vec::len)
    }

    /// Deliver `state` to every listener of its entity, in subscription
    /// order. A failing listener is logged and the rest still run.
    ///
    /// Returns how many listeners were invoked.
    pub async fn dispatch(&self, state: &EntityState) -> usize {
        let Some(listeners) = self.listeners.get(&state.entity_id) else {
            return 0;
        };
        let snapshot: Vec<Arc<L>> = listeners.clone();
        for listener in &snapshot {
            if let Err(err) = listener.on_state_change(state).await {
                tracing::warn!(
                    entity_id = %state.entity_id,
                    listener = listener.label(),
                    error = %err,
                    "state listener failed"
                );
            }
        }
        snapshot.len()
    }
}
