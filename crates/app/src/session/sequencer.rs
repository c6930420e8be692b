//! Identifier sequencer — monotonically increasing request ids.

use std::sync::atomic::{AtomicU64, Ordering};

use smartish_domain::id::RequestId;

/// Issues request ids starting at 1. Safe to share between tasks.
#[derive(Debug)]
pub struct IdSequencer {
    next: AtomicU64,
}

impl Default for IdSequencer {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdSequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next id.
    pub fn next_id(&self) -> RequestId {
        RequestId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
