// ── Update aggregator ──
//
// Owns the aggregate state for the active device. Every mutation goes
// through `watch::Sender::send_if_modified`, so a fold is atomic with
// respect to readers and subscribers wake only on real changes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

use super::aggregate::{AggregateState, DEFAULT_HISTORY_CAPACITY};
use crate::model::NormalizedDeviceUpdate;
use crate::stream::StateStream;

/// Bounded in-memory fold of the live update feed.
pub struct UpdateAggregator {
    state: watch::Sender<Arc<AggregateState>>,
    capacity: usize,
}

impl UpdateAggregator {
    pub fn new(capacity: usize) -> Self {
        let (state, _) = watch::channel(Arc::new(AggregateState::default()));
        Self {
            state,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Apply one update in delivery order. Returns `false` for a re-delivery
    /// that changed nothing.
    pub fn apply(&self, update: NormalizedDeviceUpdate) -> bool {
        let id = update.id.clone();
        let applied = self
            .state
            .send_if_modified(|state| Arc::make_mut(state).apply(update, self.capacity));
        if !applied {
            trace!(update_id = %id, "duplicate update ignored");
        }
        applied
    }

    pub fn snapshot(&self) -> Arc<AggregateState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> StateStream<Arc<AggregateState>> {
        StateStream::new(self.state.subscribe())
    }

    /// Discard everything. Subscribers observe one empty state.
    pub fn reset(&self) {
        self.state.send_replace(Arc::new(AggregateState::default()));
    }
}

impl Default for UpdateAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
