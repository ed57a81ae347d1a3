// ── Reactive stores ──
//
// Device-scoped state with push-based change notification.

mod aggregate;
mod update_store;

pub use aggregate::{AggregateState, DEFAULT_HISTORY_CAPACITY, LatestAlert};
pub use update_store::UpdateAggregator;
