// ── Feedback expiry timers ──
//
// One pending timer per alert id. Scheduling again replaces (and aborts)
// the previous timer; a generation number guards against a timer that has
// already woken firing on behalf of its replacement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;

struct Pending {
    generation: u64,
    handle: AbortHandle,
}

/// Keyed single-shot timers.
#[derive(Default)]
pub(crate) struct FeedbackTimers {
    pending: Arc<DashMap<String, Pending>>,
    next_generation: AtomicU64,
}

impl FeedbackTimers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay` unless the timer for `key` is cancelled
    /// or rescheduled first.
    pub(crate) fn schedule<F>(&self, key: &str, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let owned_key = key.to_owned();

        // The entry guard is held until the new timer is recorded, so a
        // zero-length timer cannot look itself up before it exists.
        let entry = self.pending.entry(key.to_owned());
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = pending
                .remove_if(&owned_key, |_, p| p.generation == generation)
                .is_some();
            if current {
                on_fire();
            }
        });
        let next = Pending {
            generation,
            handle: task.abort_handle(),
        };
        match entry {
            Entry::Occupied(mut slot) => {
                slot.get().handle.abort();
                slot.insert(next);
            }
            Entry::Vacant(slot) => {
                slot.insert(next);
            }
        }
    }

    pub(crate) fn cancel(&self, key: &str) {
        if let Some((_, pending)) = self.pending.remove(key) {
            pending.handle.abort();
        }
    }

    pub(crate) fn cancel_all(&self) {
        self.pending.retain(|_, pending| {
            pending.handle.abort();
            false
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for FeedbackTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
