use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time counters of one dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Emits that scheduled at least one task.
    pub emitted: u64,
    /// Emits with no matching handler.
    pub unmatched: u64,
    /// Emits whose batch raced a `stop()` and was refused.
    pub rejected: u64,
    pub enqueued: u64,
    pub executed: u64,
    pub panicked: u64,
    /// Tasks dropped by `stop()` before any worker popped them.
    pub discarded: u64,
    /// How many times `stop()` has cleared the handler registry.
    pub generation: u64,
}

/// Live counters shared between the façade and the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub emitted: AtomicU64,
    pub unmatched: AtomicU64,
    pub rejected: AtomicU64,
    pub enqueued: AtomicU64,
    pub executed: AtomicU64,
    pub panicked: AtomicU64,
    pub discarded: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            // owned by the registry; filled in by `Dispatcher::stats`
            generation: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let counters = Counters::default();
        Counters::bump(&counters.emitted);
        Counters::add(&counters.enqueued, 3);
        Counters::bump(&counters.panicked);

        let stats = counters.snapshot();
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.executed, 0);
    }

    #[test]
    fn stats_serialize_as_flat_json() {
        let stats = DispatcherStats {
            executed: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["executed"], 2);
        assert_eq!(json["discarded"], 0);
        assert_eq!(json["generation"], 0);
    }
}
