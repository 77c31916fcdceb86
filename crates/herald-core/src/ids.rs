//! Handler identifiers.
//!
//! IDs are minted by a per-dispatcher [`IdGenerator`]. There is no process-wide
//! counter, so two dispatchers hand out overlapping sequences independently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque id returned by `add_handler`.
///
/// Monotonic and never reused within the dispatcher that issued it.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandlerId(u64);

impl HandlerId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Per-instance id counter.
///
/// Starts at zero; the first issued id is `handler-1`.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    pub fn generate(&self) -> HandlerId {
        // Relaxed is enough: uniqueness comes from the RMW, not from ordering.
        HandlerId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ids_are_monotonic() {
        let id_gen = IdGenerator::new();

        let id1 = id_gen.generate();
        let id2 = id_gen.generate();
        let id3 = id_gen.generate();

        assert!(id1 < id2);
        assert!(id2 < id3);
        assert_eq!(id1.as_u64(), 1);
    }

    #[test]
    fn generators_are_independent() {
        let a = IdGenerator::new();
        let b = IdGenerator::new();

        a.generate();
        a.generate();

        // b has its own counter
        assert_eq!(b.generate(), HandlerId::new(1));
        assert_eq!(a.generate(), HandlerId::new(3));
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let id_gen = Arc::new(IdGenerator::new());

        let joins: Vec<_> = (0..4)
            .map(|_| {
                let id_gen = Arc::clone(&id_gen);
                thread::spawn(move || (0..250).map(|_| id_gen.generate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for j in joins {
            for id in j.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn display_has_prefix() {
        assert_eq!(HandlerId::new(7).to_string(), "handler-7");
    }
}
