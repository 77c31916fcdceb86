//! HandlerRegistry - signature-keyed fan-out groups.
//!
//! # Design
//! - One bucket per `EventKey`; a bucket is an ordered `Vec` (registration order).
//! - Every operation takes the same exclusive lock.
//! - `lookup` copies the bucket out (`Arc` bumps only) so dispatch never runs
//!   under the lock, and a handler removed mid-dispatch stays alive for the
//!   tasks already bound to it.
//! - `clear` bumps a generation counter. Snapshots carry the generation they
//!   were taken at, which lets the queue reject batches that raced a shutdown.
//!
//! # 学習ポイント
//! - HashMap<EventKey, Vec<..>> で型消去された handler を署名ごとに管理
//! - lookup はロック内で Arc を clone するだけ（handler 実行はロック外）

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::handler::DynHandler;
use crate::ids::{HandlerId, IdGenerator};
use crate::signature::EventKey;

#[derive(Clone)]
pub struct HandlerRecord {
    pub id: HandlerId,
    pub handler: Arc<dyn DynHandler>,
}

/// Detached copy of one fan-out group.
pub struct Snapshot {
    pub records: Vec<HandlerRecord>,
    pub generation: u64,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[derive(Default)]
struct RegistryState {
    buckets: HashMap<EventKey, Vec<HandlerRecord>>,
    generation: u64,
}

#[derive(Default)]
pub struct HandlerRegistry {
    state: Mutex<RegistryState>,
    ids: IdGenerator,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the bucket for `key`. Never fails.
    pub fn add(&self, key: EventKey, handler: Arc<dyn DynHandler>) -> HandlerId {
        let id = self.ids.generate();
        let mut state = self.state.lock();
        state
            .buckets
            .entry(key)
            .or_default()
            .push(HandlerRecord { id, handler });
        id
    }

    /// Remove the record with `id`. Returns whether one was found.
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut state = self.state.lock();

        let mut emptied = None;
        let mut found = false;
        for (key, records) in state.buckets.iter_mut() {
            if let Some(pos) = records.iter().position(|r| r.id == id) {
                records.remove(pos);
                found = true;
                if records.is_empty() {
                    emptied = Some(key.clone());
                }
                break;
            }
        }

        if let Some(key) = emptied {
            state.buckets.remove(&key);
        }
        found
    }

    pub fn lookup(&self, key: &EventKey) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            records: state.buckets.get(key).cloned().unwrap_or_default(),
            generation: state.generation,
        }
    }

    /// Drop every bucket. Returns the new generation.
    pub fn clear(&self) -> u64 {
        let mut state = self.state.lock();
        state.buckets.clear();
        state.generation += 1;
        state.generation
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.state.lock().buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().buckets.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.state.lock().buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::EventArgs;
    use crate::typed::handler::{Handler, TypedHandler};

    fn erase<Args: EventArgs, H: Handler<Args>>(handler: H) -> Arc<dyn DynHandler> {
        Arc::new(TypedHandler::<Args, H>::new(handler))
    }

    #[test]
    fn add_then_lookup() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<(i32,)>("tick");

        let id = reg.add(key.clone(), erase(|_: i32| {}));

        let snap = reg.lookup(&key);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.records[0].id, id);
    }

    #[test]
    fn lookup_of_missing_key_is_empty() {
        let reg = HandlerRegistry::new();
        reg.add(EventKey::of::<(i32,)>("tick"), erase(|_: i32| {}));

        assert!(reg.lookup(&EventKey::of::<(i32,)>("tock")).is_empty());
        assert!(reg.lookup(&EventKey::of::<(u32,)>("tick")).is_empty());
    }

    #[test]
    fn same_key_forms_fan_out_group_in_registration_order() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<(String,)>("msg");

        let a = reg.add(key.clone(), erase(|_: String| {}));
        let b = reg.add(key.clone(), erase(|mut s: String| s.clear()));
        let c = reg.add(key.clone(), erase(|_: String| {}));

        let ids: Vec<_> = reg.lookup(&key).records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(reg.bucket_count(), 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<()>("x");

        let a = reg.add(key.clone(), erase(|| {}));
        assert!(reg.remove(a));
        let b = reg.add(key.clone(), erase(|| {}));
        reg.clear();
        let c = reg.add(key, erase(|| {}));

        assert!(a < b && b < c);
    }

    #[test]
    fn remove_is_true_exactly_once() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<()>("x");
        let id = reg.add(key.clone(), erase(|| {}));

        assert!(reg.remove(id));
        assert!(!reg.remove(id));
        assert!(!reg.remove(HandlerId::new(999)));
        assert!(reg.is_empty());
        assert_eq!(reg.bucket_count(), 0);
    }

    #[test]
    fn remove_keeps_other_members_of_the_group() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<()>("x");
        let a = reg.add(key.clone(), erase(|| {}));
        let b = reg.add(key.clone(), erase(|| {}));

        assert!(reg.remove(a));

        let snap = reg.lookup(&key);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.records[0].id, b);
    }

    #[test]
    fn snapshot_survives_removal() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<()>("x");
        let id = reg.add(key.clone(), erase(|| {}));

        let snap = reg.lookup(&key);
        reg.remove(id);

        assert_eq!(snap.len(), 1);
        assert!(reg.lookup(&key).is_empty());
    }

    #[test]
    fn clear_bumps_generation() {
        let reg = HandlerRegistry::new();
        let key = EventKey::of::<()>("x");
        reg.add(key.clone(), erase(|| {}));
        reg.add(EventKey::of::<(i32,)>("y"), erase(|_: i32| {}));
        assert_eq!(reg.len(), 2);

        let before = reg.lookup(&key).generation;
        let after = reg.clear();

        assert_eq!(after, before + 1);
        assert_eq!(reg.generation(), after);
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
    }
}
