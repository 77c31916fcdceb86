//! Signature - event name + ordered argument types.
//!
//! An emission reaches a handler only when both the event name and the full
//! argument type sequence match. Handlers take their arguments by value, so the
//! only "qualifiers" left in Rust are binding modifiers (`mut s: String` vs
//! `s: String`), and those never show up in the type. Both land in one bucket.
//!
//! The fingerprint is an order-dependent fold (seed, then combine per
//! position). `(i32, String)` and `(String, i32)` get different fingerprints,
//! and equality still compares the full type list, so a fingerprint collision
//! can never merge two buckets.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

const SEED: u64 = 0xcbf2_9ce4_8422_2325;
const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;

/// EventArgs is an argument list that can be emitted.
///
/// Implemented for tuples `()` through 8-ary. Each handler in a fan-out group
/// receives its own clone, hence `Clone`.
///
/// # Example
/// ```ignore
/// dispatcher.emit("tick", (1,));
/// dispatcher.emit("moved", (entity_id, x, y));
/// dispatcher.emit("reset", ());
/// ```
pub trait EventArgs: Clone + Send + Sync + 'static {
    fn type_ids() -> Vec<TypeId>;
    fn type_names() -> Vec<&'static str>;
}

macro_rules! impl_event_args {
    ($($ty:ident),*) => {
        impl<$($ty),*> EventArgs for ($($ty,)*)
        where
            $($ty: Clone + Send + Sync + 'static,)*
        {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$ty>()),*]
            }

            fn type_names() -> Vec<&'static str> {
                vec![$(type_name::<$ty>()),*]
            }
        }
    };
}

impl_event_args!();
impl_event_args!(A1);
impl_event_args!(A1, A2);
impl_event_args!(A1, A2, A3);
impl_event_args!(A1, A2, A3, A4);
impl_event_args!(A1, A2, A3, A4, A5);
impl_event_args!(A1, A2, A3, A4, A5, A6);
impl_event_args!(A1, A2, A3, A4, A5, A6, A7);
impl_event_args!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Ordered argument type identities.
#[derive(Debug, Clone)]
pub struct Signature {
    types: Vec<TypeId>,
    names: Vec<&'static str>,
    fingerprint: u64,
}

impl Signature {
    pub fn of<A: EventArgs>() -> Self {
        let types = A::type_ids();
        let fingerprint = fingerprint(&types);
        Self {
            types,
            names: A::type_names(),
            fingerprint,
        }
    }

    pub fn arity(&self) -> usize {
        self.types.len()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

fn fingerprint(types: &[TypeId]) -> u64 {
    types
        .iter()
        .enumerate()
        .fold(SEED ^ types.len() as u64, |acc, (pos, id)| {
            let mut hasher = DefaultHasher::new();
            pos.hash(&mut hasher);
            id.hash(&mut hasher);
            let h = hasher.finish();
            acc ^ h
                .wrapping_add(GOLDEN)
                .wrapping_add(acc << 6)
                .wrapping_add(acc >> 2)
        })
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.types == other.types
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.names.join(", "))
    }
}

/// EventKey is the registry bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    name: Arc<str>,
    signature: Signature,
}

impl EventKey {
    pub fn new(name: &str, signature: Signature) -> Self {
        Self {
            name: Arc::from(name),
            signature,
        }
    }

    pub fn of<A: EventArgs>(name: &str) -> Self {
        Self::new(name, Signature::of::<A>())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the name; tasks keep one for logging.
    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}
