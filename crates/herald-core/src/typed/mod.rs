//! Typed - handler API and its type-erased storage.
//!
//! # Two layers
//! - **Typed**: `Handler<Args>` for any `Fn(A1..An)` returning `()`.
//! - **Dyn**: `DynHandler` (object-safe), stored in `HandlerRegistry` and bound
//!   to arguments as a `Task`.

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{ArgPack, DynHandler, Handler, TypedHandler};
pub use self::registry::{HandlerRecord, HandlerRegistry, Snapshot};
pub use self::task::{Job, Task};
