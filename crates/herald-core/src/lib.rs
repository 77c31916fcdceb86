//! herald-core
//!
//! In-process publish/subscribe dispatcher: typed handlers registered under a
//! name, delivered asynchronously by a pool of worker threads.
//!
//! # Modules
//! - **signature**: `EventArgs`, `Signature`, `EventKey` (name + ordered argument types)
//! - **typed**: `Handler<Args>`, type-erased `DynHandler`, `HandlerRegistry`, `Task`
//! - **queue**: `EventQueue`, the shared blocking FIFO
//! - **worker**: `WorkerGroup`, spawn/rendezvous/join and the dispatch loop
//! - **dispatcher**: `Dispatcher`, the public `start`/`stop`/`add_handler`/`remove_handler`/`emit`
//! - **config**, **error**, **ids**, **observability**: ambient pieces

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod observability;
pub mod queue;
pub mod signature;
pub mod typed;
mod worker;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, DispatchError};
pub use ids::HandlerId;
pub use observability::DispatcherStats;
pub use signature::{EventArgs, EventKey, Signature};
pub use typed::Handler;
