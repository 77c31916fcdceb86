//! Queue module: the shared FIFO between `emit` and the workers.

mod memory;

pub use memory::EventQueue;

use crate::typed::Task;

/// Result of a blocking pop.
#[derive(Debug)]
pub enum Pop {
    Task(Task),
    /// The queue was closed; the worker should exit.
    Shutdown,
}

/// A batch was stamped with a generation the queue no longer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleBatch {
    pub batch: u64,
    pub current: u64,
}
