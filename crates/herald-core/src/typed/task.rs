//! Task - one pending handler execution.
//!
//! A Task is created by `emit`, owned by the queue until exactly one worker pops
//! it, run once, and dropped. It is never re-queued.
//!
//! # 学習ポイント
//! - `self: Box<Self>` で FnOnce 相当の trait object を 1 回だけ呼ぶ
//! - クロージャへの blanket impl（テストでそのまま Task にできる）

use std::fmt;
use std::sync::Arc;

use crate::ids::HandlerId;

/// Job is the "run with no arguments" capability behind a Task.
///
/// Every concrete handler type gets its own implementation (see
/// `typed::handler::BoundHandler`); plain closures implement it too, which is
/// handy for queue tests.
pub trait Job: Send {
    fn run(self: Box<Self>);
}

impl<F> Job for F
where
    F: FnOnce() + Send,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}

pub struct Task {
    handler_id: HandlerId,
    event: Arc<str>,
    job: Box<dyn Job>,
}

impl Task {
    pub fn new(handler_id: HandlerId, event: Arc<str>, job: Box<dyn Job>) -> Self {
        Self {
            handler_id,
            event,
            job,
        }
    }

    pub fn from_fn<F>(handler_id: HandlerId, event: &str, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(handler_id, Arc::from(event), Box::new(f))
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    pub fn shared_event(&self) -> Arc<str> {
        Arc::clone(&self.event)
    }

    /// Run the bound handler on the current thread.
    pub fn run(self) {
        self.job.run()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("handler_id", &self.handler_id)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}
