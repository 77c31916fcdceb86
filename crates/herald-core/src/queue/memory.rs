//! In-memory event queue.
//!
//! `Mutex` + `Condvar` blocking pop. Unbounded: no capacity, no drop policy,
//! no priority. Admission control is the caller's problem.
//!
//! # 学習ポイント
//! - Mutex + Condvar による blocking pop（1 push につき notify_one 1 回）
//! - generation: `stop()` 前に作られた batch を受け付けない
//! - epoch: `open()` ごとに進む。古い epoch のワーカーは再 open 後も pop できない

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::{Pop, StaleBatch};
use crate::typed::Task;

struct QueueState {
    tasks: VecDeque<Task>,
    /// Workers may pop while open. Closing makes every pop return `Shutdown`.
    open: bool,
    /// Bumped by every `open`. A worker only pops under the epoch it was spawned with.
    epoch: u64,
    /// Mirrors the registry generation; bumped by `reset`.
    generation: u64,
}

pub struct EventQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                open: false,
                epoch: 0,
                generation: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Open the queue for a new set of workers. Returns their epoch.
    ///
    /// Workers still waiting under an older epoch are woken and shut down.
    pub fn open(&self) -> u64 {
        let epoch = {
            let mut state = self.state.lock();
            state.open = true;
            state.epoch += 1;
            state.epoch
        };
        self.ready.notify_all();
        epoch
    }

    /// Close the queue and wake every blocked worker.
    pub fn close(&self) {
        self.state.lock().open = false;
        self.ready.notify_all();
    }

    /// Append a whole fan-out group, keeping its order.
    ///
    /// The batch is rejected (nothing enqueued) if `generation` is not the
    /// queue's current generation, i.e. a `reset` happened since the snapshot
    /// the batch was built from.
    pub fn push_batch(&self, generation: u64, tasks: Vec<Task>) -> Result<usize, StaleBatch> {
        let n = tasks.len();
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Err(StaleBatch {
                    batch: generation,
                    current: state.generation,
                });
            }
            state.tasks.extend(tasks);
        }

        // one task -> one wake
        for _ in 0..n {
            self.ready.notify_one();
        }
        Ok(n)
    }

    /// Block until a task is available, or until the queue is closed or
    /// reopened under a newer epoch than `epoch`.
    pub fn pop_blocking(&self, epoch: u64) -> Pop {
        let mut state = self.state.lock();
        loop {
            if !state.open || state.epoch != epoch {
                return Pop::Shutdown;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Pop::Task(task);
            }
            self.ready.wait(&mut state);
        }
    }

    /// Discard every queued task and adopt `generation`. Returns how many were dropped.
    pub fn reset(&self, generation: u64) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            state.generation = generation;
            std::mem::take(&mut state.tasks)
        };
        // captured arguments are dropped outside the lock
        discarded.len()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
