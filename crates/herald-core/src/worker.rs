//! Worker pool - spawn, rendezvous, dispatch loop, join.
//!
//! # 学習ポイント
//! - `thread::Builder` で名前付きスレッド、spawn 失敗は `DispatchError` に変換
//! - crossbeam の `WaitGroup` で「全ワーカーが待機に入った」ことを保証
//! - `catch_unwind` で handler の panic をタスク単位に閉じ込める
//! - ワーカーは spawn 時の epoch でしか pop しない（再 start 後に古いワーカーが混ざらない）

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::sync::WaitGroup;
use tracing::{debug, error, trace, warn};

use crate::error::DispatchError;
use crate::observability::Counters;
use crate::queue::{EventQueue, Pop};
use crate::typed::Task;

/// Worker group handle.
/// - `spawn` returns only after every worker is ready to poll
/// - closing or reopening the queue makes every worker exit after its current task
/// - `join()` waits for all of them
pub struct WorkerGroup {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Open `queue` and spawn `n` named workers on it.
    ///
    /// If a spawn fails, the workers already running are closed and joined
    /// before the error is returned.
    pub(crate) fn spawn(
        n: usize,
        name_prefix: &str,
        queue: Arc<EventQueue>,
        counters: Arc<Counters>,
    ) -> Result<Self, DispatchError> {
        let epoch = queue.open();

        let ready = WaitGroup::new();
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let c = Arc::clone(&counters);
            let ready = ready.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name_prefix}-{worker_id}"))
                .spawn(move || {
                    drop(ready);
                    worker_loop(worker_id, epoch, &q, &c);
                });

            match spawned {
                Ok(join) => joins.push(join),
                Err(source) => {
                    error!(worker_id, error = %source, "failed to spawn worker");
                    queue.close();
                    Self { joins }.join();
                    return Err(DispatchError::Spawn {
                        index: worker_id,
                        source,
                    });
                }
            }
        }

        // rendezvous: every worker has dropped its handle
        ready.wait();
        Ok(Self { joins })
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    /// Wait for every worker to exit. The queue must already be closed.
    ///
    /// When called from one of the group's own workers (a handler calling
    /// `stop()`), that worker is not joined. It exits as soon as its handler
    /// returns, because its epoch is closed for good.
    pub fn join(self) {
        let me = thread::current().id();
        for j in self.joins {
            if j.thread().id() == me {
                debug!("stop() called from a worker; not joining self");
                continue;
            }
            if j.join().is_err() {
                // handler panics are caught in run_task, so this is a bug in the loop itself
                warn!("worker thread terminated by panic");
            }
        }
    }
}

fn worker_loop(worker_id: usize, epoch: u64, queue: &EventQueue, counters: &Counters) {
    debug!(worker_id, epoch, "worker ready");
    loop {
        let task = match queue.pop_blocking(epoch) {
            Pop::Task(task) => task,
            Pop::Shutdown => break,
        };
        run_task(worker_id, task, counters);
    }
    debug!(worker_id, epoch, "worker exiting");
}

/// Run one task to completion, containing any panic.
fn run_task(worker_id: usize, task: Task, counters: &Counters) {
    let handler_id = task.handler_id();
    let event = task.shared_event();
    trace!(worker_id, %handler_id, event = %event, "running handler");

    match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(()) => Counters::bump(&counters.executed),
        Err(payload) => {
            Counters::bump(&counters.panicked);
            error!(
                worker_id,
                %handler_id,
                event = %event,
                panic = %panic_message(payload.as_ref()),
                "handler panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::HandlerId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn counting_task(hits: &Arc<AtomicUsize>, done: &mpsc::Sender<()>) -> Task {
        let hits = Arc::clone(hits);
        let done = done.clone();
        Task::from_fn(HandlerId::new(1), "count", move || {
            hits.fetch_add(1, Ordering::SeqCst);
            let _ = done.send(());
        })
    }

    fn current_thread_name(tx: mpsc::Sender<Option<String>>) -> Task {
        Task::from_fn(HandlerId::new(1), "name", move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        })
    }

    #[test]
    fn workers_drain_the_queue() {
        let queue = Arc::new(EventQueue::new());
        let counters = Arc::new(Counters::default());
        let group = WorkerGroup::spawn(3, "test", Arc::clone(&queue), Arc::clone(&counters)).unwrap();
        assert_eq!(group.len(), 3);

        let hits = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let tasks = (0..10).map(|_| counting_task(&hits, &tx)).collect();
        queue.push_batch(0, tasks).unwrap();
        for _ in 0..10 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        queue.close();
        group.join();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(counters.snapshot().executed, 10);
    }

    #[test]
    fn workers_are_named_after_the_prefix() {
        let queue = Arc::new(EventQueue::new());
        let group = WorkerGroup::spawn(1, "named", Arc::clone(&queue), Arc::default()).unwrap();

        let (tx, rx) = mpsc::channel();
        queue.push_batch(0, vec![current_thread_name(tx)]).unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("named-0"));

        queue.close();
        group.join();
    }

    #[test]
    fn panicking_task_does_not_kill_the_worker() {
        let queue = Arc::new(EventQueue::new());
        let counters = Arc::new(Counters::default());
        let group = WorkerGroup::spawn(1, "panic", Arc::clone(&queue), Arc::clone(&counters)).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let boom = Task::from_fn(HandlerId::new(1), "boom", || panic!("boom"));
        queue.push_batch(0, vec![boom, counting_task(&hits, &tx)]).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        queue.close();
        group.join();

        let stats = counters.snapshot();
        assert_eq!(stats.panicked, 1);
        assert_eq!(stats.executed, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_stops_idle_workers() {
        let queue = Arc::new(EventQueue::new());
        let group = WorkerGroup::spawn(4, "idle", Arc::clone(&queue), Arc::default()).unwrap();

        queue.close();
        group.join();
        assert!(queue.is_empty());
    }

    #[test]
    fn new_group_replaces_the_previous_one() {
        let queue = Arc::new(EventQueue::new());
        let old = WorkerGroup::spawn(1, "old", Arc::clone(&queue), Arc::default()).unwrap();
        queue.close();
        let new = WorkerGroup::spawn(1, "new", Arc::clone(&queue), Arc::default()).unwrap();

        // the queue is open again, yet the old worker still exits
        old.join();

        let (tx, rx) = mpsc::channel();
        queue.push_batch(0, vec![current_thread_name(tx)]).unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("new-0"));

        queue.close();
        new.join();
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(s.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
