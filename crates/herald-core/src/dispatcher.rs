//! Dispatcher - the public surface.
//!
//! ```ignore
//! let bus = Dispatcher::new();
//! bus.start(4);
//!
//! let id = bus.add_handler("tick", |n: i32| println!("tick {n}"));
//! bus.add_handler("tick", |s: String| println!("tick {s}"));
//!
//! bus.emit("tick", (1,));                    // reaches the (i32) handler only
//! bus.emit("tick", ("one".to_string(),));    // reaches the (String) handler only
//!
//! bus.remove_handler(id);
//! bus.stop();
//! ```
//!
//! # Lifecycle
//! - `start` while running and `stop` while idle return false.
//! - `stop` clears every handler and drops queued tasks that no worker has
//!   popped yet. Tasks already running finish before `stop` returns.
//! - A `start` that overlaps an unfinished `stop` returns false.
//! - Restarting works, but handlers must be registered again.
//!
//! # Reentrancy
//! Handlers may call any method on the dispatcher they run in. `emit` only
//! enqueues, so it cannot deadlock or recurse. `stop` joins the workers with
//! the lifecycle lock released, so other handlers can still query the
//! dispatcher while it waits for them. A handler may even call `stop` (and
//! then `start`): its own worker is not joined, and it exits as soon as the
//! handler returns instead of joining the new pool.
//!
//! # stop() racing emit()
//! An `emit` stamps its batch with the registry generation its snapshot came
//! from, and `stop` bumps that generation. A batch from before the bump is
//! either refused (emit returns false) or enqueued just before the reset and
//! then discarded (emit returns true). Either way, nothing from before a
//! `stop` runs after it.
//!
//! # 学習ポイント
//! - 状態遷移（Idle → Running → Stopping → Idle）を Mutex 内の enum で表現
//! - join はロックの外で行う（ロック跨ぎで他スレッドを待たない）
//! - emit は「snapshot を取る」と「queue に積む」の 2 段階

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::ids::HandlerId;
use crate::observability::{Counters, DispatcherStats};
use crate::queue::EventQueue;
use crate::signature::{EventArgs, EventKey};
use crate::typed::{ArgPack, Handler, HandlerRegistry, Task, TypedHandler};
use crate::worker::WorkerGroup;

/// Worker ownership, guarded by the lifecycle lock.
enum Lifecycle {
    Idle,
    Running(WorkerGroup),
    /// `stop` has taken the group and is joining it outside the lock.
    Stopping,
}

/// Tasks bound for one emission, stamped with the registry generation.
struct Batch {
    generation: u64,
    tasks: Vec<Task>,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    registry: HandlerRegistry,
    queue: Arc<EventQueue>,
    counters: Arc<Counters>,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            queue: Arc::new(EventQueue::new()),
            counters: Arc::new(Counters::default()),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Start `thread_count` workers (clamped to `[1, cores]`).
    ///
    /// Returns false if already running, or if a worker could not be spawned
    /// (logged; see [`Dispatcher::try_start`] for the error itself).
    pub fn start(&self, thread_count: usize) -> bool {
        match self.try_start(thread_count) {
            Ok(started) => started,
            Err(err) => {
                error!(error = %err, "dispatcher failed to start");
                false
            }
        }
    }

    /// `start` with `config.thread_count`.
    pub fn start_configured(&self) -> bool {
        self.start(self.config.thread_count)
    }

    /// Like `start`, but reports spawn failures.
    ///
    /// When this returns `Ok(true)`, every worker is already blocked on the
    /// queue, so an `emit` right after it is picked up immediately.
    pub fn try_start(&self, thread_count: usize) -> Result<bool, DispatchError> {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            debug!("start refused: workers still owned by a previous start");
            return Ok(false);
        }

        let n = DispatcherConfig::effective_threads(thread_count);
        let group = WorkerGroup::spawn(
            n,
            &self.config.thread_name_prefix,
            Arc::clone(&self.queue),
            Arc::clone(&self.counters),
        )?;

        *lifecycle = Lifecycle::Running(group);
        self.running.store(true, Ordering::Release);
        info!(workers = n, requested = thread_count, "dispatcher started");
        Ok(true)
    }

    /// Stop the workers, clear every handler and drop unstarted tasks.
    ///
    /// Returns false if not running. Blocks until running handlers finish.
    pub fn stop(&self) -> bool {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let (group, generation) = {
            let mut lifecycle = self.lifecycle.lock();
            self.queue.close();

            let generation = self.registry.clear();
            let discarded = self.queue.reset(generation);
            Counters::add(&self.counters.discarded, discarded);
            if discarded > 0 {
                warn!(discarded, "dropped queued tasks on stop");
            }

            let group = match mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(group) => Some(group),
                Lifecycle::Idle | Lifecycle::Stopping => None,
            };
            (group, generation)
        };

        // 他の handler がロックを取れるよう、join はロックの外
        if let Some(group) = group {
            group.join();
        }
        *self.lifecycle.lock() = Lifecycle::Idle;
        info!(generation, "dispatcher stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register `handler` under `name`. Never fails.
    ///
    /// The argument types come from the handler itself, so parameters must be
    /// annotated: `|n: i32| ..`. Handlers returning a value do not compile.
    /// Registering the same signature again extends its fan-out group.
    pub fn add_handler<Args, H>(&self, name: &str, handler: H) -> HandlerId
    where
        Args: EventArgs,
        H: Handler<Args>,
    {
        let key = EventKey::of::<Args>(name);
        let arity = key.signature().arity();
        let id = self
            .registry
            .add(key.clone(), Arc::new(TypedHandler::<Args, H>::new(handler)));
        debug!(%id, event = %key, arity, "handler added");
        id
    }

    /// Returns true iff a handler with `id` was registered and is now removed.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let removed = self.registry.remove(id);
        debug!(%id, removed, "remove handler");
        removed
    }

    /// Schedule one task per handler registered for `name` with exactly the
    /// argument types of `args`.
    ///
    /// Returns false when nothing matches (a normal outcome) or when the batch
    /// raced a `stop()`. Never waits for handlers to run.
    pub fn emit<Args: EventArgs>(&self, name: &str, args: Args) -> bool {
        let key = EventKey::of::<Args>(name);
        match self.bind_batch(&key, args) {
            Some(batch) => self.enqueue(&key, batch),
            None => false,
        }
    }

    /// Snapshot the fan-out group for `key` and bind `args` to each handler.
    fn bind_batch<Args: EventArgs>(&self, key: &EventKey, args: Args) -> Option<Batch> {
        let snapshot = self.registry.lookup(key);
        if snapshot.is_empty() {
            Counters::bump(&self.counters.unmatched);
            trace!(event = %key, "no handler for event");
            return None;
        }

        let event = key.shared_name();
        let pack: ArgPack = Arc::new(args);
        let mut tasks = Vec::with_capacity(snapshot.len());
        for record in snapshot.records {
            match Arc::clone(&record.handler).bind(&pack) {
                Some(job) => tasks.push(Task::new(record.id, Arc::clone(&event), job)),
                None => warn!(
                    id = %record.id,
                    event = %key,
                    expected = %record.handler.signature(),
                    "handler signature does not match its bucket"
                ),
            }
        }
        if tasks.is_empty() {
            Counters::bump(&self.counters.unmatched);
            return None;
        }

        Some(Batch {
            generation: snapshot.generation,
            tasks,
        })
    }

    fn enqueue(&self, key: &EventKey, batch: Batch) -> bool {
        match self.queue.push_batch(batch.generation, batch.tasks) {
            Ok(n) => {
                Counters::bump(&self.counters.emitted);
                Counters::add(&self.counters.enqueued, n);
                trace!(event = %key, tasks = n, "event emitted");
                true
            }
            Err(stale) => {
                Counters::bump(&self.counters.rejected);
                debug!(event = %key, batch = stale.batch, current = stale.current, "emit raced stop");
                false
            }
        }
    }

    /// Workers currently owned by the dispatcher (0 when idle or stopping).
    pub fn worker_count(&self) -> usize {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(group) => group.len(),
            Lifecycle::Idle | Lifecycle::Stopping => 0,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Tasks queued but not yet popped by a worker.
    pub fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            generation: self.registry.generation(),
            ..self.counters.snapshot()
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
