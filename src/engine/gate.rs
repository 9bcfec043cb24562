//! Admission control in front of the executor.
//!
//! Every run goes through [`AdmissionGate::run_gated`]:
//! 1. a fresh cached result for `(destination, task)` is served as is,
//!    with alert suppression re-applied for the caller;
//! 2. a computation already in flight or queued for the same key and the
//!    same task snapshot is joined;
//! 3. otherwise a running slot is taken and the task executes now;
//! 4. with the pool saturated the run is queued, or refused when the queue
//!    is full (busy message for manual callers, silence for automatic ones).
//!
//! The gate never fails: every path resolves to a string, possibly empty.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use super::cache::{CacheKey, ResponseCache};
use super::executor::{ExecutionResult, TaskExecutor};
use super::queue::{QueueEntry, RunQueue};
use super::slots::{RunningSlots, SlotGuard};
use crate::channels::DeliverySink;
use crate::config::EngineConfig;
use crate::task::Task;

pub const BUSY_MESSAGE: &str = "Server is busy, please try again later.";

type RunId = u64;
type Waiters = Vec<oneshot::Sender<ExecutionResult>>;

/// A computation running or queued, and who waits on it.
struct InFlight {
    key: CacheKey,
    task: Task,
    /// The task's invalidation generation when the run was admitted.
    generation: u64,
    queued: bool,
    waiters: Waiters,
}

struct GateState {
    cache: ResponseCache,
    queue: RunQueue,
    runs: HashMap<RunId, InFlight>,
    /// The run new callers for a key may join.
    joinable: HashMap<CacheKey, RunId>,
    /// Bumped every time a task's results are invalidated.
    generations: HashMap<i64, u64>,
    next_run: RunId,
    closed: bool,
}

impl GateState {
    fn generation(&self, task_id: i64) -> u64 {
        self.generations.get(&task_id).copied().unwrap_or_default()
    }

    /// Drop cached results for a task and keep runs admitted before now
    /// from caching theirs.
    fn invalidate(&mut self, task_id: i64) {
        *self.generations.entry(task_id).or_default() += 1;
        self.cache.invalidate_task(task_id);
        self.joinable.retain(|key, _| key.task_id != task_id);
    }

    fn start_run(
        &mut self,
        key: &CacheKey,
        task: &Task,
        queued: bool,
    ) -> (RunId, oneshot::Receiver<ExecutionResult>) {
        let run_id = self.next_run;
        self.next_run += 1;
        let (tx, rx) = oneshot::channel();
        self.runs.insert(
            run_id,
            InFlight {
                key: key.clone(),
                task: task.clone(),
                generation: self.generation(task.id),
                queued,
                waiters: vec![tx],
            },
        );
        self.joinable.insert(key.clone(), run_id);
        (run_id, rx)
    }

    fn finish_run(&mut self, run_id: RunId) -> Option<InFlight> {
        let run = self.runs.remove(&run_id)?;
        if self.joinable.get(&run.key) == Some(&run_id) {
            self.joinable.remove(&run.key);
        }
        Some(run)
    }
}

/// Counts for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub running: usize,
    pub max_running: usize,
    pub queued: usize,
    pub cached: usize,
    pub in_flight: usize,
}

enum Admission {
    Cached(ExecutionResult),
    Join(oneshot::Receiver<ExecutionResult>),
    Run(SlotGuard, RunId, oneshot::Receiver<ExecutionResult>),
    Queued(oneshot::Receiver<ExecutionResult>),
    Full,
    Closed,
}

pub struct AdmissionGate {
    executor: TaskExecutor,
    sink: Arc<dyn DeliverySink>,
    config: EngineConfig,
    slots: RunningSlots,
    state: Mutex<GateState>,
}

impl AdmissionGate {
    pub fn new(executor: TaskExecutor, sink: Arc<dyn DeliverySink>, config: EngineConfig) -> Self {
        Self {
            executor,
            sink,
            slots: RunningSlots::new(config.max_running_tasks),
            state: Mutex::new(GateState {
                cache: ResponseCache::new(config.cache_ttl, config.max_cache_size),
                queue: RunQueue::new(config.max_queue_size),
                runs: HashMap::new(),
                joinable: HashMap::new(),
                generations: HashMap::new(),
                next_run: 0,
                closed: false,
            }),
            config,
        }
    }

    /// Run `task` through cache, pool and queue, rendered for the caller.
    ///
    /// Execution happens on its own tokio task, so dropping this future
    /// does not abandon a run other callers may be waiting on.
    pub async fn run_gated(self: &Arc<Self>, task: &Task, is_manual: bool) -> String {
        let key = CacheKey::for_task(task);

        match self.admit(&key, task, is_manual).await {
            Admission::Cached(result) => {
                tracing::debug!(
                    task_id = task.id,
                    destination = %key.destination,
                    "Serving cached response"
                );
                result.render(is_manual)
            }
            Admission::Join(rx) => {
                tracing::debug!(task_id = task.id, "Joining in-flight run");
                self.await_result(rx, task, is_manual).await
            }
            Admission::Run(slot, run_id, rx) => {
                let gate = Arc::clone(self);
                let task_snapshot = task.clone();
                tokio::spawn(async move { gate.execute(slot, run_id, &task_snapshot).await });
                self.await_result(rx, task, is_manual).await
            }
            Admission::Queued(rx) => {
                if is_manual {
                    let notice = format!("Task \"{}\" is queued, please wait...", task.name);
                    if let Err(e) = self.sink.send(&task.destination, &notice).await {
                        tracing::warn!(task_id = task.id, "Failed to send queue notice: {}", e);
                    }
                }
                self.await_result(rx, task, is_manual).await
            }
            Admission::Full => {
                tracing::warn!(
                    task_id = task.id,
                    destination = %key.destination,
                    is_manual,
                    "Queue is full"
                );
                if is_manual {
                    BUSY_MESSAGE.to_string()
                } else {
                    String::new()
                }
            }
            Admission::Closed => {
                tracing::warn!(task_id = task.id, "Run refused, gate is shut down");
                cancelled(task, is_manual)
            }
        }
    }

    /// Decide the path for one call under a single lock acquisition.
    async fn admit(&self, key: &CacheKey, task: &Task, is_manual: bool) -> Admission {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.closed {
            return Admission::Closed;
        }

        if let Some(result) = state.cache.get(key) {
            return Admission::Cached(result);
        }

        if let Some(run_id) = state.joinable.get(key).copied() {
            let generation = state.generation(task.id);
            let same_snapshot = state
                .runs
                .get(&run_id)
                .map(|run| run.task == *task && run.generation == generation);
            match same_snapshot {
                Some(true) => {
                    if let Some(run) = state.runs.get_mut(&run_id) {
                        let (tx, rx) = oneshot::channel();
                        run.waiters.push(tx);
                        if run.queued && is_manual {
                            state.queue.promote(run_id);
                            return Admission::Queued(rx);
                        }
                        return Admission::Join(rx);
                    }
                }
                Some(false) => {
                    tracing::info!(task_id = task.id, "Task changed since its run started");
                    state.invalidate(task.id);
                }
                None => {
                    state.joinable.remove(key);
                }
            }
        }

        if let Some(slot) = self.slots.try_acquire() {
            let (run_id, rx) = state.start_run(key, task, false);
            return Admission::Run(slot, run_id, rx);
        }

        if state.queue.is_full() {
            return Admission::Full;
        }
        let (run_id, rx) = state.start_run(key, task, true);
        let entry = QueueEntry {
            run_id,
            task: task.clone(),
            is_manual,
        };
        if state.queue.push(entry).is_err() {
            state.finish_run(run_id);
            return Admission::Full;
        }
        drop(guard);

        tracing::info!(task_id = task.id, is_manual, "Pool saturated, run queued");
        self.slots.notify();
        Admission::Queued(rx)
    }

    async fn await_result(
        &self,
        rx: oneshot::Receiver<ExecutionResult>,
        task: &Task,
        is_manual: bool,
    ) -> String {
        match rx.await {
            Ok(result) => result.render(is_manual),
            Err(_) => {
                tracing::warn!(task_id = task.id, "Run was dropped before completing");
                cancelled(task, is_manual)
            }
        }
    }

    /// Execute while holding `slot`, then publish the result of `run_id`.
    /// A panicking run releases its waiters through the cancellation path.
    async fn execute(&self, slot: SlotGuard, run_id: RunId, task: &Task) {
        match AssertUnwindSafe(self.executor.run(task)).catch_unwind().await {
            Ok(result) => self.complete(run_id, result).await,
            Err(_) => {
                tracing::error!(task_id = task.id, "Task execution panicked");
                self.state.lock().await.finish_run(run_id);
            }
        }
        drop(slot);
    }

    /// Cache the result unless the task was invalidated meanwhile, and hand
    /// it to everyone waiting on the run.
    async fn complete(&self, run_id: RunId, result: ExecutionResult) {
        let waiters = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(run) = state.finish_run(run_id) else {
                return;
            };
            if run.generation == state.generation(run.task.id) {
                state.cache.insert(run.key, result.clone());
            } else {
                tracing::debug!(task_id = run.task.id, "Stale result not cached");
            }
            run.waiters
        };
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }

    /// Take a slot and the next queue entry, if both are available.
    async fn take_next(&self) -> Option<(SlotGuard, QueueEntry)> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if state.queue.is_empty() {
            return None;
        }
        let slot = self.slots.try_acquire()?;
        let entry = state.queue.pop_next()?;
        if let Some(run) = state.runs.get_mut(&entry.run_id) {
            run.queued = false;
        }
        Some((slot, entry))
    }

    async fn run_queued(&self, slot: SlotGuard, entry: QueueEntry) {
        tokio::time::sleep(self.config.queue_delay_for(entry.is_manual)).await;
        tracing::info!(
            task_id = entry.task.id,
            is_manual = entry.is_manual,
            "Running queued task"
        );
        self.execute(slot, entry.run_id, &entry.task).await;
    }

    /// Start the loop that feeds queued runs into freed slots.
    pub fn spawn_drain_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                while let Some((slot, entry)) = gate.take_next().await {
                    let gate = Arc::clone(&gate);
                    tokio::spawn(async move { gate.run_queued(slot, entry).await });
                }
                gate.slots.released().await;
            }
        })
    }

    /// Start the periodic sweep of expired cache entries.
    pub fn spawn_cache_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        let period = self.config.cache_sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                gate.state.lock().await.cache.sweep_expired();
            }
        })
    }

    /// Forget results for a task after it was edited or deleted. Runs
    /// already in flight still answer their callers but are not cached.
    pub async fn invalidate_task(&self, task_id: i64) {
        self.state.lock().await.invalidate(task_id);
    }

    pub async fn stats(&self) -> GateStats {
        let state = self.state.lock().await;
        GateStats {
            running: self.slots.running(),
            max_running: self.slots.max(),
            queued: state.queue.len(),
            cached: state.cache.len(),
            in_flight: state.runs.len(),
        }
    }

    /// Refuse new runs and drop queued ones and cached results. Waiters on
    /// dropped runs resolve with the cancellation path; runs already
    /// executing finish normally.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        let dropped = state.queue.drain();
        for entry in &dropped {
            state.finish_run(entry.run_id);
        }
        state.cache.clear();
        tracing::info!(dropped = dropped.len(), "Admission gate flushed");
    }
}

fn cancelled(task: &Task, is_manual: bool) -> String {
    if is_manual {
        format!("Task \"{}\" failed: run was cancelled", task.name)
    } else {
        String::new()
    }
}
