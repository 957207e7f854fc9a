//! The scheduler façade and its tick loop.
//!
//! [`Scheduler`] owns every registered task. Hosts register work through the
//! `delay`/`interval`/`next_tick`/`schedule_async` family and call
//! [`Scheduler::advance`] exactly once per tick (typically once per frame).

use crate::config::SchedulerConfig;
use crate::error::{Result, TaskError};
use crate::scheduler::context::TaskContext;
use crate::scheduler::id::TaskId;
use crate::scheduler::operation::{AsyncOperation, FutureOperation};
use crate::scheduler::registry::Registry;
use crate::scheduler::tasks::{
    Repeat, Task, TaskKind, TaskStatus, Tick, TimeSource, duration_from_secs,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// One row of a [`SchedulerSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task handle.
    pub id: TaskId,
    /// Task variant.
    pub kind: TaskKind,
    /// Current status.
    pub status: TaskStatus,
}

/// Point-in-time view of the scheduler, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Number of completed `advance` calls.
    pub tick: u64,
    /// Every task not yet swept.
    pub tasks: Vec<TaskInfo>,
}

/// Cooperative, tick-driven task scheduler.
///
/// Single-threaded by contract: every method takes `&mut self`, and the
/// scheduler never spawns threads or blocks. It is `Send`, so it can be
/// moved onto whichever thread or tokio task drives the ticks.
pub struct Scheduler {
    registry: Registry,
    config: SchedulerConfig,
    /// Completed `advance` calls.
    tick: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tick", &self.tick)
            .field("tasks", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    pub fn new() -> Self {
        let config = SchedulerConfig::default();
        Self {
            registry: Registry::with_capacity(config.initial_capacity),
            config,
            tick: 0,
        }
    }

    /// Create a scheduler from a validated configuration.
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Registry::with_capacity(config.initial_capacity),
            config,
            tick: 0,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Run `callback` once after `delay` of scaled time.
    pub fn delay<F>(&mut self, delay: Duration, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.delay_with(delay, TimeSource::Scaled, callback)
    }

    /// Run `callback` once after `delay` measured in the given time source.
    pub fn delay_with<F>(
        &mut self,
        delay: Duration,
        time_source: TimeSource,
        callback: F,
    ) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let id = self
            .registry
            .insert(Task::delayed(delay, time_source, Box::new(callback)))?;
        trace!(task = %id, ?delay, ?time_source, "delayed task registered");
        Ok(id)
    }

    /// Like [`Scheduler::delay`], taking host float seconds.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidArgument`](crate::SchedulerError::InvalidArgument)
    /// when `secs` is negative or not finite.
    pub fn delay_secs<F>(&mut self, secs: f64, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let delay = duration_from_secs(secs, "delay")?;
        self.delay(delay, callback)
    }

    /// Run `callback` every `interval` of scaled time until cancelled.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidArgument`](crate::SchedulerError::InvalidArgument)
    /// when `interval` is zero.
    pub fn interval<F>(&mut self, interval: Duration, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.interval_with(interval, Repeat::Forever, TimeSource::Scaled, callback)
    }

    /// Run `callback` every `interval`, `repeat` times.
    ///
    /// When a single tick covers several whole intervals the callback fires
    /// once per owed interval, oldest first, within that tick.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidArgument`](crate::SchedulerError::InvalidArgument)
    /// when `interval` is zero.
    pub fn interval_with<F>(
        &mut self,
        interval: Duration,
        repeat: Repeat,
        time_source: TimeSource,
        callback: F,
    ) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let task = Task::interval(interval, repeat, time_source, Box::new(callback))?;
        let id = self.registry.insert(task)?;
        trace!(task = %id, ?interval, %repeat, ?time_source, "interval task registered");
        Ok(id)
    }

    /// Like [`Scheduler::interval_with`], taking host float seconds and a
    /// signed repeat count (negative means forever).
    pub fn interval_secs<F>(&mut self, secs: f64, repeat_count: i32, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let interval = duration_from_secs(secs, "interval")?;
        self.interval_with(interval, Repeat::from(repeat_count), TimeSource::Scaled, callback)
    }

    /// Run `callback` once on the next tick, whatever its delta.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::CapacityExhausted`](crate::SchedulerError::CapacityExhausted)
    /// when every task slot is in use. The same applies to every other
    /// registration method.
    pub fn next_tick<F>(&mut self, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.registry.insert(Task::next_tick(Box::new(callback)))?;
        trace!(task = %id, "next-tick task registered");
        Ok(id)
    }

    /// Observe an asynchronous operation, polling it once per tick.
    ///
    /// The task is cancelled when `token` (or any parent of it) is cancelled.
    pub fn schedule_async<O>(&mut self, operation: O, token: &CancellationToken) -> Result<TaskId>
    where
        O: AsyncOperation + 'static,
    {
        let id = self
            .registry
            .insert(Task::async_poll(Box::new(operation), token))?;
        trace!(task = %id, "async task registered");
        Ok(id)
    }

    /// Observe a future, polling it once per tick with a no-op waker.
    pub fn schedule_future<F>(&mut self, future: F, token: &CancellationToken) -> Result<TaskId>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.schedule_async(FutureOperation::new(future), token)
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Cancel a task. Returns `false` when the id is unknown or the task has
    /// already completed or been cancelled.
    ///
    /// A task still pending is dropped immediately and never runs.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let cancelled = self.registry.cancel(id);
        if cancelled {
            debug!(task = %id, "task cancelled");
        }
        cancelled
    }

    /// Cancel every task and clear all storage.
    pub fn cancel_all(&mut self) {
        let dropped = self.registry.cancel_all();
        if dropped > 0 {
            debug!(dropped, "all tasks cancelled");
        }
    }

    /// Pause a running task. Pending tasks cannot be paused.
    pub fn pause(&mut self, id: TaskId) -> bool {
        self.registry.pause(id)
    }

    /// Resume a paused task. Accumulated time is preserved.
    pub fn resume(&mut self, id: TaskId) -> bool {
        self.registry.resume(id)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Status of a task, or `None` once it has been swept.
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.registry.status(id)
    }

    /// Number of tasks not yet swept, pending ones included.
    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of tasks registered since the last tick.
    pub fn pending_count(&self) -> usize {
        self.registry.pending_len()
    }

    /// Number of completed `advance` calls.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Point-in-time view of all tasks.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let tasks = self
            .registry
            .entries()
            .into_iter()
            .filter_map(|(id, kind, status)| kind.map(|kind| TaskInfo { id, kind, status }))
            .collect();
        SchedulerSnapshot {
            tick: self.tick,
            tasks,
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance every task by one tick.
    ///
    /// 1. Tasks registered since the previous tick are promoted to `Running`.
    /// 2. Every active task is updated with `dt` (scaled) and `unscaled_dt`.
    ///    A failing or panicking callback is logged and its task removed;
    ///    the other tasks are unaffected.
    /// 3. Completed, cancelled and failed tasks are swept.
    ///
    /// Tasks registered from inside callbacks wait for the next call.
    pub fn advance(&mut self, dt: Duration, unscaled_dt: Duration) {
        let promoted = self.registry.promote();
        let tick = Tick {
            scaled: dt,
            unscaled: unscaled_dt,
            max_catch_up_firings: self.config.max_catch_up_firings,
        };

        for id in self.registry.active_ids() {
            let Some(mut task) = self.registry.checkout(id) else {
                continue;
            };

            let outcome = {
                let mut ctx = TaskContext::new(&mut self.registry, id);
                catch_unwind(AssertUnwindSafe(|| task.update(&mut ctx, &tick)))
            };
            let kind = task.kind();
            self.registry.checkin(id, task);

            let result = outcome.unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));
            if let Err(e) = result {
                let status = self.registry.status(id);
                error!(task = %id, ?kind, ?status, error = %e, "task failed; removing it");
                self.registry.mark_faulted(id);
            }
        }

        let swept = self.registry.sweep();
        self.tick += 1;

        if promoted > 0 || swept > 0 {
            debug!(
                tick = self.tick,
                promoted,
                swept,
                remaining = self.registry.len(),
                "scheduler tick"
            );
        }
    }

    /// Like [`Scheduler::advance`], taking host float seconds.
    ///
    /// Negative or non-finite deltas break the host contract; they are
    /// clamped to zero and logged instead of poisoning task timers.
    pub fn advance_secs(&mut self, dt: f64, unscaled_dt: f64) {
        let dt = clamp_delta(dt, "dt");
        let unscaled_dt = clamp_delta(unscaled_dt, "unscaled_dt");
        self.advance(dt, unscaled_dt);
    }
}

fn clamp_delta(secs: f64, name: &str) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => d,
        Err(_) => {
            warn!(delta = secs, "{name} must be finite and non-negative; using zero");
            Duration::ZERO
        }
    }
}
