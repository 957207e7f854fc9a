//! Task definitions and per-kind update logic.
//!
//! Defines [`TaskStatus`], the timing options ([`TimeSource`], [`Repeat`]),
//! and the closed [`Task`] enum whose variants each carry only their own
//! timing state. All variants are advanced through [`Task::update`].

use crate::error::{Result, SchedulerError, TaskError};
use crate::scheduler::context::TaskContext;
use crate::scheduler::operation::{AsyncOperation, OperationPoll};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Callback invoked when a task fires.
///
/// The context gives access to the scheduler from inside the callback, so
/// tasks can register follow-up work or cancel siblings.
pub type TaskCallback = Box<dyn FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send>;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Registered, waiting for the next tick to be promoted.
    Pending,
    /// Receiving time updates.
    Running,
    /// Promoted but not receiving time.
    Paused,
    /// Finished normally.
    Completed,
    /// Cancelled by the caller or by its cancellation token.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for `Completed` and `Cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which of the two tick deltas a timed task accumulates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    /// The host's scaled delta (affected by slow motion, pause menus, ...).
    #[default]
    Scaled,
    /// The raw delta, unaffected by time scaling.
    Unscaled,
}

impl TimeSource {
    fn select(self, tick: &Tick) -> Duration {
        match self {
            Self::Scaled => tick.scaled,
            Self::Unscaled => tick.unscaled,
        }
    }
}

/// How many times an interval task fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "count", rename_all = "snake_case")]
pub enum Repeat {
    /// Fire until cancelled.
    #[default]
    Forever,
    /// Fire this many times, then complete. `Times(0)` completes on its first
    /// tick without firing.
    Times(u32),
}

/// Negative counts mean "forever", matching the `-1` convention of frame
/// loop APIs.
impl From<i32> for Repeat {
    fn from(count: i32) -> Self {
        match u32::try_from(count) {
            Ok(n) => Self::Times(n),
            Err(_) => Self::Forever,
        }
    }
}

impl std::fmt::Display for Repeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forever => f.write_str("forever"),
            Self::Times(n) => write!(f, "{n} times"),
        }
    }
}

/// Discriminant of a [`Task`], used in snapshots and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fires once after a delay.
    Delayed,
    /// Fires repeatedly on a fixed period.
    Interval,
    /// Fires once on the next tick.
    NextTick,
    /// Polls an asynchronous operation.
    AsyncPoll,
}

/// Time supplied to every task for one `advance` call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tick {
    pub scaled: Duration,
    pub unscaled: Duration,
    pub max_catch_up_firings: Option<u32>,
}

/// Convert host float seconds into a `Duration`, rejecting negative and
/// non-finite input.
pub(crate) fn duration_from_secs(secs: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        SchedulerError::InvalidArgument(format!(
            "{what} must be a finite, non-negative number of seconds (got {secs})"
        ))
    })
}

/// A unit of deferred work.
pub(crate) enum Task {
    Delayed(DelayedTask),
    Interval(IntervalTask),
    NextTick(NextTickTask),
    AsyncPoll(AsyncPollTask),
}

pub(crate) struct DelayedTask {
    delay: Duration,
    elapsed: Duration,
    time_source: TimeSource,
    callback: TaskCallback,
}

pub(crate) struct IntervalTask {
    interval: Duration,
    elapsed: Duration,
    repeat: Repeat,
    executed: u32,
    /// Set while a capped catch-up backlog is being drained.
    capped: bool,
    time_source: TimeSource,
    callback: TaskCallback,
}

pub(crate) struct NextTickTask {
    has_run: bool,
    callback: TaskCallback,
}

pub(crate) struct AsyncPollTask {
    operation: Box<dyn AsyncOperation>,
    token: CancellationToken,
    started: bool,
}

impl Task {
    pub(crate) fn delayed(
        delay: Duration,
        time_source: TimeSource,
        callback: TaskCallback,
    ) -> Self {
        Self::Delayed(DelayedTask {
            delay,
            elapsed: Duration::ZERO,
            time_source,
            callback,
        })
    }

    pub(crate) fn interval(
        interval: Duration,
        repeat: Repeat,
        time_source: TimeSource,
        callback: TaskCallback,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidArgument(
                "interval must be greater than zero".to_owned(),
            ));
        }
        Ok(Self::Interval(IntervalTask {
            interval,
            elapsed: Duration::ZERO,
            repeat,
            executed: 0,
            capped: false,
            time_source,
            callback,
        }))
    }

    pub(crate) fn next_tick(callback: TaskCallback) -> Self {
        Self::NextTick(NextTickTask {
            has_run: false,
            callback,
        })
    }

    /// The task observes a child of `token`: tripping the caller's token
    /// cancels the task, while cancelling the task leaves the caller's token
    /// untouched.
    pub(crate) fn async_poll(
        operation: Box<dyn AsyncOperation>,
        token: &CancellationToken,
    ) -> Self {
        Self::AsyncPoll(AsyncPollTask {
            operation,
            token: token.child_token(),
            started: false,
        })
    }

    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            Self::Delayed(_) => TaskKind::Delayed,
            Self::Interval(_) => TaskKind::Interval,
            Self::NextTick(_) => TaskKind::NextTick,
            Self::AsyncPoll(_) => TaskKind::AsyncPoll,
        }
    }

    /// Called when the scheduler cancels the task from outside.
    pub(crate) fn on_cancel(&mut self) {
        if let Self::AsyncPoll(task) = self {
            task.token.cancel();
            task.operation.cancel();
        }
    }

    /// Advance this task by one tick.
    ///
    /// Status transitions go through `ctx`, which owns the task's slot while
    /// the task itself is checked out for the update.
    pub(crate) fn update(
        &mut self,
        ctx: &mut TaskContext<'_>,
        tick: &Tick,
    ) -> std::result::Result<(), TaskError> {
        match self {
            Self::Delayed(task) => task.update(ctx, tick),
            Self::Interval(task) => task.update(ctx, tick),
            Self::NextTick(task) => task.update(ctx),
            Self::AsyncPoll(task) => {
                task.update(ctx);
                Ok(())
            }
        }
    }
}

impl DelayedTask {
    fn update(
        &mut self,
        ctx: &mut TaskContext<'_>,
        tick: &Tick,
    ) -> std::result::Result<(), TaskError> {
        if !ctx.is_running() {
            return Ok(());
        }

        self.elapsed = self.elapsed.saturating_add(self.time_source.select(tick));
        if self.elapsed < self.delay {
            return Ok(());
        }

        let result = invoke(&mut self.callback, ctx);
        // Completed even when the callback failed.
        ctx.complete();
        result
    }
}

impl IntervalTask {
    fn update(
        &mut self,
        ctx: &mut TaskContext<'_>,
        tick: &Tick,
    ) -> std::result::Result<(), TaskError> {
        if !ctx.is_running() {
            return Ok(());
        }

        if self.repeat == Repeat::Times(0) {
            ctx.complete();
            return Ok(());
        }

        self.elapsed = self.elapsed.saturating_add(self.time_source.select(tick));

        let mut fired: u32 = 0;
        while self.elapsed >= self.interval {
            if let Some(cap) = tick.max_catch_up_firings
                && fired >= cap
            {
                let owed = u64::try_from(self.elapsed.as_nanos() / self.interval.as_nanos())
                    .unwrap_or(u64::MAX);
                if self.capped {
                    debug!(task = %ctx.id(), cap, owed, "still draining capped catch-up");
                } else {
                    self.capped = true;
                    warn!(
                        task = %ctx.id(),
                        cap,
                        owed,
                        "interval catch-up capped; deferring remaining firings"
                    );
                }
                break;
            }

            self.elapsed -= self.interval;
            self.executed = self.executed.saturating_add(1);
            fired += 1;
            invoke(&mut self.callback, ctx)?;

            if let Repeat::Times(n) = self.repeat
                && self.executed >= n
            {
                ctx.complete();
                break;
            }

            // The callback may have cancelled or paused its own task.
            if !ctx.is_running() {
                break;
            }
        }

        if self.elapsed < self.interval {
            self.capped = false;
        }
        if fired > 1 {
            debug!(task = %ctx.id(), fired, "interval caught up");
        }
        Ok(())
    }
}

impl NextTickTask {
    fn update(&mut self, ctx: &mut TaskContext<'_>) -> std::result::Result<(), TaskError> {
        if self.has_run || !ctx.is_running() {
            return Ok(());
        }

        self.has_run = true;
        let result = invoke(&mut self.callback, ctx);
        ctx.complete();
        result
    }
}

impl AsyncPollTask {
    fn update(&mut self, ctx: &mut TaskContext<'_>) {
        match ctx.current_status() {
            Some(TaskStatus::Running | TaskStatus::Paused) => {}
            _ => return,
        }

        if self.token.is_cancelled() {
            self.operation.cancel();
            ctx.cancel_current();
            debug!(task = %ctx.id(), "async operation cancelled by token");
            return;
        }

        if !ctx.is_running() {
            return;
        }

        if !self.started {
            self.started = true;
            self.operation.start();
        }

        match self.operation.try_poll() {
            OperationPoll::Pending => {}
            OperationPoll::Ready(Ok(())) => ctx.complete(),
            OperationPoll::Ready(Err(e)) => {
                let error = TaskError::Operation(e);
                warn!(task = %ctx.id(), %error, "async task completed with an error");
                ctx.complete();
            }
        }
    }
}

/// Run a callback behind a per-call error boundary.
fn invoke(
    callback: &mut TaskCallback,
    ctx: &mut TaskContext<'_>,
) -> std::result::Result<(), TaskError> {
    match catch_unwind(AssertUnwindSafe(|| callback(ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TaskError::Callback(e)),
        Err(payload) => Err(TaskError::from_panic(payload)),
    }
}
