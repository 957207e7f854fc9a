//! Re-entrant scheduler access for task callbacks.

use crate::error::Result;
use crate::scheduler::id::TaskId;
use crate::scheduler::operation::{AsyncOperation, FutureOperation};
use crate::scheduler::registry::Registry;
use crate::scheduler::tasks::{Repeat, Task, TaskStatus, TimeSource};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Handle passed to a task callback while the scheduler is advancing.
///
/// Work registered here lands in the pending list and is first updated on
/// the *next* tick, never the current one. Cancelling, pausing or resuming
/// the running task itself is allowed and takes effect immediately: an
/// interval that cancels itself stops firing within the same tick.
pub struct TaskContext<'a> {
    registry: &'a mut Registry,
    current: TaskId,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(registry: &'a mut Registry, current: TaskId) -> Self {
        Self { registry, current }
    }

    /// Id of the task whose callback is running.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.current
    }

    /// Status of any task, including this one.
    #[must_use]
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.registry.status(id)
    }

    /// Register a one-shot task firing after `delay` of scaled time.
    pub fn delay<F>(&mut self, delay: Duration, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.delay_with(delay, TimeSource::Scaled, callback)
    }

    /// Register a one-shot task firing after `delay` of the given time source.
    pub fn delay_with<F>(
        &mut self,
        delay: Duration,
        time_source: TimeSource,
        callback: F,
    ) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.registry
            .insert(Task::delayed(delay, time_source, Box::new(callback)))
    }

    /// Register a repeating task firing every `interval` of scaled time.
    pub fn interval<F>(&mut self, interval: Duration, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.interval_with(interval, Repeat::Forever, TimeSource::Scaled, callback)
    }

    /// Register a repeating task with explicit repeat count and time source.
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
        self.registry.insert(task)
    }

    /// Register a task that runs once on the next tick.
    pub fn next_tick<F>(&mut self, callback: F) -> Result<TaskId>
    where
        F: FnMut(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.registry.insert(Task::next_tick(Box::new(callback)))
    }

    /// Register an asynchronous operation to be polled once per tick.
    pub fn schedule_async<O>(&mut self, operation: O, token: &CancellationToken) -> Result<TaskId>
    where
        O: AsyncOperation + 'static,
    {
        self.registry
            .insert(Task::async_poll(Box::new(operation), token))
    }

    /// Register a future to be polled once per tick with a no-op waker.
    pub fn schedule_future<F>(&mut self, future: F, token: &CancellationToken) -> Result<TaskId>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.schedule_async(FutureOperation::new(future), token)
    }

    /// Cancel a task. See [`Scheduler::cancel`](super::Scheduler::cancel).
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.registry.cancel(id)
    }

    /// Pause a running task. See [`Scheduler::pause`](super::Scheduler::pause).
    pub fn pause(&mut self, id: TaskId) -> bool {
        self.registry.pause(id)
    }

    /// Resume a paused task. See [`Scheduler::resume`](super::Scheduler::resume).
    pub fn resume(&mut self, id: TaskId) -> bool {
        self.registry.resume(id)
    }

    pub(crate) fn current_status(&self) -> Option<TaskStatus> {
        self.registry.status(self.current)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.current_status() == Some(TaskStatus::Running)
    }

    /// Move the current task to `Completed` unless it is already terminal.
    pub(crate) fn complete(&mut self) {
        self.registry.finish(self.current, TaskStatus::Completed);
    }

    pub(crate) fn cancel_current(&mut self) {
        self.registry.finish(self.current, TaskStatus::Cancelled);
    }
}

impl std::fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
