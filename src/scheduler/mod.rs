//! Cooperative, tick-driven task scheduler.
//!
//! Registers delayed, repeating, next-tick and asynchronous work and
//! advances all of it once per host tick (usually once per frame).

pub mod context;
pub mod id;
pub mod operation;
mod registry;
pub mod runner;
pub mod tasks;

pub use context::TaskContext;
pub use id::TaskId;
pub use operation::{AsyncOperation, FutureOperation, OperationPoll};
pub use runner::{Scheduler, SchedulerSnapshot, TaskInfo};
pub use tasks::{Repeat, TaskCallback, TaskKind, TaskStatus, TimeSource};
