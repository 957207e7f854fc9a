//! Frame scheduler: cooperative, tick-driven task scheduling.
//!
//! Calling code registers deferred, repeating, next-tick and asynchronous
//! work; the host advances all of it once per tick (typically once per
//! rendered frame):
//!
//! Host tick → [`Scheduler::advance`] → promote pending → update active → sweep
//!
//! # Architecture
//!
//! - **Tasks**: a closed enum of four kinds (delayed, interval, next-tick,
//!   async-poll), each owning its own timing state and callback
//! - **Registry**: a generational arena of active tasks plus a pending list;
//!   work registered during a tick is first updated on the following tick
//! - **Scheduler**: the façade for registration, control and introspection
//! - **TickDriver**: an optional tokio loop calling `advance` at a fixed rate
//!
//! Everything runs on the thread that calls `advance`. Nothing blocks; async
//! work is polled, not awaited.

pub mod config;
pub mod driver;
pub mod error;
pub mod scheduler;

pub use config::{DriverConfig, SchedulerConfig};
pub use driver::TickDriver;
pub use error::{Result, SchedulerError, TaskError};
pub use scheduler::{
    AsyncOperation, FutureOperation, OperationPoll, Repeat, Scheduler, SchedulerSnapshot,
    TaskContext, TaskId, TaskInfo, TaskKind, TaskStatus, TimeSource,
};
