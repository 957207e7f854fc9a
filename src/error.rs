//! Error types for the frame scheduler.

/// Top-level error type for scheduler registration and configuration.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A registration argument was rejected (negative delay, zero interval).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Every task slot is in use.
    #[error("task capacity exhausted: at most {0} tasks can be alive at once")]
    CapacityExhausted(usize),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure raised by a single task during `advance`.
///
/// These never escape the scheduler; they are logged and the offending task
/// is removed.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task callback returned an error.
    #[error("callback failed: {0:#}")]
    Callback(#[source] anyhow::Error),

    /// The task callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),

    /// An observed asynchronous operation finished with an error. The task
    /// still completes; this is reported, not treated as a fault.
    #[error("async operation failed: {0:#}")]
    Operation(#[source] anyhow::Error),
}

impl TaskError {
    /// Build a [`TaskError::Panicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self::Panicked(msg)
    }
}
