//! Poll-style asynchronous operations.
//!
//! The scheduler never awaits anything. An [`AsyncOperation`] is polled once
//! per tick with a no-op waker and reports whether it has finished; whatever
//! machinery actually drives the work (a tokio runtime, an I/O thread, a
//! hand-written state machine) lives outside the scheduler.

use futures_util::task::noop_waker_ref;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Result of polling an [`AsyncOperation`] once.
#[derive(Debug)]
pub enum OperationPoll {
    /// Still running.
    Pending,
    /// Finished, successfully or not.
    Ready(anyhow::Result<()>),
}

impl OperationPoll {
    /// Returns `true` for [`OperationPoll::Ready`].
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Long-running work observed by the scheduler without blocking.
pub trait AsyncOperation: Send {
    /// Called once, on the first tick the owning task is updated.
    fn start(&mut self) {}

    /// Check for completion. Must not block.
    fn try_poll(&mut self) -> OperationPoll;

    /// Stop the underlying work. Called when the owning task is cancelled.
    fn cancel(&mut self) {}
}

/// Adapts any `Future` into an [`AsyncOperation`].
///
/// The future is polled in place, once per tick, so it only makes progress
/// on ticks. Futures that wait on external events (channels, timers on a
/// runtime) complete as soon as a tick observes them ready.
pub struct FutureOperation {
    future: Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>,
}

impl FutureOperation {
    /// Wrap a future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }
}

impl std::fmt::Debug for FutureOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureOperation").finish_non_exhaustive()
    }
}

impl AsyncOperation for FutureOperation {
    fn try_poll(&mut self) -> OperationPoll {
        let mut cx = Context::from_waker(noop_waker_ref());
        match self.future.as_mut().poll(&mut cx) {
            Poll::Pending => OperationPoll::Pending,
            Poll::Ready(result) => OperationPoll::Ready(result),
        }
    }
}

/// A spawned tokio task is observed through its join handle. Cancelling the
/// scheduler task aborts the tokio task.
impl<T> AsyncOperation for tokio::task::JoinHandle<T>
where
    T: Send + 'static,
{
    fn try_poll(&mut self) -> OperationPoll {
        let mut cx = Context::from_waker(noop_waker_ref());
        match Pin::new(self).poll(&mut cx) {
            Poll::Pending => OperationPoll::Pending,
            Poll::Ready(Ok(_)) => OperationPoll::Ready(Ok(())),
            Poll::Ready(Err(e)) => OperationPoll::Ready(Err(anyhow::Error::new(e))),
        }
    }

    fn cancel(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn ready_future_completes_on_first_poll() {
        let mut op = FutureOperation::new(async { Ok(()) });
        assert!(matches!(op.try_poll(), OperationPoll::Ready(Ok(()))));
    }

    #[test]
    fn failing_future_reports_error() {
        let mut op = FutureOperation::new(async { Err(anyhow::anyhow!("download failed")) });
        match op.try_poll() {
            OperationPoll::Ready(Err(e)) => assert_eq!(e.to_string(), "download failed"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn future_waits_on_channel() {
        let (tx, rx) = oneshot::channel::<u32>();
        let mut op = FutureOperation::new(async move {
            let value = rx.await?;
            anyhow::ensure!(value == 7, "unexpected value {value}");
            Ok(())
        });

        assert!(!op.try_poll().is_ready());
        assert!(!op.try_poll().is_ready());
        tx.send(7).unwrap();
        assert!(matches!(op.try_poll(), OperationPoll::Ready(Ok(()))));
    }

    #[tokio::test]
    async fn join_handle_reports_completion() {
        let (tx, rx) = oneshot::channel::<()>();
        let mut handle = tokio::spawn(async move {
            let _ = rx.await;
            5_u8
        });

        assert!(!handle.try_poll().is_ready());
        tx.send(()).unwrap();

        let mut ready = false;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if let OperationPoll::Ready(result) = handle.try_poll() {
                assert!(result.is_ok());
                ready = true;
                break;
            }
        }
        assert!(ready, "spawned task should finish");
    }

    #[tokio::test]
    async fn join_handle_cancel_aborts() {
        let mut handle = tokio::spawn(std::future::pending::<()>());
        handle.cancel();

        let mut aborted = false;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if let OperationPoll::Ready(result) = handle.try_poll() {
                let err = result.expect_err("aborted task reports an error");
                assert!(err.to_string().contains("cancelled"));
                aborted = true;
                break;
            }
        }
        assert!(aborted);
    }
}
