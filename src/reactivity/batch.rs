// ============================================================================
// spark-state - Deferred Batches
//
// A Batch is the notification work of one SharedState::update, captured when
// update was called. Awaiting it runs every captured listener and resolves to
// the pass report. Attach/detach calls made after the capture do not change
// what the batch runs. A batch that is dropped before it ran runs at drop, so
// every update reaches its listeners exactly once.
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::core::types::NotifyReport;

// =============================================================================
// BATCH
// =============================================================================

/// Pending notification of one update.
///
/// Listeners run when the batch is polled, on the polling thread. A batch
/// that is dropped without having been driven runs on the dropping thread
/// instead, so `let _ = state.update(x);` still notifies. The value change
/// itself was already committed by `update`.
///
/// # Example
///
/// ```
/// use spark_state::shared_state;
///
/// let state = shared_state(1);
/// let _handle = state.attach(|current, previous| {
///     println!("{previous:?} -> {current:?}");
/// });
///
/// let batch = state.update(2);
/// assert_eq!(state.value(), Some(2)); // committed before the batch runs
///
/// let report = batch.wait();
/// assert_eq!(report.notified(), 1);
/// ```
#[must_use = "dropping a batch runs it immediately and discards its report"]
pub struct Batch {
    // None once the pass has run
    work: Option<BoxFuture<'static, NotifyReport>>,
}

impl Batch {
    pub(crate) fn new(work: impl Future<Output = NotifyReport> + Send + 'static) -> Self {
        Self {
            work: Some(work.boxed()),
        }
    }

    /// Drive the batch to completion on the current thread.
    ///
    /// Safe to call from inside a listener of another batch.
    pub fn wait(mut self) -> NotifyReport {
        match self.work.take() {
            Some(work) => drive(work),
            None => NotifyReport::default(),
        }
    }
}

// The pass never yields, so a single poll finishes it without entering an
// executor. block_on only covers a future that does return Pending.
fn drive(mut work: BoxFuture<'static, NotifyReport>) -> NotifyReport {
    match (&mut work).now_or_never() {
        Some(report) => report,
        None => futures::executor::block_on(work),
    }
}

impl Future for Batch {
    type Output = NotifyReport;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(work) = self.work.as_mut() else {
            panic!("Batch polled after completion");
        };
        let report = ready!(work.as_mut().poll(cx));
        self.work = None;
        Poll::Ready(report)
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if let Some(work) = self.work.take() {
            tracing::trace!("batch dropped before running, notifying now");
            drive(work);
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("pending", &self.work.is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
