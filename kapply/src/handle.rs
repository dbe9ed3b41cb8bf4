//! The handle returned by [`crate::Applier::run`] / [`crate::Destroyer::run`].
use kapply_runtime::{Event, EventReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// A running queue: the event stream plus the means to cancel or join it.
///
/// Mirrors how `kube_runtime::Controller` hands back a `Stream` the caller
/// drives independently of the reconciler task itself — here the queue runs
/// on its own spawned task while the caller drains [`RunHandle::recv`].
pub struct RunHandle {
    events: EventReceiver,
    cancellation: CancellationToken,
    task: JoinHandle<Result<(), kapply_runtime::RunError>>,
}

impl RunHandle {
    pub(crate) fn new(events: EventReceiver, cancellation: CancellationToken, task: JoinHandle<Result<(), kapply_runtime::RunError>>) -> Self {
        Self { events, cancellation, task }
    }

    /// Await the next event, or `None` once the run has finished and every
    /// event has been drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Request cancellation. In-flight RPCs and wait tasks observe this at
    /// their next suspension point; already-completed tasks are unaffected.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await the run's terminal result.
    ///
    /// Callers that only want the final outcome, not the event stream, can
    /// call this directly; callers draining [`Self::recv`] to exhaustion
    /// should call this afterwards to pick up the run's `Result`.
    pub async fn join(self) -> Result<(), Error> {
        match self.task.await {
            Ok(result) => Ok(result?),
            Err(join_err) => Err(Error::Run(kapply_runtime::RunError::Fatal(format!("runner task panicked: {join_err}")))),
        }
    }
}
