//! The typed event stream, spec §4.I.
use kapply_client::poller::StatusEvent;
use kapply_core::{id::ObjectId, inventory::Reconcile};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::wait::WaitOutcome;

/// Which high-level action a task belongs to, carried on every event so
/// consumers can group without re-deriving it from the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// An inventory read/write task.
    Inventory,
    /// An `Apply` task.
    Apply,
    /// A `Prune` task.
    Prune,
    /// A `Wait` task.
    Wait,
    /// A `ResetMapper` task.
    Mapper,
}

/// Whether a single object's apply/prune attempt succeeded, was skipped by
/// a filter, or failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuationOutcome {
    /// The request succeeded.
    Succeeded,
    /// A filter vetoed the object; carries the filter's name and message.
    Skipped {
        /// The filter that produced the skip.
        filter: String,
        /// A human-readable reason.
        reason: String,
    },
    /// The request failed with a fatal error.
    Failed(String),
}

/// One object's apply outcome within an `Apply` task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyEvent {
    /// The object applied.
    pub id: ObjectId,
    /// The outcome.
    pub outcome: ActuationOutcome,
}

/// One object's prune outcome within a `Prune` task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneEvent {
    /// The object pruned.
    pub id: ObjectId,
    /// The outcome.
    pub outcome: ActuationOutcome,
}

/// One object's reconcile outcome within a `Wait` task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEvent {
    /// The object being waited on.
    pub id: ObjectId,
    /// The reconcile result.
    pub reconcile: Reconcile,
}

/// The typed envelope consumed by the caller, spec §4.I.
///
/// Events are emitted strictly in the order operations occur on a
/// single-producer channel; per-object `ApplyEvent`/`PruneEvent`s for an id
/// always precede any `WaitEvent` that reports that id's reconcile status.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The run has begun.
    Init,
    /// One object's apply outcome.
    Apply(ApplyEvent),
    /// One object's prune outcome.
    Prune(PruneEvent),
    /// One object's reconcile outcome.
    Wait(WaitEvent),
    /// A raw status observation forwarded from the poller.
    Status(StatusEvent),
    /// A wait task's terminal outcome (used for logging/metrics; per-object
    /// detail still arrives as [`Event::Wait`]).
    WaitOutcome {
        /// The task's name.
        task: String,
        /// How the wait task ended.
        outcome: WaitOutcome,
    },
    /// A fatal error aborted the run.
    Error(String),
    /// A task group (one queue entry) started.
    ActionGroupStart {
        /// The task's name.
        task: String,
        /// Which action this task performs.
        action: Action,
        /// The identities this task covers.
        ids: Vec<ObjectId>,
    },
    /// A task group finished.
    ActionGroupFinish {
        /// The task's name.
        task: String,
        /// Which action this task performed.
        action: Action,
    },
    /// The run was cancelled before the queue finished.
    Cancelled,
}

/// The sending half of the event stream; cheaply `Clone`, safe to hand to
/// tasks that outlive the runner's own stack frame.
#[derive(Clone)]
pub struct EventSender(UnboundedSender<Event>);

impl EventSender {
    /// Publish `event`. Silently dropped if the receiver is gone.
    pub fn send(&self, event: Event) {
        let _ = self.0.send(event);
    }
}

/// The receiving half of the event stream, handed back to the caller.
pub struct EventReceiver(UnboundedReceiver<Event>);

impl EventReceiver {
    /// Await the next event, or `None` once the sender side is dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.0.recv().await
    }
}

/// Build a fresh, unbounded event channel (spec SPEC_FULL "Event stream
/// backpressure": unbounded so a slow consumer never blocks task execution
/// or reorders events).
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), EventReceiver(rx))
}
