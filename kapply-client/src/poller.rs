//! The status-polling contract the wait engine subscribes to.
//!
//! Spec §4.H describes this as "an external collaborator exposing a lazy
//! sequence of `(id, status, message)` events per watched object". Per the
//! design notes (§9 Async), the wait engine is the only real asynchrony in
//! the core, and it is implemented as a single inbox channel per wait task
//! rather than one coroutine per watched object — so the contract here is
//! just "give me a channel of events for these ids", not a `Stream` per id.
use kapply_core::id::ObjectId;
use tokio::sync::mpsc::UnboundedReceiver;

/// The live status of a single watched object, as observed by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveStatus {
    /// The object has reconciled to its desired state.
    Current,
    /// The object exists but has not yet reconciled.
    InProgress,
    /// The object's controller reported an unrecoverable error.
    Failed,
    /// The object does not exist (or no longer exists).
    NotFound,
    /// The poller could not determine a status (e.g. a watch desync).
    Unknown,
}

/// One status observation, emitted by a [`StatusPoller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Which object this observation is about.
    pub id: ObjectId,
    /// The observed status.
    pub status: LiveStatus,
    /// An optional human-readable message (e.g. a condition's `message`).
    pub message: Option<String>,
}

/// A source of [`StatusEvent`]s for a batch of identities.
///
/// A single call to [`watch`](StatusPoller::watch) should emit events for
/// every id in `ids`, repeating as the object's status changes, until the
/// returned receiver is dropped.
pub trait StatusPoller: Send + Sync {
    /// Begin watching `ids`, returning a channel of status observations.
    fn watch(&self, ids: &[ObjectId]) -> UnboundedReceiver<StatusEvent>;
}
