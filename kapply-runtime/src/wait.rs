//! The wait / poll engine, spec §4.H.
use std::{collections::HashSet, time::Duration};

use kapply_client::poller::{LiveStatus, StatusEvent, StatusPoller};
use kapply_core::{id::ObjectId, inventory::Reconcile};
use tracing::{debug, instrument, warn};

use crate::{
    context::TaskContext,
    events::{Event, WaitEvent},
};

/// The reconcile condition a [`WaitTask`] blocks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Every id's live status is `Current`.
    AllCurrent,
    /// Every id's live status is `NotFound`.
    AllNotFound,
}

impl Condition {
    fn satisfied_by(self, status: LiveStatus) -> bool {
        match self {
            Condition::AllCurrent => status == LiveStatus::Current,
            Condition::AllNotFound => status == LiveStatus::NotFound,
        }
    }
}

/// One object that was still pending when a [`WaitTask`]'s deadline fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutResource {
    /// The object that never reached the awaited condition.
    pub id: ObjectId,
    /// The last observed status, if any event ever arrived for it.
    pub last_status: Option<LiveStatus>,
    /// The last observed message, if any.
    pub last_message: Option<String>,
}

/// Structured timeout detail, spec §4.H / §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutError {
    /// The configured deadline.
    pub timeout: Duration,
    /// The condition that was never satisfied for every id.
    pub condition: Condition,
    /// Every id this wait task was watching.
    pub identifiers: Vec<ObjectId>,
    /// The subset still pending when the deadline fired.
    pub timed_out_resources: Vec<TimedOutResource>,
}

/// How a [`WaitTask`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every watched id reached `condition`.
    Succeeded,
    /// The deadline fired before every id reached `condition`.
    TimedOut(TimeoutError),
    /// The run was cancelled while this task was waiting.
    Cancelled,
}

/// Blocks until every watched id reaches `condition`, or `timeout` fires.
///
/// Per the design notes (§9 Async), this is the only real asynchrony in the
/// engine: a single subscriber loop over one poller-provided channel, not
/// one coroutine per watched object.
pub struct WaitTask {
    ids: Vec<ObjectId>,
    condition: Condition,
    timeout: Duration,
    emit_status_events: bool,
}

impl WaitTask {
    /// Build a wait task over `ids`, blocking for up to `timeout` for
    /// `condition` to hold for all of them.
    pub fn new(ids: Vec<ObjectId>, condition: Condition, timeout: Duration) -> Self {
        Self {
            ids,
            condition,
            timeout,
            emit_status_events: false,
        }
    }

    /// Forward every raw poller observation as [`Event::Status`] in
    /// addition to the derived [`Event::Wait`] settlements (spec §6
    /// `Options.EmitStatusEvents`).
    pub fn with_status_events(mut self, emit: bool) -> Self {
        self.emit_status_events = emit;
        self
    }

    /// Run the wait to completion, publishing a [`Event::Wait`] for every
    /// id as it settles.
    #[instrument(skip(self, context, poller), fields(condition = ?self.condition, ids = self.ids.len()))]
    pub async fn await_result(&self, context: &TaskContext, poller: &dyn StatusPoller) -> WaitOutcome {
        let mut pending: HashSet<ObjectId> = HashSet::new();
        let mut last_seen: std::collections::HashMap<ObjectId, (LiveStatus, Option<String>)> = std::collections::HashMap::new();

        for id in &self.ids {
            match context.inventory_manager().object_status(id).map(|s| s.actuation) {
                Some(kapply_core::inventory::Actuation::Skipped) => self.settle(context, id, Reconcile::Skipped),
                Some(kapply_core::inventory::Actuation::Failed) => self.settle(context, id, Reconcile::Failed),
                _ => {
                    pending.insert(id.clone());
                }
            }
        }

        if pending.is_empty() {
            return WaitOutcome::Succeeded;
        }

        let watch_list: Vec<ObjectId> = pending.iter().cloned().collect();
        let mut receiver = poller.watch(&watch_list);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let cancelled = context.cancellation();

        loop {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    warn!(remaining = pending.len(), "wait task cancelled");
                    for id in &pending {
                        self.settle(context, id, Reconcile::Skipped);
                    }
                    return WaitOutcome::Cancelled;
                }
                () = &mut deadline => {
                    let timed_out_resources = pending
                        .iter()
                        .map(|id| {
                            let (status, message) = last_seen.get(id).cloned().unzip();
                            TimedOutResource { id: id.clone(), last_status: status, last_message: message.flatten() }
                        })
                        .collect();
                    for id in &pending {
                        self.settle(context, id, Reconcile::Timeout);
                    }
                    return WaitOutcome::TimedOut(TimeoutError {
                        timeout: self.timeout,
                        condition: self.condition,
                        identifiers: self.ids.clone(),
                        timed_out_resources,
                    });
                }
                event = receiver.recv() => {
                    match event {
                        Some(event) => self.handle_event(context, &mut pending, &mut last_seen, event),
                        None => {
                            debug!("status poller channel closed before all objects settled");
                            continue;
                        }
                    }
                    if pending.is_empty() {
                        return WaitOutcome::Succeeded;
                    }
                }
            }
        }
    }

    fn handle_event(
        &self,
        context: &TaskContext,
        pending: &mut HashSet<ObjectId>,
        last_seen: &mut std::collections::HashMap<ObjectId, (LiveStatus, Option<String>)>,
        event: StatusEvent,
    ) {
        if !pending.contains(&event.id) {
            return;
        }
        if self.emit_status_events {
            context.send_event(Event::Status(event.clone()));
        }
        last_seen.insert(event.id.clone(), (event.status, event.message.clone()));
        match event.status {
            LiveStatus::InProgress | LiveStatus::Unknown => {}
            LiveStatus::Failed => {
                pending.remove(&event.id);
                self.settle(context, &event.id, Reconcile::Failed);
            }
            status if self.condition.satisfied_by(status) => {
                pending.remove(&event.id);
                self.settle(context, &event.id, Reconcile::Succeeded);
            }
            _ => {}
        }
    }

    fn settle(&self, context: &TaskContext, id: &ObjectId, reconcile: Reconcile) {
        if let Some(mut status) = context.inventory_manager().object_status(id) {
            status.reconcile = reconcile;
            context.inventory_manager().set_object_status(status);
        }
        context.send_event(Event::Wait(WaitEvent { id: id.clone(), reconcile }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use kapply_core::id::ObjectRef;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct FakePoller {
        events: std::sync::Mutex<Option<Vec<StatusEvent>>>,
    }

    impl StatusPoller for FakePoller {
        fn watch(&self, _ids: &[ObjectId]) -> UnboundedReceiver<StatusEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            let events = self.events.lock().unwrap().take().unwrap_or_default();
            for event in events {
                tx.send(event).unwrap();
            }
            rx
        }
    }

    fn context_pending_on(id: &ObjectId) -> TaskContext {
        let graph = DependencyGraph::build(&[]).unwrap();
        let ctx = TaskContext::new(graph, "team-a");
        ctx.inventory_manager().add_pending_apply(ObjectRef::new(id.clone(), "v1"));
        ctx
    }

    #[tokio::test]
    async fn succeeds_once_current_is_observed() {
        let id = ObjectId::namespaced("apps", "Deployment", "ns", "api");
        let ctx = context_pending_on(&id);
        let poller = FakePoller {
            events: std::sync::Mutex::new(Some(vec![StatusEvent { id: id.clone(), status: LiveStatus::Current, message: None }])),
        };
        let task = WaitTask::new(vec![id.clone()], Condition::AllCurrent, Duration::from_secs(5));
        let outcome = task.await_result(&ctx, &poller).await;
        assert_eq!(outcome, WaitOutcome::Succeeded);
        assert_eq!(ctx.inventory_manager().object_status(&id).unwrap().reconcile, Reconcile::Succeeded);
    }

    #[tokio::test]
    async fn transient_statuses_leave_object_pending_until_timeout() {
        let id = ObjectId::namespaced("apps", "Deployment", "ns", "api");
        let ctx = context_pending_on(&id);
        let poller = FakePoller {
            events: std::sync::Mutex::new(Some(vec![StatusEvent { id: id.clone(), status: LiveStatus::InProgress, message: None }])),
        };
        let task = WaitTask::new(vec![id.clone()], Condition::AllCurrent, Duration::from_millis(20));
        let outcome = task.await_result(&ctx, &poller).await;
        assert!(matches!(outcome, WaitOutcome::TimedOut(_)));
        assert_eq!(ctx.inventory_manager().object_status(&id).unwrap().reconcile, Reconcile::Timeout);
    }

    #[tokio::test]
    async fn skipped_actuation_is_treated_as_already_done() {
        let id = ObjectId::namespaced("apps", "Deployment", "ns", "api");
        let ctx = context_pending_on(&id);
        let mut status = ctx.inventory_manager().object_status(&id).unwrap();
        status.actuation = kapply_core::inventory::Actuation::Skipped;
        ctx.inventory_manager().set_object_status(status);
        let poller = FakePoller { events: std::sync::Mutex::new(Some(vec![])) };
        let task = WaitTask::new(vec![id.clone()], Condition::AllCurrent, Duration::from_secs(5));
        let outcome = task.await_result(&ctx, &poller).await;
        assert_eq!(outcome, WaitOutcome::Succeeded);
        assert_eq!(ctx.inventory_manager().object_status(&id).unwrap().reconcile, Reconcile::Skipped);
    }
}
