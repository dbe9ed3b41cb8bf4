//! The task runner, spec §4.G.
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use kapply_client::{
    client::{ApplyOptions, ClientError, DeleteOptions, DynamicApi},
    inventory::{InventoryClient, InventoryError, InventoryInfo},
    poller::StatusPoller,
};
use kapply_core::{
    id::ObjectId,
    inventory::{Actuation, ObjectStatus, Reconcile, Strategy},
    object::Object,
    policy::{DryRunStrategy, Policy, PrunePropagationPolicy},
};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::{
    context::TaskContext,
    events::{Action, ActuationOutcome, ApplyEvent, Event, PruneEvent},
    filter::{self, ApplyFilter, ApplyFilterInput, FilterError, PruneFilter, PruneFilterInput, SkipReason},
    mutate::{ApplyTimeMutator, MutateError, Mutator},
    task::{Task, TaskKind},
    wait::WaitTask,
};

/// Failures that stop the runner from dequeuing further tasks (spec §7
/// `FatalError{cause}`).
#[derive(Debug, Error)]
pub enum RunError {
    /// The dynamic transport failed.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The inventory backend failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// A mutator failed to resolve an apply-time-mutation reference.
    #[error(transparent)]
    Mutate(#[from] MutateError),
    /// A filter reported a fatal (non-skip) condition, or any other
    /// unexpected invariant violation.
    #[error("{0}")]
    Fatal(String),
}

impl From<FilterError> for RunError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Fatal(message) => RunError::Fatal(message),
            FilterError::Skip(reason) => RunError::Fatal(format!("unexpected skip surfaced as fatal: {reason:?}")),
        }
    }
}

/// The filter that owns each [`SkipReason`] variant, spec §4.D's pipeline
/// tables, used to populate [`ActuationOutcome::Skipped`]'s `filter` field.
fn skip_outcome(reason: SkipReason) -> ActuationOutcome {
    let filter = match &reason {
        SkipReason::ApplyPreventedDeletion { .. } => "CurrentUidFilter",
        SkipReason::PolicyPrevented { .. } => "InventoryPolicyFilter",
        SkipReason::AnnotationPreventedDeletion { .. } => "PreventRemoveFilter",
        SkipReason::AnnotationPreventedUpdate { .. } => "PreventUpdateFilter",
        SkipReason::NamespaceInUse { .. } => "LocalNamespacesFilter",
        SkipReason::DependencyPreventedActuation { .. } => "DependencyFilter",
    };
    ActuationOutcome::Skipped { filter: filter.to_string(), reason: format!("{reason:?}") }
}

/// Tunables the runner needs that the solver does not (transport-facing
/// options; the solver only needs scheduling-facing ones).
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Use server-side apply for every `Apply` request.
    pub server_side: bool,
    /// Force a server-side apply through ownership conflicts.
    pub force_conflicts: bool,
    /// The field manager identity to apply under.
    pub field_manager: Option<String>,
    /// How deletes should propagate to owned dependents.
    pub propagation_policy: PrunePropagationPolicy,
    /// Whether, and how, this run should avoid mutating the live cluster.
    pub dry_run: DryRunStrategy,
    /// The inventory ownership policy filters enforce.
    pub policy: Policy,
    /// Forward raw poller observations on the event stream in addition to
    /// the derived per-object apply/prune/wait events.
    pub emit_status_events: bool,
}

/// Executes one solver-built queue against injected collaborators, spec
/// §4.G. Owns the run's [`TaskContext`] and the fixed filter/mutator
/// pipelines; every suspension point (RPC, wait-task) observes
/// `context.cancellation()`.
pub struct TaskRunner {
    context: TaskContext,
    desired: HashMap<ObjectId, Object>,
    api: std::sync::Arc<dyn DynamicApi>,
    poller: std::sync::Arc<dyn StatusPoller>,
    inventory_client: std::sync::Arc<dyn InventoryClient>,
    inventory_info: InventoryInfo,
    options: RunnerOptions,
    mutators: Vec<Box<dyn Mutator>>,
    apply_filters: Vec<Box<dyn ApplyFilter>>,
    prune_filters: Vec<Box<dyn PruneFilter>>,
    newly_applied_uids: Mutex<HashSet<String>>,
    desired_namespaces: HashSet<String>,
}

impl TaskRunner {
    /// Build a runner for one apply/prune run.
    ///
    /// `desired` must contain every object any `Apply` task in the queue
    /// will reference; the solver only carries identities, not payloads.
    pub fn new(
        context: TaskContext,
        desired: Vec<Object>,
        api: std::sync::Arc<dyn DynamicApi>,
        poller: std::sync::Arc<dyn StatusPoller>,
        inventory_client: std::sync::Arc<dyn InventoryClient>,
        inventory_info: InventoryInfo,
        options: RunnerOptions,
    ) -> Self {
        let desired_namespaces = desired.iter().map(|o| o.id().namespace.clone()).filter(|ns| !ns.is_empty()).collect();
        let desired = desired.into_iter().map(|o| (o.id().clone(), o)).collect();
        Self {
            context,
            desired,
            api,
            poller,
            inventory_client,
            inventory_info,
            options,
            mutators: vec![Box::new(ApplyTimeMutator)],
            apply_filters: filter::apply_pipeline(),
            prune_filters: filter::prune_pipeline(),
            newly_applied_uids: Mutex::new(HashSet::new()),
            desired_namespaces,
        }
    }

    /// The run's shared state, for the caller to inspect after `run`
    /// returns (or to read the final inventory via
    /// [`crate::context::InventoryManager::snapshot`]).
    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Drive `tasks` to completion, spec §4.G's event loop.
    ///
    /// On success, every queued task ran (or was intentionally gated by
    /// dry-run). On a fatal error, remaining `Apply`/`Prune`/`Wait`/
    /// `ResetMapper` tasks are drained with `Skipped` events, but any
    /// remaining inventory task still executes, so the final state is
    /// still recorded (spec §7).
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn run(&self, tasks: Vec<Task>) -> Result<(), RunError> {
        self.context.send_event(Event::Init);

        let mut iter = tasks.into_iter();
        while let Some(task) = iter.next() {
            if self.context.is_cancelled() {
                self.context.send_event(Event::Cancelled);
                return Ok(());
            }

            self.context.send_event(Event::ActionGroupStart {
                task: task.name.clone(),
                action: task.action(),
                ids: task.identifiers().to_vec(),
            });
            let action = task.action();
            let result = self.run_one(&task).await;
            self.context.send_event(Event::ActionGroupFinish { task: task.name.clone(), action });

            if let Err(err) = result {
                warn!(task = %task.name, error = %err, "fatal error, draining remaining queue");
                self.context.send_event(Event::Error(err.to_string()));
                self.drain(iter).await;
                return Err(err);
            }

            if self.context.is_cancelled() {
                self.context.send_event(Event::Cancelled);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn drain(&self, remaining: impl Iterator<Item = Task>) {
        for task in remaining {
            match &task.kind {
                TaskKind::InvAdd | TaskKind::InvSet => {
                    if let Err(err) = self.store_inventory().await {
                        warn!(task = %task.name, error = %err, "final inventory write failed during drain");
                    }
                }
                TaskKind::InvDelete => {
                    if let Err(err) = self.settle_inv_delete().await {
                        warn!(task = %task.name, error = %err, "inventory delete/store failed during drain");
                    }
                }
                _ => {
                    self.context.send_event(Event::ActionGroupStart {
                        task: task.name.clone(),
                        action: task.action(),
                        ids: task.identifiers().to_vec(),
                    });
                    for id in task.identifiers() {
                        self.mark_skipped(id, "drained after fatal error");
                    }
                    self.context.send_event(Event::ActionGroupFinish { task: task.name.clone(), action: task.action() });
                }
            }
        }
    }

    fn mark_skipped(&self, id: &ObjectId, reason: &str) {
        if let Some(mut status) = self.context.inventory_manager().object_status(id) {
            let still_pending = matches!(status.actuation, Actuation::Pending);
            if still_pending {
                status.actuation = Actuation::Skipped;
            }
            if matches!(status.reconcile, Reconcile::Pending) {
                status.reconcile = Reconcile::Skipped;
            }
            self.context.inventory_manager().set_object_status(status);
        }
        let _ = reason;
    }

    async fn run_one(&self, task: &Task) -> Result<(), RunError> {
        match &task.kind {
            TaskKind::InvAdd | TaskKind::InvSet => self.store_inventory().await,
            TaskKind::InvDelete => self.settle_inv_delete().await,
            TaskKind::ResetMapper => {
                self.api.reset_mapper();
                Ok(())
            }
            TaskKind::Apply(ids) => self.run_apply_batch(ids).await,
            TaskKind::Prune(ids) => self.run_prune_batch(ids).await,
            TaskKind::Wait(ids, condition, timeout) => self.run_wait(&task.name, ids.clone(), *condition, *timeout).await,
        }
    }

    async fn store_inventory(&self) -> Result<(), RunError> {
        let inventory = self.context.inventory_manager().snapshot();
        self.inventory_client.store(&self.inventory_info, &inventory, self.options.dry_run).await?;
        Ok(())
    }

    async fn delete_inventory(&self) -> Result<(), RunError> {
        self.inventory_client.delete(&self.inventory_info, self.options.dry_run).await?;
        Ok(())
    }

    /// `destroy`'s final inventory task (spec §4.E step 9): delete the
    /// inventory's backing object outright if every tracked object was
    /// successfully pruned, otherwise fall back to storing the inventory so
    /// the surviving (failed/skipped) entries are still recorded.
    async fn settle_inv_delete(&self) -> Result<(), RunError> {
        if self.context.inventory_manager().all_deletes_succeeded() {
            self.delete_inventory().await
        } else {
            self.store_inventory().await
        }
    }

    async fn run_wait(&self, name: &str, ids: Vec<ObjectId>, condition: crate::wait::Condition, timeout: std::time::Duration) -> Result<(), RunError> {
        let task = WaitTask::new(ids, condition, timeout).with_status_events(self.options.emit_status_events);
        let outcome = task.await_result(&self.context, self.poller.as_ref()).await;
        self.context.send_event(Event::WaitOutcome { task: name.to_string(), outcome });
        Ok(())
    }

    async fn run_apply_batch(&self, ids: &[ObjectId]) -> Result<(), RunError> {
        for id in ids {
            let outcome = self.apply_one(id).await?;
            self.context.send_event(Event::Apply(ApplyEvent { id: id.clone(), outcome }));
        }
        Ok(())
    }

    async fn apply_one(&self, id: &ObjectId) -> Result<ActuationOutcome, RunError> {
        let Some(desired) = self.desired.get(id) else {
            return Err(RunError::Fatal(format!("apply task referenced unknown object {id}")));
        };
        let mut object = desired.clone();

        for mutator in &self.mutators {
            match mutator.mutate(&mut object, &self.context) {
                Ok(_) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let live = self.api.get_metadata(id).await?;
        let newly_applied = self.newly_applied_uids.lock().expect("uid set mutex poisoned");
        let input = ApplyFilterInput {
            desired: &object,
            live: live.as_ref(),
            inventory_id: &self.inventory_info.id,
            policy: self.options.policy,
            newly_applied_uids: &newly_applied,
        };
        let verdict = filter::run_apply_pipeline(&self.apply_filters, &input, &self.context);
        drop(newly_applied);

        if let Err(err) = verdict {
            return self.settle_apply_skip(id, err);
        }

        if self.options.dry_run.is_client_side() {
            self.settle_apply(id, Actuation::Succeeded, None);
            return Ok(ActuationOutcome::Succeeded);
        }

        let apply_options = ApplyOptions {
            server_side: self.options.server_side,
            force_conflicts: self.options.force_conflicts,
            field_manager: self.options.field_manager.clone(),
            server_dry_run: self.options.dry_run.is_server_side(),
        };

        match self.api.apply(&object, &apply_options).await {
            Ok(live_object) => {
                if let Some(uid) = live_object.uid() {
                    self.newly_applied_uids.lock().expect("uid set mutex poisoned").insert(uid.to_string());
                }
                let uid = live_object.uid().map(str::to_string);
                self.context.inventory_manager().record_live_object(live_object);
                self.settle_apply(id, Actuation::Succeeded, uid);
                Ok(ActuationOutcome::Succeeded)
            }
            Err(err) => {
                self.settle_apply(id, Actuation::Failed, None);
                self.context.send_event(Event::Apply(ApplyEvent {
                    id: id.clone(),
                    outcome: ActuationOutcome::Failed(err.to_string()),
                }));
                Err(err.into())
            }
        }
    }

    fn settle_apply_skip(&self, id: &ObjectId, err: FilterError) -> Result<ActuationOutcome, RunError> {
        match err {
            FilterError::Skip(reason) => {
                self.settle_apply(id, Actuation::Skipped, None);
                Ok(skip_outcome(reason))
            }
            FilterError::Fatal(message) => {
                self.settle_apply(id, Actuation::Failed, None);
                Err(RunError::Fatal(message))
            }
        }
    }

    fn settle_apply(&self, id: &ObjectId, actuation: Actuation, uid: Option<String>) {
        if let Some(mut status) = self.context.inventory_manager().object_status(id) {
            status.actuation = actuation;
            status.uid = uid;
            self.context.inventory_manager().set_object_status(status);
        }
    }

    async fn run_prune_batch(&self, ids: &[ObjectId]) -> Result<(), RunError> {
        for id in ids {
            let outcome = self.prune_one(id).await?;
            self.context.send_event(Event::Prune(PruneEvent { id: id.clone(), outcome }));
        }
        Ok(())
    }

    async fn prune_one(&self, id: &ObjectId) -> Result<ActuationOutcome, RunError> {
        let live = self.api.get_metadata(id).await?;
        let input = PruneFilterInput {
            id,
            live: live.as_ref(),
            inventory_id: &self.inventory_info.id,
            policy: self.options.policy,
            desired_namespaces: &self.desired_namespaces,
        };
        let verdict = filter::run_prune_pipeline(&self.prune_filters, &input, &self.context);

        if let Err(err) = verdict {
            return match err {
                FilterError::Skip(reason) => {
                    self.settle_prune(id, Actuation::Skipped);
                    Ok(skip_outcome(reason))
                }
                FilterError::Fatal(message) => {
                    self.settle_prune(id, Actuation::Failed);
                    Err(RunError::Fatal(message))
                }
            };
        }

        if self.options.dry_run.is_client_side() {
            self.settle_prune(id, Actuation::Succeeded);
            return Ok(ActuationOutcome::Succeeded);
        }

        let delete_options = DeleteOptions {
            propagation_policy: self.options.propagation_policy,
            server_dry_run: self.options.dry_run.is_server_side(),
        };

        match self.api.delete(id, &delete_options).await {
            Ok(()) => {
                self.settle_prune(id, Actuation::Succeeded);
                Ok(ActuationOutcome::Succeeded)
            }
            Err(err) => {
                self.settle_prune(id, Actuation::Failed);
                self.context.send_event(Event::Prune(PruneEvent {
                    id: id.clone(),
                    outcome: ActuationOutcome::Failed(err.to_string()),
                }));
                Err(err.into())
            }
        }
    }

    fn settle_prune(&self, id: &ObjectId, actuation: Actuation) {
        // A successfully pruned object is dropped outright rather than kept
        // around with a terminal status: spec §4.E step 9 wants the final
        // inventory to be "desired set minus successfully-pruned", not a
        // record of every object ever tracked.
        if actuation == Actuation::Succeeded {
            self.context.inventory_manager().forget(id);
            return;
        }
        if let Some(mut status) = self.context.inventory_manager().object_status(id) {
            status.actuation = actuation;
            self.context.inventory_manager().set_object_status(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::DependencyGraph, solver};
    use async_trait::async_trait;
    use kapply_client::{
        client::ObjectMetadataView,
        inventory::memory::InMemoryInventoryClient,
        poller::{LiveStatus, StatusEvent},
    };
    use serde_json::json;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::mpsc;

    struct FakeApi {
        objects: Mutex<StdHashMap<ObjectId, Object>>,
    }

    #[async_trait]
    impl DynamicApi for FakeApi {
        async fn get(&self, id: &ObjectId) -> Result<Option<Object>, ClientError> {
            Ok(self.objects.lock().unwrap().get(id).cloned())
        }

        async fn get_metadata(&self, id: &ObjectId) -> Result<Option<ObjectMetadataView>, ClientError> {
            Ok(self.objects.lock().unwrap().get(id).map(|o| ObjectMetadataView {
                id: o.id().clone(),
                uid: o.uid().map(str::to_string),
                annotations: Default::default(),
            }))
        }

        async fn apply(&self, object: &Object, _options: &ApplyOptions) -> Result<Object, ClientError> {
            let mut applied = object.clone();
            applied.payload_mut()["metadata"]["uid"] = json!("uid-1");
            self.objects.lock().unwrap().insert(object.id().clone(), applied.clone());
            Ok(applied)
        }

        async fn delete(&self, id: &ObjectId, _options: &DeleteOptions) -> Result<(), ClientError> {
            self.objects.lock().unwrap().remove(id);
            Ok(())
        }

        async fn list_by_label(&self, _group: &str, _kind: &str, _namespace: &str, _label_key: &str, _label_value: &str) -> Result<Vec<Object>, ClientError> {
            Ok(Vec::new())
        }
    }

    struct FakePoller;
    impl StatusPoller for FakePoller {
        fn watch(&self, ids: &[ObjectId]) -> mpsc::UnboundedReceiver<StatusEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            for id in ids {
                tx.send(StatusEvent { id: id.clone(), status: LiveStatus::Current, message: None }).unwrap();
            }
            rx
        }
    }

    fn deployment(name: &str) -> Object {
        Object::new(
            ObjectId::namespaced("apps", "Deployment", "ns", name),
            "v1",
            json!({"metadata": {"name": name, "namespace": "ns"}}),
        )
    }

    #[tokio::test]
    async fn full_apply_run_succeeds_and_records_terminal_statuses() {
        let desired = vec![deployment("foo")];
        let options = solver::SolverOptions {
            reconcile_timeout: std::time::Duration::from_secs(5),
            ..Default::default()
        };
        let (context, tasks) = solver::build_apply_queue(desired.clone(), None, "team-a", &options).unwrap();

        let runner = TaskRunner::new(
            context,
            desired.clone(),
            std::sync::Arc::new(FakeApi { objects: Mutex::new(StdHashMap::new()) }),
            std::sync::Arc::new(FakePoller),
            std::sync::Arc::new(InMemoryInventoryClient::default()),
            InventoryInfo { namespace: "ns".to_string(), name: "inventory".to_string(), id: "team-a".to_string() },
            RunnerOptions {
                server_side: true,
                force_conflicts: false,
                field_manager: Some("kapply".to_string()),
                propagation_policy: PrunePropagationPolicy::Foreground,
                dry_run: DryRunStrategy::None,
                policy: Policy::MustMatch,
                emit_status_events: false,
            },
        );

        runner.run(tasks).await.unwrap();

        let id = desired[0].id();
        let status = runner.context().inventory_manager().object_status(id).unwrap();
        assert_eq!(status.actuation, Actuation::Succeeded);
        assert_eq!(status.reconcile, Reconcile::Succeeded);
    }

    #[tokio::test]
    async fn fatal_premature_dependency_aborts_but_still_writes_inventory() {
        let mut dependent = deployment("a");
        dependent.set_annotation("config.kubernetes.io/depends-on", "/namespaces/ns/Secret/b");

        let graph_with_edge = DependencyGraph::build(&[dependent.clone()]).unwrap();
        let context = TaskContext::new(graph_with_edge, "team-a");
        let dependency_id = ObjectId::namespaced("", "Secret", "ns", "b");
        context.inventory_manager().add_pending_apply(kapply_core::id::ObjectRef::new(dependency_id, "v1"));
        context.inventory_manager().add_pending_apply(dependent.object_ref());

        let runner = TaskRunner::new(
            context,
            vec![dependent.clone()],
            std::sync::Arc::new(FakeApi { objects: Mutex::new(StdHashMap::new()) }),
            std::sync::Arc::new(FakePoller),
            std::sync::Arc::new(InMemoryInventoryClient::default()),
            InventoryInfo { namespace: "ns".to_string(), name: "inventory".to_string(), id: "team-a".to_string() },
            RunnerOptions {
                server_side: true,
                force_conflicts: false,
                field_manager: None,
                propagation_policy: PrunePropagationPolicy::Foreground,
                dry_run: DryRunStrategy::None,
                policy: Policy::MustMatch,
                emit_status_events: false,
            },
        );

        let mut namer = crate::task::TaskNamer::default();
        let tasks = vec![namer.inv_add(), namer.apply(vec![dependent.id().clone()]), namer.inv_set()];

        let err = runner.run(tasks).await.unwrap_err();
        assert!(matches!(err, RunError::Fatal(_)));
        let status = runner.context().inventory_manager().object_status(dependent.id()).unwrap();
        assert_eq!(status.actuation, Actuation::Failed);
    }
}
