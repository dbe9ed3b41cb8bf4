//! The task queue builder, spec §4.E.
use std::time::Duration;

use kapply_core::{
    error::DuplicateIdError,
    id::{ObjectId, ObjectRef},
    inventory::Inventory,
    object::Object,
    policy::{DryRunStrategy, Policy},
};
use thiserror::Error;
use tracing::instrument;

use crate::{
    context::TaskContext,
    graph::{DependencyGraph, GraphError},
    task::{Task, TaskNamer},
    wait::Condition,
};

/// CRDs always get this wait timeout after being applied, regardless of the
/// caller's configured reconcile timeout (spec §4.E step 7, §8 P3): the
/// engine cannot safely apply a custom resource before its CRD is actually
/// being served.
pub const DEFAULT_CRD_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Failures that abort queue construction before any task executes.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Two desired objects share the same [`ObjectId`].
    #[error(transparent)]
    DuplicateId(#[from] DuplicateIdError),
    /// A `depends-on` annotation failed to parse.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The dependency graph contains a cycle.
    #[error(transparent)]
    Cyclic(#[from] kapply_core::error::CyclicDependencyError),
}

/// The solver's tunable inputs, spec §6 `Options` narrowed to what queue
/// construction itself needs (propagation policy and field-manager choices
/// are runner/transport concerns, threaded through separately).
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// How long to wait for each apply wave to reach `Current`. Zero means
    /// "do not wait".
    pub reconcile_timeout: Duration,
    /// Whether to prune objects no longer in the desired set.
    pub prune: bool,
    /// How long to wait for each prune wave to reach `NotFound`. Zero means
    /// "do not wait".
    pub prune_timeout: Duration,
    /// Whether, and how, to avoid mutating the live cluster.
    pub dry_run: DryRunStrategy,
    /// The inventory ownership policy filters enforce.
    pub policy: Policy,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            reconcile_timeout: Duration::ZERO,
            prune: false,
            prune_timeout: Duration::ZERO,
            dry_run: DryRunStrategy::None,
            policy: Policy::MustMatch,
        }
    }
}

const CUSTOM_RESOURCE_DEFINITION: &str = "CustomResourceDefinition";

/// Build the task queue for an `apply` run, spec §4.E.
///
/// Returns the [`TaskContext`] (already seeded with pending statuses for
/// every id this run will touch, and the invalid-reference set from
/// validation) alongside the ordered [`Task`] list. Returns an error with no
/// context/tasks at all if validation or cycle detection fails — per the
/// contract, a cyclic graph produces zero tasks.
#[instrument(skip(desired, prior_inventory), fields(desired = desired.len()))]
pub fn build_apply_queue(
    desired: Vec<Object>,
    prior_inventory: Option<Inventory>,
    inventory_id: impl Into<String>,
    options: &SolverOptions,
) -> Result<(TaskContext, Vec<Task>), SolverError> {
    build_queue(desired, prior_inventory, inventory_id, options, false)
}

fn build_queue(
    desired: Vec<Object>,
    prior_inventory: Option<Inventory>,
    inventory_id: impl Into<String>,
    options: &SolverOptions,
    is_destroy: bool,
) -> Result<(TaskContext, Vec<Task>), SolverError> {
    let inventory_id = inventory_id.into();

    let mut desired_ids = std::collections::HashSet::new();
    for object in &desired {
        if !desired_ids.insert(object.id().clone()) {
            return Err(DuplicateIdError(object.id().clone()).into());
        }
    }

    let graph = DependencyGraph::build(&desired)?;
    let waves = graph.topological_waves()?;

    let context = TaskContext::new(graph.clone(), inventory_id);

    for vertex in graph.vertices() {
        if !desired_ids.contains(vertex) {
            context.add_invalid_object(vertex.clone());
        }
    }

    for object in &desired {
        context.inventory_manager().add_pending_apply(object.object_ref());
    }

    let prune_ids: Vec<ObjectRef> = if options.prune {
        prior_inventory
            .iter()
            .flat_map(|inv| inv.object_refs.iter())
            .filter(|r| !desired_ids.contains(&r.id))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    for object_ref in &prune_ids {
        context.inventory_manager().add_pending_delete(object_ref.clone());
    }

    let mut namer = TaskNamer::default();
    let mut tasks = Vec::new();
    // P4 dry-run purity: no inventory RPC is emitted for any dry-run strategy.
    // TaskContext bookkeeping above still happens unconditionally, so filters
    // and the dependency graph see a fully populated run either way.
    if options.dry_run.mutates() {
        tasks.push(namer.inv_add());
    }

    let dry_run = options.dry_run;

    for wave in &waves {
        let (crds, rest): (Vec<ObjectId>, Vec<ObjectId>) = wave.iter().cloned().partition(|id| id.kind == CUSTOM_RESOURCE_DEFINITION);

        if !rest.is_empty() {
            emit_apply_batch(&mut tasks, &mut namer, rest, options.reconcile_timeout, dry_run);
        }
        if !crds.is_empty() {
            emit_apply_batch(&mut tasks, &mut namer, crds.clone(), Duration::ZERO, dry_run);
            if dry_run.mutates() {
                tasks.push(namer.reset_mapper());
                tasks.push(namer.wait(crds, Condition::AllCurrent, DEFAULT_CRD_WAIT_TIMEOUT));
            }
        }
    }

    if options.prune {
        for wave in reverse_priority_waves(prune_ids.iter().map(|r| r.id.clone()).collect()) {
            let batch = wave;
            tasks.push(namer.prune(batch.clone()));
            if dry_run.mutates() && !options.prune_timeout.is_zero() {
                tasks.push(namer.wait(batch, Condition::AllNotFound, options.prune_timeout));
            }
        }
    }

    if options.dry_run.mutates() {
        // For `destroy`, the inventory's backing object is torn down
        // instead of stored (spec §3 Lifecycle, §4.E step 9): whether every
        // prune actually succeeded is only known once the queue has run,
        // so `InvDelete` itself decides at execution time whether to delete
        // outright or fall back to a final store (spec §7 "the final
        // inventory write still runs to record what happened").
        tasks.push(if is_destroy { namer.inv_delete() } else { namer.inv_set() });
    }

    Ok((context, tasks))
}

/// Build the task queue for a `destroy` run: no objects are desired, so
/// everything the prior inventory tracks is pruned. A thin specialisation
/// of [`build_apply_queue`] with an empty desired set and `prune` forced on.
pub fn build_prune_queue(prior_inventory: Inventory, inventory_id: impl Into<String>, options: &SolverOptions) -> Result<(TaskContext, Vec<Task>), SolverError> {
    let options = SolverOptions { prune: true, ..options.clone() };
    build_queue(Vec::new(), Some(prior_inventory), inventory_id, &options, true)
}

fn emit_apply_batch(tasks: &mut Vec<Task>, namer: &mut TaskNamer, batch: Vec<ObjectId>, reconcile_timeout: Duration, dry_run: DryRunStrategy) {
    tasks.push(namer.apply(batch.clone()));
    if dry_run.mutates() && !reconcile_timeout.is_zero() {
        tasks.push(namer.wait(batch, Condition::AllCurrent, reconcile_timeout));
    }
}

/// Group `ids` into waves ordered by descending [`ObjectId`] type-priority
/// (the reverse of apply order), one wave per distinct priority tier.
///
/// The inventory model only persists `ObjectRef`s, not full payloads, so a
/// pruned object's own `depends-on` annotation is unrecoverable; ordering
/// therefore falls back to the type-priority table alone rather than a full
/// dependency graph (see `DESIGN.md`).
fn reverse_priority_waves(mut ids: Vec<ObjectId>) -> Vec<Vec<ObjectId>> {
    ids.sort();
    ids.reverse();
    let mut waves: Vec<Vec<ObjectId>> = Vec::new();
    for id in ids {
        match waves.last_mut() {
            Some(wave) if kapply_core::id::type_priority(&wave[0].kind) == kapply_core::id::type_priority(&id.kind) => wave.push(id),
            _ => waves.push(vec![id]),
        }
    }
    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use kapply_core::object::Object;
    use serde_json::json;

    fn obj(kind: &str, ns: &str, name: &str) -> Object {
        Object::new(ObjectId::namespaced("", kind, ns, name), "v1", json!({"metadata": {"name": name, "namespace": ns}}))
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let desired = vec![obj("ConfigMap", "ns", "a"), obj("ConfigMap", "ns", "a")];
        let err = build_apply_queue(desired, None, "team-a", &SolverOptions::default()).unwrap_err();
        assert!(matches!(err, SolverError::DuplicateId(_)));
    }

    #[test]
    fn cyclic_graph_produces_zero_tasks() {
        let mut a = obj("Deployment", "ns", "a");
        a.set_annotation("config.kubernetes.io/depends-on", "/namespaces/ns/Secret/b");
        let mut b = obj("Secret", "ns", "b");
        b.set_annotation("config.kubernetes.io/depends-on", "/namespaces/ns/Deployment/a");
        let err = build_apply_queue(vec![a, b], None, "team-a", &SolverOptions::default()).unwrap_err();
        assert!(matches!(err, SolverError::Cyclic(_)));
    }

    #[test]
    fn single_object_with_reconcile_timeout_produces_expected_queue() {
        let desired = vec![obj("Deployment", "ns", "foo")];
        let options = SolverOptions { reconcile_timeout: Duration::from_secs(60), ..Default::default() };
        let (_, tasks) = build_apply_queue(desired, None, "team-a", &options).unwrap();
        let kinds: Vec<&str> = tasks
            .iter()
            .map(|t| match t.kind {
                TaskKind::InvAdd => "InvAdd",
                TaskKind::InvSet => "InvSet",
                TaskKind::InvDelete => "InvDelete",
                TaskKind::Apply(_) => "Apply",
                TaskKind::Prune(_) => "Prune",
                TaskKind::Wait(..) => "Wait",
                TaskKind::ResetMapper => "ResetMapper",
            })
            .collect();
        assert_eq!(kinds, vec!["InvAdd", "Apply", "Wait", "InvSet"]);
    }

    #[test]
    fn crd_and_cr_wave_is_fenced_with_reset_mapper_and_wait() {
        let crd = obj("CustomResourceDefinition", "", "crontabs.stable.example.com");
        let mut cr = obj("CronTab", "ns", "cron-tab-01");
        cr.set_annotation("config.kubernetes.io/depends-on", "/CustomResourceDefinition/crontabs.stable.example.com");
        let (_, tasks) = build_apply_queue(vec![crd, cr], None, "team-a", &SolverOptions::default()).unwrap();
        let kinds: Vec<&str> = tasks
            .iter()
            .map(|t| match &t.kind {
                TaskKind::InvAdd => "InvAdd",
                TaskKind::InvSet => "InvSet",
                TaskKind::InvDelete => "InvDelete",
                TaskKind::Apply(_) => "Apply",
                TaskKind::Prune(_) => "Prune",
                TaskKind::Wait(..) => "Wait",
                TaskKind::ResetMapper => "ResetMapper",
            })
            .collect();
        assert_eq!(kinds, vec!["InvAdd", "Apply", "ResetMapper", "Wait", "Apply", "InvSet"]);
    }

    #[test]
    fn destroy_queue_emits_inv_delete_instead_of_inv_set() {
        let mut inventory = Inventory::empty("team-a");
        let object_ref = kapply_core::id::ObjectRef::new(ObjectId::namespaced("", "Secret", "ns", "creds"), "v1");
        inventory.object_refs.insert(object_ref.clone());
        inventory.object_statuses.push(kapply_core::inventory::ObjectStatus::pending_delete(object_ref));
        let (_, tasks) = build_prune_queue(inventory, "team-a", &SolverOptions::default()).unwrap();
        let kinds: Vec<&str> = tasks
            .iter()
            .map(|t| match &t.kind {
                TaskKind::InvAdd => "InvAdd",
                TaskKind::InvSet => "InvSet",
                TaskKind::InvDelete => "InvDelete",
                TaskKind::Apply(_) => "Apply",
                TaskKind::Prune(_) => "Prune",
                TaskKind::Wait(..) => "Wait",
                TaskKind::ResetMapper => "ResetMapper",
            })
            .collect();
        assert_eq!(kinds, vec!["InvAdd", "Prune", "InvDelete"]);
    }

    #[test]
    fn dry_run_emits_no_wait_or_inventory_tasks() {
        let desired = vec![obj("Deployment", "ns", "foo")];
        let options = SolverOptions {
            reconcile_timeout: Duration::from_secs(60),
            dry_run: DryRunStrategy::Server,
            ..Default::default()
        };
        let (_, tasks) = build_apply_queue(desired, None, "team-a", &options).unwrap();
        assert!(!tasks.iter().any(|t| matches!(t.kind, TaskKind::Wait(..))));
        assert!(!tasks.iter().any(|t| matches!(t.kind, TaskKind::InvAdd | TaskKind::InvSet | TaskKind::InvDelete)));
        assert!(tasks.iter().any(|t| matches!(t.kind, TaskKind::Apply(_))));
    }
}
