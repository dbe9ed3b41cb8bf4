//! [`DependencyFilter`], spec §4.D.
use kapply_core::inventory::{Actuation, Reconcile, Strategy};

use super::{ApplyFilter, ApplyFilterInput, FilterError, PruneFilter, PruneFilterInput, SkipReason};
use crate::context::TaskContext;

/// For Apply, rejects an object whose dependencies are invalid, scheduled
/// for the opposite strategy, or ended Skipped/Failed/Timeout. For Prune,
/// applies the same logic to dependents (the objects that depend on the one
/// being pruned), since they must be pruned first (spec invariant: reverse
/// order).
///
/// A dependency/dependent whose *actuation* is still `Pending` is a contract
/// violation by the solver — the queue must never schedule an object before
/// what it depends on has settled — so that case is fatal rather than a
/// skip (spec §8 S6). A settled actuation with `reconcile` still `Pending`
/// is not a violation: the run may simply have scheduled no `Wait` task for
/// it (e.g. `ReconcileTimeout = 0`).
pub struct DependencyFilter;

fn check(expected_strategy: Strategy, other: &kapply_core::id::ObjectId, context: &TaskContext) -> Result<(), FilterError> {
    if context.is_invalid_object(other) {
        return Err(FilterError::Skip(SkipReason::DependencyPreventedActuation {
            other: other.clone(),
            reason: "reference could not be resolved".to_string(),
        }));
    }

    let Some(status) = context.inventory_manager().object_status(other) else {
        return Err(FilterError::Skip(SkipReason::DependencyPreventedActuation {
            other: other.clone(),
            reason: "not part of this run's tracked object set".to_string(),
        }));
    };

    if status.strategy != expected_strategy {
        return Err(FilterError::Skip(SkipReason::DependencyPreventedActuation {
            other: other.clone(),
            reason: format!("scheduled for {:?}, expected {:?}", status.strategy, expected_strategy),
        }));
    }

    match (status.actuation, status.reconcile) {
        (Actuation::Pending, _) => Err(FilterError::Fatal(format!("premature actuation: dependency {other} actuation pending"))),
        // A successful apply with reconcile still Pending is normal whenever
        // the run scheduled no Wait task for it (e.g. ReconcileTimeout = 0):
        // only the solver skipping actuation itself is a contract violation.
        (Actuation::Succeeded, Reconcile::Pending) => Ok(()),
        (Actuation::Failed, _) | (_, Reconcile::Failed) => Err(FilterError::Skip(SkipReason::DependencyPreventedActuation {
            other: other.clone(),
            reason: "dependency actuation failed".to_string(),
        })),
        (Actuation::Skipped, _) | (_, Reconcile::Skipped) => Err(FilterError::Skip(SkipReason::DependencyPreventedActuation {
            other: other.clone(),
            reason: "dependency was skipped".to_string(),
        })),
        (_, Reconcile::Timeout) => Err(FilterError::Skip(SkipReason::DependencyPreventedActuation {
            other: other.clone(),
            reason: "dependency reconcile timed out".to_string(),
        })),
        (Actuation::Succeeded, Reconcile::Succeeded) => Ok(()),
    }
}

impl ApplyFilter for DependencyFilter {
    fn name(&self) -> &'static str {
        "DependencyFilter"
    }

    fn filter(&self, input: &ApplyFilterInput<'_>, context: &TaskContext) -> Result<(), FilterError> {
        for dependency in context.graph().edges_from(input.desired.id()) {
            check(Strategy::Apply, dependency, context)?;
        }
        Ok(())
    }
}

impl PruneFilter for DependencyFilter {
    fn name(&self) -> &'static str {
        "DependencyFilter"
    }

    fn filter(&self, input: &PruneFilterInput<'_>, context: &TaskContext) -> Result<(), FilterError> {
        for dependent in context.graph().edges_to(input.id) {
            check(Strategy::Delete, dependent, context)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use kapply_core::{
        id::{ObjectId, ObjectRef},
        inventory::ObjectStatus,
        object::Object,
        policy::Policy,
    };
    use serde_json::json;
    use std::collections::HashSet;

    fn graph_with_dependency() -> (DependencyGraph, ObjectId, ObjectId) {
        let dependent = ObjectId::namespaced("apps", "Deployment", "ns", "api");
        let dependency = ObjectId::namespaced("", "Secret", "ns", "creds");
        let mut object = Object::new(dependent.clone(), "v1", json!({"metadata": {"name": "api", "namespace": "ns"}}));
        object.set_annotation("config.kubernetes.io/depends-on", "/namespaces/ns/Secret/creds");
        let secret = Object::new(dependency.clone(), "v1", json!({"metadata": {"name": "creds", "namespace": "ns"}}));
        (DependencyGraph::build(&[object, secret]).unwrap(), dependent, dependency)
    }

    #[test]
    fn pending_dependency_is_fatal() {
        let (graph, dependent, dependency) = graph_with_dependency();
        let ctx = TaskContext::new(graph, "team-a");
        ctx.inventory_manager().add_pending_apply(ObjectRef::new(dependency, "v1"));
        let desired = Object::new(dependent, "v1", json!({}));
        let input = ApplyFilterInput {
            desired: &desired,
            live: None,
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(matches!(DependencyFilter.filter(&input, &ctx), Err(FilterError::Fatal(_))));
    }

    #[test]
    fn succeeded_dependency_proceeds() {
        let (graph, dependent, dependency) = graph_with_dependency();
        let ctx = TaskContext::new(graph, "team-a");
        let dep_ref = ObjectRef::new(dependency, "v1");
        ctx.inventory_manager().add_pending_apply(dep_ref.clone());
        let mut status = ObjectStatus::pending_apply(dep_ref);
        status.actuation = Actuation::Succeeded;
        status.reconcile = Reconcile::Succeeded;
        ctx.inventory_manager().set_object_status(status);

        let desired = Object::new(dependent, "v1", json!({}));
        let input = ApplyFilterInput {
            desired: &desired,
            live: None,
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(DependencyFilter.filter(&input, &ctx).is_ok());
    }

    #[test]
    fn succeeded_actuation_with_pending_reconcile_proceeds() {
        let (graph, dependent, dependency) = graph_with_dependency();
        let ctx = TaskContext::new(graph, "team-a");
        let dep_ref = ObjectRef::new(dependency, "v1");
        ctx.inventory_manager().add_pending_apply(dep_ref.clone());
        let mut status = ObjectStatus::pending_apply(dep_ref);
        status.actuation = Actuation::Succeeded;
        ctx.inventory_manager().set_object_status(status);

        let desired = Object::new(dependent, "v1", json!({}));
        let input = ApplyFilterInput {
            desired: &desired,
            live: None,
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(DependencyFilter.filter(&input, &ctx).is_ok());
    }

    #[test]
    fn failed_dependency_is_skipped_not_fatal() {
        let (graph, dependent, dependency) = graph_with_dependency();
        let ctx = TaskContext::new(graph, "team-a");
        let dep_ref = ObjectRef::new(dependency, "v1");
        ctx.inventory_manager().add_pending_apply(dep_ref.clone());
        let mut status = ObjectStatus::pending_apply(dep_ref);
        status.actuation = Actuation::Failed;
        ctx.inventory_manager().set_object_status(status);

        let desired = Object::new(dependent, "v1", json!({}));
        let input = ApplyFilterInput {
            desired: &desired,
            live: None,
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(matches!(
            DependencyFilter.filter(&input, &ctx),
            Err(FilterError::Skip(SkipReason::DependencyPreventedActuation { .. }))
        ));
    }
}
