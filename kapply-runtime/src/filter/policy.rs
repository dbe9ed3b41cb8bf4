//! Inventory ownership policy filters, spec §4.D.
use kapply_core::{annotation::OWNING_INVENTORY, inventory::Strategy, policy::Policy};

use super::{ApplyFilter, ApplyFilterInput, FilterError, PolicyStatus, PruneFilter, PruneFilterInput, SkipReason};
use crate::context::TaskContext;

fn check(live_annotation: Option<&str>, inventory_id: &str, policy: Policy, strategy: Strategy) -> Result<(), FilterError> {
    match (live_annotation, policy) {
        (Some(found), _) if found == inventory_id => Ok(()),
        (_, Policy::AdoptAll) => Ok(()),
        (None, Policy::AdoptIfNoInventory) => Ok(()),
        (None, _) => Err(FilterError::Skip(SkipReason::PolicyPrevented {
            strategy,
            policy,
            status: PolicyStatus::Empty,
        })),
        (Some(_), _) => Err(FilterError::Skip(SkipReason::PolicyPrevented {
            strategy,
            policy,
            status: PolicyStatus::NoMatch,
        })),
    }
}

/// Compares the live object's `owning-inventory` annotation against this
/// run's inventory id, before an apply.
pub struct InventoryPolicyApplyFilter;

impl ApplyFilter for InventoryPolicyApplyFilter {
    fn name(&self) -> &'static str {
        "InventoryPolicyApplyFilter"
    }

    fn filter(&self, input: &ApplyFilterInput<'_>, _context: &TaskContext) -> Result<(), FilterError> {
        let live_annotation = input.live.and_then(|live| live.annotation(OWNING_INVENTORY));
        if input.live.is_none() {
            // No live object yet: nothing to adopt, nothing to conflict with.
            return Ok(());
        }
        check(live_annotation, input.inventory_id, input.policy, Strategy::Apply)
    }
}

/// Same check as [`InventoryPolicyApplyFilter`], but for prune, where a live
/// object is expected (the object is presumably still on the server).
pub struct InventoryPolicyPruneFilter;

impl PruneFilter for InventoryPolicyPruneFilter {
    fn name(&self) -> &'static str {
        "InventoryPolicyPruneFilter"
    }

    fn filter(&self, input: &PruneFilterInput<'_>, _context: &TaskContext) -> Result<(), FilterError> {
        let live_annotation = input.live.and_then(|live| live.annotation(OWNING_INVENTORY));
        check(live_annotation, input.inventory_id, input.policy, Strategy::Delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use kapply_client::client::ObjectMetadataView;
    use kapply_core::id::ObjectId;
    use std::collections::{BTreeMap, HashSet};

    fn ctx() -> TaskContext {
        TaskContext::new(DependencyGraph::build(&[]).unwrap(), "team-a")
    }

    fn live_with(id: &str) -> ObjectMetadataView {
        let mut annotations = BTreeMap::new();
        annotations.insert(OWNING_INVENTORY.to_string(), id.to_string());
        ObjectMetadataView {
            id: ObjectId::namespaced("", "ConfigMap", "ns", "a"),
            uid: Some("uid-1".into()),
            annotations,
        }
    }

    fn desired() -> kapply_core::object::Object {
        kapply_core::object::Object::new(ObjectId::namespaced("", "ConfigMap", "ns", "a"), "v1", serde_json::json!({}))
    }

    #[test]
    fn matching_id_proceeds() {
        let context = ctx();
        let desired = desired();
        let live = live_with("team-a");
        let input = ApplyFilterInput {
            desired: &desired,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(InventoryPolicyApplyFilter.filter(&input, &context).is_ok());
    }

    #[test]
    fn mismatched_id_under_must_match_skips() {
        let context = ctx();
        let desired = desired();
        let live = live_with("team-b");
        let input = ApplyFilterInput {
            desired: &desired,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        let err = InventoryPolicyApplyFilter.filter(&input, &context).unwrap_err();
        assert_eq!(
            err,
            FilterError::Skip(SkipReason::PolicyPrevented {
                strategy: Strategy::Apply,
                policy: Policy::MustMatch,
                status: PolicyStatus::NoMatch,
            })
        );
    }

    #[test]
    fn adopt_all_proceeds_regardless() {
        let context = ctx();
        let id = ObjectId::namespaced("", "ConfigMap", "ns", "a");
        let live = live_with("team-b");
        let input = PruneFilterInput {
            id: &id,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::AdoptAll,
            desired_namespaces: &HashSet::new(),
        };
        assert!(InventoryPolicyPruneFilter.filter(&input, &context).is_ok());
    }
}
