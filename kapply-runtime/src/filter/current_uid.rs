//! [`CurrentUidFilter`], spec §4.D.
use super::{ApplyFilter, ApplyFilterInput, FilterError, SkipReason};
use crate::context::TaskContext;

/// Skips applying an object whose live UID was already applied earlier in
/// this same run under a different identity — two desired objects cannot
/// legitimately resolve to the same physical server object.
pub struct CurrentUidFilter;

impl ApplyFilter for CurrentUidFilter {
    fn name(&self) -> &'static str {
        "CurrentUidFilter"
    }

    fn filter(&self, input: &ApplyFilterInput<'_>, _context: &TaskContext) -> Result<(), FilterError> {
        let Some(uid) = input.live.and_then(|live| live.uid.as_deref()) else {
            return Ok(());
        };
        if input.newly_applied_uids.contains(uid) {
            return Err(FilterError::Skip(SkipReason::ApplyPreventedDeletion { uid: uid.to_string() }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;
    use kapply_client::client::ObjectMetadataView;
    use kapply_core::{id::ObjectId, object::Object, policy::Policy};
    use serde_json::json;
    use std::collections::{BTreeMap, HashSet};

    fn ctx() -> TaskContext {
        TaskContext::new(DependencyGraph::build(&[]).unwrap(), "team-a")
    }

    #[test]
    fn uid_reused_this_run_is_skipped() {
        let context = ctx();
        let desired = Object::new(ObjectId::namespaced("", "ConfigMap", "ns", "a"), "v1", json!({}));
        let live = ObjectMetadataView {
            id: ObjectId::namespaced("", "ConfigMap", "ns", "a"),
            uid: Some("uid-1".into()),
            annotations: BTreeMap::new(),
        };
        let mut seen = HashSet::new();
        seen.insert("uid-1".to_string());
        let input = ApplyFilterInput {
            desired: &desired,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &seen,
        };
        assert!(matches!(
            CurrentUidFilter.filter(&input, &context),
            Err(FilterError::Skip(SkipReason::ApplyPreventedDeletion { .. }))
        ));
    }

    #[test]
    fn unseen_uid_proceeds() {
        let context = ctx();
        let desired = Object::new(ObjectId::namespaced("", "ConfigMap", "ns", "a"), "v1", json!({}));
        let live = ObjectMetadataView {
            id: ObjectId::namespaced("", "ConfigMap", "ns", "a"),
            uid: Some("uid-1".into()),
            annotations: BTreeMap::new(),
        };
        let input = ApplyFilterInput {
            desired: &desired,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(CurrentUidFilter.filter(&input, &context).is_ok());
    }
}
