//! Lifecycle-annotation filters, spec §4.D.
use kapply_core::annotation::{
    LIFECYCLE_DELETION, LIFECYCLE_DELETION_DETACH, LIFECYCLE_MUTATION, LIFECYCLE_MUTATION_IGNORE, ON_REMOVE, ON_REMOVE_KEEP,
};

use super::{ApplyFilter, ApplyFilterInput, FilterError, PruneFilter, PruneFilterInput, SkipReason};
use crate::context::TaskContext;

/// Skips a prune when the live object carries `on-remove: keep` or
/// `client.lifecycle.config.k8s.io/deletion: detach`.
pub struct PreventRemoveFilter;

impl PruneFilter for PreventRemoveFilter {
    fn name(&self) -> &'static str {
        "PreventRemoveFilter"
    }

    fn filter(&self, input: &PruneFilterInput<'_>, _context: &TaskContext) -> Result<(), FilterError> {
        let Some(live) = input.live else {
            return Ok(());
        };
        if live.annotation(ON_REMOVE) == Some(ON_REMOVE_KEEP) {
            return Err(FilterError::Skip(SkipReason::AnnotationPreventedDeletion {
                annotation: ON_REMOVE.to_string(),
                value: ON_REMOVE_KEEP.to_string(),
            }));
        }
        if live.annotation(LIFECYCLE_DELETION) == Some(LIFECYCLE_DELETION_DETACH) {
            return Err(FilterError::Skip(SkipReason::AnnotationPreventedDeletion {
                annotation: LIFECYCLE_DELETION.to_string(),
                value: LIFECYCLE_DELETION_DETACH.to_string(),
            }));
        }
        Ok(())
    }
}

/// Skips an apply (update) when the desired object carries
/// `client.lifecycle.config.k8s.io/mutation: ignore` **and** it already
/// exists on the server. A not-yet-existing object is still created.
pub struct PreventUpdateFilter;

impl ApplyFilter for PreventUpdateFilter {
    fn name(&self) -> &'static str {
        "PreventUpdateFilter"
    }

    fn filter(&self, input: &ApplyFilterInput<'_>, _context: &TaskContext) -> Result<(), FilterError> {
        if input.live.is_none() {
            return Ok(());
        }
        if input.desired.annotation(LIFECYCLE_MUTATION) == Some(LIFECYCLE_MUTATION_IGNORE) {
            return Err(FilterError::Skip(SkipReason::AnnotationPreventedUpdate {
                annotation: LIFECYCLE_MUTATION.to_string(),
                value: LIFECYCLE_MUTATION_IGNORE.to_string(),
            }));
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

    fn live(annotations: &[(&str, &str)]) -> ObjectMetadataView {
        let mut map = BTreeMap::new();
        for (k, v) in annotations {
            map.insert(k.to_string(), v.to_string());
        }
        ObjectMetadataView {
            id: ObjectId::namespaced("", "ConfigMap", "ns", "a"),
            uid: Some("uid-1".into()),
            annotations: map,
        }
    }

    #[test]
    fn keep_annotation_prevents_removal() {
        let context = ctx();
        let live = live(&[(ON_REMOVE, ON_REMOVE_KEEP)]);
        let id = ObjectId::namespaced("", "ConfigMap", "ns", "a");
        let input = PruneFilterInput {
            id: &id,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            desired_namespaces: &HashSet::new(),
        };
        assert!(matches!(
            PreventRemoveFilter.filter(&input, &context),
            Err(FilterError::Skip(SkipReason::AnnotationPreventedDeletion { .. }))
        ));
    }

    #[test]
    fn ignore_mutation_only_blocks_existing_objects() {
        let context = ctx();
        let mut desired = Object::new(ObjectId::namespaced("", "ConfigMap", "ns", "a"), "v1", json!({}));
        desired.set_annotation(LIFECYCLE_MUTATION, LIFECYCLE_MUTATION_IGNORE);

        let input_create = ApplyFilterInput {
            desired: &desired,
            live: None,
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(PreventUpdateFilter.filter(&input_create, &context).is_ok());

        let live = live(&[]);
        let input_update = ApplyFilterInput {
            desired: &desired,
            live: Some(&live),
            inventory_id: "team-a",
            policy: Policy::MustMatch,
            newly_applied_uids: &HashSet::new(),
        };
        assert!(matches!(
            PreventUpdateFilter.filter(&input_update, &context),
            Err(FilterError::Skip(SkipReason::AnnotationPreventedUpdate { .. }))
        ));
    }
}
