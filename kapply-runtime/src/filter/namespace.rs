//! [`LocalNamespacesFilter`], spec §4.D.
use super::{FilterError, PruneFilter, PruneFilterInput, SkipReason};
use crate::context::TaskContext;

/// Skips pruning a `Namespace` whose name is still referenced by any
/// namespaced object in the desired set.
pub struct LocalNamespacesFilter;

impl PruneFilter for LocalNamespacesFilter {
    fn name(&self) -> &'static str {
        "LocalNamespacesFilter"
    }

    fn filter(&self, input: &PruneFilterInput<'_>, _context: &TaskContext) -> Result<(), FilterError> {
        if input.id.kind != "Namespace" {
            return Ok(());
        }
        if input.desired_namespaces.contains(input.id.name.as_str()) {
            return Err(FilterError::Skip(SkipReason::NamespaceInUse { namespace: input.id.name.clone() }));
        }
        Ok(())
    }
}
