//! Validation filters, spec §4.D.
//!
//! A filter inspects a single object immediately before its apply or prune
//! RPC and decides whether the run proceeds, skips that object (recording a
//! typed reason), or aborts fatally. Filters never mutate the object; only
//! [`crate::mutate::Mutator`]s do that, and they run first.
mod current_uid;
mod dependency;
mod lifecycle;
mod namespace;
mod policy;

pub use current_uid::CurrentUidFilter;
pub use dependency::DependencyFilter;
pub use lifecycle::{PreventRemoveFilter, PreventUpdateFilter};
pub use namespace::LocalNamespacesFilter;
pub use policy::{InventoryPolicyApplyFilter, InventoryPolicyPruneFilter};

use std::collections::HashSet;

use kapply_client::client::ObjectMetadataView;
use kapply_core::{id::ObjectId, inventory::Strategy, object::Object, policy::Policy};
use thiserror::Error;

use crate::context::TaskContext;

/// Which policy check failed a [`SkipReason::PolicyPrevented`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    /// The live annotation carries a different inventory id.
    NoMatch,
    /// The live object carries no `owning-inventory` annotation at all.
    Empty,
}

/// The typed, equality-comparable reasons a filter can skip an object,
/// spec §4.D's table of skip-error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// [`CurrentUidFilter`]: the live object's UID was already applied this
    /// run under a different identity.
    ApplyPreventedDeletion {
        /// The colliding UID.
        uid: String,
    },
    /// [`InventoryPolicyApplyFilter`] / [`InventoryPolicyPruneFilter`].
    PolicyPrevented {
        /// Apply or Delete.
        strategy: Strategy,
        /// The configured policy.
        policy: Policy,
        /// Why the policy check failed.
        status: PolicyStatus,
    },
    /// [`PreventRemoveFilter`].
    AnnotationPreventedDeletion {
        /// The annotation key that matched.
        annotation: String,
        /// Its value.
        value: String,
    },
    /// [`PreventUpdateFilter`].
    AnnotationPreventedUpdate {
        /// The annotation key that matched.
        annotation: String,
        /// Its value.
        value: String,
    },
    /// [`LocalNamespacesFilter`].
    NamespaceInUse {
        /// The namespace still referenced by the desired set.
        namespace: String,
    },
    /// [`DependencyFilter`]: a dependency (or dependent) ended up invalid,
    /// scheduled for the opposite strategy, or settled Skipped/Failed/Timeout.
    DependencyPreventedActuation {
        /// The dependency (apply) or dependent (prune) that blocked this object.
        other: ObjectId,
        /// Human-readable detail.
        reason: String,
    },
}

/// Failures a filter can produce: a recoverable, typed skip, or a fatal
/// abort of the whole run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Skip just this object; the run continues with its siblings.
    #[error("skipped: {0:?}")]
    Skip(SkipReason),
    /// Abort the entire run. Used for the "premature actuation" contract
    /// violation the solver must never produce (spec §4.D `DependencyFilter`,
    /// §8 scenario S6).
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Everything an [`ApplyFilter`] needs about the object under test, beyond
/// the task context.
pub struct ApplyFilterInput<'a> {
    /// The desired (about-to-be-applied) object.
    pub desired: &'a Object,
    /// The live object's metadata, if it already exists on the server.
    pub live: Option<&'a ObjectMetadataView>,
    /// The inventory id this run is writing under.
    pub inventory_id: &'a str,
    /// The configured ownership policy.
    pub policy: Policy,
    /// UIDs of objects already applied earlier in this same run.
    pub newly_applied_uids: &'a HashSet<String>,
}

/// Everything a [`PruneFilter`] needs about the object under test.
pub struct PruneFilterInput<'a> {
    /// The object being considered for deletion.
    pub id: &'a ObjectId,
    /// The live object's metadata. Absent only if it disappeared between
    /// listing and filtering; treated as already-gone by every filter here.
    pub live: Option<&'a ObjectMetadataView>,
    /// The inventory id this run is writing under.
    pub inventory_id: &'a str,
    /// The configured ownership policy.
    pub policy: Policy,
    /// Namespace names still referenced by any object in the desired set.
    pub desired_namespaces: &'a HashSet<String>,
}

/// A gatekeeper run before an object's apply RPC.
pub trait ApplyFilter: Send + Sync {
    /// A short, stable identifier used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Decide whether `input.desired` may be applied.
    fn filter(&self, input: &ApplyFilterInput<'_>, context: &TaskContext) -> Result<(), FilterError>;
}

/// A gatekeeper run before an object's delete RPC.
pub trait PruneFilter: Send + Sync {
    /// A short, stable identifier used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Decide whether `input.id` may be pruned.
    fn filter(&self, input: &PruneFilterInput<'_>, context: &TaskContext) -> Result<(), FilterError>;
}

/// The fixed Apply pipeline, spec §4.D: `InventoryPolicyApply →
/// DependencyFilter(Apply) → PreventUpdate → CurrentUID`.
pub fn apply_pipeline() -> Vec<Box<dyn ApplyFilter>> {
    vec![
        Box::new(InventoryPolicyApplyFilter),
        Box::new(DependencyFilter),
        Box::new(PreventUpdateFilter),
        Box::new(CurrentUidFilter),
    ]
}

/// The fixed Prune pipeline, spec §4.D: `PreventRemove → InventoryPolicyPrune
/// → DependencyFilter(Delete) → LocalNamespaces`.
pub fn prune_pipeline() -> Vec<Box<dyn PruneFilter>> {
    vec![
        Box::new(PreventRemoveFilter),
        Box::new(InventoryPolicyPruneFilter),
        Box::new(DependencyFilter),
        Box::new(LocalNamespacesFilter),
    ]
}

/// Run every filter in `pipeline` against `input`, short-circuiting on the
/// first non-proceed result.
pub fn run_apply_pipeline(pipeline: &[Box<dyn ApplyFilter>], input: &ApplyFilterInput<'_>, context: &TaskContext) -> Result<(), FilterError> {
    for filter in pipeline {
        filter.filter(input, context)?;
    }
    Ok(())
}

/// Run every filter in `pipeline` against `input`, short-circuiting on the
/// first non-proceed result.
pub fn run_prune_pipeline(pipeline: &[Box<dyn PruneFilter>], input: &PruneFilterInput<'_>, context: &TaskContext) -> Result<(), FilterError> {
    for filter in pipeline {
        filter.filter(input, context)?;
    }
    Ok(())
}
