//! The inventory record shape: spec §3 `Inventory` / `ObjectStatus` and the
//! small enums that describe an object's actuation lifecycle.
use crate::id::ObjectRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether an object is being applied or deleted this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Create or update to match desired state.
    Apply,
    /// Delete because it is no longer desired.
    Delete,
}

/// The outcome of the actuation (apply/delete) step for one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actuation {
    /// Not yet attempted.
    Pending,
    /// The apply/delete RPC succeeded.
    Succeeded,
    /// The apply/delete RPC failed.
    Failed,
    /// A filter vetoed this object; it was never attempted.
    Skipped,
}

/// The outcome of waiting for the object to reconcile after actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reconcile {
    /// Not yet observed.
    Pending,
    /// Reached the awaited condition (`Current` for apply, `NotFound` for
    /// prune).
    Succeeded,
    /// Actuation itself failed, so reconciliation was never meaningful.
    Failed,
    /// Actuation was skipped, so reconciliation was never meaningful.
    Skipped,
    /// The wait task's deadline elapsed before the condition was observed.
    Timeout,
}

/// Per-object status record, spec §3 `ObjectStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStatus {
    /// Which object this describes.
    pub object_ref: ObjectRef,
    /// Apply or delete.
    pub strategy: Strategy,
    /// Actuation outcome.
    pub actuation: Actuation,
    /// Reconcile outcome.
    pub reconcile: Reconcile,
    /// The server-assigned UID captured at apply time, used to distinguish a
    /// recreated object from the original.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// The object's generation at apply time, if observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

impl ObjectStatus {
    /// A freshly-pending status for an object about to be applied.
    pub fn pending_apply(object_ref: ObjectRef) -> Self {
        Self {
            object_ref,
            strategy: Strategy::Apply,
            actuation: Actuation::Pending,
            reconcile: Reconcile::Pending,
            uid: None,
            generation: None,
        }
    }

    /// A freshly-pending status for an object about to be pruned.
    pub fn pending_delete(object_ref: ObjectRef) -> Self {
        Self {
            object_ref,
            strategy: Strategy::Delete,
            actuation: Actuation::Pending,
            reconcile: Reconcile::Pending,
            uid: None,
            generation: None,
        }
    }

    /// True if `actuation` is not [`Actuation::Pending`].
    pub fn actuation_is_terminal(&self) -> bool {
        !matches!(self.actuation, Actuation::Pending)
    }

    /// True if `reconcile` is not [`Reconcile::Pending`].
    pub fn reconcile_is_terminal(&self) -> bool {
        !matches!(self.reconcile, Reconcile::Pending)
    }
}

/// A durable record of what one engine invocation owns, spec §3 `Inventory`.
///
/// `id` is an opaque label value; an identical `id` across runs MUST refer to
/// the same logical inventory (the storage backend is responsible for
/// enforcing this, see `kapply-client::inventory`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// The opaque inventory id.
    pub id: String,
    /// The set of objects this inventory currently claims.
    pub object_refs: BTreeSet<ObjectRef>,
    /// Per-object status, one entry per member of `object_refs`.
    pub object_statuses: Vec<ObjectStatus>,
}

impl Inventory {
    /// An empty inventory for the given id, with no members yet.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object_refs: BTreeSet::new(),
            object_statuses: Vec::new(),
        }
    }

    /// Look up the status for a given ref, if present.
    pub fn status_for(&self, object_ref: &ObjectRef) -> Option<&ObjectStatus> {
        self.object_statuses.iter().find(|s| &s.object_ref == object_ref)
    }
}

// `ObjectRef` needs a total order to live in a `BTreeSet`; order on the
// underlying `ObjectId`'s deterministic ordering, then on version so that
// two refs to the same id but different versions still have a stable
// relative order instead of comparing equal-but-distinct.
impl PartialOrd for ObjectRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id).then_with(|| self.version.cmp(&other.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ObjectId;

    fn oref(name: &str) -> ObjectRef {
        ObjectRef::new(ObjectId::namespaced("", "ConfigMap", "ns", name), "v1")
    }

    #[test]
    fn pending_statuses_start_non_terminal() {
        let status = ObjectStatus::pending_apply(oref("a"));
        assert!(!status.actuation_is_terminal());
        assert!(!status.reconcile_is_terminal());
    }

    #[test]
    fn inventory_looks_up_status_by_ref() {
        let mut inv = Inventory::empty("team-a");
        let r = oref("a");
        inv.object_refs.insert(r.clone());
        inv.object_statuses.push(ObjectStatus::pending_apply(r.clone()));
        assert!(inv.status_for(&r).is_some());
        assert!(inv.status_for(&oref("b")).is_none());
    }
}
