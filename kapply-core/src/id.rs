//! Object identity and the deterministic ordering used across the engine.
use crate::error::InvalidAnnotationError;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt::{self, Display},
};

/// A stable identity for an object on the cluster: group, kind, namespace, and
/// name.
///
/// Equality ignores `version` on purpose (the same object identity may be
/// addressed through different API versions across requests). Use
/// [`ObjectRef`] when the version needs to travel with the identity, such as
/// when persisting to the inventory.
///
/// `ObjectId` serialises to the same `<namespace>_<name>_<group>_<Kind>` form
/// the inventory ConfigMap backend uses as its data keys, with empty string
/// segments for cluster-scoped objects and the core group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// API group, empty string for the core group.
    pub group: String,
    /// Kind, e.g. `Deployment`.
    pub kind: String,
    /// Namespace, empty string for cluster-scoped objects.
    pub namespace: String,
    /// Name.
    pub name: String,
}

impl ObjectId {
    /// Construct a namespaced identity.
    pub fn namespaced(group: impl Into<String>, kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Construct a cluster-scoped identity (namespace is the empty string).
    pub fn cluster_scoped(group: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: String::new(),
            name: name.into(),
        }
    }

    /// True if this identity has no namespace segment.
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }

    /// The `group/version/kind` string used as a tie-break key in [`Ord`].
    fn group_version_kind_key(&self) -> String {
        format!("{}_{}", self.group, self.kind)
    }

    /// The inventory ConfigMap data-key form: `<namespace>_<name>_<group>_<Kind>`.
    pub fn inventory_key(&self) -> String {
        format!("{}_{}_{}_{}", self.namespace, self.name, self.group, self.kind)
    }

    /// Parse one entry of a `config.kubernetes.io/depends-on` annotation.
    ///
    /// Accepts either `<group>/namespaces/<namespace>/<kind>/<name>` or the
    /// cluster-scoped shorthand `<group>/<kind>/<name>`; `group` may be
    /// empty (core group). Anything else is an
    /// [`InvalidAnnotationError`].
    pub fn parse_dependency_ref(owner: &ObjectId, reference: &str) -> Result<Self, InvalidAnnotationError> {
        let err = |reason: &str| InvalidAnnotationError {
            object: owner.clone(),
            reference: reference.to_string(),
            reason: reason.to_string(),
        };
        let segments: Vec<&str> = reference.trim().split('/').collect();
        match segments.as_slice() {
            [group, "namespaces", namespace, kind, name] => {
                if namespace.is_empty() || kind.is_empty() || name.is_empty() {
                    return Err(err("namespace, kind, and name segments must be non-empty"));
                }
                Ok(ObjectId::namespaced(*group, *kind, *namespace, *name))
            }
            [group, kind, name] => {
                if kind.is_empty() || name.is_empty() {
                    return Err(err("kind and name segments must be non-empty"));
                }
                Ok(ObjectId::cluster_scoped(*group, *kind, *name))
            }
            _ => Err(err("expected <group>/namespaces/<ns>/<kind>/<name> or <group>/<kind>/<name>")),
        }
    }

    /// Parse an inventory ConfigMap data key back into an [`ObjectId`].
    ///
    /// The format is `<namespace>_<name>_<group>_<Kind>`; `group` may itself
    /// be empty or contain dots, but never an underscore, so splitting on the
    /// first three underscores from the left is sound.
    pub fn parse_inventory_key(key: &str) -> Option<Self> {
        let mut parts = key.splitn(4, '_');
        let namespace = parts.next()?.to_string();
        let name = parts.next()?.to_string();
        let group = parts.next()?.to_string();
        let kind = parts.next()?.to_string();
        Some(Self { group, kind, namespace, name })
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inventory_key())
    }
}

/// [`ObjectId`] plus the API version it was last observed or applied at.
///
/// This is what the inventory persists: pruning and status reporting need
/// the version to re-address the object, while graph and filter logic only
/// ever need the version-agnostic [`ObjectId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// The version-agnostic identity.
    pub id: ObjectId,
    /// API version, e.g. `v1` or `v1beta1`.
    pub version: String,
}

impl ObjectRef {
    /// Build an `ObjectRef` from an id and a version.
    pub fn new(id: ObjectId, version: impl Into<String>) -> Self {
        Self { id, version: version.into() }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.id)
    }
}

/// The type-priority table from spec §4.A.
///
/// Lower priorities apply first and prune last (reverse order). Kinds not
/// listed here get priority `0`; `ValidatingWebhookConfiguration` always
/// sorts after every other kind.
const TYPE_PRIORITIES: &[&str] = &[
    "Namespace",
    "ResourceQuota",
    "StorageClass",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "ServiceAccount",
    "PodSecurityPolicy",
    "Role",
    "ClusterRole",
    "RoleBinding",
    "ClusterRoleBinding",
    "ConfigMap",
    "Secret",
    "Service",
    "LimitRange",
    "PriorityClass",
    "Deployment",
    "StatefulSet",
    "CronJob",
    "PodDisruptionBudget",
];

const UNKNOWN_KIND_PRIORITY: i32 = 0;
const VALIDATING_WEBHOOK_PRIORITY: i32 = 1;

/// Returns the apply-order priority of `kind`: negative for the well-known
/// early kinds (in the order of [`TYPE_PRIORITIES`]), `0` for anything
/// unrecognised, and `1` for `ValidatingWebhookConfiguration`, which always
/// applies last.
pub fn type_priority(kind: &str) -> i32 {
    if kind == "ValidatingWebhookConfiguration" {
        return VALIDATING_WEBHOOK_PRIORITY;
    }
    match TYPE_PRIORITIES.iter().position(|&k| k == kind) {
        // Map position 0..N-1 to priorities -N..-1, so the first entry in the
        // table sorts first.
        Some(pos) => pos as i32 - TYPE_PRIORITIES.len() as i32,
        None => UNKNOWN_KIND_PRIORITY,
    }
}

impl ObjectId {
    /// The total order from spec §4.A: type-priority, then
    /// `group_version_kind`, then namespace, then name.
    fn order_key(&self) -> (i32, String, &str, &str) {
        (type_priority(&self.kind), self.group_version_kind_key(), self.namespace.as_str(), self.name.as_str())
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}
