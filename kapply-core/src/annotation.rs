//! Well-known annotation and label keys the engine reads and writes.
//!
//! See spec §6 "Annotations the engine reads on desired objects" for the
//! authoritative table; the constants here are the single source of truth so
//! that filters, the graph builder, and the inventory backends never
//! hand-type these strings.

/// CSV of dependency references; see [`crate::id::ObjectId`] parsing in
/// `kapply-runtime`'s graph builder for the reference grammar.
pub const DEPENDS_ON: &str = "config.kubernetes.io/depends-on";

/// The inventory id this object is claimed by, compared against the running
/// inventory's id by the policy filters.
pub const OWNING_INVENTORY: &str = "config.k8s.io/owning-inventory";

/// `keep` prevents pruning.
pub const ON_REMOVE: &str = "cli-utils.sigs.k8s.io/on-remove";
/// The value of [`ON_REMOVE`] that prevents pruning.
pub const ON_REMOVE_KEEP: &str = "keep";

/// `detach` prevents pruning (newer spelling of [`ON_REMOVE`]).
pub const LIFECYCLE_DELETION: &str = "client.lifecycle.config.k8s.io/deletion";
/// The value of [`LIFECYCLE_DELETION`] that prevents pruning.
pub const LIFECYCLE_DELETION_DETACH: &str = "detach";

/// `ignore` prevents updating an object that already exists on the server.
pub const LIFECYCLE_MUTATION: &str = "client.lifecycle.config.k8s.io/mutation";
/// The value of [`LIFECYCLE_MUTATION`] that prevents updating.
pub const LIFECYCLE_MUTATION_IGNORE: &str = "ignore";

/// Inline JSON array of apply-time-mutation entries.
pub const APPLY_TIME_MUTATION: &str = "config.kubernetes.io/apply-time-mutation";

/// The label on the inventory backing object carrying the opaque inventory
/// id.
pub const INVENTORY_ID_LABEL: &str = "cli-utils.sigs.k8s.io/inventory-id";
