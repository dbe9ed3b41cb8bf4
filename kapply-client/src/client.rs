//! The dynamic REST transport contract.
//!
//! Spec §1 names this an external collaborator: "assumed to provide CRUD +
//! list-with-selector + dynamic resource mapping + watch". [`DynamicApi`] is
//! the minimal slice of that contract the coordination layer actually calls
//! into; a real implementation backs it with an HTTP client against an API
//! server, a test implementation backs it with an in-memory map.
use async_trait::async_trait;
use kapply_core::{id::ObjectId, object::Object, policy::PrunePropagationPolicy};
use thiserror::Error;

/// Options for a single apply (create-or-update) request.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Use server-side apply rather than a client-side three-way merge.
    pub server_side: bool,
    /// Force a server-side apply through ownership conflicts.
    pub force_conflicts: bool,
    /// The field manager identity to apply under.
    pub field_manager: Option<String>,
    /// Send the request with the server-side dry-run flag set.
    pub server_dry_run: bool,
}

/// Options for a single delete (prune) request.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    /// How the delete should propagate to owned dependents.
    pub propagation_policy: PrunePropagationPolicy,
    /// Send the request with the server-side dry-run flag set.
    pub server_dry_run: bool,
}

/// A minimal, metadata-only view of a live object, used by filters that only
/// need to inspect annotations/labels/uid without paying for the full
/// payload (spec §4.D `InventoryPolicyApplyFilter`: "reads the live object
/// via a metadata-only client").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadataView {
    /// The object's identity.
    pub id: ObjectId,
    /// The server-assigned UID.
    pub uid: Option<String>,
    /// Annotation values, looked up by key as needed by filters.
    pub annotations: std::collections::BTreeMap<String, String>,
}

impl ObjectMetadataView {
    /// Read a single annotation value.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Transport-level failures the coordination layer treats uniformly as
/// fatal (spec §7 `FatalError{cause}` wraps these).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The object does not exist on the server.
    #[error("object not found: {0}")]
    NotFound(ObjectId),
    /// The server rejected the request outright (validation, RBAC, etc).
    #[error("server rejected request for {id}: {message}")]
    Rejected {
        /// The object the request was for.
        id: ObjectId,
        /// The server's message.
        message: String,
    },
    /// A write lost an optimistic-concurrency race; the caller should re-get
    /// and retry.
    #[error("optimistic concurrency conflict on {0}")]
    Conflict(ObjectId),
    /// The underlying transport failed (timeouts, connection errors, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// The dynamic CRUD contract the engine drives apply/prune tasks through.
///
/// Implementations are expected to perform their own discovery/resource
/// mapping internally; the coordination layer never needs anything beyond
/// [`ObjectId`] to address a call.
#[async_trait]
pub trait DynamicApi: Send + Sync {
    /// Fetch the full live object, if it exists.
    async fn get(&self, id: &ObjectId) -> Result<Option<Object>, ClientError>;

    /// Fetch a metadata-only view of the live object, if it exists.
    async fn get_metadata(&self, id: &ObjectId) -> Result<Option<ObjectMetadataView>, ClientError>;

    /// Create or update `object` to match its desired payload.
    ///
    /// Returns the live object as observed immediately after the request,
    /// including the server-assigned `uid`.
    async fn apply(&self, object: &Object, options: &ApplyOptions) -> Result<Object, ClientError>;

    /// Delete the object identified by `id`.
    ///
    /// Idempotent: deleting an object that is already gone is success, not
    /// [`ClientError::NotFound`].
    async fn delete(&self, id: &ObjectId, options: &DeleteOptions) -> Result<(), ClientError>;

    /// List every object of `(group, kind)` in `namespace` carrying
    /// `label_key = label_value`.
    ///
    /// Used solely by the inventory backend to find its own backing objects;
    /// the coordination layer never lists arbitrary desired-set kinds this
    /// way (spec §1: list-with-selector is an assumed transport capability).
    async fn list_by_label(
        &self,
        group: &str,
        kind: &str,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<Object>, ClientError>;

    /// Invalidate any cached API discovery/resource mapping.
    ///
    /// Called after applying `CustomResourceDefinition`s (spec §4.E step 7,
    /// the `ResetMapper` task) so that subsequent calls can resolve newly
    /// registered kinds.
    fn reset_mapper(&self) {}
}
