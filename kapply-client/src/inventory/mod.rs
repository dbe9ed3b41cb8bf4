//! The Inventory Store, spec §4.C.
//!
//! [`InventoryClient`] is the pluggable storage contract; [`config_map`]
//! implements it against a single ConfigMap-shaped server object (the wire
//! format in spec §6), and [`memory`] implements it purely in-process for
//! tests and ephemeral use.
pub mod config_map;
pub mod memory;

use async_trait::async_trait;
use kapply_core::{inventory::Inventory, policy::DryRunStrategy};
use thiserror::Error;

pub use config_map::ConfigMapInventoryClient;
pub use memory::InMemoryInventoryClient;

/// Names and addresses a single logical inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryInfo {
    /// The namespace the backing object lives in.
    pub namespace: String,
    /// The backing object's name (subject to legacy-name fix-up).
    pub name: String,
    /// The opaque inventory id.
    pub id: String,
}

/// Failures from [`InventoryClient`] operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The backing object's stored id does not match the one requested.
    #[error("inventory id mismatch: requested {requested:?}, backing object carries {found:?}")]
    MismatchedInventoryId {
        /// The id the caller asked to load.
        requested: String,
        /// The id actually stored on the backing object.
        found: String,
    },
    /// More than one backing object carries the requested id's label.
    #[error("found {count} inventory objects carrying id {id:?}, expected at most one")]
    MultipleInventoryObj {
        /// The id that matched more than one backing object.
        id: String,
        /// How many backing objects matched.
        count: usize,
    },
    /// `Store` exhausted its optimistic-concurrency retry budget.
    #[error("inventory store retries exhausted after {attempts} attempt(s)")]
    RetriesExhausted {
        /// How many attempts were made before giving up.
        attempts: u32,
    },
    /// The inventory payload failed to decode.
    #[error("failed to decode inventory payload")]
    Decode(#[from] serde_json::Error),
    /// The underlying transport failed.
    #[error(transparent)]
    Client(#[from] crate::client::ClientError),
}

/// The pluggable inventory storage contract, spec §4.C.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Load the inventory named by `info`, or `Ok(None)` if no backing
    /// object exists yet. Never returns `Ok(None)` for "backing object
    /// exists but has the wrong id" — that is
    /// [`InventoryError::MismatchedInventoryId`].
    async fn load(&self, info: &InventoryInfo) -> Result<Option<Inventory>, InventoryError>;

    /// Persist `inventory`. A no-op that returns `Ok(())` immediately when
    /// `dry_run` is anything other than [`DryRunStrategy::None`].
    async fn store(&self, info: &InventoryInfo, inventory: &Inventory, dry_run: DryRunStrategy) -> Result<(), InventoryError>;

    /// Delete the backing object for `info`. Idempotent: deleting an
    /// already-absent inventory is success.
    async fn delete(&self, info: &InventoryInfo, dry_run: DryRunStrategy) -> Result<(), InventoryError>;

    /// List every inventory whose backing object carries `info.id`'s label,
    /// scoped to `info.namespace`.
    async fn list(&self, info: &InventoryInfo) -> Result<Vec<Inventory>, InventoryError>;
}
