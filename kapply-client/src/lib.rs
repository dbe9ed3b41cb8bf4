//! Transport-facing trait contracts and inventory storage backends.
//!
//! Per spec §1, the REST transport to the API server and the per-object
//! status poller are external collaborators: this crate defines the traits
//! the engine needs from them ([`client::DynamicApi`],
//! [`poller::StatusPoller`]) without implementing either. What *is* in
//! scope here is the Inventory Store (spec §4.C): the [`inventory::InventoryClient`]
//! trait and its `ConfigMap`-backed and in-memory implementations.
pub mod client;
pub mod inventory;
pub mod legacy_name;
pub mod poller;

pub use client::{ApplyOptions, ClientError, DeleteOptions, DynamicApi, ObjectMetadataView};
pub use inventory::{InMemoryInventoryClient, InventoryClient, InventoryError, InventoryInfo};
pub use poller::{LiveStatus, StatusEvent, StatusPoller};
