//! Shared identity, data model, and error types for the kapply actuation engine.
//!
//! This crate has no knowledge of how objects are transported to or from an
//! API server; it only defines the vocabulary that the rest of the workspace
//! (`kapply-client`, `kapply-runtime`, `kapply`) builds on:
//!
//! - [`id`] — [`ObjectId`]/[`ObjectRef`] identity and the deterministic
//!   type-priority ordering used whenever objects must be iterated in a
//!   stable order.
//! - [`object`] — the generic, dynamically-typed object wrapper the engine
//!   passes around instead of branching on kind.
//! - [`inventory`] — the [`Inventory`]/[`ObjectStatus`] record shape.
//! - [`annotation`] — the well-known annotation/label keys the engine reads
//!   and writes.
//! - [`error`] — the shared, structured error vocabulary.

pub mod annotation;
pub mod error;
pub mod id;
pub mod inventory;
pub mod object;
pub mod policy;

pub use error::{CyclicDependencyError, Error};
pub use id::{ObjectId, ObjectRef};
pub use inventory::{Actuation, Inventory, ObjectStatus, Reconcile, Strategy};
pub use object::Object;
pub use policy::{DryRunStrategy, Policy, PrunePropagationPolicy};

/// Convenience alias for results bounded by this crate's [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
