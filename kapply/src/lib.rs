//! `kapply`: a declarative actuation engine in the style of `cli-utils`'s
//! apply/prune reconciler, built the way `kube` composes its own `Client`,
//! `Api`, and `Controller` facades over lower coordination crates.
//!
//! This crate is the thin public surface over three lower layers:
//!
//! - `kapply-core` — identity, data model, shared errors.
//! - `kapply-client` — transport trait contracts and the Inventory Store.
//! - `kapply-runtime` — the dependency graph, filters, solver, task runner,
//!   and wait engine.
//!
//! [`Applier`] drives a desired object set to match the live cluster;
//! [`Destroyer`] tears down everything a prior `Applier` run tracked. Both
//! return a [`RunHandle`] immediately and execute their queue on a spawned
//! task, the way `kube_runtime::Controller::run` hands back a `Stream` the
//! caller drives independently of the reconciler loop.
pub mod applier;
pub mod destroyer;
pub mod error;
pub mod handle;
pub mod options;

pub use applier::{Applier, ApplierBuilder};
pub use destroyer::{Destroyer, DestroyerBuilder};
pub use error::{Error, Result};
pub use handle::RunHandle;
pub use options::{Options, ServerSideApplyOptions};

pub use kapply_client::{
    client::{ApplyOptions, ClientError, DeleteOptions, DynamicApi, ObjectMetadataView},
    inventory::{ConfigMapInventoryClient, InMemoryInventoryClient, InventoryClient, InventoryError, InventoryInfo},
    poller::{LiveStatus, StatusEvent, StatusPoller},
};
pub use kapply_core::{
    id::{ObjectId, ObjectRef},
    inventory::{Actuation, Inventory, ObjectStatus, Reconcile, Strategy},
    object::Object,
    policy::{DryRunStrategy, Policy, PrunePropagationPolicy},
};
pub use kapply_runtime::{
    Action, ActuationOutcome, ApplyEvent, Condition, Event, PruneEvent, WaitEvent, WaitOutcome,
};
