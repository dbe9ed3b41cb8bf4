//! The coordination layer: dependency graph, validation filters, solver,
//! task runner, wait engine, and event stream for the kapply actuation
//! engine.
//!
//! This crate owns every piece of `kapply`'s behavior that does not talk
//! directly to a cluster; `kapply-client` supplies the `DynamicApi`,
//! `StatusPoller`, and `InventoryClient` collaborators this crate drives,
//! and the `kapply` facade wires a [`solver::build_apply_queue`] /
//! [`runner::TaskRunner`] pair together behind a small public API.
//!
//! - [`graph`] — the dependency DAG and topological wave computation.
//! - [`mutate`] — apply-time-mutation field injection.
//! - [`context`] — the run-scoped inventory/invalid-object/cancellation state.
//! - [`events`] — the typed event envelope consumers observe.
//! - [`wait`] — the reconcile wait/poll engine.
//! - [`filter`] — the fixed apply/prune validation pipelines.
//! - [`task`] — queue entry types and their monotonic naming.
//! - [`solver`] — builds the ordered task queue from a desired object set.
//! - [`runner`] — executes a built queue against the injected collaborators.

pub mod context;
pub mod events;
pub mod filter;
pub mod graph;
pub mod mutate;
pub mod runner;
pub mod solver;
pub mod task;
pub mod wait;

pub use context::{InventoryManager, TaskContext};
pub use events::{Action, ActuationOutcome, ApplyEvent, Event, EventReceiver, EventSender, PruneEvent, WaitEvent};
pub use graph::{DependencyGraph, GraphError};
pub use runner::{RunError, RunnerOptions, TaskRunner};
pub use solver::{build_apply_queue, build_prune_queue, SolverError, SolverOptions};
pub use task::{Task, TaskKind, TaskNamer};
pub use wait::{Condition, TimeoutError, WaitOutcome, WaitTask};
