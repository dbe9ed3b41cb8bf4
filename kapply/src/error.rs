//! The facade's top-level error enum, spec §7.
//!
//! Mirrors how `kube::Error` wraps `kube_core::Error` and transport errors
//! with `#[from]`: every coordination-layer crate's own error enum is
//! absorbed here so callers only ever need to match on one type.
use kapply_client::{client::ClientError, inventory::InventoryError};
use kapply_core::error::CyclicDependencyError;
use kapply_runtime::{GraphError, RunError, SolverError};
use thiserror::Error;

/// Everything that can go wrong driving an [`crate::Applier`] or
/// [`crate::Destroyer`] run.
#[derive(Debug, Error)]
pub enum Error {
    /// Queue construction failed before any task executed (spec §7
    /// "Validation" taxonomy): a duplicate id, an unparseable `depends-on`
    /// reference, or a cyclic graph.
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The dependency graph itself could not be built.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The graph contained a cycle. Kept distinct from [`Error::Solver`]
    /// because callers that only care about cycles (e.g. a `kapply plan`
    /// dry-run preview) can match this variant directly instead of
    /// destructuring through `SolverError`.
    #[error(transparent)]
    CyclicDependency(#[from] CyclicDependencyError),
    /// Loading or storing the inventory failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// The transport rejected a request outside of the run loop (e.g. the
    /// initial inventory load's underlying `get`/`list` call).
    #[error(transparent)]
    Client(#[from] ClientError),
    /// A fatal error was raised while the queue was running; see
    /// [`kapply_runtime::RunError`] for the taxonomy (filter fatals,
    /// mutator failures, transport failures mid-run).
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Convenience alias for results bounded by [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
