//! Inventory ownership policy and dry-run strategy, spec §3.
use serde::{Deserialize, Serialize};

/// Controls whether apply/prune may touch an existing object whose
/// `owning-inventory` annotation is empty or belongs to another inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Policy {
    /// The live object's `owning-inventory` annotation must equal ours.
    #[default]
    MustMatch,
    /// Adopt the object if it has no `owning-inventory` annotation yet;
    /// otherwise require a match.
    AdoptIfNoInventory,
    /// Adopt unconditionally, regardless of the live annotation.
    AdoptAll,
}

/// Whether, and how, this run should avoid mutating the live cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DryRunStrategy {
    /// Mutate the cluster normally.
    #[default]
    None,
    /// Skip all mutation locally; no request is sent to the server at all.
    Client,
    /// Send the request with the server-side dry-run flag set.
    Server,
}

/// How a delete should propagate to dependents owned via `ownerReferences`.
///
/// This is a pass-through value: the engine does not implement propagation
/// semantics itself (that is the transport's concern), it only threads the
/// caller's chosen policy uniformly into every prune request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PrunePropagationPolicy {
    /// Delete dependents first, then the object itself.
    #[default]
    Foreground,
    /// Delete the object first; dependents become orphaned then garbage
    /// collected asynchronously.
    Background,
    /// Delete the object only; dependents are orphaned permanently.
    Orphan,
}

impl DryRunStrategy {
    /// True only for [`DryRunStrategy::None`]: whether this run is expected
    /// to produce real server-side effects at all, including inventory
    /// writes and wait tasks.
    pub fn mutates(self) -> bool {
        matches!(self, DryRunStrategy::None)
    }

    /// True for [`DryRunStrategy::Server`]: whether outbound requests should
    /// still be sent, carrying the server-side dry-run flag.
    pub fn is_server_side(self) -> bool {
        matches!(self, DryRunStrategy::Server)
    }

    /// True for [`DryRunStrategy::Client`]: whether outbound requests should
    /// be suppressed entirely, including dry-run ones.
    pub fn is_client_side(self) -> bool {
        matches!(self, DryRunStrategy::Client)
    }
}
