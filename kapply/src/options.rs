//! The public configuration surface, spec §6 `Options`.
//!
//! There is no separate config-file or env-var layer: the CLI shell and
//! manifest loading are out of scope (spec §1), so `Options` and
//! [`ServerSideApplyOptions`] *are* the library's configuration surface, the
//! way `kube_runtime::Config` is for a controller's watch/backoff tuning.
use std::time::Duration;

use kapply_core::policy::{DryRunStrategy, Policy, PrunePropagationPolicy};

/// Server-side apply tuning, spec §6 `ServerSideOptions`.
#[derive(Debug, Clone)]
pub struct ServerSideApplyOptions {
    /// Use server-side apply rather than a client-side three-way merge.
    pub server_side_apply: bool,
    /// Force a server-side apply through field-ownership conflicts.
    pub force_conflicts: bool,
    /// The field manager identity to apply under.
    pub field_manager: String,
}

impl Default for ServerSideApplyOptions {
    fn default() -> Self {
        Self {
            server_side_apply: true,
            force_conflicts: false,
            field_manager: "kapply".to_string(),
        }
    }
}

/// Tunables for one [`crate::Applier::run`] invocation, spec §6 `Options`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Server-side apply tuning.
    pub server_side: ServerSideApplyOptions,
    /// How long to wait for each apply wave to reach `Current`. Zero means
    /// "do not wait".
    pub reconcile_timeout: Duration,
    /// Whether to prune objects no longer in the desired set.
    pub prune: bool,
    /// Whether, and how, this run should avoid mutating the live cluster.
    pub dry_run: DryRunStrategy,
    /// How deletes during pruning should propagate to owned dependents.
    pub prune_propagation_policy: PrunePropagationPolicy,
    /// How long to wait for each prune wave to reach `NotFound`. Zero means
    /// "do not wait".
    pub prune_timeout: Duration,
    /// The inventory ownership policy filters enforce.
    pub inventory_policy: Policy,
    /// Forward every raw status observation from the poller on the event
    /// stream as [`kapply_runtime::Event::Status`], not just the derived
    /// per-object apply/prune/wait events.
    pub emit_status_events: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            server_side: ServerSideApplyOptions::default(),
            reconcile_timeout: Duration::ZERO,
            prune: false,
            dry_run: DryRunStrategy::None,
            prune_propagation_policy: PrunePropagationPolicy::default(),
            prune_timeout: Duration::ZERO,
            inventory_policy: Policy::default(),
            emit_status_events: false,
        }
    }
}
