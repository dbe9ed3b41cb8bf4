//! `Applier`: the public entry point for `apply` runs, spec §2's
//! composition sequence specialised to "apply".
use std::sync::Arc;

use kapply_client::{
    client::DynamicApi,
    inventory::{InventoryClient, InventoryInfo},
    legacy_name,
    poller::StatusPoller,
};
use kapply_core::{object::Object, policy::DryRunStrategy};
use kapply_runtime::{events, runner::RunnerOptions, solver};
use rand::rng;
use tracing::instrument;

use crate::{error::Error, handle::RunHandle, options::Options};

/// Drives a desired [`Object`] set to match the live cluster, spec §2.
///
/// `Applier` is stateless between runs: every [`Applier::run`] call is an
/// independent engine invocation with its own graph, task context, and task
/// queue (spec §3 "Lifecycle"). Only the injected collaborators
/// ([`DynamicApi`], [`StatusPoller`], [`InventoryClient`]) are shared.
pub struct Applier {
    api: Arc<dyn DynamicApi>,
    poller: Arc<dyn StatusPoller>,
    inventory_client: Arc<dyn InventoryClient>,
}

impl Applier {
    /// Start building an `Applier` over the given collaborators.
    pub fn builder() -> ApplierBuilder {
        ApplierBuilder::default()
    }

    /// Run one apply, spec §2 composition steps 1-8.
    ///
    /// Returns a [`RunHandle`] immediately; the queue executes on a spawned
    /// task while the caller drains [`RunHandle::recv`] for events. Await
    /// [`RunHandle::join`] for the terminal `Result`.
    #[instrument(skip(self, desired), fields(desired = desired.len(), inventory_id = %inventory_info.id))]
    pub async fn run(&self, desired: Vec<Object>, mut inventory_info: InventoryInfo, options: Options) -> Result<RunHandle, Error> {
        inventory_info.name = legacy_name::fix_up_legacy_name(&inventory_info.name, &mut rng());

        let prior_inventory = self.inventory_client.load(&inventory_info).await?;

        let solver_options = solver::SolverOptions {
            reconcile_timeout: options.reconcile_timeout,
            prune: options.prune,
            prune_timeout: options.prune_timeout,
            dry_run: options.dry_run,
            policy: options.inventory_policy,
        };
        let (context, tasks) = solver::build_apply_queue(desired.clone(), prior_inventory, inventory_info.id.clone(), &solver_options)?;

        let cancellation = context.cancellation();
        let (sender, receiver) = events::channel();
        context.set_event_sender(sender);

        let runner_options = RunnerOptions {
            server_side: options.server_side.server_side_apply,
            force_conflicts: options.server_side.force_conflicts,
            field_manager: Some(options.server_side.field_manager.clone()),
            propagation_policy: options.prune_propagation_policy,
            dry_run: options.dry_run,
            policy: options.inventory_policy,
            emit_status_events: options.emit_status_events,
        };
        let runner = kapply_runtime::TaskRunner::new(
            context,
            desired,
            self.api.clone(),
            self.poller.clone(),
            self.inventory_client.clone(),
            inventory_info,
            runner_options,
        );

        let task = tokio::spawn(async move { runner.run(tasks).await });

        Ok(RunHandle::new(receiver, cancellation, task))
    }

    /// Run an apply with [`DryRunStrategy::Client`] forced on, ignoring
    /// whatever `options.dry_run` carries. Convenience for callers building
    /// a plan-preview command; equivalent to setting the field directly.
    pub async fn plan(&self, desired: Vec<Object>, inventory_info: InventoryInfo, mut options: Options) -> Result<RunHandle, Error> {
        options.dry_run = DryRunStrategy::Client;
        self.run(desired, inventory_info, options).await
    }
}

/// Builder for [`Applier`].
#[derive(Default)]
pub struct ApplierBuilder {
    api: Option<Arc<dyn DynamicApi>>,
    poller: Option<Arc<dyn StatusPoller>>,
    inventory_client: Option<Arc<dyn InventoryClient>>,
}

impl ApplierBuilder {
    /// The transport the engine issues apply/prune/get RPCs through.
    #[must_use]
    pub fn dynamic_api(mut self, api: Arc<dyn DynamicApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// The status poller the wait engine subscribes to.
    #[must_use]
    pub fn status_poller(mut self, poller: Arc<dyn StatusPoller>) -> Self {
        self.poller = Some(poller);
        self
    }

    /// The inventory storage backend.
    #[must_use]
    pub fn inventory_client(mut self, client: Arc<dyn InventoryClient>) -> Self {
        self.inventory_client = Some(client);
        self
    }

    /// Finish building.
    ///
    /// # Panics
    ///
    /// Panics if any of [`Self::dynamic_api`], [`Self::status_poller`], or
    /// [`Self::inventory_client`] was never called — every collaborator is
    /// required, there is no sensible default transport.
    pub fn build(self) -> Applier {
        Applier {
            api: self.api.expect("ApplierBuilder::dynamic_api was never called"),
            poller: self.poller.expect("ApplierBuilder::status_poller was never called"),
            inventory_client: self.inventory_client.expect("ApplierBuilder::inventory_client was never called"),
        }
    }
}
