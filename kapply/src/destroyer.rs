//! `Destroyer`: the public entry point for `destroy` runs, spec §2 "destroy"
//! — prune every object the inventory tracks, desiring nothing.
use std::sync::Arc;

use kapply_client::{
    client::DynamicApi,
    inventory::{InventoryClient, InventoryInfo},
    poller::StatusPoller,
};
use kapply_core::inventory::Inventory;
use kapply_runtime::{events, runner::RunnerOptions, solver};
use tracing::instrument;

use crate::{error::Error, handle::RunHandle, options::Options};

/// Tears down every object a prior [`Applier`](crate::Applier) run recorded,
/// spec §2 "destroy". Desires nothing, so every tracked object is pruned.
pub struct Destroyer {
    api: Arc<dyn DynamicApi>,
    poller: Arc<dyn StatusPoller>,
    inventory_client: Arc<dyn InventoryClient>,
}

impl Destroyer {
    /// Start building a `Destroyer` over the given collaborators.
    pub fn builder() -> DestroyerBuilder {
        DestroyerBuilder::default()
    }

    /// Run one destroy: load the inventory named by `inventory_info`, queue
    /// every tracked object for deletion, and run the queue to completion.
    ///
    /// `options.prune` is ignored — a destroy always prunes everything the
    /// inventory tracks, regardless of that flag.
    #[instrument(skip(self), fields(inventory_id = %inventory_info.id))]
    pub async fn run(&self, inventory_info: InventoryInfo, options: Options) -> Result<RunHandle, Error> {
        let prior_inventory = self.inventory_client.load(&inventory_info).await?.unwrap_or_else(|| Inventory::empty(inventory_info.id.clone()));

        let solver_options = solver::SolverOptions {
            reconcile_timeout: options.reconcile_timeout,
            prune: true,
            prune_timeout: options.prune_timeout,
            dry_run: options.dry_run,
            policy: options.inventory_policy,
        };
        let (context, tasks) = solver::build_prune_queue(prior_inventory, inventory_info.id.clone(), &solver_options)?;

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
            Vec::new(),
            self.api.clone(),
            self.poller.clone(),
            self.inventory_client.clone(),
            inventory_info,
            runner_options,
        );

        let task = tokio::spawn(async move { runner.run(tasks).await });

        Ok(RunHandle::new(receiver, cancellation, task))
    }
}

/// Builder for [`Destroyer`].
#[derive(Default)]
pub struct DestroyerBuilder {
    api: Option<Arc<dyn DynamicApi>>,
    poller: Option<Arc<dyn StatusPoller>>,
    inventory_client: Option<Arc<dyn InventoryClient>>,
}

impl DestroyerBuilder {
    /// The transport the engine issues delete/get RPCs through.
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
    /// [`Self::inventory_client`] was never called.
    pub fn build(self) -> Destroyer {
        Destroyer {
            api: self.api.expect("DestroyerBuilder::dynamic_api was never called"),
            poller: self.poller.expect("DestroyerBuilder::status_poller was never called"),
            inventory_client: self.inventory_client.expect("DestroyerBuilder::inventory_client was never called"),
        }
    }
}
