//! Shared in-memory state for one engine run, spec §4.F.
use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use kapply_core::{
    id::{ObjectId, ObjectRef},
    inventory::{Actuation, Inventory, ObjectStatus, Reconcile, Strategy},
    object::Object,
};
use tokio_util::sync::CancellationToken;

use crate::{events::EventSender, graph::DependencyGraph};

/// A façade over the in-memory [`Inventory`] (spec §4.C's payload) with the
/// typed helpers filters, the solver, and the wait engine call into.
///
/// Not safe for concurrent *writers* (the runner is single-threaded per
/// spec §5), but reads and writes are still mutex-guarded so that filters
/// running inline with the runner and a wait task's poll-event handler can
/// share one `Arc<TaskContext>` without `unsafe`.
pub struct InventoryManager {
    inventory: Mutex<Inventory>,
    /// Live payloads captured immediately after a successful apply, used by
    /// [`crate::mutate::ApplyTimeMutator`] to resolve source field values.
    live_objects: Mutex<HashMap<ObjectId, Object>>,
}

impl InventoryManager {
    /// Start a run with inventory `id` and no tracked members yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inventory: Mutex::new(Inventory::empty(id)),
            live_objects: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the manager from a previously-loaded inventory, replacing
    /// whatever was there (used once, right after `Load`).
    pub fn seed(&self, inventory: Inventory) {
        *self.inventory.lock().expect("inventory mutex poisoned") = inventory;
    }

    /// The opaque inventory id this run is writing under.
    pub fn id(&self) -> String {
        self.inventory.lock().expect("inventory mutex poisoned").id.clone()
    }

    /// A point-in-time clone of the full inventory, for `Store`.
    pub fn snapshot(&self) -> Inventory {
        self.inventory.lock().expect("inventory mutex poisoned").clone()
    }

    /// Track `object_ref` with a fresh `Apply`/Pending status, unless it is
    /// already tracked.
    pub fn add_pending_apply(&self, object_ref: ObjectRef) {
        let mut inventory = self.inventory.lock().expect("inventory mutex poisoned");
        if inventory.object_refs.insert(object_ref.clone()) {
            inventory.object_statuses.push(ObjectStatus::pending_apply(object_ref));
        }
    }

    /// Track `object_ref` with a fresh `Delete`/Pending status, unless it is
    /// already tracked.
    pub fn add_pending_delete(&self, object_ref: ObjectRef) {
        let mut inventory = self.inventory.lock().expect("inventory mutex poisoned");
        if inventory.object_refs.insert(object_ref.clone()) {
            inventory.object_statuses.push(ObjectStatus::pending_delete(object_ref));
        }
    }

    /// Overwrite the status entry for `status.object_ref`.
    ///
    /// Panics if no entry for that ref exists: every ref must have been
    /// registered via [`Self::add_pending_apply`]/[`Self::add_pending_delete`]
    /// first. A missing entry here is a solver bug, not a runtime condition.
    pub fn set_object_status(&self, status: ObjectStatus) {
        let mut inventory = self.inventory.lock().expect("inventory mutex poisoned");
        let slot = inventory
            .object_statuses
            .iter_mut()
            .find(|s| s.object_ref == status.object_ref)
            .unwrap_or_else(|| panic!("set_object_status on untracked ref {}", status.object_ref));
        *slot = status;
    }

    /// The current status for `id`, across any tracked version.
    pub fn object_status(&self, id: &ObjectId) -> Option<ObjectStatus> {
        let inventory = self.inventory.lock().expect("inventory mutex poisoned");
        inventory.object_statuses.iter().find(|s| &s.object_ref.id == id).cloned()
    }

    /// Every id whose apply succeeded this run.
    pub fn successful_applies(&self) -> HashSet<ObjectId> {
        self.matching(|s| s.strategy == Strategy::Apply && s.actuation == Actuation::Succeeded)
    }

    /// Every id whose delete failed this run.
    pub fn failed_deletes(&self) -> HashSet<ObjectId> {
        self.matching(|s| s.strategy == Strategy::Delete && s.actuation == Actuation::Failed)
    }

    /// Every id whose reconcile ended as `Skipped`.
    pub fn skipped_reconciles(&self) -> HashSet<ObjectId> {
        self.matching(|s| s.reconcile == Reconcile::Skipped)
    }

    /// The UIDs captured for every object this run applied.
    pub fn applied_resource_uids(&self) -> HashSet<String> {
        let inventory = self.inventory.lock().expect("inventory mutex poisoned");
        inventory
            .object_statuses
            .iter()
            .filter(|s| s.strategy == Strategy::Apply)
            .filter_map(|s| s.uid.clone())
            .collect()
    }

    fn matching(&self, predicate: impl Fn(&ObjectStatus) -> bool) -> HashSet<ObjectId> {
        let inventory = self.inventory.lock().expect("inventory mutex poisoned");
        inventory
            .object_statuses
            .iter()
            .filter(|s| predicate(s))
            .map(|s| s.object_ref.id.clone())
            .collect()
    }

    /// Drop `id` from the tracked set entirely (used after a successful
    /// prune, once the final inventory write no longer needs to carry it).
    pub fn forget(&self, id: &ObjectId) {
        let mut inventory = self.inventory.lock().expect("inventory mutex poisoned");
        inventory.object_refs.retain(|r| &r.id != id);
        inventory.object_statuses.retain(|s| &s.object_ref.id != id);
    }

    /// True if no tracked entry is a `Delete` any more.
    ///
    /// [`Self::forget`] drops a `Delete` entry the moment its actuation
    /// succeeds, so any survivor here failed or was skipped. Used by the
    /// runner's `InvDelete` task (spec §4.E step 9) to decide whether the
    /// inventory's backing object can be removed outright, or must instead
    /// be stored with the surviving entries recorded.
    pub fn all_deletes_succeeded(&self) -> bool {
        let inventory = self.inventory.lock().expect("inventory mutex poisoned");
        !inventory.object_statuses.iter().any(|s| s.strategy == Strategy::Delete)
    }

    /// Record `object`'s live payload immediately after a successful apply.
    pub fn record_live_object(&self, object: Object) {
        self.live_objects.lock().expect("live object mutex poisoned").insert(object.id().clone(), object);
    }

    /// The live payload captured for `id`, if it has been applied this run.
    pub fn live_object(&self, id: &ObjectId) -> Option<Object> {
        self.live_objects.lock().expect("live object mutex poisoned").get(id).cloned()
    }
}

/// Process-wide scratch state for one engine run, spec §4.F.
pub struct TaskContext {
    graph: DependencyGraph,
    inventory: InventoryManager,
    invalid_objects: Mutex<HashSet<ObjectId>>,
    events: Mutex<Option<EventSender>>,
    cancellation: CancellationToken,
}

impl TaskContext {
    /// Start a run over `graph`, writing under inventory `id`.
    pub fn new(graph: DependencyGraph, id: impl Into<String>) -> Self {
        Self {
            graph,
            inventory: InventoryManager::new(id),
            invalid_objects: Mutex::new(HashSet::new()),
            events: Mutex::new(None),
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach the event sender tasks should publish through.
    pub fn set_event_sender(&self, sender: EventSender) {
        *self.events.lock().expect("event sender mutex poisoned") = Some(sender);
    }

    /// The dependency graph for this run.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The inventory façade for this run.
    pub fn inventory_manager(&self) -> &InventoryManager {
        &self.inventory
    }

    /// Mark `id` as having an unresolvable `depends-on` reference.
    pub fn add_invalid_object(&self, id: ObjectId) {
        self.invalid_objects.lock().expect("invalid object mutex poisoned").insert(id);
    }

    /// Whether `id` was marked invalid by [`Self::add_invalid_object`].
    pub fn is_invalid_object(&self, id: &ObjectId) -> bool {
        self.invalid_objects.lock().expect("invalid object mutex poisoned").contains(id)
    }

    /// Publish an event to the caller's stream, if one is attached.
    ///
    /// Silently drops the event if the receiver has already been dropped
    /// (spec SPEC_FULL "Event stream backpressure": a gone consumer is
    /// treated the same as a cancelled context, not a fatal error).
    pub fn send_event(&self, event: crate::events::Event) {
        if let Some(sender) = self.events.lock().expect("event sender mutex poisoned").as_ref() {
            sender.send(event);
        }
    }

    /// The token that cancels this run; cloned into every RPC/wait-task
    /// suspension point per spec §5.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// True once [`Self::cancellation`]'s token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kapply_core::id::{ObjectId, ObjectRef};

    fn oref(name: &str) -> ObjectRef {
        ObjectRef::new(ObjectId::namespaced("", "ConfigMap", "ns", name), "v1")
    }

    #[test]
    fn pending_apply_is_idempotent() {
        let manager = InventoryManager::new("team-a");
        manager.add_pending_apply(oref("a"));
        manager.add_pending_apply(oref("a"));
        assert_eq!(manager.snapshot().object_statuses.len(), 1);
    }

    #[test]
    fn set_object_status_overwrites_existing_entry() {
        let manager = InventoryManager::new("team-a");
        let r = oref("a");
        manager.add_pending_apply(r.clone());
        let mut status = ObjectStatus::pending_apply(r.clone());
        status.actuation = Actuation::Succeeded;
        manager.set_object_status(status);
        assert_eq!(manager.object_status(&r.id).unwrap().actuation, Actuation::Succeeded);
    }

    #[test]
    #[should_panic(expected = "untracked ref")]
    fn set_object_status_on_untracked_ref_panics() {
        let manager = InventoryManager::new("team-a");
        manager.set_object_status(ObjectStatus::pending_apply(oref("ghost")));
    }

    #[test]
    fn successful_applies_filters_by_strategy_and_actuation() {
        let manager = InventoryManager::new("team-a");
        let r = oref("a");
        manager.add_pending_apply(r.clone());
        let mut status = ObjectStatus::pending_apply(r.clone());
        status.actuation = Actuation::Succeeded;
        manager.set_object_status(status);
        assert_eq!(manager.successful_applies(), [r.id].into_iter().collect());
    }

    #[test]
    fn forget_drops_the_entry_entirely() {
        let manager = InventoryManager::new("team-a");
        let r = oref("a");
        manager.add_pending_delete(r.clone());
        manager.forget(&r.id);
        assert_eq!(manager.object_status(&r.id), None);
        assert!(manager.snapshot().object_refs.is_empty());
    }

    #[test]
    fn all_deletes_succeeded_is_true_once_every_delete_is_forgotten() {
        let manager = InventoryManager::new("team-a");
        let a = oref("a");
        let b = oref("b");
        manager.add_pending_delete(a.clone());
        manager.add_pending_delete(b.clone());
        assert!(!manager.all_deletes_succeeded());

        manager.forget(&a.id);
        assert!(!manager.all_deletes_succeeded(), "b is still tracked as Pending");

        let mut failed = ObjectStatus::pending_delete(b.clone());
        failed.actuation = Actuation::Failed;
        manager.set_object_status(failed);
        assert!(!manager.all_deletes_succeeded(), "a failed delete must not count as succeeded");

        manager.forget(&b.id);
        assert!(manager.all_deletes_succeeded());
    }

    #[test]
    fn invalid_objects_are_tracked() {
        let graph = DependencyGraph::build(&[]).unwrap();
        let ctx = TaskContext::new(graph, "team-a");
        let id = ObjectId::namespaced("", "ConfigMap", "ns", "a");
        assert!(!ctx.is_invalid_object(&id));
        ctx.add_invalid_object(id.clone());
        assert!(ctx.is_invalid_object(&id));
    }
}
