//! Task variants and naming, spec §3 `Task` / §4.E.
use std::time::Duration;

use kapply_core::id::ObjectId;

use crate::{events::Action, wait::Condition};

/// One entry of a solver-built queue.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Write an initial inventory entry covering every id this run will
    /// touch, all `Pending`, so a crashed run can resume or still prune.
    InvAdd,
    /// Write the final inventory reflecting end-of-run status.
    InvSet,
    /// Delete the inventory's backing object entirely (`destroy`, once
    /// every object has been pruned).
    InvDelete,
    /// Apply a batch of objects.
    Apply(Vec<ObjectId>),
    /// Prune (delete) a batch of objects.
    Prune(Vec<ObjectId>),
    /// Block until every id in the batch reaches `condition`, or `timeout`
    /// fires.
    Wait(Vec<ObjectId>, Condition, Duration),
    /// Invalidate cached API discovery, after applying CRDs.
    ResetMapper,
}

/// A named, queued unit of work.
#[derive(Debug, Clone)]
pub struct Task {
    /// The task's unique, monotonically-numbered name (e.g. `apply-0`).
    pub name: String,
    /// What the task does.
    pub kind: TaskKind,
}

impl Task {
    /// Which high-level action this task performs.
    pub fn action(&self) -> Action {
        match &self.kind {
            TaskKind::InvAdd | TaskKind::InvSet | TaskKind::InvDelete => Action::Inventory,
            TaskKind::Apply(_) => Action::Apply,
            TaskKind::Prune(_) => Action::Prune,
            TaskKind::Wait(..) => Action::Wait,
            TaskKind::ResetMapper => Action::Mapper,
        }
    }

    /// The identities this task covers, empty for inventory/mapper tasks.
    pub fn identifiers(&self) -> &[ObjectId] {
        match &self.kind {
            TaskKind::Apply(ids) | TaskKind::Prune(ids) => ids,
            TaskKind::Wait(ids, ..) => ids,
            TaskKind::InvAdd | TaskKind::InvSet | TaskKind::InvDelete | TaskKind::ResetMapper => &[],
        }
    }
}

/// Monotonic per-category counters for task names, spec §4.E "numeric rules".
#[derive(Debug, Default)]
pub struct TaskNamer {
    apply: u32,
    prune: u32,
    wait: u32,
    inventory_add: u32,
    inventory_set: u32,
    delete_inventory: u32,
}

impl TaskNamer {
    /// Build the next `apply-<n>` task.
    pub fn apply(&mut self, ids: Vec<ObjectId>) -> Task {
        let name = format!("apply-{}", self.apply);
        self.apply += 1;
        Task { name, kind: TaskKind::Apply(ids) }
    }

    /// Build the next `prune-<n>` task.
    pub fn prune(&mut self, ids: Vec<ObjectId>) -> Task {
        let name = format!("prune-{}", self.prune);
        self.prune += 1;
        Task { name, kind: TaskKind::Prune(ids) }
    }

    /// Build the next `wait-<n>` task.
    pub fn wait(&mut self, ids: Vec<ObjectId>, condition: Condition, timeout: Duration) -> Task {
        let name = format!("wait-{}", self.wait);
        self.wait += 1;
        Task { name, kind: TaskKind::Wait(ids, condition, timeout) }
    }

    /// Build the next `inventory-add-<n>` task.
    pub fn inv_add(&mut self) -> Task {
        let name = format!("inventory-add-{}", self.inventory_add);
        self.inventory_add += 1;
        Task { name, kind: TaskKind::InvAdd }
    }

    /// Build the next `inventory-set-<n>` task.
    pub fn inv_set(&mut self) -> Task {
        let name = format!("inventory-set-{}", self.inventory_set);
        self.inventory_set += 1;
        Task { name, kind: TaskKind::InvSet }
    }

    /// Build the next `delete-inventory-<n>` task.
    pub fn inv_delete(&mut self) -> Task {
        let name = format!("delete-inventory-{}", self.delete_inventory);
        self.delete_inventory += 1;
        Task { name, kind: TaskKind::InvDelete }
    }

    /// Build a `ResetMapper` task. Not counted; spec §4.E names no numeric
    /// suffix for it.
    pub fn reset_mapper(&self) -> Task {
        Task {
            name: "reset-mapper".to_string(),
            kind: TaskKind::ResetMapper,
        }
    }
}
