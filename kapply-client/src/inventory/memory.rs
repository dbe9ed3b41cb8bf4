//! An in-process inventory backend for tests and ephemeral use, spec §4.C.
use super::{InventoryClient, InventoryError, InventoryInfo};
use async_trait::async_trait;
use kapply_core::{inventory::Inventory, policy::DryRunStrategy};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Keeps inventories in a process-local map keyed by `(namespace, name)`.
///
/// Unlike [`super::ConfigMapInventoryClient`] this never needs retries (no
/// remote optimistic concurrency to race against), but it still enforces the
/// id-mismatch and multiple-match contracts so tests exercise the same
/// error paths a real backend would produce.
#[derive(Clone, Default)]
pub struct InMemoryInventoryClient {
    inventories: Arc<Mutex<HashMap<(String, String), Inventory>>>,
}

impl InMemoryInventoryClient {
    /// An empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventoryClient {
    async fn load(&self, info: &InventoryInfo) -> Result<Option<Inventory>, InventoryError> {
        let store = self.inventories.lock().expect("inventory mutex poisoned");
        let by_id: Vec<&Inventory> = store
            .values()
            .filter(|inv| inv.id == info.id)
            .collect();
        if by_id.len() > 1 {
            return Err(InventoryError::MultipleInventoryObj {
                id: info.id.clone(),
                count: by_id.len(),
            });
        }
        if let Some(inv) = by_id.first() {
            return Ok(Some((*inv).clone()));
        }
        match store.get(&(info.namespace.clone(), info.name.clone())) {
            Some(inv) => Err(InventoryError::MismatchedInventoryId {
                requested: info.id.clone(),
                found: inv.id.clone(),
            }),
            None => Ok(None),
        }
    }

    async fn store(&self, info: &InventoryInfo, inventory: &Inventory, dry_run: DryRunStrategy) -> Result<(), InventoryError> {
        if !dry_run.mutates() {
            return Ok(());
        }
        let mut store = self.inventories.lock().expect("inventory mutex poisoned");
        store.insert((info.namespace.clone(), info.name.clone()), inventory.clone());
        Ok(())
    }

    async fn delete(&self, info: &InventoryInfo, dry_run: DryRunStrategy) -> Result<(), InventoryError> {
        if !dry_run.mutates() {
            return Ok(());
        }
        let mut store = self.inventories.lock().expect("inventory mutex poisoned");
        store.remove(&(info.namespace.clone(), info.name.clone()));
        Ok(())
    }

    async fn list(&self, info: &InventoryInfo) -> Result<Vec<Inventory>, InventoryError> {
        let store = self.inventories.lock().expect("inventory mutex poisoned");
        Ok(store.values().filter(|inv| inv.id == info.id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kapply_core::{id::ObjectId, id::ObjectRef, inventory::ObjectStatus};

    fn info(id: &str) -> InventoryInfo {
        InventoryInfo {
            namespace: "ns".into(),
            name: "app-inventory".into(),
            id: id.into(),
        }
    }

    #[tokio::test]
    async fn load_returns_none_when_absent() {
        let client = InMemoryInventoryClient::new();
        assert_eq!(client.load(&info("team-a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let client = InMemoryInventoryClient::new();
        let oref = ObjectRef::new(ObjectId::namespaced("", "ConfigMap", "ns", "a"), "v1");
        let mut inv = Inventory::empty("team-a");
        inv.object_refs.insert(oref.clone());
        inv.object_statuses.push(ObjectStatus::pending_apply(oref));
        client.store(&info("team-a"), &inv, DryRunStrategy::None).await.unwrap();
        assert_eq!(client.load(&info("team-a")).await.unwrap(), Some(inv));
    }

    #[tokio::test]
    async fn dry_run_store_is_a_no_op() {
        let client = InMemoryInventoryClient::new();
        let inv = Inventory::empty("team-a");
        client.store(&info("team-a"), &inv, DryRunStrategy::Server).await.unwrap();
        assert_eq!(client.load(&info("team-a")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn mismatched_id_at_same_name_is_an_error() {
        let client = InMemoryInventoryClient::new();
        client.store(&info("team-a"), &Inventory::empty("team-a"), DryRunStrategy::None).await.unwrap();
        let err = client.load(&info("team-b")).await.unwrap_err();
        assert!(matches!(err, InventoryError::MismatchedInventoryId { .. }));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let client = InMemoryInventoryClient::new();
        client.delete(&info("team-a"), DryRunStrategy::None).await.unwrap();
        client.delete(&info("team-a"), DryRunStrategy::None).await.unwrap();
    }
}
