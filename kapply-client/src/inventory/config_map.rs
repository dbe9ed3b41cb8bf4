//! The single-object (ConfigMap) inventory backend, spec §4.C/§6.
use super::{InventoryClient, InventoryError, InventoryInfo};
use crate::client::{ApplyOptions, ClientError, DeleteOptions, DynamicApi};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use kapply_core::{
    annotation::INVENTORY_ID_LABEL,
    id::ObjectId,
    inventory::{Inventory, ObjectStatus},
    object::Object,
    policy::DryRunStrategy,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const CONFIG_MAP_GROUP: &str = "";
const CONFIG_MAP_KIND: &str = "ConfigMap";
const FIELD_MANAGER: &str = "kapply";
/// Optimistic-concurrency conflicts are retried at most this many times,
/// spec §5 "retry count bounded (≤ 5)".
const MAX_STORE_RETRIES: u32 = 5;

/// Persists an [`Inventory`] as a single ConfigMap, per the wire format in
/// spec §6: one label (`cli-utils.sigs.k8s.io/inventory-id`) carrying the
/// opaque id, and one `data` entry per tracked object keyed by
/// `<namespace>_<name>_<group>_<Kind>`, whose value is either the empty
/// string or a JSON-encoded [`ObjectStatus`] sans the redundant `object_ref`.
pub struct ConfigMapInventoryClient {
    api: Arc<dyn DynamicApi>,
}

impl ConfigMapInventoryClient {
    /// Build a client backed by `api`.
    pub fn new(api: Arc<dyn DynamicApi>) -> Self {
        Self { api }
    }

    fn config_map_id(namespace: &str, name: &str) -> ObjectId {
        ObjectId::namespaced(CONFIG_MAP_GROUP, CONFIG_MAP_KIND, namespace, name)
    }

    fn encode(inventory: &Inventory, existing: Option<&Value>) -> Value {
        let mut data = serde_json::Map::new();
        for object_ref in &inventory.object_refs {
            let key = object_ref.id.inventory_key();
            let value = match inventory.status_for(object_ref) {
                Some(status) => serde_json::to_string(&EncodedStatus::from(status)).unwrap_or_default(),
                None => String::new(),
            };
            data.insert(key, Value::String(value));
        }
        let (resource_version, uid) = existing
            .map(|v| {
                (
                    v.get("metadata").and_then(|m| m.get("resourceVersion")).cloned(),
                    v.get("metadata").and_then(|m| m.get("uid")).cloned(),
                )
            })
            .unwrap_or((None, None));
        let mut metadata = json!({
            "name": Value::Null,
            "namespace": Value::Null,
            "labels": { INVENTORY_ID_LABEL: inventory.id.clone() },
        });
        if let Some(rv) = resource_version {
            metadata["resourceVersion"] = rv;
        }
        if let Some(uid) = uid {
            metadata["uid"] = uid;
        }
        json!({
            "apiVersion": "v1",
            "kind": CONFIG_MAP_KIND,
            "metadata": metadata,
            "data": Value::Object(data),
        })
    }

    fn decode(namespace: &str, name: &str, payload: &Value) -> Result<Inventory, InventoryError> {
        let id = payload
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(|l| l.get(INVENTORY_ID_LABEL))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut inventory = Inventory::empty(id);
        let data = payload.get("data").and_then(Value::as_object);
        for (key, value) in data.into_iter().flatten() {
            let Some(id) = ObjectId::parse_inventory_key(key) else {
                warn!(configmap = %format!("{namespace}/{name}"), key, "skipping unparseable inventory data key");
                continue;
            };
            // The object's applied version is not recoverable from the
            // ConfigMap key alone; callers that need it re-resolve it live.
            let object_ref = kapply_core::id::ObjectRef::new(id, String::new());
            inventory.object_refs.insert(object_ref.clone());
            if let Some(raw) = value.as_str() {
                if !raw.is_empty() {
                    if let Ok(encoded) = serde_json::from_str::<EncodedStatus>(raw) {
                        inventory.object_statuses.push(encoded.into_status(object_ref));
                    }
                }
            }
        }
        Ok(inventory)
    }
}

/// The on-wire shape of an `ObjectStatus` inside a ConfigMap data value:
/// the `object_ref` is redundant with the data key, so it is omitted.
#[derive(serde::Serialize, serde::Deserialize)]
struct EncodedStatus {
    strategy: kapply_core::inventory::Strategy,
    actuation: kapply_core::inventory::Actuation,
    reconcile: kapply_core::inventory::Reconcile,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation: Option<i64>,
}

impl From<&ObjectStatus> for EncodedStatus {
    fn from(s: &ObjectStatus) -> Self {
        Self {
            strategy: s.strategy,
            actuation: s.actuation,
            reconcile: s.reconcile,
            uid: s.uid.clone(),
            generation: s.generation,
        }
    }
}

impl EncodedStatus {
    fn into_status(self, object_ref: kapply_core::id::ObjectRef) -> ObjectStatus {
        ObjectStatus {
            object_ref,
            strategy: self.strategy,
            actuation: self.actuation,
            reconcile: self.reconcile,
            uid: self.uid,
            generation: self.generation,
        }
    }
}

#[async_trait]
impl InventoryClient for ConfigMapInventoryClient {
    async fn load(&self, info: &InventoryInfo) -> Result<Option<Inventory>, InventoryError> {
        let matches = self
            .api
            .list_by_label(CONFIG_MAP_GROUP, CONFIG_MAP_KIND, &info.namespace, INVENTORY_ID_LABEL, &info.id)
            .await?;
        if matches.len() > 1 {
            return Err(InventoryError::MultipleInventoryObj {
                id: info.id.clone(),
                count: matches.len(),
            });
        }
        if let Some(object) = matches.first() {
            return Ok(Some(Self::decode(&info.namespace, object.id().name.as_str(), object.payload())?));
        }

        // No object carries our id's label. If one exists at the requested
        // name anyway, it belongs to a different inventory: that is a
        // mismatch, not an absence.
        let id = Self::config_map_id(&info.namespace, &info.name);
        match self.api.get(&id).await? {
            Some(object) => {
                let found = object
                    .payload()
                    .get("metadata")
                    .and_then(|m| m.get("labels"))
                    .and_then(|l| l.get(INVENTORY_ID_LABEL))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Err(InventoryError::MismatchedInventoryId {
                    requested: info.id.clone(),
                    found,
                })
            }
            None => Ok(None),
        }
    }

    async fn store(&self, info: &InventoryInfo, inventory: &Inventory, dry_run: DryRunStrategy) -> Result<(), InventoryError> {
        if !dry_run.mutates() {
            debug!(inventory_id = %info.id, "dry run: skipping inventory store");
            return Ok(());
        }
        let id = Self::config_map_id(&info.namespace, &info.name);
        let namespace = info.namespace.clone();
        let name = info.name.clone();
        let attempts = std::sync::atomic::AtomicU32::new(0);

        let op = || {
            let id = id.clone();
            let namespace = namespace.clone();
            let name = name.clone();
            async {
                attempts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let existing = self.api.get(&id).await?;
                let mut payload = Self::encode(inventory, existing.as_ref().map(Object::payload));
                if let Value::Object(meta) = payload["metadata"].take() {
                    let mut meta = meta;
                    meta.insert("name".into(), Value::String(name.clone()));
                    meta.insert("namespace".into(), Value::String(namespace.clone()));
                    payload["metadata"] = Value::Object(meta);
                }
                let object = Object::new(id.clone(), "v1", payload);
                self.api
                    .apply(
                        &object,
                        &ApplyOptions {
                            field_manager: Some(FIELD_MANAGER.to_string()),
                            server_dry_run: dry_run.is_server_side(),
                            ..Default::default()
                        },
                    )
                    .await
                    .map(|_| ())
            }
        };

        op.retry(ExponentialBuilder::default().with_max_times(MAX_STORE_RETRIES as usize))
            .when(|e: &ClientError| matches!(e, ClientError::Conflict(_)))
            .await
            .map_err(|e| match e {
                ClientError::Conflict(_) => InventoryError::RetriesExhausted {
                    attempts: attempts.load(std::sync::atomic::Ordering::Relaxed),
                },
                other => InventoryError::Client(other),
            })
    }

    async fn delete(&self, info: &InventoryInfo, dry_run: DryRunStrategy) -> Result<(), InventoryError> {
        if !dry_run.mutates() {
            return Ok(());
        }
        let id = Self::config_map_id(&info.namespace, &info.name);
        match self.api.delete(&id, &DeleteOptions::default()).await {
            Ok(()) => Ok(()),
            Err(ClientError::NotFound(_)) => Ok(()),
            Err(other) => Err(InventoryError::Client(other)),
        }
    }

    async fn list(&self, info: &InventoryInfo) -> Result<Vec<Inventory>, InventoryError> {
        let matches = self
            .api
            .list_by_label(CONFIG_MAP_GROUP, CONFIG_MAP_KIND, &info.namespace, INVENTORY_ID_LABEL, &info.id)
            .await?;
        matches
            .iter()
            .map(|object| Self::decode(&info.namespace, object.id().name.as_str(), object.payload()))
            .collect()
    }
}
