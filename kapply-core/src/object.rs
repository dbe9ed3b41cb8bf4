//! The generic object wrapper the engine passes between components.
//!
//! Desired objects arrive from the (out-of-scope) manifest loader as generic
//! property trees. Per the design notes, the engine never branches on kind
//! except through [`ObjectId`]; everything else is opaque payload that is
//! only meaningful to the transport layer and to the mutators that rewrite
//! fields ahead of an apply.
use crate::id::ObjectId;
use serde_json::Value;

/// A single desired (or observed) object.
///
/// `payload` is the object's full property tree, including `metadata` and
/// `spec`; the engine reads/writes specific fields out of it only where the
/// spec calls for it (annotations, and mutator target paths), and otherwise
/// treats it as opaque. `id` and `version` are kept alongside rather than
/// re-derived from `payload` on every access, since the object set is read
/// many times per run.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    id: ObjectId,
    version: String,
    payload: Value,
}

impl Object {
    /// Wrap a payload together with its already-known identity and version.
    pub fn new(id: ObjectId, version: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            version: version.into(),
            payload,
        }
    }

    /// The object's stable identity.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// The object's API version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// A reference to the identity plus version, suitable for inventory
    /// storage.
    pub fn object_ref(&self) -> crate::id::ObjectRef {
        crate::id::ObjectRef::new(self.id.clone(), self.version.clone())
    }

    /// Read-only access to the full payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Mutable access to the full payload, used by mutators ahead of apply.
    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    /// Read a string-valued annotation, if present.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.payload
            .get("metadata")?
            .get("annotations")?
            .get(key)?
            .as_str()
    }

    /// Set a string-valued annotation, creating `metadata.annotations` if it
    /// does not already exist.
    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        let metadata = self
            .payload
            .as_object_mut()
            .expect("object payload must be a JSON object")
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        let annotations = metadata
            .as_object_mut()
            .expect("metadata must be a JSON object")
            .entry("annotations")
            .or_insert_with(|| Value::Object(Default::default()));
        annotations
            .as_object_mut()
            .expect("annotations must be a JSON object")
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// The server-assigned UID, if this object has ever been observed live.
    pub fn uid(&self) -> Option<&str> {
        self.payload.get("metadata")?.get("uid")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ObjectId;
    use serde_json::json;

    fn obj() -> Object {
        Object::new(
            ObjectId::namespaced("apps", "Deployment", "ns", "api"),
            "v1",
            json!({"metadata": {"name": "api", "namespace": "ns"}}),
        )
    }

    #[test]
    fn annotation_round_trips() {
        let mut o = obj();
        assert_eq!(o.annotation("config.kubernetes.io/depends-on"), None);
        o.set_annotation("config.kubernetes.io/depends-on", "/namespaces/ns/Secret/s");
        assert_eq!(
            o.annotation("config.kubernetes.io/depends-on"),
            Some("/namespaces/ns/Secret/s")
        );
    }

    #[test]
    fn uid_absent_until_observed() {
        assert_eq!(obj().uid(), None);
    }
}
