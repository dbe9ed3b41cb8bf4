//! Pre-apply object transforms, spec §4.J.
//!
//! The built-in [`ApplyTimeMutator`] resolves references of the form "set my
//! field `.spec.x` from the applied object `Y`'s field `.status.z`" by
//! consulting the [`crate::context::TaskContext`]'s inventory manager for
//! `Y`'s post-apply live form. Per the design notes (§9), the resolver only
//! handles scalar source values; arrays/objects at the source path are left
//! unspecified and are rejected with [`MutateError::NonScalarSource`].
use kapply_core::{annotation::APPLY_TIME_MUTATION, id::ObjectId, object::Object};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::context::TaskContext;

/// One entry of a `config.kubernetes.io/apply-time-mutation` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MutationRef {
    /// The object the value is read from.
    #[serde(rename = "sourceRef")]
    pub source_ref: ObjectId,
    /// JSON-pointer path into the source object's live payload.
    #[serde(rename = "sourcePath")]
    pub source_path: String,
    /// JSON-pointer path into this object's payload to write to.
    #[serde(rename = "targetPath")]
    pub target_path: String,
    /// The placeholder substring inside the target field's current string
    /// value that gets replaced with the resolved source value. An empty
    /// token means "set the whole target field" rather than substitute.
    #[serde(default)]
    pub token: String,
}

/// Parse the `apply-time-mutation` annotation on `object`, if present.
///
/// A malformed annotation is treated as "no mutation references" here; the
/// graph builder and [`ApplyTimeMutator`] only ever consult objects that
/// passed schema validation upstream, and a syntactically-valid-but-empty
/// array is the common case being modelled.
pub fn apply_time_mutation_refs(object: &Object) -> Vec<MutationRef> {
    object
        .annotation(APPLY_TIME_MUTATION)
        .and_then(|raw| serde_json::from_str::<Vec<MutationRef>>(raw).ok())
        .unwrap_or_default()
}

/// Failures raised while mutating a single object.
#[derive(Debug, Error)]
pub enum MutateError {
    /// The `apply-time-mutation` annotation did not parse as JSON.
    #[error("malformed apply-time-mutation annotation on {object}: {source}")]
    MalformedAnnotation {
        /// The object carrying the malformed annotation.
        object: ObjectId,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// The mutation's source object has not been applied yet, or its live
    /// form was never captured.
    #[error("apply-time-mutation source {0} has no captured live value")]
    SourceNotApplied(ObjectId),
    /// The resolved `sourcePath` does not exist on the source object.
    #[error("apply-time-mutation source path {path:?} not found on {object}")]
    SourcePathNotFound {
        /// The source object.
        object: ObjectId,
        /// The JSON pointer that failed to resolve.
        path: String,
    },
    /// The resolved `sourcePath` value is not a scalar (spec §9 Open
    /// Questions: arrays/objects are unspecified, so this is rejected
    /// rather than guessed at).
    #[error("apply-time-mutation source path {path:?} on {object} is not a scalar")]
    NonScalarSource {
        /// The source object.
        object: ObjectId,
        /// The JSON pointer whose value was not a scalar.
        path: String,
    },
    /// `targetPath` does not exist on the target object, or a non-empty
    /// `token` was requested against a target field that is not a string.
    #[error("apply-time-mutation target path {path:?} on {object} is not a replaceable field")]
    InvalidTargetPath {
        /// The target object.
        object: ObjectId,
        /// The JSON pointer that could not be written.
        path: String,
    },
}

/// A pre-apply transform over a single object.
///
/// Implementations may read (but must not mutate) the task context; the
/// runner calls `mutate` once per object, immediately before the filter
/// pipeline, in the order mutators were registered.
pub trait Mutator: Send + Sync {
    /// A short, stable identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Rewrite `object` in place. Returns `Ok(true)` if a field was
    /// changed, `Ok(false)` if the mutator had nothing to do, or an error
    /// to abort this object's apply fatally.
    fn mutate(&self, object: &mut Object, context: &TaskContext) -> Result<bool, MutateError>;
}

/// The built-in apply-time-mutation mutator, spec §4.J.
#[derive(Debug, Default)]
pub struct ApplyTimeMutator;

impl Mutator for ApplyTimeMutator {
    fn name(&self) -> &str {
        "ApplyTimeMutator"
    }

    fn mutate(&self, object: &mut Object, context: &TaskContext) -> Result<bool, MutateError> {
        let Some(raw) = object.annotation(APPLY_TIME_MUTATION) else {
            return Ok(false);
        };
        let references: Vec<MutationRef> = serde_json::from_str(raw).map_err(|source| MutateError::MalformedAnnotation {
            object: object.id().clone(),
            source,
        })?;

        let mut mutated = false;
        for reference in references {
            apply_one(object, &reference, context)?;
            mutated = true;
        }
        Ok(mutated)
    }
}

fn apply_one(object: &mut Object, reference: &MutationRef, context: &TaskContext) -> Result<(), MutateError> {
    let source = context
        .inventory_manager()
        .live_object(&reference.source_ref)
        .ok_or_else(|| MutateError::SourceNotApplied(reference.source_ref.clone()))?;

    let pointer = jsonptr::PointerBuf::parse(&reference.source_path).map_err(|_| MutateError::SourcePathNotFound {
        object: reference.source_ref.clone(),
        path: reference.source_path.clone(),
    })?;
    let value = pointer
        .resolve(source.payload())
        .map_err(|_| MutateError::SourcePathNotFound {
            object: reference.source_ref.clone(),
            path: reference.source_path.clone(),
        })?;
    let scalar = scalar_to_string(value).ok_or_else(|| MutateError::NonScalarSource {
        object: reference.source_ref.clone(),
        path: reference.source_path.clone(),
    })?;

    write_target(object, &reference.target_path, &reference.token, &scalar)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn write_target(object: &mut Object, target_path: &str, token: &str, resolved: &str) -> Result<(), MutateError> {
    let pointer = jsonptr::PointerBuf::parse(target_path).map_err(|_| MutateError::InvalidTargetPath {
        object: object.id().clone(),
        path: target_path.to_string(),
    })?;

    if token.is_empty() {
        let slot = pointer
            .resolve_mut(object.payload_mut())
            .map_err(|_| MutateError::InvalidTargetPath {
                object: object.id().clone(),
                path: target_path.to_string(),
            })?;
        *slot = Value::String(resolved.to_string());
        return Ok(());
    }

    let slot = pointer
        .resolve_mut(object.payload_mut())
        .map_err(|_| MutateError::InvalidTargetPath {
            object: object.id().clone(),
            path: target_path.to_string(),
        })?;
    let Value::String(current) = slot else {
        return Err(MutateError::InvalidTargetPath {
            object: object.id().clone(),
            path: target_path.to_string(),
        });
    };
    *current = current.replace(token, resolved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TaskContext;
    use crate::graph::DependencyGraph;
    use kapply_core::id::ObjectId;
    use serde_json::json;

    fn context_with_applied(id: ObjectId, payload: Value) -> TaskContext {
        let graph = DependencyGraph::build(&[]).unwrap();
        let ctx = TaskContext::new(graph, "team-a");
        ctx.inventory_manager().record_live_object(Object::new(id, "v1", payload));
        ctx
    }

    #[test]
    fn sets_whole_field_when_token_is_empty() {
        let source_id = ObjectId::namespaced("", "Service", "ns", "lb");
        let ctx = context_with_applied(source_id.clone(), json!({"status": {"ip": "10.0.0.1"}}));
        let mut target = Object::new(
            ObjectId::namespaced("apps", "Deployment", "ns", "api"),
            "v1",
            json!({"spec": {"host": ""}}),
        );
        let reference = MutationRef {
            source_ref: source_id,
            source_path: "/status/ip".into(),
            target_path: "/spec/host".into(),
            token: String::new(),
        };
        apply_one(&mut target, &reference, &ctx).unwrap();
        assert_eq!(target.payload()["spec"]["host"], json!("10.0.0.1"));
    }

    #[test]
    fn substitutes_token_inside_existing_string() {
        let source_id = ObjectId::namespaced("", "Service", "ns", "lb");
        let ctx = context_with_applied(source_id.clone(), json!({"status": {"ip": "10.0.0.1"}}));
        let mut target = Object::new(
            ObjectId::namespaced("apps", "Deployment", "ns", "api"),
            "v1",
            json!({"spec": {"url": "https://$(ip)/health"}}),
        );
        let reference = MutationRef {
            source_ref: source_id,
            source_path: "/status/ip".into(),
            target_path: "/spec/url".into(),
            token: "$(ip)".into(),
        };
        apply_one(&mut target, &reference, &ctx).unwrap();
        assert_eq!(target.payload()["spec"]["url"], json!("https://10.0.0.1/health"));
    }

    #[test]
    fn unapplied_source_is_an_error() {
        let source_id = ObjectId::namespaced("", "Service", "ns", "lb");
        let graph = DependencyGraph::build(&[]).unwrap();
        let ctx = TaskContext::new(graph, "team-a");
        let mut target = Object::new(ObjectId::namespaced("apps", "Deployment", "ns", "api"), "v1", json!({"spec": {}}));
        let reference = MutationRef {
            source_ref: source_id,
            source_path: "/status/ip".into(),
            target_path: "/spec/host".into(),
            token: String::new(),
        };
        assert!(matches!(apply_one(&mut target, &reference, &ctx), Err(MutateError::SourceNotApplied(_))));
    }

    #[test]
    fn non_scalar_source_is_rejected() {
        let source_id = ObjectId::namespaced("", "Service", "ns", "lb");
        let ctx = context_with_applied(source_id.clone(), json!({"status": {"ports": [80, 443]}}));
        let mut target = Object::new(ObjectId::namespaced("apps", "Deployment", "ns", "api"), "v1", json!({"spec": {}}));
        let reference = MutationRef {
            source_ref: source_id,
            source_path: "/status/ports".into(),
            target_path: "/spec/host".into(),
            token: String::new(),
        };
        assert!(matches!(apply_one(&mut target, &reference, &ctx), Err(MutateError::NonScalarSource { .. })));
    }
}
