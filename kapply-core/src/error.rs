//! The shared error vocabulary, spec §7.
//!
//! Crate-specific concerns (graph construction, filters, the solver, the
//! wait engine) define their own `thiserror` enums in `kapply-runtime` and
//! `kapply-client`; what lives here is the handful of structured error types
//! that are part of the *data model* itself, because other crates need to
//! construct or pattern-match on them without depending on each other.
use crate::id::ObjectId;
use thiserror::Error;

/// A dependency reference failed to parse.
///
/// Produced by [`crate::id::ObjectId::parse_dependency_ref`] when a
/// `config.kubernetes.io/depends-on` entry does not match either
/// `<group>/namespaces/<ns>/<kind>/<name>` or `<group>/<kind>/<name>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid depends-on reference {reference:?} on {object}: {reason}")]
pub struct InvalidAnnotationError {
    /// The object whose annotation failed to parse.
    pub object: ObjectId,
    /// The raw reference string that failed to parse.
    pub reference: String,
    /// Human-readable reason (e.g. "expected 3 or 4 segments, got 2").
    pub reason: String,
}

/// The dependency graph contains a cycle.
///
/// Carries every edge of every strongly connected component of size > 1 (and
/// every self-loop), per spec §4.B, so the caller can report the full cycle
/// rather than a single arbitrary edge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cyclic dependency detected among {0} edge(s)")]
pub struct CyclicDependencyError(pub Vec<(ObjectId, ObjectId)>);

impl CyclicDependencyError {
    /// The distinct identities involved in any reported cycle edge.
    pub fn identities(&self) -> Vec<ObjectId> {
        let mut seen = Vec::new();
        for (from, to) in &self.0 {
            if !seen.contains(from) {
                seen.push(from.clone());
            }
            if !seen.contains(to) {
                seen.push(to.clone());
            }
        }
        seen
    }
}

/// Two or more desired objects share the same [`ObjectId`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("duplicate object id in desired set: {0}")]
pub struct DuplicateIdError(pub ObjectId);

/// A namespaced object's namespace is itself in the desired set, but not as
/// a `Namespace`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("object {object} references namespace {namespace:?}, which is not present as a Namespace in the desired set")]
pub struct MissingNamespaceError {
    /// The namespaced object.
    pub object: ObjectId,
    /// The namespace name it references.
    pub namespace: String,
}

/// Top-level error envelope for parse/shape failures raised directly out of
/// the data model. Coordination-layer crates wrap this (via `#[from]`) into
/// their own richer error enums rather than re-exposing it as-is.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`InvalidAnnotationError`].
    #[error(transparent)]
    InvalidAnnotation(#[from] InvalidAnnotationError),
    /// See [`CyclicDependencyError`].
    #[error(transparent)]
    CyclicDependency(#[from] CyclicDependencyError),
    /// See [`DuplicateIdError`].
    #[error(transparent)]
    DuplicateId(#[from] DuplicateIdError),
    /// See [`MissingNamespaceError`].
    #[error(transparent)]
    MissingNamespace(#[from] MissingNamespaceError),
    /// Failure decoding a JSON payload this crate is responsible for, such as
    /// inventory data values.
    #[error("failed to decode JSON payload")]
    Serde(#[from] serde_json::Error),
}
