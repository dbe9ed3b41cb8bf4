//! The dependency graph, spec §4.B.
use hashbrown::{HashMap, HashSet};
use kapply_core::{
    annotation::DEPENDS_ON,
    error::CyclicDependencyError,
    id::ObjectId,
    object::Object,
};
use thiserror::Error;

use crate::mutate::apply_time_mutation_refs;

/// Failures raised while building the [`DependencyGraph`].
#[derive(Debug, Error)]
pub enum GraphError {
    /// A `depends-on` annotation entry did not parse.
    #[error(transparent)]
    InvalidAnnotation(#[from] kapply_core::error::InvalidAnnotationError),
}

/// A typed DAG over object identities: edge `A -> B` means "A depends on B".
///
/// Every identity passed to [`DependencyGraph::builder`] becomes a vertex,
/// even if it has no edges, so that objects with no dependencies still get
/// their own wave.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    vertices: Vec<ObjectId>,
    /// `from -> {to}`: the dependencies of `from`.
    edges_from: HashMap<ObjectId, HashSet<ObjectId>>,
    /// `to -> {from}`: the dependents of `to`.
    edges_to: HashMap<ObjectId, HashSet<ObjectId>>,
}

impl DependencyGraph {
    /// Build a graph from the desired object set, wiring up explicit
    /// `depends-on` annotations, implicit namespace containment, and
    /// apply-time-mutation references (spec §4.B steps 1-4).
    pub fn build(objects: &[Object]) -> Result<Self, GraphError> {
        let mut graph = Self::default();
        for object in objects {
            graph.add_vertex(object.id().clone());
        }

        let namespaces: HashSet<&str> = objects
            .iter()
            .filter(|o| o.id().kind == "Namespace")
            .map(|o| o.id().name.as_str())
            .collect();

        for object in objects {
            if let Some(raw) = object.annotation(DEPENDS_ON) {
                for reference in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let target = ObjectId::parse_dependency_ref(object.id(), reference)?;
                    graph.add_edge(object.id().clone(), target);
                }
            }

            if !object.id().is_cluster_scoped() && namespaces.contains(object.id().namespace.as_str()) {
                let ns_id = ObjectId::cluster_scoped("", "Namespace", object.id().namespace.clone());
                graph.add_edge(object.id().clone(), ns_id);
            }

            for mutation_ref in apply_time_mutation_refs(object) {
                graph.add_edge(object.id().clone(), mutation_ref.source_ref);
            }
        }

        Ok(graph)
    }

    fn add_vertex(&mut self, id: ObjectId) {
        if !self.vertices.contains(&id) {
            self.vertices.push(id.clone());
        }
        self.edges_from.entry(id.clone()).or_default();
        self.edges_to.entry(id).or_default();
    }

    fn add_edge(&mut self, from: ObjectId, to: ObjectId) {
        self.add_vertex(from.clone());
        self.add_vertex(to.clone());
        self.edges_from.get_mut(&from).unwrap().insert(to.clone());
        self.edges_to.get_mut(&to).unwrap().insert(from);
    }

    /// All vertices, in the order they were first added.
    pub fn vertices(&self) -> &[ObjectId] {
        &self.vertices
    }

    /// The dependencies of `id` (edges `id -> *`).
    pub fn edges_from(&self, id: &ObjectId) -> impl Iterator<Item = &ObjectId> {
        self.edges_from.get(id).into_iter().flatten()
    }

    /// The dependents of `id` (edges `* -> id`).
    pub fn edges_to(&self, id: &ObjectId) -> impl Iterator<Item = &ObjectId> {
        self.edges_to.get(id).into_iter().flatten()
    }

    /// Topologically sort into waves: each inner `Vec` holds ids whose
    /// dependencies are all satisfied by prior waves, ordered within the
    /// wave by [`kapply_core::id::ObjectId`]'s `Ord` (the type-priority
    /// table). Fails with [`kapply_core::error::CyclicDependencyError`] if
    /// any strongly connected component has size > 1, or any self-loop
    /// exists.
    pub fn topological_waves(&self) -> Result<Vec<Vec<ObjectId>>, CyclicDependencyError> {
        self.check_for_cycles()?;

        let mut remaining: HashSet<ObjectId> = self.vertices.iter().cloned().collect();
        let mut waves = Vec::new();
        while !remaining.is_empty() {
            let mut wave: Vec<ObjectId> = remaining
                .iter()
                .filter(|id| self.edges_from(id).all(|dep| !remaining.contains(dep)))
                .cloned()
                .collect();
            // Cycle-freedom (checked above) guarantees this is non-empty.
            wave.sort();
            for id in &wave {
                remaining.remove(id);
            }
            waves.push(wave);
        }
        Ok(waves)
    }

    /// The same waves as [`Self::topological_waves`], but each wave's
    /// internal order reversed and the wave sequence reversed too, for
    /// prune ordering (spec invariant: "delete in reverse order").
    pub fn reverse_topological_waves(&self) -> Result<Vec<Vec<ObjectId>>, CyclicDependencyError> {
        let mut waves = self.topological_waves()?;
        waves.reverse();
        for wave in &mut waves {
            wave.reverse();
        }
        Ok(waves)
    }

    /// Tarjan's algorithm, reporting every edge belonging to a strongly
    /// connected component of size > 1, plus every self-loop.
    fn check_for_cycles(&self) -> Result<(), CyclicDependencyError> {
        struct Tarjan<'g> {
            graph: &'g DependencyGraph,
            index_counter: usize,
            stack: Vec<ObjectId>,
            on_stack: HashSet<ObjectId>,
            indices: HashMap<ObjectId, usize>,
            lowlinks: HashMap<ObjectId, usize>,
            sccs: Vec<Vec<ObjectId>>,
        }

        impl<'g> Tarjan<'g> {
            fn visit(&mut self, v: &ObjectId) {
                self.indices.insert(v.clone(), self.index_counter);
                self.lowlinks.insert(v.clone(), self.index_counter);
                self.index_counter += 1;
                self.stack.push(v.clone());
                self.on_stack.insert(v.clone());

                for w in self.graph.edges_from(v).cloned().collect::<Vec<_>>() {
                    if !self.indices.contains_key(&w) {
                        self.visit(&w);
                        let w_low = self.lowlinks[&w];
                        let v_low = self.lowlinks[v];
                        self.lowlinks.insert(v.clone(), v_low.min(w_low));
                    } else if self.on_stack.contains(&w) {
                        let w_idx = self.indices[&w];
                        let v_low = self.lowlinks[v];
                        self.lowlinks.insert(v.clone(), v_low.min(w_idx));
                    }
                }

                if self.lowlinks[v] == self.indices[v] {
                    let mut scc = Vec::new();
                    loop {
                        let w = self.stack.pop().expect("scc root must be on stack");
                        self.on_stack.remove(&w);
                        let is_root = &w == v;
                        scc.push(w);
                        if is_root {
                            break;
                        }
                    }
                    self.sccs.push(scc);
                }
            }
        }

        let mut tarjan = Tarjan {
            graph: self,
            index_counter: 0,
            stack: Vec::new(),
            on_stack: HashSet::new(),
            indices: HashMap::new(),
            lowlinks: HashMap::new(),
            sccs: Vec::new(),
        };
        for v in &self.vertices {
            if !tarjan.indices.contains_key(v) {
                tarjan.visit(v);
            }
        }

        let mut offending_edges = Vec::new();
        for scc in &tarjan.sccs {
            let members: HashSet<&ObjectId> = scc.iter().collect();
            if scc.len() > 1 {
                for from in scc {
                    for to in self.edges_from(from) {
                        if members.contains(to) {
                            offending_edges.push((from.clone(), to.clone()));
                        }
                    }
                }
            } else {
                let only = &scc[0];
                if self.edges_from(only).any(|to| to == only) {
                    offending_edges.push((only.clone(), only.clone()));
                }
            }
        }

        if offending_edges.is_empty() {
            Ok(())
        } else {
            Err(CyclicDependencyError(offending_edges))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kapply_core::id::ObjectId;
    use serde_json::json;

    fn obj(kind: &str, ns: &str, name: &str, depends_on: Option<&str>) -> Object {
        let mut metadata = json!({"name": name});
        if !ns.is_empty() {
            metadata["namespace"] = json!(ns);
        }
        if let Some(dep) = depends_on {
            metadata["annotations"] = json!({ DEPENDS_ON: dep });
        }
        Object::new(
            if ns.is_empty() {
                ObjectId::cluster_scoped("", kind, name)
            } else {
                ObjectId::namespaced("", kind, ns, name)
            },
            "v1",
            json!({ "metadata": metadata }),
        )
    }

    #[test]
    fn independent_objects_land_in_one_wave() {
        let objects = vec![obj("ConfigMap", "ns", "a", None), obj("Secret", "ns", "b", None)];
        let graph = DependencyGraph::build(&objects).unwrap();
        let waves = graph.topological_waves().unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 2);
    }

    #[test]
    fn explicit_dependency_creates_two_waves() {
        let objects = vec![
            obj("Deployment", "ns", "api", Some("/namespaces/ns/Secret/creds")),
            obj("Secret", "ns", "creds", None),
        ];
        let graph = DependencyGraph::build(&objects).unwrap();
        let waves = graph.topological_waves().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0][0].name, "creds");
        assert_eq!(waves[1][0].name, "api");
    }

    #[test]
    fn namespaced_objects_implicitly_depend_on_their_namespace() {
        let objects = vec![obj("Namespace", "", "team-a", None), obj("ConfigMap", "team-a", "cfg", None)];
        let graph = DependencyGraph::build(&objects).unwrap();
        let waves = graph.topological_waves().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0][0].kind, "Namespace");
    }

    #[test]
    fn cycle_is_detected_and_reports_both_edges() {
        let objects = vec![
            obj("Deployment", "ns", "a", Some("/namespaces/ns/Secret/b")),
            obj("Secret", "ns", "b", Some("/namespaces/ns/Deployment/a")),
        ];
        let graph = DependencyGraph::build(&objects).unwrap();
        let err = graph.topological_waves().unwrap_err();
        assert_eq!(err.0.len(), 2);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let objects = vec![obj("ConfigMap", "ns", "a", Some("/namespaces/ns/ConfigMap/a"))];
        let graph = DependencyGraph::build(&objects).unwrap();
        assert!(graph.topological_waves().is_err());
    }

    #[test]
    fn reverse_waves_invert_both_sequence_and_order() {
        let objects = vec![
            obj("Deployment", "ns", "api", Some("/namespaces/ns/Secret/creds")),
            obj("Secret", "ns", "creds", None),
        ];
        let graph = DependencyGraph::build(&objects).unwrap();
        let forward = graph.topological_waves().unwrap();
        let reverse = graph.reverse_topological_waves().unwrap();
        assert_eq!(reverse.len(), forward.len());
        assert_eq!(reverse[0][0].name, "api");
        assert_eq!(reverse[1][0].name, "creds");
    }
}
