use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::collections::HashSet;

type Adjacency = IndexMap<String, IndexSet<String>>;

#[derive(Debug, Default)]
struct Edges {
    /// dependency -> identifiers that depend on it
    dependents: Adjacency,
    /// dependent -> identifiers it depends on
    dependencies: Adjacency,
    /// outer -> inner identifiers it owns
    contained: Adjacency,
}

/// **DEPENDENCY GRAPH**
///
/// **PURPOSE**: Bidirectional adjacency used to order destruction.
/// **GUARANTEE**: Edges only grow during normal operation; they are pruned
/// when the owning identifier is destroyed.
///
/// All three maps sit behind one lock of their own, independent of the
/// instance tiers, so graph updates never wait on a running construction.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: RwLock<Edges>,
}

impl DependencyGraph {
    /// Graph without edges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent_id` depends on `dependency_id`. Idempotent.
    pub fn register_dependency(&self, dependency_id: &str, dependent_id: &str) {
        let mut edges = self.edges.write();
        let added = edges
            .dependents
            .entry(dependency_id.to_string())
            .or_default()
            .insert(dependent_id.to_string());
        if !added {
            return;
        }
        edges
            .dependencies
            .entry(dependent_id.to_string())
            .or_default()
            .insert(dependency_id.to_string());
    }

    /// Record that `outer_id` owns `inner_id`. Also registers `outer_id` as a
    /// dependent of `inner_id`. Idempotent.
    pub fn register_containment(&self, inner_id: &str, outer_id: &str) {
        let added = self
            .edges
            .write()
            .contained
            .entry(outer_id.to_string())
            .or_default()
            .insert(inner_id.to_string());
        if added {
            self.register_dependency(inner_id, outer_id);
        }
    }

    /// Whether `candidate_id` transitively depends on `id`.
    pub fn is_dependent(&self, id: &str, candidate_id: &str) -> bool {
        let edges = self.edges.read();
        let mut seen = HashSet::new();
        Self::reaches(&edges.dependents, id, candidate_id, &mut seen)
    }

    fn reaches<'a>(
        dependents: &'a Adjacency,
        id: &'a str,
        candidate_id: &str,
        seen: &mut HashSet<&'a str>,
    ) -> bool {
        if !seen.insert(id) {
            return false;
        }
        let Some(direct) = dependents.get(id) else {
            return false;
        };
        if direct.contains(candidate_id) {
            return true;
        }
        direct
            .iter()
            .any(|next| Self::reaches(dependents, next, candidate_id, seen))
    }

    /// Direct dependents of `id`, in registration order.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        Self::neighbours(&self.edges.read().dependents, id)
    }

    /// Direct dependencies of `id`, in registration order.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        Self::neighbours(&self.edges.read().dependencies, id)
    }

    /// Identifiers owned by `id`, in registration order.
    pub fn contained_in(&self, id: &str) -> Vec<String> {
        Self::neighbours(&self.edges.read().contained, id)
    }

    /// Whether anything depends on `id`.
    pub fn has_dependents(&self, id: &str) -> bool {
        self.edges
            .read()
            .dependents
            .get(id)
            .is_some_and(|set| !set.is_empty())
    }

    fn neighbours(map: &Adjacency, id: &str) -> Vec<String> {
        map.get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Detach the dependents of `id` so destruction works on a disconnected
    /// snapshot.
    pub(crate) fn take_dependents(&self, id: &str) -> Vec<String> {
        self.edges
            .write()
            .dependents
            .shift_remove(id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Detach the identifiers owned by `id`.
    pub(crate) fn take_contained(&self, id: &str) -> Vec<String> {
        self.edges
            .write()
            .contained
            .shift_remove(id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Remove `id` as a key everywhere and from every neighbour set.
    pub fn forget(&self, id: &str) {
        let mut edges = self.edges.write();
        let Edges {
            dependents,
            dependencies,
            contained,
        } = &mut *edges;
        for map in [dependents, dependencies, contained] {
            map.shift_remove(id);
            map.retain(|_, set| {
                set.shift_remove(id);
                !set.is_empty()
            });
        }
    }

    /// Drop every edge.
    pub fn clear(&self) {
        let mut edges = self.edges.write();
        edges.dependents.clear();
        edges.dependencies.clear();
        edges.contained.clear();
    }

    /// No edges at all.
    pub fn is_empty(&self) -> bool {
        let edges = self.edges.read();
        edges.dependents.is_empty() && edges.dependencies.is_empty() && edges.contained.is_empty()
    }
}
