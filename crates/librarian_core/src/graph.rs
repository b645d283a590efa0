//! Graph operations: BFS expansion over reverse/forward call, import,
//! extends, and implements edges.
//!
//! Nodes are [`ObjectId`]s naming [`Symbol`](crate::types::Symbol)s; edges
//! are [`EdgeKind`] relationships (calls/imports/extends/implements).

use crate::error::Result;
use crate::object_id::ObjectId;
use crate::types::{EdgeKind, GraphEdge};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Narrow interface the storage engine exposes to graph algorithms, so
/// this module doesn't need to depend on the concrete `Store` type.
pub trait EdgeLookup {
    /// Symbol ids reachable by following `kind` edges out of `node`.
    fn edges_from(&self, node: &ObjectId, kind: EdgeKind) -> Result<Vec<ObjectId>>;
    /// Symbol ids that reach `node` via `kind` edges.
    fn edges_to(&self, node: &ObjectId, kind: EdgeKind) -> Result<Vec<ObjectId>>;
}

/// In-memory adjacency list for algorithms requiring a full graph view.
#[derive(Debug, Clone, Default)]
pub struct AdjacencyList {
    /// Forward edges: node -> [(kind, target)]
    forward: BTreeMap<ObjectId, Vec<(EdgeKind, ObjectId)>>,
    /// Backward edges: node -> [(kind, source)]
    backward: BTreeMap<ObjectId, Vec<(EdgeKind, ObjectId)>>,
    /// All nodes in the graph.
    nodes: BTreeSet<ObjectId>,
}

impl AdjacencyList {
    /// Builds an adjacency list from a flat edge collection.
    pub fn from_edges<'a>(edges: impl Iterator<Item = &'a GraphEdge>) -> Self {
        let mut forward: BTreeMap<ObjectId, Vec<(EdgeKind, ObjectId)>> = BTreeMap::new();
        let mut backward: BTreeMap<ObjectId, Vec<(EdgeKind, ObjectId)>> = BTreeMap::new();
        let mut nodes = BTreeSet::new();

        for edge in edges {
            nodes.insert(edge.from);
            nodes.insert(edge.to);

            forward.entry(edge.from).or_default().push((edge.kind, edge.to));
            backward.entry(edge.to).or_default().push((edge.kind, edge.from));
        }

        Self {
            forward,
            backward,
            nodes,
        }
    }

    /// Outgoing edges for a node.
    pub fn outgoing(&self, node: &ObjectId) -> &[(EdgeKind, ObjectId)] {
        self.forward.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Incoming edges for a node.
    pub fn incoming(&self, node: &ObjectId) -> &[(EdgeKind, ObjectId)] {
        self.backward.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// All nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &ObjectId> {
        self.nodes.iter()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(|v| v.len()).sum()
    }
}

/// Configuration for graph expansion from seed symbols.
#[derive(Debug, Clone)]
pub struct ExpansionConfig {
    /// Maximum depth to expand from seeds (the Retriever's L0/L1/L2 ceiling).
    pub max_depth: u32,
    /// Edge kinds to follow during expansion.
    pub follow_kinds: Vec<EdgeKind>,
    /// Maximum number of nodes to expand.
    pub max_nodes: usize,
    /// Whether to follow edges bidirectionally.
    pub bidirectional: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            follow_kinds: vec![
                EdgeKind::Calls,
                EdgeKind::Imports,
                EdgeKind::Extends,
                EdgeKind::Implements,
            ],
            max_nodes: 50,
            bidirectional: false,
        }
    }
}

/// Result of graph expansion.
#[derive(Debug, Clone)]
pub struct ExpansionResult {
    /// All nodes reached during expansion, in discovery order.
    pub expanded_nodes: Vec<ObjectId>,
    /// Depth at which each node was discovered.
    pub node_depths: HashMap<ObjectId, u32>,
    /// Seeds used to start expansion.
    pub seeds: Vec<ObjectId>,
    /// Whether expansion stopped early due to the `max_nodes` limit.
    pub truncated: bool,
}

/// Expands the graph from seed symbols using BFS.
///
/// Uses `EdgeLookup` for per-node edge queries rather than loading the
/// full graph into memory, so this scales with the neighborhood visited
/// rather than the whole store.
///
/// # Examples
///
/// ```no_run
/// use librarian_core::{ObjectId, EdgeKind, ExpansionConfig, expand_from_seeds};
/// use librarian_core::graph::EdgeLookup;
///
/// # fn run(lookup: &impl EdgeLookup, root: ObjectId) -> librarian_core::Result<()> {
/// let config = ExpansionConfig {
///     max_depth: 2,
///     max_nodes: 100,
///     follow_kinds: vec![EdgeKind::Calls],
///     bidirectional: false,
/// };
///
/// let result = expand_from_seeds(lookup, vec![root], &config)?;
/// println!("Expanded to {} nodes", result.expanded_nodes.len());
/// # Ok(())
/// # }
/// ```
pub fn expand_from_seeds(
    lookup: &impl EdgeLookup,
    seeds: Vec<ObjectId>,
    config: &ExpansionConfig,
) -> Result<ExpansionResult> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut depths = HashMap::new();
    let mut result = Vec::new();

    for seed in &seeds {
        if visited.insert(*seed) {
            queue.push_back((*seed, 0));
            depths.insert(*seed, 0);
        }
    }

    let mut truncated = false;

    while let Some((node, depth)) = queue.pop_front() {
        result.push(node);

        if result.len() >= config.max_nodes {
            truncated = !queue.is_empty();
            break;
        }

        if depth >= config.max_depth {
            continue;
        }

        for kind in &config.follow_kinds {
            if let Ok(neighbors) = lookup.edges_from(&node, *kind) {
                for neighbor in neighbors {
                    if visited.insert(neighbor) {
                        queue.push_back((neighbor, depth + 1));
                        depths.insert(neighbor, depth + 1);
                    }
                }
            }

            if config.bidirectional {
                if let Ok(neighbors) = lookup.edges_to(&node, *kind) {
                    for neighbor in neighbors {
                        if visited.insert(neighbor) {
                            queue.push_back((neighbor, depth + 1));
                            depths.insert(neighbor, depth + 1);
                        }
                    }
                }
            }
        }
    }

    Ok(ExpansionResult {
        expanded_nodes: result,
        node_depths: depths,
        seeds,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(byte: u8) -> ObjectId {
        ObjectId::from_bytes([byte; 32])
    }

    fn edge(from: u8, to: u8) -> GraphEdge {
        GraphEdge {
            from: node(from),
            to: node(to),
            kind: EdgeKind::Calls,
            evidence_ids: vec![],
            last_seen_version: 1,
        }
    }

    struct MapLookup(AdjacencyList);

    impl EdgeLookup for MapLookup {
        fn edges_from(&self, node: &ObjectId, kind: EdgeKind) -> Result<Vec<ObjectId>> {
            Ok(self
                .0
                .outgoing(node)
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, n)| *n)
                .collect())
        }

        fn edges_to(&self, node: &ObjectId, kind: EdgeKind) -> Result<Vec<ObjectId>> {
            Ok(self
                .0
                .incoming(node)
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, n)| *n)
                .collect())
        }
    }

    #[test]
    fn test_adjacency_from_edges() {
        let edges = vec![edge(1, 2)];
        let adj = AdjacencyList::from_edges(edges.iter());

        assert_eq!(adj.node_count(), 2);
        assert_eq!(adj.edge_count(), 1);
    }

    #[test]
    fn test_expansion_respects_max_depth() {
        let edges = vec![edge(1, 2), edge(2, 3), edge(3, 4)];
        let adj = AdjacencyList::from_edges(edges.iter());
        let lookup = MapLookup(adj);

        let config = ExpansionConfig {
            max_depth: 1,
            follow_kinds: vec![EdgeKind::Calls],
            max_nodes: 50,
            bidirectional: false,
        };

        let result = expand_from_seeds(&lookup, vec![node(1)], &config).unwrap();
        assert_eq!(result.expanded_nodes, vec![node(1), node(2)]);
        assert!(!result.truncated);
    }

    #[test]
    fn test_expansion_truncates_at_max_nodes() {
        let edges = vec![edge(1, 2), edge(2, 3), edge(3, 4)];
        let adj = AdjacencyList::from_edges(edges.iter());
        let lookup = MapLookup(adj);

        let config = ExpansionConfig {
            max_depth: 10,
            follow_kinds: vec![EdgeKind::Calls],
            max_nodes: 2,
            bidirectional: false,
        };

        let result = expand_from_seeds(&lookup, vec![node(1)], &config).unwrap();
        assert_eq!(result.expanded_nodes.len(), 2);
        assert!(result.truncated);
    }
}
