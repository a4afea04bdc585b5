//! Inference graph: an arena of alists keyed by id, joined by labelled edges.
//!
//! Uses a `petgraph` stable graph so node indices survive pruning, with a
//! `HashMap` from alist id to node index for O(1) lookups. Every node and edge
//! carries an insertion sequence number; all neighbour and leaf views are
//! returned in insertion order so a session replays deterministically.

pub mod view;

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::alist::{Alist, State};
use crate::error::GraphError;

pub use view::{UiEdge, UiGraph};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Id of the root node of every session.
pub const ROOT_ID: &str = "0";

/// Edge data: the name of the rule that produced the child.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    pub label: String,
    seq: u64,
}

#[derive(Debug, Clone)]
struct Node {
    alist: Alist,
    seq: u64,
}

/// Directed graph of alists for one inference session.
#[derive(Debug, Clone, Default)]
pub struct InferenceGraph {
    graph: StableDiGraph<Node, EdgeData>,
    /// Alist id → node index.
    index: HashMap<String, NodeIndex>,
    /// Children ever linked under each parent; drives id minting.
    links_made: HashMap<String, usize>,
    next_seq: u64,
}

impl InferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alists in the graph.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn alist(&self, id: &str) -> Option<&Alist> {
        self.index.get(id).map(|&idx| &self.graph[idx].alist)
    }

    pub fn alist_mut(&mut self, id: &str) -> Option<&mut Alist> {
        let idx = *self.index.get(id)?;
        Some(&mut self.graph[idx].alist)
    }

    /// Look up an alist, failing with a diagnostic when it is gone.
    pub fn require(&self, id: &str) -> GraphResult<&Alist> {
        self.alist(id).ok_or_else(|| GraphError::NodeNotFound { id: id.to_string() })
    }

    /// Set the state of a node; returns false when the node is missing.
    pub fn set_state(&mut self, id: &str, state: State) -> bool {
        match self.alist_mut(id) {
            Some(alist) => {
                alist.state = state;
                true
            }
            None => false,
        }
    }

    /// All alists, in insertion order.
    pub fn alists(&self) -> Vec<&Alist> {
        self.ordered_indices()
            .into_iter()
            .map(|idx| &self.graph[idx].alist)
            .collect()
    }

    fn ordered_indices(&self) -> Vec<NodeIndex> {
        let mut indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        indices.sort_by_key(|&idx| self.graph[idx].seq);
        indices
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Insert or overwrite an alist by id. Edges are untouched.
    pub fn add_alist(&mut self, alist: Alist) -> NodeIndex {
        if let Some(&idx) = self.index.get(&alist.id) {
            self.graph[idx].alist = alist;
            return idx;
        }
        let seq = self.bump_seq();
        let id = alist.id.clone();
        let idx = self.graph.add_node(Node { alist, seq });
        self.index.insert(id, idx);
        idx
    }

    pub fn add_alists_from(&mut self, alists: impl IntoIterator<Item = Alist>) {
        for alist in alists {
            self.add_alist(alist);
        }
    }

    /// Link `child` under `parent` with an edge labelled `label`.
    ///
    /// With `create_new_id`, the child gets id `{parent}-{depth}.{n}` where
    /// `depth` is the parent's depth plus one and `n` counts every child ever
    /// linked under that parent, and its depth is set accordingly. The child
    /// is upserted; a missing parent is inserted as is. Returns the child id.
    pub fn link(&mut self, parent: &Alist, child: &mut Alist, label: &str, create_new_id: bool) -> String {
        let parent_idx = match self.index.get(&parent.id) {
            Some(&idx) => idx,
            None => self.add_alist(parent.clone()),
        };
        if create_new_id {
            let made = self.links_made.entry(parent.id.clone()).or_insert(0);
            *made += 1;
            child.id = format!("{}-{}.{}", parent.id, parent.depth + 1, made);
            child.depth = parent.depth + 1;
        }
        let child_idx = self.add_alist(child.clone());
        if parent_idx != child_idx && self.graph.find_edge(parent_idx, child_idx).is_none() {
            let seq = self.bump_seq();
            self.graph.add_edge(
                parent_idx,
                child_idx,
                EdgeData {
                    label: label.to_string(),
                    seq,
                },
            );
        }
        child.id.clone()
    }

    /// Remove a node and its whole descendant subtree. Returns how many
    /// nodes were removed.
    pub fn prune(&mut self, id: &str) -> usize {
        let Some(&start) = self.index.get(id) else {
            return 0;
        };
        let mut doomed = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if !seen.insert(idx) {
                continue;
            }
            doomed.push(idx);
            queue.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
        }
        for idx in &doomed {
            if let Some(node) = self.graph.remove_node(*idx) {
                self.index.remove(&node.alist.id);
                self.links_made.remove(&node.alist.id);
            }
        }
        tracing::debug!(node = id, removed = doomed.len(), "pruned subtree");
        doomed.len()
    }

    // -----------------------------------------------------------------------
    // Neighbour queries
    // -----------------------------------------------------------------------

    fn neighbour_ids(&self, id: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(u64, NodeIndex)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Incoming => e.source(),
                    Direction::Outgoing => e.target(),
                };
                (e.weight().seq, other)
            })
            .collect();
        edges.sort_by_key(|(seq, _)| *seq);
        edges
            .into_iter()
            .map(|(_, other)| self.graph[other].alist.id.clone())
            .collect()
    }

    /// Parent ids, earliest edge first.
    pub fn parent_ids(&self, id: &str) -> Vec<String> {
        self.neighbour_ids(id, Direction::Incoming)
    }

    /// Child ids, in link order.
    pub fn child_ids(&self, id: &str) -> Vec<String> {
        self.neighbour_ids(id, Direction::Outgoing)
    }

    pub fn parent_alists(&self, id: &str) -> Vec<Alist> {
        self.parent_ids(id)
            .iter()
            .filter_map(|p| self.alist(p).cloned())
            .collect()
    }

    pub fn child_alists(&self, id: &str) -> Vec<Alist> {
        self.child_ids(id)
            .iter()
            .filter_map(|c| self.alist(c).cloned())
            .collect()
    }

    /// Label of the edge from `parent` to `child`.
    pub fn edge_label(&self, parent: &str, child: &str) -> Option<&str> {
        let (&p, &c) = (self.index.get(parent)?, self.index.get(child)?);
        let edge = self.graph.find_edge(p, c)?;
        self.graph.edge_weight(edge).map(|e| e.label.as_str())
    }

    fn is_leaf(&self, idx: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .next()
            .is_none()
    }

    // -----------------------------------------------------------------------
    // Frontier
    // -----------------------------------------------------------------------

    /// All leaf alists, ascending by cost.
    pub fn leaf_alists(&self) -> Vec<Alist> {
        self.sorted_leaves(None)
            .into_iter()
            .map(|idx| self.graph[idx].alist.clone())
            .collect()
    }

    fn sorted_leaves(&self, state: Option<State>) -> Vec<NodeIndex> {
        let mut leaves: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.is_leaf(idx))
            .filter(|&idx| state.is_none_or(|s| self.graph[idx].alist.state == s))
            .collect();
        leaves.sort_by(|&a, &b| {
            let (na, nb) = (&self.graph[a], &self.graph[b]);
            na.alist
                .cost
                .total_cmp(&nb.alist.cost)
                .then(na.seq.cmp(&nb.seq))
        });
        leaves
    }

    /// Up to `size` leaves in `state`, cheapest first.
    ///
    /// With `update_state` the returned nodes are claimed (`EXPLORING`) so
    /// the next call does not hand them out again.
    pub fn frontier(&mut self, size: usize, update_state: bool, state: State) -> Vec<Alist> {
        let mut picked = self.sorted_leaves(Some(state));
        picked.truncate(size);
        picked
            .into_iter()
            .map(|idx| {
                if update_state {
                    self.graph[idx].alist.state = State::Exploring;
                }
                self.graph[idx].alist.clone()
            })
            .collect()
    }

    /// Whether any leaf is in `state`, without claiming it.
    pub fn has_leaf_in(&self, state: State) -> bool {
        self.graph
            .node_indices()
            .any(|idx| self.is_leaf(idx) && self.graph[idx].alist.state == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alist::Attr;

    fn root() -> Alist {
        Alist::new()
            .with(Attr::Subject, "Ghana")
            .with(Attr::Property, "population")
            .with(Attr::Object, "?x")
            .with_opvar("?x")
    }

    fn graph_with_root() -> (InferenceGraph, Alist) {
        let mut graph = InferenceGraph::new();
        let root = root();
        graph.add_alist(root.clone());
        (graph, root)
    }

    #[test]
    fn link_mints_path_ids() {
        let (mut graph, root) = graph_with_root();
        let mut a = root.copy();
        let mut b = root.copy();
        assert_eq!(graph.link(&root, &mut a, "temporal", true), "0-1.1");
        assert_eq!(graph.link(&root, &mut b, "temporal", true), "0-1.2");
        assert_eq!(a.depth, 1);

        let mut grandchild = root.copy();
        graph.link(&a, &mut grandchild, "value", true);
        assert_eq!(grandchild.id, "0-1.1-2.1");
        assert_eq!(grandchild.depth, 2);
    }

    #[test]
    fn ids_are_not_reused_after_prune() {
        let (mut graph, root) = graph_with_root();
        let mut first = root.copy();
        let mut second = root.copy();
        graph.link(&root, &mut first, "comp", true);
        graph.link(&root, &mut second, "comp", true);
        graph.prune(&first.id);
        let mut third = root.copy();
        graph.link(&root, &mut third, "comp", true);
        assert_ne!(third.id, second.id);
        assert!(graph.contains(&second.id));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn add_alist_is_idempotent() {
        let (mut graph, root) = graph_with_root();
        let mut child = root.copy();
        graph.link(&root, &mut child, "Lookup", true);
        let (nodes, edges) = (graph.len(), graph.edge_count());

        child.cov = 0.3;
        graph.add_alist(child.clone());
        graph.add_alist(child.clone());
        graph.link(&root, &mut child, "Lookup", false);

        assert_eq!(graph.len(), nodes);
        assert_eq!(graph.edge_count(), edges);
        assert_eq!(graph.alist(&child.id).map(|a| a.cov), Some(0.3));
    }

    #[test]
    fn neighbours_are_in_link_order() {
        let (mut graph, root) = graph_with_root();
        let ids: Vec<String> = (0..4)
            .map(|_| {
                let mut c = root.copy();
                graph.link(&root, &mut c, "value", true)
            })
            .collect();
        assert_eq!(graph.child_ids(ROOT_ID), ids);
        assert_eq!(graph.parent_ids(&ids[2]), vec![ROOT_ID.to_string()]);
        assert_eq!(graph.edge_label(ROOT_ID, &ids[0]), Some("value"));
    }

    #[test]
    fn frontier_orders_by_cost_and_claims() {
        let (mut graph, root) = graph_with_root();
        for cost in [3.0, 1.0, 2.0] {
            let mut c = root.copy();
            c.cost = cost;
            graph.link(&root, &mut c, "value", true);
        }
        let picked = graph.frontier(2, false, State::Unexplored);
        assert_eq!(picked.iter().map(|a| a.cost).collect::<Vec<_>>(), vec![1.0, 2.0]);

        let claimed = graph.frontier(1, true, State::Unexplored);
        assert_eq!(claimed[0].cost, 1.0);
        assert_eq!(graph.alist(&claimed[0].id).map(|a| a.state), Some(State::Exploring));
        let next = graph.frontier(1, true, State::Unexplored);
        assert_eq!(next[0].cost, 2.0);
    }

    #[test]
    fn root_is_not_a_leaf_once_it_has_children() {
        let (mut graph, root) = graph_with_root();
        assert_eq!(graph.leaf_alists().len(), 1);
        let mut c = root.copy();
        graph.link(&root, &mut c, "value", true);
        let leaves = graph.leaf_alists();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id, c.id);
    }

    #[test]
    fn prune_removes_descendants() {
        let (mut graph, root) = graph_with_root();
        let mut h = root.copy();
        graph.link(&root, &mut h, "temporal", true);
        for _ in 0..3 {
            let mut z = root.copy();
            graph.link(&h, &mut z, "value", true);
        }
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.prune(&h.id), 4);
        assert_eq!(graph.len(), 1);
        assert!(graph.child_ids(ROOT_ID).is_empty());
    }
}
