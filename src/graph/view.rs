//! Read-only views of an inference graph for explainers and front ends.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::Serialize;
use serde_json::Value as Json;

use super::{InferenceGraph, Node};

/// Node-link rendering of a graph.
#[derive(Debug, Clone, Serialize)]
pub struct UiGraph {
    /// Alists in wire form, in insertion order.
    pub nodes: Vec<Json>,
    pub edges: Vec<UiEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

impl InferenceGraph {
    /// The neighbourhood of `id`: ancestors up to `anc_len` hops and
    /// descendants up to `desc_len` hops, with the edges among them.
    pub fn blanket_subgraph(&self, id: &str, anc_len: usize, desc_len: usize) -> InferenceGraph {
        let Some(&start) = self.index.get(id) else {
            return InferenceGraph::new();
        };
        let mut keep: HashSet<NodeIndex> = HashSet::from([start]);
        keep.extend(self.within(start, anc_len, Direction::Incoming));
        keep.extend(self.within(start, desc_len, Direction::Outgoing));

        let mut sub = InferenceGraph::new();
        let mut mapped: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        for idx in self.ordered_indices() {
            if !keep.contains(&idx) {
                continue;
            }
            let node = &self.graph[idx];
            let new_idx = sub.graph.add_node(Node {
                alist: node.alist.clone(),
                seq: node.seq,
            });
            sub.index.insert(node.alist.id.clone(), new_idx);
            mapped.insert(idx, new_idx);
        }
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .filter(|e| keep.contains(&e.source()) && keep.contains(&e.target()))
            .collect();
        edges.sort_by_key(|e| e.weight().seq);
        for edge in edges {
            if let (Some(&s), Some(&t)) = (mapped.get(&edge.source()), mapped.get(&edge.target())) {
                sub.graph.add_edge(s, t, edge.weight().clone());
            }
        }
        sub.next_seq = self.next_seq;
        sub
    }

    fn within(&self, start: NodeIndex, hops: usize, direction: Direction) -> Vec<NodeIndex> {
        let mut found = Vec::new();
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        while let Some((idx, depth)) = queue.pop_front() {
            if depth >= hops {
                continue;
            }
            for next in self.graph.neighbors_directed(idx, direction) {
                if seen.insert(next) {
                    found.push(next);
                    queue.push_back((next, depth + 1));
                }
            }
        }
        found
    }

    /// Serialisable node-link form of the whole graph.
    pub fn ui_graph(&self) -> UiGraph {
        let nodes = self
            .ordered_indices()
            .into_iter()
            .map(|idx| self.graph[idx].alist.to_json())
            .collect();
        let mut edges: Vec<_> = self.graph.edge_references().collect();
        edges.sort_by_key(|e| e.weight().seq);
        let edges = edges
            .into_iter()
            .map(|e| UiEdge {
                source: self.graph[e.source()].alist.id.clone(),
                target: self.graph[e.target()].alist.id.clone(),
                label: e.weight().label.clone(),
            })
            .collect();
        UiGraph { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use crate::alist::{Alist, Attr};
    use crate::graph::InferenceGraph;

    /// root → h → {z1, z2}, z1 → f
    fn chain() -> (InferenceGraph, Vec<String>) {
        let mut graph = InferenceGraph::new();
        let root = Alist::new().with(Attr::Subject, "Ghana").with_opvar("?x");
        graph.add_alist(root.clone());
        let mut h = root.copy();
        graph.link(&root, &mut h, "temporal", true);
        let mut z1 = root.copy();
        graph.link(&h, &mut z1, "value", true);
        let mut z2 = root.copy();
        graph.link(&h, &mut z2, "value", true);
        let mut f = root.copy();
        graph.link(&z1, &mut f, "Lookup", true);
        (graph, vec![root.id, h.id, z1.id, z2.id, f.id])
    }

    #[test]
    fn blanket_is_bounded_both_ways() {
        let (graph, ids) = chain();
        let sub = graph.blanket_subgraph(&ids[1], 0, 1);
        assert_eq!(sub.len(), 3);
        assert!(!sub.contains(&ids[0]));
        assert!(!sub.contains(&ids[4]));
        assert_eq!(sub.child_ids(&ids[1]), vec![ids[2].clone(), ids[3].clone()]);

        let wide = graph.blanket_subgraph(&ids[4], 3, 0);
        assert_eq!(wide.len(), 4);
        assert!(wide.contains(&ids[0]));
        assert!(!wide.contains(&ids[3]));
    }

    #[test]
    fn ui_graph_lists_labelled_edges() {
        let (graph, ids) = chain();
        let ui = graph.ui_graph();
        assert_eq!(ui.nodes.len(), 5);
        assert_eq!(ui.edges.len(), 4);
        assert_eq!(ui.edges[0].source, ids[0]);
        assert_eq!(ui.edges[0].label, "temporal");
        assert_eq!(ui.edges[3].label, "Lookup");
        let json = serde_json::to_value(&ui).unwrap();
        assert_eq!(json["nodes"][0]["id"], "0");
    }
}
