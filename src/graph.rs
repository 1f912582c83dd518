//! The shape graph: the engine's output artifact.
//!
//! A finite labeled directed graph summarizing the drawing behavior of
//! the analyzed program. Nodes are deduplicated [`TurtlePath`] snapshots,
//! edges carry an [`EdgeType`] label, and parallel edges of different
//! types between the same pair are allowed. The graph is immutable once
//! assembled and is consumed by external comparison logic.

use crate::callgraph::InstrRef;
use crate::classify::TurtleOp;
use crate::state::AbstractTurtleState;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Label of one shape-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    /// Straight-line successor.
    Sequential,
    /// Conditional fan-out; a branching node carries at least two.
    Branch,
    /// Edge returning to an already-visited node, representing
    /// iteration or recursion.
    LoopBack,
    /// Edge crossing into a callee's first turtle-relevant node.
    Call,
    /// Edge crossing back to the caller's continuation.
    Return,
}

/// Index of a node within one [`ShapeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathId(pub u32);

impl PathId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the shape graph: a snapshot of the abstract turtle state
/// together with the class of the operation that produced it.
///
/// Equality and hashing use `(state, op)` only — that is the structural
/// equality the external comparison consumer relies on. `origin` records
/// the first call-graph instruction that produced the node and is
/// diagnostic only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurtlePath {
    pub state: AbstractTurtleState,
    pub op: TurtleOp,
    pub origin: InstrRef,
}

impl PartialEq for TurtlePath {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.op == other.op
    }
}

impl Eq for TurtlePath {}

impl Hash for TurtlePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.op.hash(state);
    }
}

/// One labeled directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeEdge {
    pub source: PathId,
    pub target: PathId,
    pub edge_type: EdgeType,
}

/// Accumulates nodes and edges during traversal and freezes them into a
/// [`ShapeGraph`].
#[derive(Debug, Default)]
pub(crate) struct GraphAssembler {
    nodes: Vec<TurtlePath>,
    index: HashMap<TurtlePath, PathId>,
    edges: Vec<ShapeEdge>,
    edge_seen: HashSet<ShapeEdge>,
    entries: Vec<PathId>,
    entry_seen: HashSet<PathId>,
}

impl GraphAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a node by structural equality; an equal node keeps its
    /// first identity and first origin.
    pub fn intern(&mut self, path: TurtlePath) -> PathId {
        if let Some(&id) = self.index.get(&path) {
            return id;
        }
        let id = PathId(self.nodes.len() as u32);
        self.index.insert(path.clone(), id);
        self.nodes.push(path);
        id
    }

    /// Add an edge; duplicate `(source, target, type)` triples are
    /// dropped, parallel edges of different types kept.
    pub fn add_edge(&mut self, source: PathId, target: PathId, edge_type: EdgeType) {
        let edge = ShapeEdge {
            source,
            target,
            edge_type,
        };
        if self.edge_seen.insert(edge) {
            self.edges.push(edge);
        }
    }

    /// Mark a node as a traversal entry point.
    pub fn mark_entry(&mut self, id: PathId) {
        if self.entry_seen.insert(id) {
            self.entries.push(id);
        }
    }

    /// Freeze the accumulated graph, pruning nodes unreachable from the
    /// entries (and edges touching them).
    pub fn finish(self) -> ShapeGraph {
        let reachable = self.reachable_set();
        if reachable.len() == self.nodes.len() {
            return ShapeGraph {
                nodes: self.nodes,
                edges: self.edges,
                entries: self.entries,
            };
        }

        let mut remap: HashMap<PathId, PathId> = HashMap::new();
        let mut nodes = Vec::with_capacity(reachable.len());
        for (index, node) in self.nodes.into_iter().enumerate() {
            let old = PathId(index as u32);
            if reachable.contains(&old) {
                remap.insert(old, PathId(nodes.len() as u32));
                nodes.push(node);
            }
        }
        let edges = self
            .edges
            .into_iter()
            .filter_map(|edge| {
                Some(ShapeEdge {
                    source: *remap.get(&edge.source)?,
                    target: *remap.get(&edge.target)?,
                    edge_type: edge.edge_type,
                })
            })
            .collect();
        let entries = self
            .entries
            .into_iter()
            .filter_map(|id| remap.get(&id).copied())
            .collect();
        ShapeGraph {
            nodes,
            edges,
            entries,
        }
    }

    fn reachable_set(&self) -> HashSet<PathId> {
        let mut graph: DiGraph<(), EdgeType> = DiGraph::new();
        let indices: Vec<NodeIndex> = (0..self.nodes.len()).map(|_| graph.add_node(())).collect();
        for edge in &self.edges {
            graph.add_edge(
                indices[edge.source.index()],
                indices[edge.target.index()],
                edge.edge_type,
            );
        }
        let mut reachable = HashSet::new();
        for &entry in &self.entries {
            let mut dfs = Dfs::new(&graph, indices[entry.index()]);
            while let Some(visited) = dfs.next(&graph) {
                reachable.insert(PathId(visited.index() as u32));
            }
        }
        reachable
    }
}

/// The finished, immutable shape graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeGraph {
    nodes: Vec<TurtlePath>,
    edges: Vec<ShapeEdge>,
    entries: Vec<PathId>,
}

impl ShapeGraph {
    /// Nodes in insertion order. Restartable: each call yields a fresh
    /// iterator.
    pub fn nodes(&self) -> impl Iterator<Item = &TurtlePath> + '_ {
        self.nodes.iter()
    }

    /// Edges in insertion order. Restartable like [`ShapeGraph::nodes`].
    pub fn edges(&self) -> impl Iterator<Item = &ShapeEdge> + '_ {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The designated entry nodes, in first-reached order.
    pub fn entry_nodes(&self) -> &[PathId] {
        &self.entries
    }

    pub fn get(&self, id: PathId) -> Option<&TurtlePath> {
        self.nodes.get(id.index())
    }

    /// Outgoing edges of one node, in insertion order.
    pub fn edges_from(&self, id: PathId) -> impl Iterator<Item = &ShapeEdge> + '_ {
        self.edges.iter().filter(move |edge| edge.source == id)
    }

    /// Edges carrying one label, in insertion order.
    pub fn edges_of_type(&self, edge_type: EdgeType) -> impl Iterator<Item = &ShapeEdge> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.edge_type == edge_type)
    }

    pub fn has_edge(&self, source: PathId, target: PathId, edge_type: EdgeType) -> bool {
        self.edges.contains(&ShapeEdge {
            source,
            target,
            edge_type,
        })
    }

    /// View of the graph as a petgraph `DiGraph`, for consumers that
    /// want to run graph algorithms (isomorphism checks, dominators)
    /// without re-indexing. Node order matches [`ShapeGraph::nodes`].
    pub fn to_petgraph(&self) -> DiGraph<&TurtlePath, EdgeType> {
        let mut graph = DiGraph::new();
        let indices: Vec<NodeIndex> = self.nodes.iter().map(|node| graph.add_node(node)).collect();
        for edge in &self.edges {
            graph.add_edge(
                indices[edge.source.index()],
                indices[edge.target.index()],
                edge.edge_type,
            );
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph::{ConstValue, NodeId};
    use crate::classify::{Provenance, TurtleKind};
    use crate::state::AbstractTurtleState;

    fn path(distance: i64, origin_index: usize) -> TurtlePath {
        let op = TurtleOp {
            kind: TurtleKind::Move { backward: false },
            args: vec![Provenance::Constant(ConstValue::Int(distance))],
        };
        TurtlePath {
            state: AbstractTurtleState::start().apply(&op),
            op,
            origin: InstrRef::new(NodeId(0), origin_index),
        }
    }

    #[test]
    fn interning_deduplicates_structurally() {
        let mut assembler = GraphAssembler::new();
        let first = assembler.intern(path(10, 0));
        // Same state and op class from a different instruction.
        let second = assembler.intern(path(10, 5));
        let third = assembler.intern(path(20, 1));
        assert_eq!(first, second);
        assert_ne!(first, third);

        let graph = {
            assembler.mark_entry(first);
            assembler.mark_entry(third);
            assembler.finish()
        };
        assert_eq!(graph.node_count(), 2);
        // The first origin wins for the deduplicated node.
        assert_eq!(graph.get(first).unwrap().origin.index, 0);
    }

    #[test]
    fn duplicate_edge_triples_collapse_but_types_do_not() {
        let mut assembler = GraphAssembler::new();
        let a = assembler.intern(path(10, 0));
        let b = assembler.intern(path(20, 1));
        assembler.mark_entry(a);
        assembler.add_edge(a, b, EdgeType::Sequential);
        assembler.add_edge(a, b, EdgeType::Sequential);
        assembler.add_edge(a, b, EdgeType::LoopBack);
        let graph = assembler.finish();
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_edge(a, b, EdgeType::Sequential));
        assert!(graph.has_edge(a, b, EdgeType::LoopBack));
    }

    #[test]
    fn unreachable_nodes_are_pruned() {
        let mut assembler = GraphAssembler::new();
        let entry = assembler.intern(path(10, 0));
        let reached = assembler.intern(path(20, 1));
        let orphan = assembler.intern(path(30, 2));
        assembler.mark_entry(entry);
        assembler.add_edge(entry, reached, EdgeType::Sequential);
        assembler.add_edge(orphan, reached, EdgeType::Sequential);
        let graph = assembler.finish();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.entry_nodes().len(), 1);
        let kept: Vec<i64> = graph
            .nodes()
            .map(|n| match &n.op.args[0] {
                Provenance::Constant(ConstValue::Int(v)) => *v,
                _ => panic!("unexpected arg"),
            })
            .collect();
        assert_eq!(kept, vec![10, 20]);
    }

    #[test]
    fn iteration_is_restartable_and_ordered() {
        let mut assembler = GraphAssembler::new();
        let a = assembler.intern(path(10, 0));
        let b = assembler.intern(path(20, 1));
        assembler.mark_entry(a);
        assembler.add_edge(a, b, EdgeType::Sequential);
        let graph = assembler.finish();

        let first_pass: Vec<_> = graph.nodes().collect();
        let second_pass: Vec<_> = graph.nodes().collect();
        assert_eq!(first_pass, second_pass);
        assert_eq!(first_pass.len(), 2);
    }

    #[test]
    fn petgraph_view_mirrors_the_graph() {
        let mut assembler = GraphAssembler::new();
        let a = assembler.intern(path(10, 0));
        let b = assembler.intern(path(20, 1));
        assembler.mark_entry(a);
        assembler.add_edge(a, b, EdgeType::Sequential);
        assembler.add_edge(b, a, EdgeType::LoopBack);
        let graph = assembler.finish();

        let view = graph.to_petgraph();
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.edge_count(), 2);
    }
}
