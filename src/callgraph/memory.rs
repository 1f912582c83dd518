//! In-memory reference implementation of [`CallGraphSource`].
//!
//! External call-graph builders that do not keep their own graph
//! representation can lower into this one; the engine's tests build
//! their fixtures through it as well.

use super::{CallGraphSource, InstrRef, Instruction, NodeId};
use im::HashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProcedureNode {
    name: String,
    instructions: Vec<Instruction>,
}

/// An immutable call graph held in memory.
///
/// Construct through [`MemoryCallGraphBuilder`]; the caller index is
/// derived from call targets when the builder finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCallGraph {
    nodes: Vec<ProcedureNode>,
    caller_index: HashMap<NodeId, Vec<InstrRef>>,
}

impl MemoryCallGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl CallGraphSource for MemoryCallGraph {
    fn node_ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len() as u32).map(NodeId).collect()
    }

    fn node_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.index()).map(|n| n.name.as_str())
    }

    fn instructions(&self, node: NodeId) -> &[Instruction] {
        self.nodes
            .get(node.index())
            .map(|n| n.instructions.as_slice())
            .unwrap_or(&[])
    }

    fn callers(&self, node: NodeId) -> &[InstrRef] {
        self.caller_index
            .get(&node)
            .map(|sites| sites.as_slice())
            .unwrap_or(&[])
    }
}

/// Builder for [`MemoryCallGraph`].
#[derive(Debug, Default)]
pub struct MemoryCallGraphBuilder {
    nodes: Vec<ProcedureNode>,
}

impl MemoryCallGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure node and return its identity.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ProcedureNode {
            name: name.into(),
            instructions: Vec::new(),
        });
        id
    }

    /// Append an instruction to a node and return its reference.
    ///
    /// Unknown node identities are ignored and reported back as an
    /// out-of-graph reference; validation rejects such graphs anyway.
    pub fn push_instr(&mut self, node: NodeId, instr: Instruction) -> InstrRef {
        match self.nodes.get_mut(node.index()) {
            Some(proc_node) => {
                proc_node.instructions.push(instr);
                InstrRef::new(node, proc_node.instructions.len() - 1)
            }
            None => InstrRef::new(node, usize::MAX),
        }
    }

    /// Finish the graph, deriving the caller index from call targets.
    pub fn build(self) -> MemoryCallGraph {
        let mut caller_index: HashMap<NodeId, Vec<InstrRef>> = HashMap::new();
        for (node_index, proc_node) in self.nodes.iter().enumerate() {
            for (instr_index, instr) in proc_node.instructions.iter().enumerate() {
                if let Instruction::Call { targets, .. } = instr {
                    let site = InstrRef::new(NodeId(node_index as u32), instr_index);
                    for &target in targets {
                        caller_index.entry(target).or_default().push(site);
                    }
                }
            }
        }
        MemoryCallGraph {
            nodes: self.nodes,
            caller_index,
        }
    }
}
