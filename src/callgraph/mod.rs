//! Call graph input layer.
//!
//! The shape extractor consumes an interprocedural call graph produced by
//! an external points-to-based builder. This module defines the opaque
//! capability set the engine depends on (`CallGraphSource`), the
//! instruction and operand data model, an in-memory reference
//! implementation with a builder API, and the structural validator that
//! enforces the input contract before traversal.
//!
//! The engine never fabricates node identities; it only echoes the ones
//! the source hands out, and it never mutates the graph.

mod memory;
mod validation;

pub use memory::{MemoryCallGraph, MemoryCallGraphBuilder};
pub use validation::validate;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque identity of a procedure activation context in the call graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of one instruction within a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrRef {
    pub node: NodeId,
    pub index: usize,
}

impl InstrRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for InstrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node, self.index)
    }
}

/// A concrete constant operand value.
///
/// Floats compare and hash by bit pattern so the type is usable as a map
/// key; the source constants this models are literals, where bit-level
/// identity is the right equivalence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Str(a), ConstValue::Str(b)) => a == b,
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ConstValue::Int(v) => {
                0u8.hash(state);
                v.hash(state);
            }
            ConstValue::Float(v) => {
                1u8.hash(state);
                v.to_bits().hash(state);
            }
            ConstValue::Str(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            ConstValue::Bool(v) => {
                3u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl ConstValue {
    /// Numeric view of the constant, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(v) => Some(*v as f64),
            ConstValue::Float(v) => Some(*v),
            ConstValue::Str(_) | ConstValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Float(v) => write!(f, "{}", v),
            ConstValue::Str(v) => write!(f, "{:?}", v),
            ConstValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Provenance source of one call operand, as recorded by the external
/// builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// A literal constant.
    Const(ConstValue),
    /// The value produced by another instruction (a call result).
    Def(InstrRef),
    /// The n-th formal parameter of the enclosing node.
    Param(usize),
    /// Nothing is known about the value.
    Unknown,
}

/// One operation within a call-graph node.
///
/// Instructions form a small intra-node control-flow graph: an
/// instruction without an explicit transfer falls through to the next
/// index, and running off the end of the list exits the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// A call site. `callee` is the resolved dotted symbol name;
    /// `targets` are the analyzable callee nodes the external builder
    /// resolved (empty for library or otherwise unanalyzable calls, more
    /// than one under polymorphism).
    Call {
        callee: String,
        operands: Vec<Operand>,
        targets: Vec<NodeId>,
    },
    /// Conditional fan-out to two or more instruction indices.
    Branch { arms: Vec<usize> },
    /// Loop entry. `body` is the first instruction of the loop body,
    /// `exit` the continuation after the loop; the body transfers back
    /// to the header to iterate.
    LoopHeader { body: usize, exit: usize },
    /// Unconditional intra-node transfer.
    Jump { to: usize },
    /// Node exit.
    Return,
}

impl Instruction {
    /// Shorthand for an unresolved (library) call.
    pub fn call(callee: impl Into<String>, operands: Vec<Operand>) -> Self {
        Instruction::Call {
            callee: callee.into(),
            operands,
            targets: Vec::new(),
        }
    }

    /// Shorthand for a call with resolved targets.
    pub fn call_to(
        callee: impl Into<String>,
        operands: Vec<Operand>,
        targets: Vec<NodeId>,
    ) -> Self {
        Instruction::Call {
            callee: callee.into(),
            operands,
            targets,
        }
    }
}

/// The capability set the engine requires of a call graph.
///
/// Any conforming builder can hand its result to the engine by
/// implementing this trait; the engine depends on nothing else. All
/// methods are read-only, so independent analyses may run concurrently
/// over one graph.
pub trait CallGraphSource {
    /// All node identities, in a stable order.
    fn node_ids(&self) -> Vec<NodeId>;

    /// The qualified name of a node, or `None` if the node is unknown.
    fn node_name(&self, node: NodeId) -> Option<&str>;

    /// The instruction list of a node (empty for unknown nodes).
    fn instructions(&self, node: NodeId) -> &[Instruction];

    /// Call sites that target the node. Used only by the bounded
    /// backward provenance walk.
    fn callers(&self, node: NodeId) -> &[InstrRef];

    /// Whether the node exists in the graph.
    fn contains(&self, node: NodeId) -> bool {
        self.node_name(node).is_some()
    }

    /// Look up one instruction.
    fn instruction(&self, at: InstrRef) -> Option<&Instruction> {
        self.instructions(at.node).get(at.index)
    }
}
