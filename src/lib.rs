//! turtlescan — static shape-graph extraction for Python turtle programs.
//!
//! Given an interprocedural call graph of a turtle-graphics script
//! (built by an external points-to analysis) and a set of entry points,
//! the engine infers the sequence of drawing operations the script can
//! perform — without executing it — and returns a finite labeled graph
//! of [`TurtlePath`] nodes and [`EdgeType`] edges. Two scripts can then
//! be checked for behavioral equivalence by comparing their graphs.
//!
//! Arguments whose values originate from a machine-learning classifier
//! call are not guessed at: the affected state components collapse to an
//! absorbing classifier-controlled class, so a classifier-driven shape
//! never compares equal to a hardcoded one.
//!
//! ```
//! use turtlescan::callgraph::{ConstValue, Instruction, MemoryCallGraphBuilder, Operand};
//! use turtlescan::{analyze, AnalysisConfig};
//!
//! let mut builder = MemoryCallGraphBuilder::new();
//! let main = builder.add_node("script.main");
//! builder.push_instr(
//!     main,
//!     Instruction::call("turtle.forward", vec![Operand::Const(ConstValue::Int(10))]),
//! );
//! builder.push_instr(
//!     main,
//!     Instruction::call("turtle.right", vec![Operand::Const(ConstValue::Int(90))]),
//! );
//! let graph = builder.build();
//!
//! let shape = analyze(&graph, &[main], AnalysisConfig::default_ref()).unwrap();
//! assert_eq!(shape.node_count(), 2);
//! ```

pub mod builder;
pub mod callgraph;
pub mod classify;
pub mod config;
pub mod errors;
pub mod graph;
pub mod state;

pub use builder::PathBuilder;
pub use callgraph::{CallGraphSource, NodeId};
pub use classify::{OperationClassifier, Provenance, TurtleKind, TurtleOp};
pub use config::AnalysisConfig;
pub use errors::{ShapeError, ShapeResult};
pub use graph::{EdgeType, PathId, ShapeEdge, ShapeGraph, TurtlePath};
pub use state::AbstractTurtleState;

/// Analyze a call graph from `entries` and return its shape graph.
///
/// Convenience wrapper over [`PathBuilder`]; fails only when the call
/// graph violates its structural contract.
pub fn analyze<G: CallGraphSource>(
    graph: &G,
    entries: &[NodeId],
    config: &AnalysisConfig,
) -> ShapeResult<ShapeGraph> {
    PathBuilder::new(graph, config).build(entries)
}
