// Test utility module for turtlescan integration tests
#![allow(dead_code)]

use turtlescan::callgraph::{
    ConstValue, Instruction, MemoryCallGraph, MemoryCallGraphBuilder, NodeId, Operand,
};
use turtlescan::{analyze, AnalysisConfig, EdgeType, ShapeGraph};

pub fn forward(distance: i64) -> Instruction {
    Instruction::call(
        "turtle.forward",
        vec![Operand::Const(ConstValue::Int(distance))],
    )
}

pub fn backward(distance: i64) -> Instruction {
    Instruction::call(
        "turtle.backward",
        vec![Operand::Const(ConstValue::Int(distance))],
    )
}

pub fn right(angle: i64) -> Instruction {
    Instruction::call(
        "turtle.right",
        vec![Operand::Const(ConstValue::Int(angle))],
    )
}

pub fn left(angle: i64) -> Instruction {
    Instruction::call("turtle.left", vec![Operand::Const(ConstValue::Int(angle))])
}

pub fn pencolor(name: &str) -> Instruction {
    Instruction::call(
        "turtle.pencolor",
        vec![Operand::Const(ConstValue::Str(name.to_string()))],
    )
}

pub fn penup() -> Instruction {
    Instruction::call("turtle.penup", vec![])
}

pub fn pendown() -> Instruction {
    Instruction::call("turtle.pendown", vec![])
}

pub fn predict() -> Instruction {
    Instruction::call("model.predict", vec![Operand::Unknown])
}

/// Build a single-procedure call graph named `script.main`.
pub fn single_node_graph(instructions: Vec<Instruction>) -> (MemoryCallGraph, NodeId) {
    let mut builder = MemoryCallGraphBuilder::new();
    let main = builder.add_node("script.main");
    for instr in instructions {
        builder.push_instr(main, instr);
    }
    (builder.build(), main)
}

/// Analyze a single-procedure script with the default configuration.
pub fn analyze_script(instructions: Vec<Instruction>) -> ShapeGraph {
    let (graph, main) = single_node_graph(instructions);
    analyze(&graph, &[main], AnalysisConfig::default_ref())
        .expect("well-formed fixture graph should analyze")
}

pub fn count_edges(shape: &ShapeGraph, edge_type: EdgeType) -> usize {
    shape.edges_of_type(edge_type).count()
}
