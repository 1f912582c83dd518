//! Traversal structure: branch fan-out, call/return crossings,
//! recursion and nested-loop folding, and the multi-target join.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use turtlescan::callgraph::{Instruction, MemoryCallGraphBuilder, Operand};
use turtlescan::state::PositionClass;
use turtlescan::{analyze, AnalysisConfig, EdgeType};

#[test]
fn branch_fans_out_from_the_preceding_node() {
    // forward(10); if c: left(45) else: right(45); pencolor("red")
    let shape = analyze_script(vec![
        forward(10),
        Instruction::Branch { arms: vec![2, 4] },
        left(45),
        Instruction::Jump { to: 6 },
        right(45),
        Instruction::Jump { to: 6 },
        pencolor("red"),
    ]);

    // The two turn states differ, so the join point is re-traversed per
    // arm and the color node splits too.
    assert_eq!(shape.node_count(), 5);
    assert_eq!(count_edges(&shape, EdgeType::Branch), 2);
    assert_eq!(count_edges(&shape, EdgeType::Sequential), 2);
    assert_eq!(count_edges(&shape, EdgeType::LoopBack), 0);

    let entry = shape.entry_nodes()[0];
    let branch_sources: Vec<_> = shape
        .edges_of_type(EdgeType::Branch)
        .map(|e| e.source)
        .collect();
    assert_eq!(branch_sources, vec![entry, entry]);
}

#[test]
fn branch_without_preceding_node_yields_two_entries() {
    let shape = analyze_script(vec![
        Instruction::Branch { arms: vec![1, 3] },
        left(45),
        Instruction::Jump { to: 4 },
        right(45),
        Instruction::Return,
    ]);
    assert_eq!(shape.node_count(), 2);
    assert_eq!(shape.entry_nodes().len(), 2);
    assert_eq!(shape.edge_count(), 0);
}

#[test]
fn calls_cross_with_call_and_return_edges() {
    // main: forward(10); helper(); forward(20)
    // helper: right(90)
    let mut builder = MemoryCallGraphBuilder::new();
    let main = builder.add_node("script.main");
    let helper = builder.add_node("script.helper");
    builder.push_instr(main, forward(10));
    builder.push_instr(
        main,
        Instruction::call_to("helper", vec![], vec![helper]),
    );
    builder.push_instr(main, forward(20));
    builder.push_instr(helper, right(90));
    let graph = builder.build();

    let shape = analyze(&graph, &[main], AnalysisConfig::default_ref()).unwrap();
    assert_eq!(shape.node_count(), 3);
    assert_eq!(count_edges(&shape, EdgeType::Call), 1);
    assert_eq!(count_edges(&shape, EdgeType::Return), 1);

    let call_edge = shape.edges_of_type(EdgeType::Call).next().unwrap();
    let return_edge = shape.edges_of_type(EdgeType::Return).next().unwrap();
    // The call enters the helper's node and the return leaves it.
    assert_eq!(call_edge.target, return_edge.source);
}

#[test]
fn callee_that_draws_nothing_keeps_the_caller_chain_sequential() {
    let mut builder = MemoryCallGraphBuilder::new();
    let main = builder.add_node("script.main");
    let silent = builder.add_node("script.silent");
    builder.push_instr(main, forward(10));
    builder.push_instr(
        main,
        Instruction::call_to("silent", vec![], vec![silent]),
    );
    builder.push_instr(main, right(90));
    builder.push_instr(silent, Instruction::call("math.sqrt", vec![Operand::Unknown]));
    let graph = builder.build();

    let shape = analyze(&graph, &[main], AnalysisConfig::default_ref()).unwrap();
    assert_eq!(shape.node_count(), 2);
    assert_eq!(count_edges(&shape, EdgeType::Sequential), 1);
    assert_eq!(count_edges(&shape, EdgeType::Call), 0);
    assert_eq!(count_edges(&shape, EdgeType::Return), 0);
}

#[test]
fn direct_recursion_folds_into_a_loop_back() {
    // spiral: forward(10); spiral()
    let mut builder = MemoryCallGraphBuilder::new();
    let spiral = builder.add_node("script.spiral");
    builder.push_instr(spiral, forward(10));
    builder.push_instr(
        spiral,
        Instruction::call_to("spiral", vec![], vec![spiral]),
    );
    let graph = builder.build();

    let shape = analyze(&graph, &[spiral], AnalysisConfig::default_ref()).unwrap();
    assert_eq!(shape.node_count(), 1);
    assert!(count_edges(&shape, EdgeType::LoopBack) >= 1);
}

#[test]
fn mutual_recursion_terminates_with_loop_backs() {
    // ping: forward(10); pong()    pong: right(90); ping()
    let mut builder = MemoryCallGraphBuilder::new();
    let ping = builder.add_node("script.ping");
    let pong = builder.add_node("script.pong");
    builder.push_instr(ping, forward(10));
    builder.push_instr(ping, Instruction::call_to("pong", vec![], vec![pong]));
    builder.push_instr(pong, right(90));
    builder.push_instr(pong, Instruction::call_to("ping", vec![], vec![ping]));
    let graph = builder.build();

    let shape = analyze(&graph, &[ping], AnalysisConfig::default_ref()).unwrap();
    assert!(count_edges(&shape, EdgeType::LoopBack) >= 1);
    assert!(shape.node_count() >= 2);
}

#[test]
fn multi_target_call_joins_the_continuation() {
    // main: right(90); draw()  where draw resolves to either variant.
    let mut builder = MemoryCallGraphBuilder::new();
    let main = builder.add_node("script.main");
    let short = builder.add_node("script.draw_short");
    let long = builder.add_node("script.draw_long");
    builder.push_instr(main, right(90));
    builder.push_instr(
        main,
        Instruction::call_to("draw", vec![], vec![short, long]),
    );
    builder.push_instr(main, pencolor("red"));
    builder.push_instr(short, forward(10));
    builder.push_instr(long, forward(20));
    let graph = builder.build();

    let shape = analyze(&graph, &[main], AnalysisConfig::default_ref()).unwrap();
    // turn, two callee moves, one joined color node.
    assert_eq!(shape.node_count(), 4);
    assert_eq!(count_edges(&shape, EdgeType::Call), 2);
    assert_eq!(count_edges(&shape, EdgeType::Return), 2);

    // The continuation resumes with the join: the two move distances
    // disagree, so the color node's position class is unresolved.
    let color_node = shape
        .nodes()
        .find(|n| n.op.kind == turtlescan::TurtleKind::ColorSet)
        .expect("color node present");
    assert_eq!(color_node.state.position, PositionClass::Unresolved);

    let returns: Vec<_> = shape
        .edges_of_type(EdgeType::Return)
        .map(|e| e.target)
        .collect();
    assert!(returns.iter().all(|t| shape.get(*t) == Some(color_node)));
}

#[test]
fn nested_loops_fold_per_header() {
    // outer: while …: (while …: forward(10)); right(90)
    let shape = analyze_script(vec![
        Instruction::LoopHeader { body: 1, exit: 6 },
        Instruction::LoopHeader { body: 2, exit: 4 },
        forward(10),
        Instruction::Jump { to: 1 },
        right(90),
        Instruction::Jump { to: 0 },
        Instruction::Return,
    ]);

    assert!(count_edges(&shape, EdgeType::LoopBack) >= 2);
    // Every loop-back closes a cycle on its own iteration's node.
    for edge in shape.edges_of_type(EdgeType::LoopBack) {
        assert!(shape.get(edge.source).is_some());
        assert!(shape.get(edge.target).is_some());
    }
}

#[test]
fn accumulating_loop_widens_and_terminates() {
    // while …: right(7) — the heading never revisits a class within the
    // widening budget, so the loop converges by widening instead.
    let config = AnalysisConfig {
        loop_widening_threshold: 4,
        ..AnalysisConfig::default()
    };
    let (graph, main) = single_node_graph(vec![
        Instruction::LoopHeader { body: 1, exit: 3 },
        right(7),
        Instruction::Jump { to: 0 },
        Instruction::Return,
    ]);
    let shape = analyze(&graph, &[main], &config).unwrap();

    assert!(count_edges(&shape, EdgeType::LoopBack) >= 1);
    assert!(
        shape
            .nodes()
            .any(|n| n.state.heading == turtlescan::state::HeadingClass::Unresolved),
        "widening collapses the accumulating heading"
    );
    // Bounded by the threshold, not the 360/7 cycle length.
    assert!(shape.node_count() <= 6);
}
