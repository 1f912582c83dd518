//! Structural validation of the input call graph.
//!
//! The path builder assumes the structural contract holds everywhere; a
//! violation found mid-traversal would have no sound recovery. Checking
//! up front turns every such violation into a `MalformedGraph` error at
//! the component boundary, which is the engine's only fatal condition.

use super::{CallGraphSource, Instruction, NodeId, Operand};
use crate::errors::{ShapeError, ShapeResult};

/// Validate the structural contract of `graph` for a traversal starting
/// at `entries`.
///
/// Checks: entries exist and are non-empty, every call target and every
/// operand `Def` reference names an existing node and instruction, every
/// intra-node transfer (branch arm, loop body/exit, jump) lands inside
/// its node's instruction list, and every backward transfer lands on a
/// loop header. The last rule is what lets the path builder fold every
/// intra-node cycle at a header instead of diverging on an unstructured
/// jump cycle.
pub fn validate<G: CallGraphSource>(graph: &G, entries: &[NodeId]) -> ShapeResult<()> {
    if entries.is_empty() {
        return Err(ShapeError::malformed("no entry nodes supplied"));
    }
    for &entry in entries {
        if !graph.contains(entry) {
            return Err(ShapeError::malformed(format!(
                "entry node {} is not in the graph",
                entry
            )));
        }
    }

    let node_ids = graph.node_ids();
    let mut instr_count = 0usize;
    for &node in &node_ids {
        let instructions = graph.instructions(node);
        instr_count += instructions.len();
        for (index, instr) in instructions.iter().enumerate() {
            validate_instr(graph, node, index, instr, instructions)?;
        }
    }

    log::debug!(
        "validated call graph: {} nodes, {} instructions, {} entries",
        node_ids.len(),
        instr_count,
        entries.len()
    );
    Ok(())
}

fn validate_instr<G: CallGraphSource>(
    graph: &G,
    node: NodeId,
    index: usize,
    instr: &Instruction,
    instructions: &[Instruction],
) -> ShapeResult<()> {
    let len = instructions.len();
    let in_range = |target: usize| target < len;
    let backward_into_header = |target: usize| {
        target > index || matches!(instructions.get(target), Some(Instruction::LoopHeader { .. }))
    };
    match instr {
        Instruction::Call {
            targets, operands, ..
        } => {
            for &target in targets {
                if !graph.contains(target) {
                    return Err(ShapeError::malformed_at(
                        node,
                        format!(
                            "call at instruction {} targets missing node {}",
                            index, target
                        ),
                    ));
                }
            }
            for operand in operands {
                if let Operand::Def(site) = operand {
                    if graph.instruction(*site).is_none() {
                        return Err(ShapeError::malformed_at(
                            node,
                            format!(
                                "operand of instruction {} references missing definition {}",
                                index, site
                            ),
                        ));
                    }
                }
            }
        }
        Instruction::Branch { arms } => {
            if arms.len() < 2 {
                return Err(ShapeError::malformed_at(
                    node,
                    format!("branch at instruction {} has fewer than two arms", index),
                ));
            }
            for &arm in arms {
                if !in_range(arm) {
                    return Err(ShapeError::malformed_at(
                        node,
                        format!("branch arm {} at instruction {} is out of range", arm, index),
                    ));
                }
                if !backward_into_header(arm) {
                    return Err(ShapeError::malformed_at(
                        node,
                        format!(
                            "branch arm {} at instruction {} transfers backward past a loop header",
                            arm, index
                        ),
                    ));
                }
            }
        }
        Instruction::LoopHeader { body, exit } => {
            if !in_range(*body) || !in_range(*exit) {
                return Err(ShapeError::malformed_at(
                    node,
                    format!("loop header at instruction {} transfers out of range", index),
                ));
            }
            if !backward_into_header(*body) || !backward_into_header(*exit) {
                return Err(ShapeError::malformed_at(
                    node,
                    format!(
                        "loop header at instruction {} transfers backward past a loop header",
                        index
                    ),
                ));
            }
        }
        Instruction::Jump { to } => {
            if !in_range(*to) {
                return Err(ShapeError::malformed_at(
                    node,
                    format!("jump at instruction {} transfers out of range", index),
                ));
            }
            if !backward_into_header(*to) {
                return Err(ShapeError::malformed_at(
                    node,
                    format!(
                        "jump at instruction {} transfers backward past a loop header",
                        index
                    ),
                ));
            }
        }
        Instruction::Return => {}
    }
    Ok(())
}
