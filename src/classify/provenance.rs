//! Backward provenance resolution for call operands.
//!
//! Decides whether a value flowing into a turtle primitive is a known
//! constant, transitively classifier-derived, or unresolvable. The walk
//! follows def-use chains within the defining procedure and, for formal
//! parameters, the arguments at call sites in direct callers — bounded
//! by `AnalysisConfig::provenance_caller_depth`. It is deliberately not
//! an unbounded interprocedural data-flow analysis; anything past the
//! bound degrades to `Unresolved`.

use super::Provenance;
use crate::callgraph::{CallGraphSource, InstrRef, Instruction, NodeId, Operand};
use crate::config::AnalysisConfig;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SeenKey {
    Def(InstrRef),
    Param(NodeId, usize),
}

/// Resolve the provenance class of `operand` as seen from `node`.
pub fn resolve_operand<G: CallGraphSource>(
    graph: &G,
    config: &AnalysisConfig,
    node: NodeId,
    operand: &Operand,
) -> Provenance {
    let mut seen = HashSet::new();
    resolve(
        graph,
        config,
        node,
        operand,
        config.provenance_caller_depth,
        &mut seen,
    )
}

fn resolve<G: CallGraphSource>(
    graph: &G,
    config: &AnalysisConfig,
    node: NodeId,
    operand: &Operand,
    caller_budget: usize,
    seen: &mut HashSet<SeenKey>,
) -> Provenance {
    match operand {
        Operand::Const(value) => Provenance::Constant(value.clone()),
        Operand::Unknown => Provenance::Unresolved,
        Operand::Def(site) => {
            // Cycle guard; repeated keys resolve conservatively.
            if !seen.insert(SeenKey::Def(*site)) {
                return Provenance::Unresolved;
            }
            resolve_definition(graph, config, *site, caller_budget, seen)
        }
        Operand::Param(index) => {
            if caller_budget == 0 {
                return Provenance::Unresolved;
            }
            if !seen.insert(SeenKey::Param(node, *index)) {
                return Provenance::Unresolved;
            }
            resolve_parameter(graph, config, node, *index, caller_budget, seen)
        }
    }
}

/// A value defined by another instruction: classifier calls taint it
/// directly; any other call passes the join of its own operands through,
/// so wrappers like `int(model.predict(x))` stay classifier-derived.
fn resolve_definition<G: CallGraphSource>(
    graph: &G,
    config: &AnalysisConfig,
    site: InstrRef,
    caller_budget: usize,
    seen: &mut HashSet<SeenKey>,
) -> Provenance {
    let Some(Instruction::Call {
        callee, operands, ..
    }) = graph.instruction(site)
    else {
        return Provenance::Unresolved;
    };
    if config
        .classifier_ops
        .iter()
        .any(|pattern| super::matches_callee(callee, pattern))
    {
        log::trace!("operand defined by classifier call {} at {}", callee, site);
        return Provenance::ClassifierDerived;
    }
    if operands.is_empty() {
        return Provenance::Unresolved;
    }
    let resolved: Vec<Provenance> = operands
        .iter()
        .map(|operand| resolve(graph, config, site.node, operand, caller_budget, seen))
        .collect();
    join_all(resolved)
}

/// A formal parameter: resolved against the matching argument at every
/// call site in the node's direct callers, one budget unit per hop.
fn resolve_parameter<G: CallGraphSource>(
    graph: &G,
    config: &AnalysisConfig,
    node: NodeId,
    index: usize,
    caller_budget: usize,
    seen: &mut HashSet<SeenKey>,
) -> Provenance {
    let sites = graph.callers(node);
    if sites.is_empty() {
        return Provenance::Unresolved;
    }
    let mut resolved = Vec::with_capacity(sites.len());
    for site in sites {
        let argument = match graph.instruction(*site) {
            Some(Instruction::Call { operands, .. }) => operands.get(index),
            _ => None,
        };
        resolved.push(match argument {
            Some(operand) => resolve(
                graph,
                config,
                site.node,
                operand,
                caller_budget - 1,
                seen,
            ),
            // Arity mismatch at the call site: nothing to learn.
            None => Provenance::Unresolved,
        });
    }
    join_all(resolved)
}

/// Join of provenance classes: classifier-derived dominates, agreeing
/// constants survive, everything else collapses to unresolved.
fn join_all(classes: Vec<Provenance>) -> Provenance {
    let mut iter = classes.into_iter();
    let Some(first) = iter.next() else {
        return Provenance::Unresolved;
    };
    iter.fold(first, |acc, next| match (acc, next) {
        (Provenance::ClassifierDerived, _) | (_, Provenance::ClassifierDerived) => {
            Provenance::ClassifierDerived
        }
        (Provenance::Constant(a), Provenance::Constant(b)) if a == b => Provenance::Constant(a),
        _ => Provenance::Unresolved,
    })
}
