//! The path builder: the core call-graph walk.
//!
//! Traverses the call graph depth-first from each configured entry
//! point, threading an abstract turtle state, and emits `TurtlePath`
//! nodes connected by labeled edges. Loops and recursion are folded into
//! `LoopBack` edges instead of being unrolled — the visited tracking is
//! keyed by (site, abstract state) and scoped to the active traversal
//! path, so the same code can be re-traversed on independent paths but
//! never expands without bound.
//!
//! The walk never raises an error for unrecognized code; the only
//! failure is a structurally invalid input graph, rejected by validation
//! before the walk starts.

use crate::callgraph::{self, CallGraphSource, InstrRef, Instruction, NodeId};
use crate::classify::{OpTag, OperationClassifier, TurtleOp};
use crate::config::AnalysisConfig;
use crate::errors::ShapeResult;
use crate::graph::{EdgeType, GraphAssembler, PathId, ShapeGraph, TurtlePath};
use crate::state::AbstractTurtleState;
use std::collections::HashMap;

/// Builds a [`ShapeGraph`] from a call graph and entry points.
///
/// Holds only borrows; one builder can run several analyses and
/// independent builders can analyze the same graph concurrently.
pub struct PathBuilder<'a, G: CallGraphSource> {
    graph: &'a G,
    config: &'a AnalysisConfig,
}

impl<'a, G: CallGraphSource> PathBuilder<'a, G> {
    pub fn new(graph: &'a G, config: &'a AnalysisConfig) -> Self {
        Self { graph, config }
    }

    /// Walk the graph from `entries` and assemble the shape graph.
    ///
    /// Fails only on a structurally invalid call graph; everything else
    /// is absorbed into the abstraction.
    pub fn build(&self, entries: &[NodeId]) -> ShapeResult<ShapeGraph> {
        callgraph::validate(self.graph, entries)?;
        let mut walk = Walk {
            graph: self.graph,
            config: self.config,
            classifier: OperationClassifier::new(self.config),
            assembler: GraphAssembler::new(),
            call_stack: Vec::new(),
            loop_frames: Vec::new(),
            emit_count: 0,
        };
        for &entry in entries {
            log::debug!(
                "walking entry {} ({})",
                entry,
                self.graph.node_name(entry).unwrap_or("?")
            );
            let cursor = Cursor {
                state: AbstractTurtleState::start(),
                incoming: Vec::new(),
            };
            walk.walk_node(entry, cursor)?;
        }
        let graph = walk.assembler.finish();
        log::debug!(
            "shape graph assembled: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Traversal context: the abstract state plus the pending edges to
/// attach to the next emitted node. An empty pending set means the next
/// emission is an entry node of the shape graph.
#[derive(Debug, Clone)]
struct Cursor {
    state: AbstractTurtleState,
    incoming: Vec<(PathId, EdgeType)>,
}

/// One procedure activation on the active path. Recursion folds when a
/// call re-enters a node whose frame carries the same abstract state.
struct CallFrame {
    node: NodeId,
    entry_state: AbstractTurtleState,
    first_emitted: Option<PathId>,
}

/// One loop activation on the active path, keyed by header site and the
/// set of states already carried through it.
struct LoopFrame {
    header: InstrRef,
    /// Call-stack depth at creation; frames die with their activation.
    depth: usize,
    /// Arrival states already carried through the header, each mapped to
    /// the first node emitted during that pass. Folding targets the
    /// matching pass's node so re-entries from an enclosing loop do not
    /// point back at a stale iteration.
    pass_nodes: HashMap<AbstractTurtleState, Option<PathId>>,
    first_emitted: Option<PathId>,
    /// Back-edge target when the body emits nothing: the node that led
    /// into the loop.
    fallback: Option<PathId>,
    passes: u32,
    last_state: AbstractTurtleState,
}

impl LoopFrame {
    fn fold_target(&self, state: &AbstractTurtleState) -> Option<PathId> {
        self.pass_nodes
            .get(state)
            .copied()
            .flatten()
            .or(self.first_emitted)
            .or(self.fallback)
    }
}

struct Walk<'a, G: CallGraphSource> {
    graph: &'a G,
    config: &'a AnalysisConfig,
    classifier: OperationClassifier<'a>,
    assembler: GraphAssembler,
    call_stack: Vec<CallFrame>,
    loop_frames: Vec<LoopFrame>,
    emit_count: u64,
}

impl<'a, G: CallGraphSource> Walk<'a, G> {
    fn walk_node(&mut self, node: NodeId, cursor: Cursor) -> ShapeResult<Cursor> {
        if let Some(frame) = self
            .call_stack
            .iter()
            .find(|f| f.node == node && f.entry_state == cursor.state)
        {
            let target = frame.first_emitted;
            log::trace!("folding recursive call into {}", node);
            if let Some(target) = target {
                for &(source, _) in &cursor.incoming {
                    self.assembler.add_edge(source, target, EdgeType::LoopBack);
                }
            }
            return Ok(cursor);
        }

        self.call_stack.push(CallFrame {
            node,
            entry_state: cursor.state.clone(),
            first_emitted: None,
        });
        let result = self.walk_span(node, 0, cursor);
        self.call_stack.pop();
        let depth = self.call_stack.len();
        self.loop_frames.retain(|frame| frame.depth <= depth);
        result
    }

    /// Walk the intra-node instruction CFG from `start` until the node
    /// exits, returning the continuation cursor.
    fn walk_span(&mut self, node: NodeId, start: usize, mut cursor: Cursor) -> ShapeResult<Cursor> {
        let graph = self.graph;
        let mut index = start;
        loop {
            let instructions = graph.instructions(node);
            let Some(instr) = instructions.get(index) else {
                return Ok(cursor);
            };
            let at = InstrRef::new(node, index);
            match instr {
                Instruction::Return => return Ok(cursor),
                Instruction::Jump { to } => index = *to,
                Instruction::Branch { arms } => {
                    let mut exits = Vec::with_capacity(arms.len());
                    for &arm in arms {
                        let mut forked = cursor.clone();
                        for pending in &mut forked.incoming {
                            if pending.1 == EdgeType::Sequential {
                                pending.1 = EdgeType::Branch;
                            }
                        }
                        exits.push(self.walk_span(node, arm, forked)?);
                    }
                    return Ok(merge_exits(exits, cursor));
                }
                Instruction::LoopHeader { body, exit } => {
                    match self.enter_loop(at, &mut cursor) {
                        LoopStep::Iterate => index = *body,
                        LoopStep::Fold(target) => {
                            if let Some(target) = target {
                                for &(source, _) in &cursor.incoming {
                                    self.assembler.add_edge(
                                        source,
                                        target,
                                        EdgeType::LoopBack,
                                    );
                                }
                            }
                            index = *exit;
                        }
                    }
                }
                Instruction::Call { targets, .. } => {
                    match self.classifier.classify(graph, at) {
                        OpTag::Turtle(op) => {
                            let next_state = cursor.state.apply(&op);
                            self.emit(&mut cursor, next_state, op, at);
                        }
                        OpTag::PlainCall => {
                            cursor = self.walk_call(targets, cursor)?;
                        }
                        // Classifier calls matter only as provenance
                        // sources; unanalyzable calls are state no-ops.
                        OpTag::ClassifierCall { .. } | OpTag::Other => {}
                        OpTag::Branch | OpTag::LoopHeader => {}
                    }
                    index += 1;
                }
            }
        }
    }

    /// Loop-header bookkeeping: decide whether to take another pass over
    /// the body or fold the iteration into a back-edge. Past the
    /// widening threshold, changed state components collapse so the fold
    /// key converges.
    fn enter_loop(&mut self, at: InstrRef, cursor: &mut Cursor) -> LoopStep {
        let depth = self.call_stack.len();
        let position = self
            .loop_frames
            .iter()
            .rposition(|f| f.depth == depth && f.header == at);
        let Some(position) = position else {
            self.loop_frames.push(LoopFrame {
                header: at,
                depth,
                pass_nodes: HashMap::from([(cursor.state.clone(), None)]),
                first_emitted: None,
                fallback: cursor.incoming.first().map(|&(source, _)| source),
                passes: 0,
                last_state: cursor.state.clone(),
            });
            return LoopStep::Iterate;
        };

        let threshold = self.config.loop_widening_threshold;
        let frame = &mut self.loop_frames[position];
        if frame.pass_nodes.contains_key(&cursor.state) {
            log::trace!("folding loop at {} after {} passes", at, frame.passes);
            return LoopStep::Fold(frame.fold_target(&cursor.state));
        }
        frame.passes += 1;
        if frame.passes >= threshold {
            log::debug!("widening loop state at {} after {} passes", at, frame.passes);
            cursor.state = cursor.state.widen_against(&frame.last_state);
            if frame.pass_nodes.contains_key(&cursor.state) {
                return LoopStep::Fold(frame.fold_target(&cursor.state));
            }
        }
        frame.pass_nodes.insert(cursor.state.clone(), None);
        frame.last_state = cursor.state.clone();
        LoopStep::Iterate
    }

    /// A call with analyzable targets: descend into each with a forked
    /// state under `Call`/`Return` edge labels, then resume the caller
    /// with the join over the per-target exits. Several targets mean the
    /// external builder could not resolve the call uniquely; joining is
    /// the documented over-approximation for that imprecision.
    fn walk_call(&mut self, targets: &[NodeId], cursor: Cursor) -> ShapeResult<Cursor> {
        let mut exits = Vec::with_capacity(targets.len());
        for &target in targets {
            let before = self.emit_count;
            let entry_incoming = cursor
                .incoming
                .iter()
                .map(|&(source, _)| (source, EdgeType::Call))
                .collect();
            let out = self.walk_node(
                target,
                Cursor {
                    state: cursor.state.clone(),
                    incoming: entry_incoming,
                },
            )?;
            if self.emit_count == before {
                // The callee drew nothing: the caller's pending edges
                // (and state) pass through untouched.
                exits.push(cursor.clone());
            } else {
                let incoming = out
                    .incoming
                    .into_iter()
                    .map(|(source, label)| {
                        if label == EdgeType::Call {
                            // A pending edge that predates the call and
                            // crossed the callee unconsumed: restore its
                            // caller-side label.
                            let original = cursor
                                .incoming
                                .iter()
                                .find(|&&(s, _)| s == source)
                                .map(|&(_, l)| l)
                                .unwrap_or(EdgeType::Sequential);
                            (source, original)
                        } else {
                            (source, EdgeType::Return)
                        }
                    })
                    .collect();
                exits.push(Cursor {
                    state: out.state,
                    incoming,
                });
            }
        }
        Ok(merge_exits(exits, cursor))
    }

    /// Intern a shape node for `next_state`, connect the pending edges,
    /// and advance the cursor.
    fn emit(
        &mut self,
        cursor: &mut Cursor,
        next_state: AbstractTurtleState,
        op: TurtleOp,
        origin: InstrRef,
    ) {
        let id = self.assembler.intern(TurtlePath {
            state: next_state.clone(),
            op,
            origin,
        });
        if cursor.incoming.is_empty() {
            self.assembler.mark_entry(id);
        }
        let lead_of_active_loop = self.loop_frames.iter().any(|frame| {
            frame.first_emitted == Some(id)
                || frame.pass_nodes.get(&frame.last_state) == Some(&Some(id))
        });
        for &(source, label) in &cursor.incoming {
            // A sequential self-edge on a loop's lead node is the
            // abstraction stuttering across an iteration; the fold edge
            // at the header already carries that information.
            if source == id && label == EdgeType::Sequential && lead_of_active_loop {
                continue;
            }
            self.assembler.add_edge(source, id, label);
        }
        for frame in &mut self.call_stack {
            if frame.first_emitted.is_none() {
                frame.first_emitted = Some(id);
            }
        }
        for frame in &mut self.loop_frames {
            if frame.first_emitted.is_none() {
                frame.first_emitted = Some(id);
            }
            if let Some(slot) = frame.pass_nodes.get_mut(&frame.last_state) {
                if slot.is_none() {
                    *slot = Some(id);
                }
            }
        }
        cursor.state = next_state;
        cursor.incoming = vec![(id, EdgeType::Sequential)];
        self.emit_count += 1;
        log::trace!("emitted {:?} from {}", id, origin);
    }
}

enum LoopStep {
    Iterate,
    Fold(Option<PathId>),
}

/// Join the continuation cursors of forked traversals (branch arms or
/// call targets): states join component-wise, pending edges accumulate
/// without duplicates. `fallback` covers the vacuous case.
fn merge_exits(exits: Vec<Cursor>, fallback: Cursor) -> Cursor {
    let mut iter = exits.into_iter();
    let Some(mut merged) = iter.next() else {
        return fallback;
    };
    for exit in iter {
        merged.state = merged.state.join(&exit.state);
        for pending in exit.incoming {
            if !merged.incoming.contains(&pending) {
                merged.incoming.push(pending);
            }
        }
    }
    merged
}
