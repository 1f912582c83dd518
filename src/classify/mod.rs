//! Operation classification.
//!
//! Decides, for any instruction in the call graph, whether it denotes a
//! turtle drawing primitive, a classifier-prediction call, an ordinary
//! call, or a control-flow construct. Recognition is table-driven from
//! [`AnalysisConfig`]; anything the tables do not cover classifies as
//! `Other` rather than failing, since Python call graphs are routinely
//! incomplete.

mod provenance;

pub use provenance::resolve_operand;

use crate::callgraph::{CallGraphSource, ConstValue, InstrRef, Instruction, Operand};
use crate::config::AnalysisConfig;
use serde::{Deserialize, Serialize};

/// Resolved provenance class of one call operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// The value is a known constant.
    Constant(ConstValue),
    /// The value transitively originates from a classifier-prediction
    /// call.
    ClassifierDerived,
    /// Nothing conclusive is known statically.
    Unresolved,
}

/// Kind of turtle drawing primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurtleKind {
    /// Relative motion along the current heading.
    Move { backward: bool },
    /// Absolute position set (`goto` and friends).
    MoveTo,
    /// Relative rotation. `clockwise` distinguishes `right` from `left`.
    Turn { clockwise: bool },
    /// Absolute heading set.
    SetHeading,
    PenUp,
    PenDown,
    ColorSet,
    /// Drawing primitives that mark without changing the tracked state
    /// (`circle`, `dot`, `stamp`).
    OtherDraw,
}

/// A recognized turtle operation: the primitive kind plus the resolved
/// provenance class of each argument. This is also the
/// producing-instruction class recorded on shape-graph nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurtleOp {
    pub kind: TurtleKind,
    pub args: Vec<Provenance>,
}

impl TurtleOp {
    /// The single argument class, for unary primitives.
    pub fn arg(&self) -> Option<&Provenance> {
        self.args.first()
    }
}

/// Classification of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpTag {
    /// A turtle drawing primitive.
    Turtle(TurtleOp),
    /// A classifier-prediction call; relevant only as a provenance
    /// source, never emitted into the shape graph.
    ClassifierCall { args: Vec<Provenance> },
    /// An ordinary call with at least one analyzable target.
    PlainCall,
    Branch,
    LoopHeader,
    /// Anything else: unanalyzable library calls, jumps, returns.
    Other,
}

/// Table-driven instruction classifier.
///
/// Holds only a borrow of the configuration; construction is free and
/// the classifier is stateless, so it can be shared across traversals.
pub struct OperationClassifier<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> OperationClassifier<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Classify the instruction at `at`.
    ///
    /// Unknown instruction references classify as `Other`; validation has
    /// already rejected graphs where that would matter.
    pub fn classify<G: CallGraphSource>(&self, graph: &G, at: InstrRef) -> OpTag {
        let Some(instr) = graph.instruction(at) else {
            return OpTag::Other;
        };
        match instr {
            Instruction::Call {
                callee,
                operands,
                targets,
            } => {
                let resolve_args = |operands: &[Operand]| {
                    operands
                        .iter()
                        .map(|operand| {
                            provenance::resolve_operand(graph, self.config, at.node, operand)
                        })
                        .collect()
                };
                if let Some(kind) = self.turtle_kind(callee) {
                    OpTag::Turtle(TurtleOp {
                        kind,
                        args: resolve_args(operands),
                    })
                } else if self.is_classifier_call(callee) {
                    OpTag::ClassifierCall {
                        args: resolve_args(operands),
                    }
                } else if !targets.is_empty() {
                    OpTag::PlainCall
                } else {
                    OpTag::Other
                }
            }
            Instruction::Branch { .. } => OpTag::Branch,
            Instruction::LoopHeader { .. } => OpTag::LoopHeader,
            Instruction::Jump { .. } | Instruction::Return => OpTag::Other,
        }
    }

    /// Whether `callee` is a recognized classifier-prediction call.
    pub fn is_classifier_call(&self, callee: &str) -> bool {
        self.config
            .classifier_ops
            .iter()
            .any(|pattern| matches_callee(callee, pattern))
    }

    /// The turtle primitive kind for `callee`, if the tables recognize
    /// it.
    pub fn turtle_kind(&self, callee: &str) -> Option<TurtleKind> {
        let config = self.config;
        let matches = |table: &[String]| table.iter().any(|p| matches_callee(callee, p));
        if matches(&config.forward_ops) {
            Some(TurtleKind::Move { backward: false })
        } else if matches(&config.backward_ops) {
            Some(TurtleKind::Move { backward: true })
        } else if matches(&config.clockwise_turn_ops) {
            Some(TurtleKind::Turn { clockwise: true })
        } else if matches(&config.counter_turn_ops) {
            Some(TurtleKind::Turn { clockwise: false })
        } else if matches(&config.set_heading_ops) {
            Some(TurtleKind::SetHeading)
        } else if matches(&config.goto_ops) {
            Some(TurtleKind::MoveTo)
        } else if matches(&config.pen_up_ops) {
            Some(TurtleKind::PenUp)
        } else if matches(&config.pen_down_ops) {
            Some(TurtleKind::PenDown)
        } else if matches(&config.color_ops) {
            Some(TurtleKind::ColorSet)
        } else if matches(&config.other_draw_ops) {
            Some(TurtleKind::OtherDraw)
        } else {
            None
        }
    }
}

/// Match a resolved callee name against a table pattern.
///
/// A bare pattern matches the final dotted segment (`"forward"` matches
/// `"turtle.forward"` and `"t.forward"`); a dotted pattern matches as a
/// dotted suffix (`"sklearn.svm.SVC.predict"` matches fully-qualified
/// names only).
fn matches_callee(callee: &str, pattern: &str) -> bool {
    if pattern.contains('.') {
        callee == pattern
            || callee
                .strip_suffix(pattern)
                .is_some_and(|prefix| prefix.ends_with('.'))
    } else {
        callee.rsplit('.').next() == Some(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callgraph::{MemoryCallGraphBuilder, Operand};

    fn classify_single(instr: Instruction) -> OpTag {
        let mut builder = MemoryCallGraphBuilder::new();
        let main = builder.add_node("script.main");
        let at = builder.push_instr(main, instr);
        let graph = builder.build();
        let config = AnalysisConfig::default();
        OperationClassifier::new(&config).classify(&graph, at)
    }

    #[test]
    fn bare_patterns_match_last_segment() {
        assert!(matches_callee("turtle.forward", "forward"));
        assert!(matches_callee("forward", "forward"));
        assert!(!matches_callee("turtle.fast_forward", "forward"));
    }

    #[test]
    fn dotted_patterns_match_as_suffix() {
        assert!(matches_callee("sklearn.svm.SVC.predict", "SVC.predict"));
        assert!(!matches_callee("sklearn.svm.MockSVC.predict", "SVC.predict"));
    }

    #[test]
    fn recognizes_turtle_move() {
        let tag = classify_single(Instruction::call(
            "turtle.forward",
            vec![Operand::Const(ConstValue::Int(10))],
        ));
        match tag {
            OpTag::Turtle(op) => {
                assert_eq!(op.kind, TurtleKind::Move { backward: false });
                assert_eq!(
                    op.arg(),
                    Some(&Provenance::Constant(ConstValue::Int(10)))
                );
            }
            other => panic!("expected turtle op, got {:?}", other),
        }
    }

    #[test]
    fn recognizes_classifier_call() {
        let tag = classify_single(Instruction::call(
            "model.predict",
            vec![Operand::Unknown],
        ));
        assert_eq!(
            tag,
            OpTag::ClassifierCall {
                args: vec![Provenance::Unresolved]
            }
        );
    }

    #[test]
    fn unresolved_library_call_is_other() {
        let tag = classify_single(Instruction::call("math.sqrt", vec![Operand::Unknown]));
        assert_eq!(tag, OpTag::Other);
    }

    #[test]
    fn turn_direction_is_distinguished() {
        let config = AnalysisConfig::default();
        let classifier = OperationClassifier::new(&config);
        assert_eq!(
            classifier.turtle_kind("turtle.right"),
            Some(TurtleKind::Turn { clockwise: true })
        );
        assert_eq!(
            classifier.turtle_kind("turtle.left"),
            Some(TurtleKind::Turn { clockwise: false })
        );
    }

    #[test]
    fn control_flow_tags() {
        assert_eq!(
            classify_single(Instruction::Branch { arms: vec![0, 0] }),
            OpTag::Branch
        );
        assert_eq!(
            classify_single(Instruction::LoopHeader { body: 0, exit: 0 }),
            OpTag::LoopHeader
        );
        assert_eq!(classify_single(Instruction::Return), OpTag::Other);
    }
}
