//! Analysis configuration.
//!
//! Which library calls count as turtle primitives or classifier
//! predictions is not hardcoded into the engine; it is an explicit,
//! immutable table passed to the operation classifier at construction.
//! The defaults cover the CPython `turtle` module vocabulary and the
//! sklearn estimator prediction surface.
//!
//! The two policy constants the design leaves to the implementer live
//! here as well, so embedding harnesses can tighten or relax them:
//! `provenance_caller_depth` bounds the backward data-flow walk that
//! decides whether a value is classifier-derived, and
//! `loop_widening_threshold` bounds how many distinct-state passes over
//! one loop header are made before changed state components are widened.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Immutable configuration table for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Forward-motion primitives (`forward`, `fd`).
    #[serde(default = "default_forward_ops")]
    pub forward_ops: Vec<String>,

    /// Backward-motion primitives (`backward`, `back`, `bk`).
    #[serde(default = "default_backward_ops")]
    pub backward_ops: Vec<String>,

    /// Clockwise turns (`right`, `rt`).
    #[serde(default = "default_clockwise_turn_ops")]
    pub clockwise_turn_ops: Vec<String>,

    /// Counter-clockwise turns (`left`, `lt`).
    #[serde(default = "default_counter_turn_ops")]
    pub counter_turn_ops: Vec<String>,

    /// Absolute heading sets (`setheading`, `seth`).
    #[serde(default = "default_set_heading_ops")]
    pub set_heading_ops: Vec<String>,

    /// Absolute position sets (`goto`, `setpos`, `setposition`).
    #[serde(default = "default_goto_ops")]
    pub goto_ops: Vec<String>,

    /// Pen-up primitives (`penup`, `pu`, `up`).
    #[serde(default = "default_pen_up_ops")]
    pub pen_up_ops: Vec<String>,

    /// Pen-down primitives (`pendown`, `pd`, `down`).
    #[serde(default = "default_pen_down_ops")]
    pub pen_down_ops: Vec<String>,

    /// Color-setting primitives (`pencolor`, `color`, `fillcolor`).
    #[serde(default = "default_color_ops")]
    pub color_ops: Vec<String>,

    /// Other drawing primitives that leave marks without moving state
    /// (`circle`, `dot`, `stamp`).
    #[serde(default = "default_other_draw_ops")]
    pub other_draw_ops: Vec<String>,

    /// Classifier-prediction calls. A value flowing out of one of these
    /// is classifier-derived.
    #[serde(default = "default_classifier_ops")]
    pub classifier_ops: Vec<String>,

    /// How many direct-caller hops the backward provenance walk follows
    /// when an operand is a formal parameter. Depth 0 resolves parameters
    /// to `Unresolved` immediately.
    #[serde(default = "default_provenance_caller_depth")]
    pub provenance_caller_depth: usize,

    /// Distinct-state passes allowed over one loop header within a
    /// single active path before changed state components are widened to
    /// `Unresolved`, forcing convergence.
    #[serde(default = "default_loop_widening_threshold")]
    pub loop_widening_threshold: u32,
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_forward_ops() -> Vec<String> {
    to_strings(&["forward", "fd"])
}

fn default_backward_ops() -> Vec<String> {
    to_strings(&["backward", "back", "bk"])
}

fn default_clockwise_turn_ops() -> Vec<String> {
    to_strings(&["right", "rt"])
}

fn default_counter_turn_ops() -> Vec<String> {
    to_strings(&["left", "lt"])
}

fn default_set_heading_ops() -> Vec<String> {
    to_strings(&["setheading", "seth"])
}

fn default_goto_ops() -> Vec<String> {
    to_strings(&["goto", "setpos", "setposition"])
}

fn default_pen_up_ops() -> Vec<String> {
    to_strings(&["penup", "pu", "up"])
}

fn default_pen_down_ops() -> Vec<String> {
    to_strings(&["pendown", "pd", "down"])
}

fn default_color_ops() -> Vec<String> {
    to_strings(&["pencolor", "color", "fillcolor"])
}

fn default_other_draw_ops() -> Vec<String> {
    to_strings(&["circle", "dot", "stamp"])
}

fn default_classifier_ops() -> Vec<String> {
    to_strings(&["predict", "predict_proba", "decision_function"])
}

fn default_provenance_caller_depth() -> usize {
    1
}

fn default_loop_widening_threshold() -> u32 {
    64
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            forward_ops: default_forward_ops(),
            backward_ops: default_backward_ops(),
            clockwise_turn_ops: default_clockwise_turn_ops(),
            counter_turn_ops: default_counter_turn_ops(),
            set_heading_ops: default_set_heading_ops(),
            goto_ops: default_goto_ops(),
            pen_up_ops: default_pen_up_ops(),
            pen_down_ops: default_pen_down_ops(),
            color_ops: default_color_ops(),
            other_draw_ops: default_other_draw_ops(),
            classifier_ops: default_classifier_ops(),
            provenance_caller_depth: default_provenance_caller_depth(),
            loop_widening_threshold: default_loop_widening_threshold(),
        }
    }
}

static DEFAULT_CONFIG: Lazy<AnalysisConfig> = Lazy::new(AnalysisConfig::default);

impl AnalysisConfig {
    /// Shared default table, built once.
    pub fn default_ref() -> &'static AnalysisConfig {
        &DEFAULT_CONFIG
    }
}
