//! Abstract turtle state.
//!
//! Concrete turtle state (position, heading, pen, color) is abstracted
//! into equivalence classes rather than tracked as exact numbers, because
//! exact values are frequently unknowable statically. Two classes are
//! absorbing: `ClassifierControlled` marks a component whose rendered
//! value depends on a machine-learning prediction, and `Unresolved`
//! marks one that is statically unknown for any other reason. Once a
//! component is classifier-controlled, no sequence of constant
//! operations brings it back — the abstraction never claims more
//! precision than is actually known. `Unresolved` may step up to
//! `ClassifierControlled`, never down to a constant class.

use crate::callgraph::ConstValue;
use crate::classify::{Provenance, TurtleKind, TurtleOp};
use serde::{Deserialize, Serialize};
use std::fmt;

const MICRODEG_PER_TURN: i64 = 360_000_000;

/// A rotation amount in microdegrees, normalized into
/// `[0, 360_000_000)`. Integer microdegrees keep the heading domain
/// finite, which the termination argument for loop folding relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Angle(i64);

impl Angle {
    pub fn from_degrees(degrees: f64) -> Self {
        let micro = (degrees * 1e6).round() as i64;
        Self(micro.rem_euclid(MICRODEG_PER_TURN))
    }

    pub fn plus(self, other: Angle) -> Angle {
        Self((self.0 + other.0).rem_euclid(MICRODEG_PER_TURN))
    }

    pub fn negated(self) -> Angle {
        Self((-self.0).rem_euclid(MICRODEG_PER_TURN))
    }

    pub fn degrees(self) -> f64 {
        self.0 as f64 / 1e6
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Equivalence class of the turtle's position.
///
/// `Moved` records the distance class of the most recent constant move,
/// not accumulated coordinates: accumulation would give every loop
/// iteration a fresh abstract state and defeat loop folding. `At` is an
/// absolute constant fix from `goto`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionClass {
    Home,
    Moved(ConstValue),
    At(ConstValue, ConstValue),
    ClassifierControlled,
    Unresolved,
}

/// Equivalence class of the turtle's heading.
///
/// `Turned` is the cumulative rotation relative to the initial heading;
/// `Set` is an absolute heading from `setheading`. Both accumulate
/// further constant turns exactly, modulo a full turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadingClass {
    Initial,
    Turned(Angle),
    Set(Angle),
    ClassifierControlled,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PenState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorClass {
    Initial,
    Set(ConstValue),
    ClassifierControlled,
    Unresolved,
}

/// Snapshot of the abstract turtle state threaded through traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbstractTurtleState {
    pub position: PositionClass,
    pub heading: HeadingClass,
    pub pen: PenState,
    pub color: ColorClass,
}

impl Default for AbstractTurtleState {
    fn default() -> Self {
        Self::start()
    }
}

impl AbstractTurtleState {
    /// The state every traversal starts from: home position, initial
    /// heading, pen down, default color.
    pub fn start() -> Self {
        Self {
            position: PositionClass::Home,
            heading: HeadingClass::Initial,
            pen: PenState::Down,
            color: ColorClass::Initial,
        }
    }

    /// Transfer function: the state after one turtle operation. Total
    /// and deterministic; never fails.
    pub fn apply(&self, op: &TurtleOp) -> Self {
        let mut next = self.clone();
        match op.kind {
            TurtleKind::Move { .. } => {
                next.position = apply_move(&self.position, &self.heading, op.arg());
            }
            TurtleKind::MoveTo => {
                next.position = apply_move_to(&self.position, &op.args);
            }
            TurtleKind::Turn { clockwise } => {
                next.heading = apply_turn(self.heading, op.arg(), clockwise);
            }
            TurtleKind::SetHeading => {
                next.heading = apply_set_heading(self.heading, op.arg());
            }
            TurtleKind::PenUp => next.pen = PenState::Up,
            TurtleKind::PenDown => next.pen = PenState::Down,
            TurtleKind::ColorSet => {
                next.color = apply_color(&self.color, &op.args);
            }
            // Marks the canvas without changing the tracked state.
            TurtleKind::OtherDraw => {}
        }
        next
    }

    /// Component-wise join, used where control paths merge (after a
    /// call with several resolved targets). Equal classes survive,
    /// classifier control dominates, any other disagreement collapses
    /// to `Unresolved`. Disagreeing pen states join to `Down` so
    /// possible drawing is never hidden.
    pub fn join(&self, other: &Self) -> Self {
        Self {
            position: join_class(&self.position, &other.position, |c| {
                matches!(c, PositionClass::ClassifierControlled)
            })
            .unwrap_or(PositionClass::Unresolved),
            heading: join_class(&self.heading, &other.heading, |c| {
                matches!(c, HeadingClass::ClassifierControlled)
            })
            .unwrap_or(HeadingClass::Unresolved),
            pen: if self.pen == other.pen {
                self.pen
            } else {
                PenState::Down
            },
            color: join_class(&self.color, &other.color, |c| {
                matches!(c, ColorClass::ClassifierControlled)
            })
            .unwrap_or(ColorClass::Unresolved),
        }
    }

    /// Widening: collapse the components that changed between two
    /// successive loop passes to `Unresolved`, forcing the folding key
    /// to converge. Classifier control is preserved — widening must not
    /// erase provenance.
    pub fn widen_against(&self, previous: &Self) -> Self {
        Self {
            position: widen_class(&self.position, &previous.position, |c| {
                matches!(c, PositionClass::ClassifierControlled)
            })
            .unwrap_or(PositionClass::Unresolved),
            heading: widen_class(&self.heading, &previous.heading, |c| {
                matches!(c, HeadingClass::ClassifierControlled)
            })
            .unwrap_or(HeadingClass::Unresolved),
            pen: self.pen,
            color: widen_class(&self.color, &previous.color, |c| {
                matches!(c, ColorClass::ClassifierControlled)
            })
            .unwrap_or(ColorClass::Unresolved),
        }
    }
}

/// Shared join shape for the absorbing component domains: `Some` keeps a
/// class, `None` asks the caller for its `Unresolved`.
fn join_class<T: Clone + PartialEq>(
    a: &T,
    b: &T,
    is_classifier: impl Fn(&T) -> bool,
) -> Option<T> {
    if a == b {
        Some(a.clone())
    } else if is_classifier(a) {
        Some(a.clone())
    } else if is_classifier(b) {
        Some(b.clone())
    } else {
        None
    }
}

fn widen_class<T: Clone + PartialEq>(
    current: &T,
    previous: &T,
    is_classifier: impl Fn(&T) -> bool,
) -> Option<T> {
    if current == previous || is_classifier(current) {
        Some(current.clone())
    } else {
        None
    }
}

fn apply_move(
    position: &PositionClass,
    heading: &HeadingClass,
    distance: Option<&Provenance>,
) -> PositionClass {
    match position {
        PositionClass::ClassifierControlled => PositionClass::ClassifierControlled,
        PositionClass::Unresolved => {
            if classifier_in_play(distance, heading) {
                PositionClass::ClassifierControlled
            } else {
                PositionClass::Unresolved
            }
        }
        _ => match (distance, heading) {
            (Some(Provenance::ClassifierDerived), _) => PositionClass::ClassifierControlled,
            (_, HeadingClass::ClassifierControlled) => PositionClass::ClassifierControlled,
            (Some(Provenance::Constant(d)), HeadingClass::Initial)
            | (Some(Provenance::Constant(d)), HeadingClass::Turned(_))
            | (Some(Provenance::Constant(d)), HeadingClass::Set(_)) => {
                PositionClass::Moved(d.clone())
            }
            _ => PositionClass::Unresolved,
        },
    }
}

fn classifier_in_play(distance: Option<&Provenance>, heading: &HeadingClass) -> bool {
    matches!(distance, Some(Provenance::ClassifierDerived))
        || matches!(heading, HeadingClass::ClassifierControlled)
}

fn apply_move_to(position: &PositionClass, args: &[Provenance]) -> PositionClass {
    if matches!(position, PositionClass::ClassifierControlled) {
        return PositionClass::ClassifierControlled;
    }
    if args
        .iter()
        .any(|a| matches!(a, Provenance::ClassifierDerived))
    {
        return PositionClass::ClassifierControlled;
    }
    if matches!(position, PositionClass::Unresolved) {
        return PositionClass::Unresolved;
    }
    match args {
        [Provenance::Constant(x), Provenance::Constant(y)] => {
            PositionClass::At(x.clone(), y.clone())
        }
        _ => PositionClass::Unresolved,
    }
}

fn apply_turn(
    heading: HeadingClass,
    angle: Option<&Provenance>,
    clockwise: bool,
) -> HeadingClass {
    match heading {
        HeadingClass::ClassifierControlled => HeadingClass::ClassifierControlled,
        HeadingClass::Unresolved => match angle {
            Some(Provenance::ClassifierDerived) => HeadingClass::ClassifierControlled,
            _ => HeadingClass::Unresolved,
        },
        known => match angle {
            Some(Provenance::ClassifierDerived) => HeadingClass::ClassifierControlled,
            Some(Provenance::Constant(value)) => match constant_angle(value, clockwise) {
                Some(delta) => accumulate_turn(known, delta),
                None => HeadingClass::Unresolved,
            },
            _ => HeadingClass::Unresolved,
        },
    }
}

fn accumulate_turn(known: HeadingClass, delta: Angle) -> HeadingClass {
    match known {
        HeadingClass::Initial => HeadingClass::Turned(delta),
        HeadingClass::Turned(total) => HeadingClass::Turned(total.plus(delta)),
        HeadingClass::Set(total) => HeadingClass::Set(total.plus(delta)),
        absorbing => absorbing,
    }
}

fn apply_set_heading(heading: HeadingClass, angle: Option<&Provenance>) -> HeadingClass {
    match heading {
        HeadingClass::ClassifierControlled => HeadingClass::ClassifierControlled,
        HeadingClass::Unresolved => match angle {
            Some(Provenance::ClassifierDerived) => HeadingClass::ClassifierControlled,
            _ => HeadingClass::Unresolved,
        },
        _ => match angle {
            Some(Provenance::ClassifierDerived) => HeadingClass::ClassifierControlled,
            Some(Provenance::Constant(value)) => match value.as_f64() {
                Some(degrees) => HeadingClass::Set(Angle::from_degrees(degrees)),
                None => HeadingClass::Unresolved,
            },
            _ => HeadingClass::Unresolved,
        },
    }
}

/// Turtle turns are clockwise-negative: `right(90)` subtracts from the
/// heading, `left(90)` adds.
fn constant_angle(value: &ConstValue, clockwise: bool) -> Option<Angle> {
    let degrees = value.as_f64()?;
    let angle = Angle::from_degrees(degrees);
    Some(if clockwise { angle.negated() } else { angle })
}

fn apply_color(color: &ColorClass, args: &[Provenance]) -> ColorClass {
    if matches!(color, ColorClass::ClassifierControlled) {
        return ColorClass::ClassifierControlled;
    }
    if args
        .iter()
        .any(|a| matches!(a, Provenance::ClassifierDerived))
    {
        return ColorClass::ClassifierControlled;
    }
    if matches!(color, ColorClass::Unresolved) {
        return ColorClass::Unresolved;
    }
    let constants: Option<Vec<&ConstValue>> = args
        .iter()
        .map(|a| match a {
            Provenance::Constant(c) => Some(c),
            _ => None,
        })
        .collect();
    match constants.as_deref() {
        Some([single]) => ColorClass::Set((*single).clone()),
        // Component color forms like (r, g, b) canonicalize to one
        // string constant so the class stays a single value.
        Some(parts) if !parts.is_empty() => {
            let joined = parts
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",");
            ColorClass::Set(ConstValue::Str(joined))
        }
        _ => ColorClass::Unresolved,
    }
}
