//! Error types for shape-graph extraction.
//!
//! The engine has a deliberately narrow error surface: the only condition
//! that crosses the component boundary as a failure is a structurally
//! invalid input call graph. Unrecognized operations are absorbed as
//! no-ops and imprecise values collapse into the absorbing abstract
//! classes, so neither ever surfaces as an error.

use crate::callgraph::NodeId;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type ShapeResult<T> = Result<T, ShapeError>;

/// Fatal analysis errors.
///
/// `MalformedGraph` indicates the external call-graph builder violated its
/// structural contract (dangling call target, out-of-range transfer,
/// unknown entry node). The analysis aborts; there is nothing sound to
/// recover to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("malformed call graph: {detail}")]
    MalformedGraph {
        detail: String,
        /// Node the violation was found in, when attributable.
        node: Option<NodeId>,
    },
}

impl ShapeError {
    /// Create a malformed-graph error without node attribution.
    pub fn malformed(detail: impl Into<String>) -> Self {
        ShapeError::MalformedGraph {
            detail: detail.into(),
            node: None,
        }
    }

    /// Create a malformed-graph error attributed to a node.
    pub fn malformed_at(node: NodeId, detail: impl Into<String>) -> Self {
        ShapeError::MalformedGraph {
            detail: detail.into(),
            node: Some(node),
        }
    }
}
