//! Error types for graph mutation and verification.
//!
//! Every error here signals a bug in the calling pass, never a condition an
//! end user can act on. Operations check all of their preconditions before the
//! first edge write, so an `Err` always leaves the graph as it was.

use thiserror::Error;

use crate::node::NodeId;

/// Builds a [`GraphError::Verification`] with a formatted message.
///
/// ```ignore
/// return Err(verify_fail!(node, Some(input), "missing usage of {} in input {}", node, input));
/// ```
macro_rules! verify_fail {
    ($node:expr, $other:expr, $msg:expr) => {
        $crate::error::GraphError::Verification {
            node: $node,
            other: $other,
            message: $msg.to_string(),
        }
    };

    ($node:expr, $other:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::error::GraphError::Verification {
            node: $node,
            other: $other,
            message: format!($fmt, $($arg)*),
        }
    };
}

pub(crate) use verify_fail;

/// Result alias used throughout the crate.
pub type GraphResult<T> = Result<T, GraphError>;

/// A violated precondition or a failed structural check.
///
/// # Categories
///
/// ## Precondition violations
/// - [`GraphError::Frozen`] - mutation attempted on a frozen graph
/// - [`GraphError::Deleted`] / [`GraphError::NotAlive`] - operating on a node in the wrong state
/// - [`GraphError::SelfReplacement`] / [`GraphError::ReplacementNotAlive`]
/// - [`GraphError::HasUsages`] / [`GraphError::HasPredecessor`] / [`GraphError::HasEdges`]
/// - [`GraphError::NullRequiredEdge`] - clearing a non-optional input
///
/// ## Verification failures
/// - [`GraphError::Verification`] - an invariant between two nodes does not hold
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph has been frozen and rejects every mutation.
    #[error("cannot modify frozen graph")]
    Frozen,

    /// The id does not name a slot of this graph.
    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    /// `register` was handed a node that is not in the unregistered state.
    #[error("node is already registered (state: {state})")]
    AlreadyRegistered {
        /// Debug rendering of the offending state.
        state: String,
    },

    /// The node was deleted earlier and may no longer be mutated or referenced.
    #[error("node {node} has been deleted")]
    Deleted {
        /// Id the node had while it was alive.
        node: NodeId,
    },

    /// The node is not alive in this graph.
    #[error("node {node} is not alive")]
    NotAlive {
        /// The offending node.
        node: NodeId,
    },

    /// A node was asked to replace itself.
    #[error("cannot replace node {node} with itself")]
    SelfReplacement {
        /// The node being replaced.
        node: NodeId,
    },

    /// An alive node was asked to be replaced with a node that is not alive.
    #[error("cannot replace alive node {node} with non-alive node {replacement}")]
    ReplacementNotAlive {
        /// The node being replaced.
        node: NodeId,
        /// The rejected replacement.
        replacement: NodeId,
    },

    /// Deletion attempted on a node that still has usages.
    #[error("cannot delete node {node} because of {count} usage(s)")]
    HasUsages {
        /// The node being deleted.
        node: NodeId,
        /// Remaining usage count.
        count: usize,
    },

    /// Deletion attempted on a node that still has a predecessor.
    #[error("cannot delete node {node} because of predecessor {predecessor}")]
    HasPredecessor {
        /// The node being deleted.
        node: NodeId,
        /// The predecessor still pointing at it.
        predecessor: NodeId,
    },

    /// `mark_deleted` on a node whose own edges have not been cleared.
    #[error("cannot mark node {node} deleted while it still holds edges")]
    HasEdges {
        /// The node being deleted.
        node: NodeId,
    },

    /// A non-optional input slot would become null.
    #[error("non-optional input '{slot}' of node {node} cannot be null")]
    NullRequiredEdge {
        /// The node owning the slot.
        node: NodeId,
        /// Slot name from the edge schema.
        slot: &'static str,
    },

    /// A required retarget found no edge pointing at the expected node.
    #[error("node {node} has no edge to {target}")]
    EdgeNotFound {
        /// The node whose edges were searched.
        node: NodeId,
        /// The node the edge should have pointed at.
        target: NodeId,
    },

    /// A successor edge would give a node a second predecessor.
    #[error("node {successor} already has predecessor {existing}, cannot attach to {predecessor}")]
    PredecessorConflict {
        /// The successor being attached.
        successor: NodeId,
        /// Its current predecessor.
        existing: NodeId,
        /// The node that tried to become its predecessor.
        predecessor: NodeId,
    },

    /// A position does not address a slot of the node's class.
    #[error("invalid edge position {position} for node {node}")]
    InvalidPosition {
        /// The node the position was applied to.
        node: NodeId,
        /// Debug rendering of the position.
        position: String,
    },

    /// The progress signal asked for the current traversal to be abandoned.
    #[error("graph traversal cancelled by progress signal")]
    Cancelled,

    /// A structural invariant does not hold.
    #[error("graph verification failed at {node}: {message}")]
    Verification {
        /// The node being verified.
        node: NodeId,
        /// The other node in the inconsistent relation, if any.
        other: Option<NodeId>,
        /// Human-readable description of the broken invariant.
        message: String,
    },
}

impl GraphError {
    /// Whether this error came from a verification pass rather than a precondition check.
    pub fn is_verification(&self) -> bool {
        matches!(self, GraphError::Verification { .. })
    }

    /// The node primarily involved in the error, if there is one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            GraphError::Frozen | GraphError::Cancelled | GraphError::AlreadyRegistered { .. } => {
                None
            }
            GraphError::UnknownNode(node) => Some(*node),
            GraphError::Deleted { node }
            | GraphError::NotAlive { node }
            | GraphError::SelfReplacement { node }
            | GraphError::ReplacementNotAlive { node, .. }
            | GraphError::HasUsages { node, .. }
            | GraphError::HasPredecessor { node, .. }
            | GraphError::HasEdges { node }
            | GraphError::NullRequiredEdge { node, .. }
            | GraphError::EdgeNotFound { node, .. }
            | GraphError::InvalidPosition { node, .. }
            | GraphError::Verification { node, .. } => Some(*node),
            GraphError::PredecessorConflict { successor, .. } => Some(*successor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_fail_formats_message() {
        let a = NodeId::new(3);
        let b = NodeId::new(7);
        let err = verify_fail!(a, Some(b), "missing usage of {} in input {}", a, b);
        assert!(err.is_verification());
        assert_eq!(err.node(), Some(a));
        assert_eq!(
            err.to_string(),
            "graph verification failed at #3: missing usage of #3 in input #7"
        );
    }

    #[test]
    fn test_precondition_display() {
        let err = GraphError::HasUsages {
            node: NodeId::new(1),
            count: 2,
        };
        assert!(!err.is_verification());
        assert_eq!(err.to_string(), "cannot delete node #1 because of 2 usage(s)");
        assert_eq!(GraphError::Frozen.node(), None);
    }
}
