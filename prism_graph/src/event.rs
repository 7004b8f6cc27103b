//! Structural change notification.
//!
//! Mutations queue events while they run and the graph delivers them once the
//! operation has fully applied, so a listener never observes a half-rewired
//! graph. Events for nodes that are no longer alive at delivery are dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::graph::Graph;
use crate::node::NodeId;

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEvent {
    /// An input edge of the node was retargeted.
    InputChanged,
    /// The node gained or lost a predecessor.
    ControlFlowChanged,
    /// The node's last usage went away.
    ZeroUsages,
    /// The node was registered.
    NodeAdded,
}

impl NodeEvent {
    #[inline]
    pub const fn as_flag(self) -> NodeEvents {
        match self {
            NodeEvent::InputChanged => NodeEvents::INPUT_CHANGED,
            NodeEvent::ControlFlowChanged => NodeEvents::CONTROL_FLOW_CHANGED,
            NodeEvent::ZeroUsages => NodeEvents::ZERO_USAGES,
            NodeEvent::NodeAdded => NodeEvents::NODE_ADDED,
        }
    }
}

bitflags::bitflags! {
    /// A set of [`NodeEvent`] kinds.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeEvents: u8 {
        const INPUT_CHANGED = 1 << 0;
        const CONTROL_FLOW_CHANGED = 1 << 1;
        const ZERO_USAGES = 1 << 2;
        const NODE_ADDED = 1 << 3;
    }
}

/// Receiver of node events.
///
/// Called synchronously after the mutation that raised the event. The graph is
/// passed read-only; listeners record what changed and act on it later.
pub trait NodeEventListener: Send {
    fn event(&mut self, graph: &Graph, event: NodeEvent, node: NodeId);
}

impl<F> NodeEventListener for F
where
    F: FnMut(&Graph, NodeEvent, NodeId) + Send,
{
    fn event(&mut self, graph: &Graph, event: NodeEvent, node: NodeId) {
        self(graph, event, node)
    }
}

/// Handle returned by [`Graph::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u32);

/// Listener collecting the ids of changed nodes into a shared set.
///
/// Clones share the same set, so one clone can be installed on the graph and
/// another kept by the pass that drains it.
#[derive(Debug, Clone)]
pub struct ChangedNodes {
    filter: NodeEvents,
    nodes: Arc<Mutex<FxHashSet<NodeId>>>,
}

impl ChangedNodes {
    /// Record nodes for every event kind.
    pub fn new() -> Self {
        Self::filtered(NodeEvents::all())
    }

    /// Record nodes only for the given event kinds.
    pub fn filtered(filter: NodeEvents) -> Self {
        ChangedNodes {
            filter,
            nodes: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.lock().contains(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }

    /// Drain the collected set.
    pub fn take(&self) -> FxHashSet<NodeId> {
        std::mem::take(&mut *self.nodes.lock())
    }
}

impl Default for ChangedNodes {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeEventListener for ChangedNodes {
    fn event(&mut self, _graph: &Graph, event: NodeEvent, node: NodeId) {
        if self.filter.contains(event.as_flag()) {
            self.nodes.lock().insert(node);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;

    #[test]
    fn test_changed_nodes_filters_events() {
        let graph = Graph::new(GraphConfig::default());
        let mut listener = ChangedNodes::filtered(NodeEvents::ZERO_USAGES);
        let view = listener.clone();

        listener.event(&graph, NodeEvent::InputChanged, NodeId::new(1));
        listener.event(&graph, NodeEvent::ZeroUsages, NodeId::new(2));

        assert!(!view.contains(NodeId::new(1)));
        assert!(view.contains(NodeId::new(2)));
        assert_eq!(view.take().len(), 1);
        assert!(view.is_empty());
    }

    #[test]
    fn test_closure_listener() {
        let graph = Graph::new(GraphConfig::default());
        let mut seen = Vec::new();
        {
            let mut listener = |_: &Graph, event: NodeEvent, node: NodeId| seen.push((event, node));
            listener.event(&graph, NodeEvent::NodeAdded, NodeId::new(0));
        }
        assert_eq!(seen, vec![(NodeEvent::NodeAdded, NodeId::new(0))]);
    }
}
