//! Structural verification.
//!
//! Two tiers:
//!
//! - **Cheap** (always): required inputs are non-null, every edge target is
//!   alive, of an accepted kind, and permits the edge's input type.
//! - **Bidirectional** (`GraphConfig::verify_edges`): usage lists match the
//!   input edges exactly, and predecessors match successor edges.
//!
//! A failure is a [`GraphError::Verification`] naming the node, the other
//! node of the broken relation, and the invariant.

use rustc_hash::FxHashSet;

use super::Graph;
use crate::error::{verify_fail, GraphResult};
use crate::node::{Node, NodeId};
use crate::progress::Polled;

impl Graph {
    /// Verify every alive node.
    ///
    /// Polls the progress signal between nodes and fails with
    /// [`GraphError::Cancelled`](crate::GraphError::Cancelled) if it fires.
    pub fn verify(&self) -> GraphResult<()> {
        for (id, _) in Polled::new(self.iter(), &self.progress) {
            self.verify_node(id)?;
        }
        self.check_progress()
    }

    /// Verify one node, including the bidirectional checks when enabled.
    pub fn verify_node(&self, id: NodeId) -> GraphResult<()> {
        let node = self.check_alive(id)?;
        self.verify_inputs(id, node)?;
        self.verify_successors(id, node)?;
        if self.config.verify_edges {
            self.verify_edges(id, node)?;
        }
        Ok(())
    }

    fn verify_target(&self, id: NodeId, target: NodeId) -> GraphResult<&Node> {
        match self.nodes.get(target) {
            Some(node) if node.is_alive() => Ok(node),
            Some(node) if node.is_deleted() => {
                Err(verify_fail!(id, Some(target), "edge target {} was deleted", target))
            }
            _ => Err(verify_fail!(id, Some(target), "edge to unknown node {}", target)),
        }
    }

    fn verify_inputs(&self, id: NodeId, node: &Node) -> GraphResult<()> {
        for position in node.input_positions() {
            let Some(slot) = position.slot_info(node) else {
                continue;
            };
            let Some(target) = position.get(node) else {
                if !slot.is_optional() {
                    return Err(verify_fail!(
                        id,
                        None,
                        "non-optional input {} cannot be null",
                        slot.name()
                    ));
                }
                continue;
            };
            let input = self.verify_target(id, target)?;
            if !slot.target().accepts(input.class()) {
                return Err(verify_fail!(
                    id,
                    Some(target),
                    "input {} does not accept {} ({})",
                    slot.name(),
                    target,
                    input.class()
                ));
            }
            if !input.class().allowed_usage_types().permits(slot.input_type()) {
                return Err(verify_fail!(
                    id,
                    Some(target),
                    "input {} of type {:?} is not allowed by {} ({})",
                    slot.name(),
                    slot.input_type(),
                    target,
                    input.class()
                ));
            }
        }
        Ok(())
    }

    fn verify_successors(&self, id: NodeId, node: &Node) -> GraphResult<()> {
        for position in node.successor_positions() {
            let (Some(slot), Some(target)) = (position.slot_info(node), position.get(node)) else {
                continue;
            };
            let successor = self.verify_target(id, target)?;
            if !slot.target().accepts(successor.class()) {
                return Err(verify_fail!(
                    id,
                    Some(target),
                    "successor {} does not accept {} ({})",
                    slot.name(),
                    target,
                    successor.class()
                ));
            }
        }
        Ok(())
    }

    fn verify_edges(&self, id: NodeId, node: &Node) -> GraphResult<()> {
        let inputs: FxHashSet<NodeId> = node.inputs().collect();
        for input in inputs {
            let edges = node.input_count_of(input);
            let entries = self.nodes[input].usages.count_of(id);
            if entries < edges {
                return Err(verify_fail!(
                    id,
                    Some(input),
                    "missing usage of {} in input {}",
                    id,
                    input
                ));
            }
            if entries > edges {
                return Err(verify_fail!(
                    id,
                    Some(input),
                    "input {} lists {} as usage {} time(s) for {} edge(s)",
                    input,
                    id,
                    entries,
                    edges
                ));
            }
        }

        for usage in node.usages() {
            let Some(user) = self.nodes.get(usage).filter(|user| user.is_alive()) else {
                return Err(verify_fail!(id, Some(usage), "usage {} is not alive", usage));
            };
            if user.input_count_of(id) == 0 {
                return Err(verify_fail!(
                    id,
                    Some(usage),
                    "missing input in usage {}",
                    usage
                ));
            }
        }

        for successor in node.successors() {
            if self.nodes[successor].predecessor != Some(id) {
                return Err(verify_fail!(
                    id,
                    Some(successor),
                    "missing predecessor in {}",
                    successor
                ));
            }
        }

        if let Some(predecessor) = node.predecessor() {
            let owners = self
                .nodes
                .get(predecessor)
                .filter(|p| p.is_alive())
                .map_or(0, |p| p.successors().filter(|&s| s == id).count());
            if owners != 1 {
                return Err(verify_fail!(
                    id,
                    Some(predecessor),
                    "predecessor {} has {} successor edge(s) to this node",
                    predecessor,
                    owners
                ));
            }
        }
        Ok(())
    }

    /// Whether [`Graph::verify`] passes.
    pub fn is_consistent(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(err) => {
                log::debug!("graph is inconsistent: {}", err);
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::error::GraphError;
    use crate::graph::tests::{debug_graph, Kinds};
    use crate::graph::Graph;
    use crate::node::{Node, NodeId};
    use crate::position::Position;
    use crate::schema::{InputType, NodeClass};
    use crate::GraphConfig;

    fn message(err: GraphError) -> String {
        match err {
            GraphError::Verification { message, .. } => message,
            other => panic!("expected verification failure, got {other}"),
        }
    }

    #[test]
    fn test_consistent_graph_verifies() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let a = kinds.constant(&mut graph, 1);
        let sum = kinds.add(&mut graph, a, a);
        kinds.neg(&mut graph, sum);
        assert!(graph.verify().is_ok());
        assert!(graph.is_consistent());
    }

    #[test]
    fn test_null_required_input_is_reported() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let neg = graph.register(Node::new(&kinds.neg, ())).unwrap();

        let err = graph.verify_node(neg).unwrap_err();
        assert_eq!(err.node(), Some(neg));
        assert_eq!(message(err), "non-optional input x cannot be null");
    }

    #[test]
    fn test_disallowed_input_type_is_reported() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let a = kinds.constant(&mut graph, 1);
        let pi = graph
            .register(Node::new(&kinds.pi, ()).with_input(0, a).with_input(1, a))
            .unwrap();

        let err = graph.verify_node(pi).unwrap_err();
        assert!(message(err).starts_with("input guard of type Guard is not allowed"));
    }

    #[test]
    fn test_target_kind_is_checked() {
        let kinds = Kinds::new();
        let after_begin = NodeClass::build("Anchored")
            .typed_input("anchor", InputType::Value, &["Begin"])
            .finish();
        let mut graph = debug_graph();
        let a = kinds.constant(&mut graph, 1);
        let node = graph
            .register(Node::new(&after_begin, ()).with_input(0, a))
            .unwrap();

        let err = graph.verify_node(node).unwrap_err();
        assert!(message(err).contains("does not accept #0 (Const)"));

        let begin = graph.register(Node::new(&kinds.begin, ())).unwrap();
        graph.set_edge(node, Position::input(0), Some(begin)).unwrap();
        graph.verify_node(node).unwrap();
    }

    #[test]
    fn test_usage_asymmetry_is_reported() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let a = kinds.constant(&mut graph, 1);
        let neg = kinds.neg(&mut graph, a);

        // Break the duality behind the graph's back.
        graph.nodes[a].usages.clear();
        let err = graph.verify_node(neg).unwrap_err();
        assert_eq!(err.node(), Some(neg));
        assert_eq!(message(err), format!("missing usage of {} in input {}", neg, a));

        graph.nodes[a].usages.push(neg);
        graph.nodes[a].usages.push(a);
        let err = graph.verify_node(a).unwrap_err();
        assert_eq!(message(err), format!("missing input in usage {}", a));
    }

    #[test]
    fn test_predecessor_asymmetry_is_reported() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let s = graph.register(Node::new(&kinds.begin, ())).unwrap();
        let p = graph
            .register(Node::new(&kinds.begin, ()).with_successor(0, s))
            .unwrap();

        graph.nodes[s].predecessor = None;
        let err = graph.verify_node(p).unwrap_err();
        assert_eq!(message(err), format!("missing predecessor in {}", s));
    }

    #[test]
    fn test_edge_checks_follow_config() {
        let kinds = Kinds::new();
        let mut graph = Graph::new(GraphConfig::release());
        let a = kinds.constant(&mut graph, 1);
        kinds.neg(&mut graph, a);

        graph.nodes[a].usages.clear();
        assert!(graph.verify().is_ok());

        graph.set_verify_edges(true);
        assert!(graph.verify().is_err());
        assert_eq!(graph.verify_node(NodeId::new(9)), Err(GraphError::UnknownNode(NodeId::new(9))));
    }
}
