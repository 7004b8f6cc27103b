//! End-to-end rewrites through the public graph API.

use std::sync::Arc;

use parking_lot::Mutex;
use prism_graph::{
    CancellationToken, ChangedNodes, Graph, GraphConfig, GraphError, InputType, Node, NodeClass,
    NodeEvent, NodeEvents, NodeId, Position,
};

fn value_kinds() -> (Arc<NodeClass>, Arc<NodeClass>) {
    let leaf = NodeClass::build("Leaf").finish();
    let user = NodeClass::build("User").input("x", InputType::Value).finish();
    (leaf, user)
}

fn control_kind() -> Arc<NodeClass> {
    NodeClass::build("Control").successor("next").finish()
}

#[test]
fn test_replace_at_usages_moves_every_user() {
    let (leaf, user) = value_kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&leaf, ())).unwrap();
    let b = graph.register(Node::new(&user, ()).with_input(0, a)).unwrap();
    let c = graph.register(Node::new(&user, ()).with_input(0, a)).unwrap();

    let d = Node::new(&leaf, ());
    assert!(d.is_unregistered());
    let d = graph.register(d).unwrap();

    assert_eq!(graph.replace_at_usages(a, Some(d)).unwrap(), 2);
    assert_eq!(graph.node(b).input_at(0), Some(d));
    assert_eq!(graph.node(c).input_at(0), Some(d));
    assert!(graph.node(a).has_no_usages());
    assert_eq!(graph.node(d).usage_count(), 2);
    graph.verify().unwrap();

    graph.safe_delete(a).unwrap();
    assert!(graph.node(a).is_deleted());
    assert_eq!(graph.node(a).id_before_deletion(), Some(a));
}

#[test]
fn test_replace_at_predecessor_unlinks_successor() {
    let control = control_kind();
    let mut graph = Graph::new(GraphConfig::debug());
    let s = graph.register(Node::new(&control, ())).unwrap();
    let a = graph
        .register(Node::new(&control, ()).with_successor(0, s))
        .unwrap();
    assert_eq!(graph.node(s).predecessor(), Some(a));

    // `a` has no predecessor of its own, so nothing changes.
    graph.replace_at_predecessor(a, None).unwrap();
    assert_eq!(graph.node(a).successor_at(0), Some(s));

    graph.replace_at_predecessor(s, None).unwrap();
    assert_eq!(graph.node(s).predecessor(), None);
    assert_eq!(graph.node(a).successor_at(0), None);
    graph.verify().unwrap();

    graph.safe_delete(s).unwrap();
}

#[test]
fn test_required_retarget_reports_missing_edge() {
    let (leaf, user) = value_kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&leaf, ())).unwrap();
    let other = graph.register(Node::new(&leaf, ())).unwrap();
    let u = graph.register(Node::new(&user, ()).with_input(0, a)).unwrap();

    assert_eq!(graph.replace_first_input(u, other, Some(a)), Ok(false));
    assert_eq!(
        graph.replace_required_input(u, other, Some(a)),
        Err(GraphError::EdgeNotFound { node: u, target: other })
    );
    assert_eq!(
        graph.replace_required_input(u, a, None),
        Err(GraphError::NullRequiredEdge { node: u, slot: "x" })
    );
    assert_eq!(graph.node(u).input_at(0), Some(a));
}

#[test]
fn test_frozen_graph_rejects_mutation() {
    let (leaf, user) = value_kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&leaf, ())).unwrap();
    let b = graph.register(Node::new(&leaf, ())).unwrap();
    let u = graph.register(Node::new(&user, ()).with_input(0, a)).unwrap();
    graph.freeze();

    assert_eq!(graph.register(Node::new(&leaf, ())), Err(GraphError::Frozen));
    assert_eq!(graph.replace_at_usages(a, Some(b)), Err(GraphError::Frozen));
    assert_eq!(
        graph.set_edge(u, Position::input(0), Some(b)),
        Err(GraphError::Frozen)
    );
    assert_eq!(graph.safe_delete(b), Err(GraphError::Frozen));
    assert_eq!(graph.compress().map(|_| ()), Err(GraphError::Frozen));

    // Queries still work.
    assert_eq!(graph.node(u).input_at(0), Some(a));
    graph.verify().unwrap();
}

#[test]
fn test_listeners_see_completed_mutations() {
    let (leaf, user) = value_kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&leaf, ())).unwrap();
    let b = graph.register(Node::new(&leaf, ())).unwrap();
    let u = graph.register(Node::new(&user, ()).with_input(0, a)).unwrap();

    let zero = ChangedNodes::filtered(NodeEvents::ZERO_USAGES);
    graph.add_listener(zero.clone());

    let seen: Arc<Mutex<Vec<(NodeEvent, NodeId, usize)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let id = graph.add_listener(move |graph: &Graph, event: NodeEvent, node: NodeId| {
        sink.lock().push((event, node, graph.node(node).usage_count()));
    });

    graph.replace_at_usages(a, Some(b)).unwrap();
    assert!(zero.contains(a));
    assert!(!zero.contains(b));

    // The usage count observed by the listener is the final one.
    let log = seen.lock().clone();
    assert!(log.contains(&(NodeEvent::InputChanged, u, 0)));
    assert!(log.contains(&(NodeEvent::ZeroUsages, a, 0)));

    assert!(graph.remove_listener(id));
    seen.lock().clear();
    graph.safe_delete(u).unwrap();
    assert!(seen.lock().is_empty());
    assert!(zero.contains(b));
}

#[test]
fn test_cancelled_traversal_stops_early() {
    let (leaf, user) = value_kinds();
    let mut graph = Graph::new(GraphConfig {
        progress_poll_interval: 4,
        ..GraphConfig::debug()
    });
    let a = graph.register(Node::new(&leaf, ())).unwrap();
    for _ in 0..32 {
        graph.register(Node::new(&user, ()).with_input(0, a)).unwrap();
    }

    let token = CancellationToken::new();
    graph.set_progress_signal(Some(Arc::new(token.clone())));
    assert_eq!(graph.usages(a).count(), 32);
    graph.check_progress().unwrap();

    token.cancel();
    assert_eq!(graph.usages(a).count(), 0);
    assert_eq!(graph.check_progress(), Err(GraphError::Cancelled));
    assert_eq!(graph.inputs(a).count(), 0);

    graph.set_progress_signal(None);
    graph.check_progress().unwrap();
    assert_eq!(graph.usages(a).count(), 32);
}

#[test]
fn test_cancelled_replacement_changes_nothing() {
    let (leaf, user) = value_kinds();
    let mut graph = Graph::new(GraphConfig {
        progress_poll_interval: 2,
        ..GraphConfig::debug()
    });
    let a = graph.register(Node::new(&leaf, ())).unwrap();
    let b = graph.register(Node::new(&leaf, ())).unwrap();
    let users: Vec<NodeId> = (0..6)
        .map(|_| graph.register(Node::new(&user, ()).with_input(0, a)).unwrap())
        .collect();
    let edge_mods = graph.edge_mod_count();

    let token = CancellationToken::new();
    graph.set_progress_signal(Some(Arc::new(token.clone())));
    token.cancel();

    assert_eq!(graph.replace_at_usages(a, Some(b)), Err(GraphError::Cancelled));
    assert_eq!(graph.replace_and_delete(a, b), Err(GraphError::Cancelled));
    assert_eq!(graph.verify(), Err(GraphError::Cancelled));
    assert_eq!(graph.edge_mod_count(), edge_mods);
    assert_eq!(graph.node(a).usage_count(), 6);
    assert!(users.iter().all(|&u| graph.node(u).input_at(0) == Some(a)));

    graph.set_progress_signal(None);
    graph.replace_and_delete(a, b).unwrap();
    assert_eq!(graph.node(b).usage_count(), 6);
    graph.verify().unwrap();
}
