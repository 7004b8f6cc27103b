//! Structural invariants of the graph under mutation.

use std::sync::Arc;

use prism_graph::{
    CloneEdges, Graph, GraphConfig, GraphError, InputType, Node, NodeClass, NodeId,
};

#[derive(Debug, Clone, PartialEq, Hash)]
struct Constant(i64);

struct Kinds {
    constant: Arc<NodeClass>,
    add: Arc<NodeClass>,
    phi: Arc<NodeClass>,
    fixed: Arc<NodeClass>,
}

fn kinds() -> Kinds {
    Kinds {
        constant: NodeClass::build("Const").value_numberable().finish(),
        add: NodeClass::build("Add")
            .input("x", InputType::Value)
            .input("y", InputType::Value)
            .value_numberable()
            .finish(),
        phi: NodeClass::build("Phi")
            .optional_input_list("values", InputType::Value)
            .finish(),
        fixed: NodeClass::build("Fixed").successor("next").finish(),
    }
}

/// `u` appears in `n.usages()` exactly as often as `u` has edges to `n`.
fn assert_usage_duality(graph: &Graph) {
    for (n, node) in graph.iter() {
        for (u, user) in graph.iter() {
            let entries = node.usages().filter(|&x| x == u).count();
            assert_eq!(entries, user.input_count_of(n), "usages of {} by {}", n, u);
        }
    }
}

/// Every predecessor owns exactly one successor edge to its node, and no
/// other node does.
fn assert_predecessor_duality(graph: &Graph) {
    for (s, node) in graph.iter() {
        let owners: Vec<NodeId> = graph
            .iter()
            .filter(|(_, p)| p.successors().any(|x| x == s))
            .map(|(p, _)| p)
            .collect();
        match node.predecessor() {
            Some(p) => {
                assert_eq!(owners, vec![p], "successor edges to {}", s);
                assert_eq!(graph.node(p).successors().filter(|&x| x == s).count(), 1);
            }
            None => assert!(owners.is_empty(), "{} has owners {:?}", s, owners),
        }
    }
}

/// Small deterministic generator so the mutation sequence is reproducible.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, n: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % n
    }
}

#[test]
fn test_duality_survives_random_rewrites() {
    let k = kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let mut rng = Lcg(7);
    let mut values: Vec<NodeId> = (0..6)
        .map(|v| graph.register(Node::new(&k.constant, Constant(v))).unwrap())
        .collect();

    for step in 0..300i64 {
        let mut alive: Vec<NodeId> = values.iter().copied().filter(|&v| graph.is_alive(v)).collect();
        if alive.is_empty() {
            let fresh = graph.register(Node::new(&k.constant, Constant(step))).unwrap();
            values.push(fresh);
            alive.push(fresh);
        }
        let pick = |rng: &mut Lcg| alive[rng.below(alive.len())];
        match rng.below(6) {
            0 | 1 => {
                let (x, y) = (pick(&mut rng), pick(&mut rng));
                let node = Node::new(&k.add, ()).with_input(0, x).with_input(1, y);
                values.push(graph.add_or_unique(node).unwrap());
            }
            2 => {
                let phi = graph.register(Node::new(&k.phi, ())).unwrap();
                for _ in 0..rng.below(4) {
                    let v = pick(&mut rng);
                    graph.append_input(phi, 0, Some(v)).unwrap();
                }
                values.push(phi);
            }
            3 => {
                let (from, to) = (pick(&mut rng), pick(&mut rng));
                match graph.replace_at_usages(from, Some(to)) {
                    Ok(_) | Err(GraphError::SelfReplacement { .. }) => {}
                    Err(err) => panic!("step {}: {}", step, err),
                }
            }
            4 => {
                let victim = pick(&mut rng);
                if graph.node(victim).has_no_usages() {
                    graph.safe_delete(victim).unwrap();
                }
            }
            _ => {
                let user = pick(&mut rng);
                if let Some(first) = graph.node(user).inputs().next() {
                    let to = pick(&mut rng);
                    graph.replace_first_input(user, first, Some(to)).unwrap();
                }
            }
        }
    }

    assert_usage_duality(&graph);
    graph.verify().unwrap();

    let map = graph.compress().unwrap();
    assert_eq!(graph.deleted_count(), 0);
    assert!(map.len() >= graph.len());
    assert_usage_duality(&graph);
    graph.verify().unwrap();
}

#[test]
fn test_predecessor_duality_under_rewiring() {
    let k = kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let chain: Vec<NodeId> = (0..5)
        .map(|_| graph.register(Node::new(&k.fixed, ())).unwrap())
        .collect();
    for pair in chain.windows(2) {
        graph
            .set_edge(pair[0], prism_graph::Position::successor(0), Some(pair[1]))
            .unwrap();
    }
    assert_predecessor_duality(&graph);

    // Unlink chain[2] and splice it out.
    graph.replace_and_delete(chain[2], chain[3]).unwrap();
    assert_eq!(graph.node(chain[1]).successor_at(0), Some(chain[3]));
    assert_predecessor_duality(&graph);

    // Stealing an owned successor is rejected.
    let err = graph
        .replace_first_successor(chain[0], chain[1], Some(chain[3]))
        .unwrap_err();
    assert!(matches!(err, GraphError::PredecessorConflict { .. }));
    assert_predecessor_duality(&graph);
    graph.verify().unwrap();
}

#[test]
fn test_replacement_preserves_totals() {
    let k = kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let n = graph.register(Node::new(&k.constant, Constant(1))).unwrap();
    let r = graph.register(Node::new(&k.constant, Constant(2))).unwrap();
    graph
        .register(Node::new(&k.add, ()).with_input(0, n).with_input(1, n))
        .unwrap();
    graph
        .register(Node::new(&k.add, ()).with_input(0, r).with_input(1, n))
        .unwrap();
    let phi = graph.register(Node::new(&k.phi, ())).unwrap();
    graph.append_input(phi, 0, Some(n)).unwrap();

    let before_n = graph.node(n).usage_count();
    let before_r = graph.node(r).usage_count();
    graph.replace_at_usages(n, Some(r)).unwrap();

    assert!(graph.node(n).has_no_usages());
    assert_eq!(graph.node(r).usage_count(), before_r + before_n);
    assert_usage_duality(&graph);
}

#[test]
fn test_failed_delete_leaves_graph_unchanged() {
    let k = kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&k.constant, Constant(1))).unwrap();
    let sum = graph
        .register(Node::new(&k.add, ()).with_input(0, a).with_input(1, a))
        .unwrap();
    let next = graph.register(Node::new(&k.fixed, ())).unwrap();
    let head = graph
        .register(Node::new(&k.fixed, ()).with_successor(0, next))
        .unwrap();

    let snapshot = format!("{:?}", graph);
    let (mods, edge_mods) = (graph.mod_count(), graph.edge_mod_count());

    assert!(matches!(
        graph.safe_delete(a),
        Err(GraphError::HasUsages { count: 2, .. })
    ));
    assert!(matches!(
        graph.safe_delete(next),
        Err(GraphError::HasPredecessor { predecessor, .. }) if predecessor == head
    ));

    assert_eq!(format!("{:?}", graph), snapshot);
    assert_eq!(graph.mod_count(), mods);
    assert_eq!(graph.edge_mod_count(), edge_mods);
    assert_eq!(graph.node(a).usages().collect::<Vec<_>>(), vec![sum, sum]);
}

#[test]
fn test_clone_equivalence() {
    let k = kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&k.constant, Constant(1))).unwrap();
    let phi = graph.register(Node::new(&k.phi, ())).unwrap();
    graph.append_input(phi, 0, Some(a)).unwrap();
    graph.append_input(phi, 0, None).unwrap();

    let copy = graph.duplicate(phi, CloneEdges::WITH_ALL_EDGES).unwrap();
    assert_ne!(copy, phi);
    assert!(graph.node(copy).value_equals(graph.node(phi)));
    assert_eq!(graph.node(copy).input_list(0), graph.node(phi).input_list(0));
    assert!(graph.node(copy).data_flow_equals(graph.node(phi)));
    assert_usage_duality(&graph);
}

#[test]
fn test_gvn_idempotence() {
    let k = kinds();
    let mut graph = Graph::new(GraphConfig::debug());
    let a = graph.register(Node::new(&k.constant, Constant(1))).unwrap();
    let b = graph.register(Node::new(&k.constant, Constant(2))).unwrap();
    let sum = graph
        .register(Node::new(&k.add, ()).with_input(0, a).with_input(1, b))
        .unwrap();

    // Leaves resolve through the leaf cache, so duplicating one is a no-op.
    let first = graph.duplicate(a, CloneEdges::WITH_ALL_EDGES).unwrap();
    let second = graph.duplicate(a, CloneEdges::WITH_ONLY_INPUT_EDGES).unwrap();
    assert_eq!(first, a);
    assert_eq!(second, a);

    let again = graph
        .add_or_unique(Node::new(&k.add, ()).with_input(0, a).with_input(1, b))
        .unwrap();
    assert_eq!(again, sum);

    let c1 = graph
        .add_or_unique(Node::new(&k.constant, Constant(9)))
        .unwrap();
    let c2 = graph
        .add_or_unique(Node::new(&k.constant, Constant(9)))
        .unwrap();
    assert_eq!(c1, c2);
    assert_eq!(graph.len(), 4);
}
