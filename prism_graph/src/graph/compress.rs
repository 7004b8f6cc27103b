//! Id compaction.
//!
//! Deleted nodes keep their arena slot so ids stay stable. Compression drops
//! the tombstones and renumbers the alive nodes densely, in their old order.
//! Every id held outside the graph is invalidated; callers translate them
//! through the returned [`IdMap`].

use super::Graph;
use crate::arena::{Arena, SecondaryMap};
use crate::error::GraphResult;
use crate::node::{Node, NodeId, NodeState};

/// Old-to-new id translation produced by [`Graph::compress`].
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    new_ids: Vec<Option<NodeId>>,
}

impl IdMap {
    /// New id of a node that was alive at compression time.
    pub fn get(&self, old: NodeId) -> Option<NodeId> {
        self.new_ids.get(old.as_usize()).copied().flatten()
    }

    /// Number of slots before compression.
    pub fn len(&self) -> usize {
        self.new_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_ids.is_empty()
    }

    /// Whether no id changed.
    pub fn is_identity(&self) -> bool {
        self.new_ids
            .iter()
            .enumerate()
            .all(|(i, id)| id.is_some_and(|id| id.as_usize() == i))
    }

    #[inline]
    fn translate(&self, old: NodeId) -> NodeId {
        self.get(old).unwrap_or(old)
    }
}

impl Graph {
    /// Drop deleted slots and renumber alive nodes.
    ///
    /// Per-node modification counters restart from zero.
    pub fn compress(&mut self) -> GraphResult<IdMap> {
        self.check_mutable()?;
        let mut next = 0u32;
        let map = IdMap {
            new_ids: self
                .nodes
                .iter()
                .map(|(_, node)| {
                    node.is_alive().then(|| {
                        let id = NodeId::new(next);
                        next += 1;
                        id
                    })
                })
                .collect(),
        };
        let before = self.nodes.len();

        let nodes = std::mem::take(&mut self.nodes).into_vec();
        let mut kept: Vec<Node> = Vec::with_capacity(self.live);
        for mut node in nodes {
            let NodeState::Alive(old) = node.state else {
                continue;
            };
            node.state = NodeState::Alive(map.translate(old));
            node.inputs.remap(|id| map.translate(id));
            node.successors.remap(|id| map.translate(id));
            node.usages.remap(|id| map.translate(id));
            node.predecessor = node.predecessor.map(|id| map.translate(id));
            kept.push(node);
        }
        self.nodes = Arena::from_vec(kept);
        self.node_mod_counts = SecondaryMap::new();
        self.usage_mod_counts = SecondaryMap::new();
        self.mod_count += 1;
        self.rebuild_leaf_cache();

        log::debug!(
            "compressed graph from {} to {} slot(s)",
            before,
            self.nodes.len()
        );
        Ok(map)
    }

    /// Compress if the share of deleted slots crosses the configured threshold.
    pub fn maybe_compress(&mut self) -> GraphResult<Option<IdMap>> {
        if !self
            .config
            .should_compress(self.deleted_count(), self.nodes.len())
        {
            return Ok(None);
        }
        self.compress().map(Some)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::graph::tests::{debug_graph, Constant, Kinds};
    use crate::graph::Graph;
    use crate::node::{Node, NodeId};
    use crate::GraphConfig;

    #[test]
    fn test_compress_renumbers_and_rewires() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let dead = kinds.constant(&mut graph, 0);
        let a = kinds.constant(&mut graph, 1);
        let next = graph.register(Node::new(&kinds.begin, ())).unwrap();
        let head = graph
            .register(Node::new(&kinds.begin, ()).with_successor(0, next))
            .unwrap();
        let neg = kinds.neg(&mut graph, a);
        graph.safe_delete(dead).unwrap();

        let map = graph.compress().unwrap();
        assert_eq!(map.len(), 5);
        assert!(!map.is_identity());
        assert_eq!(map.get(dead), None);
        assert_eq!(graph.slot_count(), 4);
        assert_eq!(graph.deleted_count(), 0);

        let (a, next, head, neg) = (
            map.get(a).unwrap(),
            map.get(next).unwrap(),
            map.get(head).unwrap(),
            map.get(neg).unwrap(),
        );
        assert_eq!(a, NodeId::new(0));
        assert_eq!(graph.node(neg).input_at(0), Some(a));
        assert_eq!(graph.node(a).single_usage(), Some(neg));
        assert_eq!(graph.node(next).predecessor(), Some(head));
        assert_eq!(graph.node(neg).id(), Some(neg));
        graph.verify().unwrap();
    }

    #[test]
    fn test_compress_rebuilds_leaf_cache() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let dead = kinds.constant(&mut graph, 0);
        kinds.constant(&mut graph, 1);
        graph.safe_delete(dead).unwrap();
        assert_eq!(graph.leaf_cache_len(), 1);

        graph.compress().unwrap();
        assert_eq!(graph.leaf_cache_len(), 1);
        let again = graph
            .add_or_unique(Node::new(&kinds.constant, Constant(1)))
            .unwrap();
        assert_eq!(again, NodeId::new(0));
    }

    #[test]
    fn test_maybe_compress_threshold() {
        let kinds = Kinds::new();
        let mut graph = Graph::new(GraphConfig {
            compression_threshold_percent: 50,
            compression_min_deleted: 2,
            ..GraphConfig::debug()
        });
        let ids: Vec<_> = (0..4).map(|v| kinds.constant(&mut graph, v)).collect();

        graph.safe_delete(ids[0]).unwrap();
        assert!(graph.maybe_compress().unwrap().is_none());

        graph.safe_delete(ids[1]).unwrap();
        let map = graph.maybe_compress().unwrap().unwrap();
        assert_eq!(map.get(ids[2]), Some(NodeId::new(0)));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_compress_without_deletions_is_identity() {
        let kinds = Kinds::new();
        let mut graph = debug_graph();
        let a = kinds.constant(&mut graph, 1);
        kinds.neg(&mut graph, a);
        assert!(graph.compress().unwrap().is_identity());
    }
}
