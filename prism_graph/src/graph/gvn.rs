//! Value numbering.
//!
//! Value-numberable leaf nodes (no successors, at most two direct inputs) are
//! kept in a cache keyed by their data-flow hash. Other value-numberable
//! nodes are matched by scanning the usages of their first input, which is
//! where an equal node would have to be registered as a usage too.
//!
//! Cache entries are never trusted: a candidate is returned only if it is
//! alive and data-flow-equal to the probe. Deletion evicts a node's entry
//! right away. An entry left under an old key by an input or data change is
//! pruned when its bucket is next written, or dropped by compression.

use smallvec::SmallVec;

use super::Graph;
use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeId};

impl Graph {
    /// Record an alive cacheable node under its current hash.
    pub(crate) fn put_in_cache(&mut self, id: NodeId) {
        let key = self.nodes[id].data_flow_hash();
        let nodes = &self.nodes;
        let bucket = self.leaf_cache.entry(key).or_default();
        bucket.retain(|candidate| {
            let node = &nodes[*candidate];
            node.is_alive() && node.data_flow_hash() == key
        });
        if !bucket.contains(&id) {
            bucket.push(id);
        }
    }

    /// Drop a cacheable node from the bucket of its current hash.
    pub(crate) fn evict_from_cache(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        if !node.class().uses_leaf_cache() {
            return;
        }
        let key = node.data_flow_hash();
        if let Some(bucket) = self.leaf_cache.get_mut(&key) {
            bucket.retain(|candidate| *candidate != id);
            if bucket.is_empty() {
                self.leaf_cache.remove(&key);
            }
        }
    }

    /// Re-key a node after its inputs or data changed.
    pub(crate) fn note_inputs_changed(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        if node.is_alive() && node.class().uses_leaf_cache() {
            self.put_in_cache(id);
        }
    }

    /// Drop every cache entry and re-insert all alive cacheable nodes.
    pub(crate) fn rebuild_leaf_cache(&mut self) {
        self.leaf_cache.clear();
        let cached: Vec<NodeId> = self
            .iter()
            .filter(|(_, node)| node.class().uses_leaf_cache())
            .map(|(id, _)| id)
            .collect();
        for id in cached {
            self.put_in_cache(id);
        }
    }

    /// Number of entries in the leaf cache, stale ones included.
    pub fn leaf_cache_len(&self) -> usize {
        self.leaf_cache.values().map(|bucket| bucket.len()).sum()
    }

    fn find_in_cache(&self, probe: &Node) -> Option<NodeId> {
        let bucket = self.leaf_cache.get(&probe.data_flow_hash())?;
        bucket
            .iter()
            .copied()
            .find(|&candidate| self.is_duplicate_of(candidate, probe))
    }

    fn is_duplicate_of(&self, candidate: NodeId, probe: &Node) -> bool {
        probe.id() != Some(candidate)
            && self
                .nodes
                .get(candidate)
                .is_some_and(|node| node.is_alive() && node.data_flow_equals(probe))
    }

    /// An alive node equal to `probe` in class, data and inputs.
    ///
    /// Only value-numberable classes have duplicates. `probe` may be an
    /// unregistered node or an alive node of this graph; a node is never its
    /// own duplicate.
    pub fn find_duplicate(&self, probe: &Node) -> Option<NodeId> {
        let class = probe.class();
        if !class.is_value_numberable() {
            return None;
        }
        if class.uses_leaf_cache() {
            return self.find_in_cache(probe);
        }
        match probe.inputs().next() {
            Some(first) => {
                let users = self.nodes.get(first)?;
                let mut seen: SmallVec<[NodeId; 8]> = SmallVec::new();
                users.usages().find(|&usage| {
                    if seen.contains(&usage) {
                        return false;
                    }
                    seen.push(usage);
                    self.is_duplicate_of(usage, probe)
                })
            }
            None => self.ids().find(|&id| self.is_duplicate_of(id, probe)),
        }
    }

    /// Register `node` unless an equal node already exists.
    ///
    /// Returns the existing node or the id of the newly registered one.
    pub fn add_or_unique(&mut self, node: Node) -> GraphResult<NodeId> {
        self.check_mutable()?;
        if !node.is_unregistered() {
            return Err(GraphError::AlreadyRegistered {
                state: node.state().to_string(),
            });
        }
        if let Some(existing) = self.find_duplicate(&node) {
            log::trace!("value numbering reused {} for {:?}", existing, node);
            return Ok(existing);
        }
        self.register(node)
    }
}

// =============================================================================
// Tests
// =============================================================================
