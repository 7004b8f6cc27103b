//! Node cloning.
//!
//! Clones are built by [`Node::clone_with`]: plain data goes through the
//! data's own copy routine and each edge family is either copied or left
//! empty. No kind-specific construction logic runs.
//!
//! Copying successors into the same graph would give every successor a
//! second predecessor, so duplicating a node with non-empty successor slots
//! under [`CloneEdges::WITH_ALL_EDGES`] fails with
//! [`GraphError::PredecessorConflict`]. Clone the node unregistered with
//! [`Graph::clone_node`] and rewire it first instead.

use rustc_hash::{FxHashMap, FxHashSet};

use super::Graph;
use crate::error::{GraphError, GraphResult};
use crate::event::NodeEvent;
use crate::node::{Node, NodeId, NodeState};
use crate::schema::CloneEdges;

impl Graph {
    /// Unregistered copy of an alive node.
    pub fn clone_node(&self, id: NodeId, edges: CloneEdges) -> GraphResult<Node> {
        Ok(self.check_alive(id)?.clone_with(edges))
    }

    /// Clone a node into this graph.
    ///
    /// Value-numberable leaf kinds are looked up in the leaf cache first, and
    /// an existing equal node is returned instead of inserting the clone.
    /// Callers must not assume a fresh id.
    pub fn duplicate(&mut self, id: NodeId, edges: CloneEdges) -> GraphResult<NodeId> {
        self.check_mutable()?;
        let copy = self.check_alive(id)?.clone_with(edges);
        self.insert_clone(copy)
    }

    /// Duplicate a node keeping its inputs but no successors.
    pub fn copy_with_inputs(&mut self, id: NodeId) -> GraphResult<NodeId> {
        self.duplicate(id, CloneEdges::WITH_ONLY_INPUT_EDGES)
    }

    /// Clone a node of this graph into another graph.
    ///
    /// Every copied edge target is translated through `map` (ids of this graph
    /// to ids of `into`). A copied edge whose target has no entry fails with
    /// [`GraphError::UnknownNode`].
    pub fn clone_into(
        &self,
        id: NodeId,
        into: &mut Graph,
        edges: CloneEdges,
        map: &FxHashMap<NodeId, NodeId>,
    ) -> GraphResult<NodeId> {
        into.check_mutable()?;
        let mut copy = self.check_alive(id)?.clone_with(edges);
        if let Some(missing) = copy
            .inputs()
            .chain(copy.successors())
            .find(|target| !map.contains_key(target))
        {
            return Err(GraphError::UnknownNode(missing));
        }
        let translate = |target: NodeId| map.get(&target).copied().unwrap_or(target);
        copy.inputs.remap(translate);
        copy.successors.remap(translate);
        into.insert_clone(copy)
    }

    fn insert_clone(&mut self, copy: Node) -> GraphResult<NodeId> {
        if copy.class().uses_leaf_cache() {
            if let Some(existing) = self.find_duplicate(&copy) {
                log::trace!("clone of {:?} resolved to cached {}", copy, existing);
                return Ok(existing);
            }
        }
        self.register(copy)
    }

    /// Duplicate a set of nodes as a unit.
    ///
    /// Edges between members of the set are redirected to the copies. Inputs
    /// pointing outside the set are kept; successors pointing outside the set
    /// are left empty on the copy. Returns the mapping from originals to
    /// copies.
    ///
    /// A value-numberable leaf member whose copy would equal an existing node
    /// maps to that node instead of being copied, as in [`Graph::duplicate`].
    pub fn duplicate_nodes(&mut self, ids: &[NodeId]) -> GraphResult<FxHashMap<NodeId, NodeId>> {
        self.check_mutable()?;
        let mut members = FxHashSet::default();
        let mut order = Vec::with_capacity(ids.len());
        for &id in ids {
            self.check_alive(id)?;
            if members.insert(id) {
                order.push(id);
            }
        }

        let mut map = self.number_leaf_members(&order, &members);
        let fresh: Vec<NodeId> = order
            .iter()
            .copied()
            .filter(|id| !map.contains_key(id))
            .collect();
        let first = self.nodes.next_id().index();
        let mut copied = FxHashSet::default();
        for (offset, &id) in fresh.iter().enumerate() {
            let copy = NodeId::new(first + offset as u32);
            map.insert(id, copy);
            copied.insert(copy);
        }

        let copies: Vec<Node> = fresh
            .iter()
            .map(|&id| {
                let mut copy = self.nodes[id].clone_with(CloneEdges::WITH_ALL_EDGES);
                copy.inputs
                    .remap(|target| map.get(&target).copied().unwrap_or(target));
                // Only fresh copies may become successors; everything else
                // already has its place in the control flow.
                for (slot, sub) in copy.successors.addresses().collect::<Vec<_>>() {
                    let mapped = copy
                        .successors
                        .get(slot, sub)
                        .and_then(|target| map.get(&target).copied())
                        .filter(|target| copied.contains(target));
                    copy.successors.set(slot, sub, mapped);
                }
                copy
            })
            .collect();

        // Allocate every copy before wiring, so edges between copies resolve.
        let mut added = Vec::with_capacity(copies.len());
        for mut copy in copies {
            let id = self.nodes.next_id();
            copy.state = NodeState::Alive(id);
            self.nodes.alloc(copy);
            self.live += 1;
            added.push(id);
        }
        if !added.is_empty() {
            self.mod_count += 1;
        }
        for &id in &added {
            let inputs: Vec<NodeId> = self.nodes[id].inputs().collect();
            for target in inputs {
                self.nodes[target].usages.push(id);
                self.bump_usages(target);
            }
            let successors: Vec<NodeId> = self.nodes[id].successors().collect();
            for target in successors {
                self.nodes[target].predecessor = Some(id);
            }
            if self.nodes[id].class().uses_leaf_cache() {
                self.put_in_cache(id);
            }
            self.notify(NodeEvent::NodeAdded, id);
        }
        log::debug!(
            "duplicated {} node(s), {} resolved by value numbering",
            added.len(),
            order.len() - added.len()
        );
        self.flush_events();
        Ok(map)
    }

    /// Map cacheable leaf members to existing equal nodes.
    ///
    /// A member qualifies once every input it takes from the set is itself
    /// mapped to an existing node; an input that will be freshly copied has
    /// no usages yet, so nothing can equal a node reading it.
    fn number_leaf_members(
        &self,
        order: &[NodeId],
        members: &FxHashSet<NodeId>,
    ) -> FxHashMap<NodeId, NodeId> {
        let mut map = FxHashMap::default();
        let mut pending: Vec<NodeId> = order
            .iter()
            .copied()
            .filter(|&id| self.nodes[id].class().uses_leaf_cache())
            .collect();
        loop {
            let before = pending.len();
            pending.retain(|&id| {
                let node = &self.nodes[id];
                if node
                    .inputs()
                    .any(|input| members.contains(&input) && !map.contains_key(&input))
                {
                    return true;
                }
                let mut copy = node.clone_with(CloneEdges::WITH_ALL_EDGES);
                copy
                    .inputs
                    .remap(|target| map.get(&target).copied().unwrap_or(target));
                match self.find_duplicate(&copy) {
                    Some(existing) => {
                        map.insert(id, existing);
                        false
                    }
                    None => true,
                }
            });
            if pending.len() == before {
                return map;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
