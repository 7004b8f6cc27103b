//! Usage-directed replacement and deletion.
//!
//! Replacement works in two steps. First every edge to retarget is collected
//! and checked (a `None` replacement is only legal for optional slots), then
//! the edges are written. Usage lists are therefore never iterated while they
//! shrink, and a rejected replacement leaves the graph untouched. The planning
//! walk polls the progress signal and fails with `Cancelled` if it fires.

use rustc_hash::FxHashSet;

use super::Graph;
use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeId, NodeState};
use crate::position::Position;
use crate::progress::Polled;
use crate::schema::{EdgesType, InputTypes};

/// Edges selected for retargeting: (usage, position of its edge).
type Plan = Vec<(NodeId, Position)>;

impl Graph {
    // =========================================================================
    // Replacement at Usages
    // =========================================================================

    /// Retarget every edge pointing at `id` to `replacement`.
    ///
    /// Afterwards `id` has no usages. Returns how many edges were moved.
    pub fn replace_at_usages(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
    ) -> GraphResult<usize> {
        self.replace_usages_where(id, replacement, |_| true, None)
    }

    /// Retarget the edges of the usages accepted by `filter`.
    pub fn replace_at_matching_usages(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
        filter: impl FnMut(&Node) -> bool,
    ) -> GraphResult<usize> {
        self.replace_usages_where(id, replacement, filter, None)
    }

    /// Retarget only the edges whose declared input type is one of `types`.
    ///
    /// A usage may keep other edges to `id` of a different type. `Unchecked`
    /// edges never match.
    pub fn replace_at_usages_of_type(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
        types: InputTypes,
    ) -> GraphResult<usize> {
        self.replace_usages_where(id, replacement, |_| true, Some(types))
    }

    /// Combination of [`Graph::replace_at_matching_usages`] and
    /// [`Graph::replace_at_usages_of_type`].
    pub fn replace_at_matching_usages_of_type(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
        filter: impl FnMut(&Node) -> bool,
        types: InputTypes,
    ) -> GraphResult<usize> {
        self.replace_usages_where(id, replacement, filter, Some(types))
    }

    fn replace_usages_where(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
        mut filter: impl FnMut(&Node) -> bool,
        types: Option<InputTypes>,
    ) -> GraphResult<usize> {
        self.check_replace_with(id, replacement)?;
        let plan = self.plan_usage_replacement(id, replacement, &mut filter, types)?;
        let moved = self.apply_plan(id, replacement, &plan);
        self.flush_events();
        Ok(moved)
    }

    /// Collect the edges to retarget, in usage list order.
    fn plan_usage_replacement(
        &self,
        id: NodeId,
        replacement: Option<NodeId>,
        filter: &mut dyn FnMut(&Node) -> bool,
        types: Option<InputTypes>,
    ) -> GraphResult<Plan> {
        let mut plan = Plan::new();
        let mut visited = FxHashSet::default();
        for usage in Polled::new(self.nodes[id].usages(), &self.progress) {
            if !visited.insert(usage) {
                continue;
            }
            let user = &self.nodes[usage];
            if !filter(user) {
                continue;
            }
            for position in user.input_positions() {
                if position.get(user) != Some(id) {
                    continue;
                }
                if let Some(types) = types {
                    let matches = position
                        .input_type(user)
                        .as_flag()
                        .is_some_and(|flag| types.contains(flag));
                    if !matches {
                        continue;
                    }
                }
                if replacement.is_none() && !position.is_optional(user) {
                    return Err(GraphError::NullRequiredEdge {
                        node: usage,
                        slot: position.name(user),
                    });
                }
                plan.push((usage, position));
            }
        }
        // A partial plan would leave some usages behind.
        self.check_progress()?;
        Ok(plan)
    }

    fn apply_plan(&mut self, id: NodeId, replacement: Option<NodeId>, plan: &Plan) -> usize {
        for &(usage, position) in plan {
            self.write_edge(usage, position, replacement);
        }
        if !plan.is_empty() {
            log::trace!(
                "replaced {} with {:?} at {} edge(s)",
                id,
                replacement,
                plan.len()
            );
        }
        plan.len()
    }

    // =========================================================================
    // Replacement at Predecessor
    // =========================================================================

    /// Point the successor edge of `id`'s predecessor at `replacement`.
    ///
    /// Afterwards `id` has no predecessor. A no-op if it had none.
    pub fn replace_at_predecessor(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
    ) -> GraphResult<()> {
        self.check_replace_with(id, replacement)?;
        self.check_predecessor_free(id, replacement, None)?;
        self.replace_at_predecessor_unchecked(id, replacement)?;
        self.flush_events();
        Ok(())
    }

    /// `replacement` may take over `id`'s predecessor only if it has none,
    /// or if its predecessor is `released` (an edge about to be cleared).
    fn check_predecessor_free(
        &self,
        id: NodeId,
        replacement: Option<NodeId>,
        released: Option<NodeId>,
    ) -> GraphResult<()> {
        let (Some(predecessor), Some(replacement)) = (self.nodes[id].predecessor, replacement)
        else {
            return Ok(());
        };
        match self.nodes[replacement].predecessor {
            Some(existing) if Some(existing) != released => Err(GraphError::PredecessorConflict {
                successor: replacement,
                existing,
                predecessor,
            }),
            _ => Ok(()),
        }
    }

    fn replace_at_predecessor_unchecked(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
    ) -> GraphResult<()> {
        let Some(predecessor) = self.nodes[id].predecessor else {
            return Ok(());
        };
        let address = self.nodes[predecessor]
            .successors
            .find_first(id)
            .ok_or(GraphError::EdgeNotFound {
                node: predecessor,
                target: id,
            })?;
        self.write_edge(
            predecessor,
            Position::from_address(EdgesType::Successors, address),
            replacement,
        );
        Ok(())
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Replace `id` everywhere by `replacement`, then delete it.
    ///
    /// Usages and the predecessor edge move to `replacement`. If `replacement`
    /// is a successor of `id`, that edge is released first so the replacement
    /// can take over `id`'s place in the control flow.
    pub fn replace_and_delete(&mut self, id: NodeId, replacement: NodeId) -> GraphResult<()> {
        self.check_replace_with(id, Some(replacement))?;
        self.check_predecessor_free(id, Some(replacement), Some(id))?;
        let plan = self.plan_usage_replacement(id, Some(replacement), &mut |_: &Node| true, None)?;

        self.clear_successors_unchecked(id);
        self.apply_plan(id, Some(replacement), &plan);
        self.replace_at_predecessor_unchecked(id, Some(replacement))?;
        self.delete_unchecked(id);
        self.flush_events();
        Ok(())
    }

    /// Replace every usage of `id` by `replacement`, then delete it.
    ///
    /// `id` must not have a predecessor.
    pub fn replace_at_usages_and_delete(
        &mut self,
        id: NodeId,
        replacement: Option<NodeId>,
    ) -> GraphResult<()> {
        self.check_replace_with(id, replacement)?;
        if let Some(predecessor) = self.nodes[id].predecessor {
            return Err(GraphError::HasPredecessor {
                node: id,
                predecessor,
            });
        }
        let plan = self.plan_usage_replacement(id, replacement, &mut |_: &Node| true, None)?;
        self.apply_plan(id, replacement, &plan);
        self.delete_unchecked(id);
        self.flush_events();
        Ok(())
    }

    /// Clear the edges of an unused node and delete it.
    ///
    /// The caller must already have removed every usage and the predecessor.
    pub fn safe_delete(&mut self, id: NodeId) -> GraphResult<()> {
        self.check_mutable()?;
        self.check_deletable(id)?;
        self.delete_unchecked(id);
        self.flush_events();
        Ok(())
    }

    /// Delete a node whose edges, usages and predecessor are all gone.
    pub fn mark_deleted(&mut self, id: NodeId) -> GraphResult<()> {
        self.check_mutable()?;
        let node = self.check_deletable(id)?;
        if !node.inputs.is_clear() || !node.successors.is_clear() {
            return Err(GraphError::HasEdges { node: id });
        }
        self.mark_deleted_unchecked(id);
        self.flush_events();
        Ok(())
    }

    fn check_deletable(&self, id: NodeId) -> GraphResult<&Node> {
        let node = self.check_alive(id)?;
        if node.has_usages() {
            return Err(GraphError::HasUsages {
                node: id,
                count: node.usage_count(),
            });
        }
        if let Some(predecessor) = node.predecessor {
            return Err(GraphError::HasPredecessor {
                node: id,
                predecessor,
            });
        }
        Ok(node)
    }

    fn delete_unchecked(&mut self, id: NodeId) {
        self.evict_from_cache(id);
        self.clear_inputs_unchecked(id);
        self.clear_successors_unchecked(id);
        self.mark_deleted_unchecked(id);
    }

    fn mark_deleted_unchecked(&mut self, id: NodeId) {
        self.evict_from_cache(id);
        self.nodes[id].state = NodeState::Deleted(id);
        self.live -= 1;
        self.mod_count += 1;
        log::trace!("deleted {}", id);
    }
}

// =============================================================================
// Tests
// =============================================================================
