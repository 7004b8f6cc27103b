//! Edge writes and the usage/predecessor bookkeeping behind them.
//!
//! Every edge change funnels into [`Graph::write_edge`], which writes the slot
//! and then updates the reverse side: usage lists for inputs, predecessor
//! pointers for successors.

use smallvec::SmallVec;

use super::Graph;
use crate::error::{GraphError, GraphResult};
use crate::event::NodeEvent;
use crate::node::{EdgeValue, NodeId};
use crate::position::Position;
use crate::schema::{EdgesType, InputType};

impl Graph {
    // =========================================================================
    // Bookkeeping Primitives
    // =========================================================================

    /// Write one edge and update the reverse side. Preconditions are the caller's.
    pub(crate) fn write_edge(
        &mut self,
        owner: NodeId,
        position: Position,
        target: Option<NodeId>,
    ) -> Option<NodeId> {
        let old = self.nodes[owner]
            .edges_mut(position.edges_type())
            .set(position.slot(), position.sub_index(), target)
            .flatten();
        match position.edges_type() {
            EdgesType::Inputs => self.update_usages(owner, old, target),
            EdgesType::Successors => self.update_predecessor(owner, old, target),
        }
        old
    }

    /// Move `owner` from the usages of `old` to the usages of `new`.
    fn update_usages(&mut self, owner: NodeId, old: Option<NodeId>, new: Option<NodeId>) {
        if old == new {
            return;
        }
        self.edge_mod_count += 1;
        self.bump_node(owner);
        if let Some(old) = old {
            let removed = self.remove_usage(old, owner);
            debug_assert!(removed, "{} missing from usages of {}", owner, old);
        }
        self.notify(NodeEvent::InputChanged, owner);
        if let Some(new) = new {
            self.nodes[new].usages.push(owner);
            self.bump_usages(new);
        }
        if let Some(old) = old {
            if self.nodes[old].usages.is_empty() {
                self.notify(NodeEvent::ZeroUsages, old);
            }
        }
        self.note_inputs_changed(owner);
    }

    /// Point the predecessor of `new` at `owner` and release `old`.
    fn update_predecessor(&mut self, owner: NodeId, old: Option<NodeId>, new: Option<NodeId>) {
        if old == new {
            return;
        }
        self.edge_mod_count += 1;
        if let Some(old) = old {
            self.nodes[old].predecessor = None;
            self.notify(NodeEvent::ControlFlowChanged, old);
        }
        if let Some(new) = new {
            debug_assert!(self.nodes[new].predecessor.is_none());
            self.nodes[new].predecessor = Some(owner);
            self.notify(NodeEvent::ControlFlowChanged, new);
        }
        self.notify(NodeEvent::ControlFlowChanged, owner);
    }

    /// Remove one occurrence of `usage` from the usages of `target`.
    pub(crate) fn remove_usage(&mut self, target: NodeId, usage: NodeId) -> bool {
        let removed = self.nodes[target].usages.remove(usage);
        if removed {
            self.bump_usages(target);
        }
        removed
    }

    /// Remove up to `times` occurrences of `usage` from `target` in one pass.
    pub(crate) fn remove_usage_n_times(
        &mut self,
        target: NodeId,
        usage: NodeId,
        times: usize,
    ) -> usize {
        let removed = self.nodes[target].usages.remove_n(usage, times);
        if removed > 0 {
            self.bump_usages(target);
        }
        removed
    }

    /// Drop usage entries whose node is no longer alive.
    ///
    /// Returns how many entries were removed.
    pub fn remove_dead_usages(&mut self, id: NodeId) -> GraphResult<usize> {
        self.check_mutable()?;
        self.check_alive(id)?;
        let mut usages = self.nodes[id].usages.take();
        let removed = usages.remove_where(|usage| !self.nodes[usage].is_alive());
        self.nodes[id].usages = usages;
        if removed > 0 {
            self.bump_usages(id);
            if self.nodes[id].usages.is_empty() {
                self.notify(NodeEvent::ZeroUsages, id);
            }
            self.flush_events();
        }
        Ok(removed)
    }

    // =========================================================================
    // Checked Writes
    // =========================================================================

    /// Whether writing `target` at `position` of `owner` is legal.
    pub(crate) fn check_edge_write(
        &self,
        owner: NodeId,
        position: Position,
        target: Option<NodeId>,
    ) -> GraphResult<()> {
        let node = self.check_alive(owner)?;
        if !position.is_valid_for(node) {
            return Err(GraphError::InvalidPosition {
                node: owner,
                position: position.to_string(),
            });
        }
        let Some(target) = target else {
            if position.is_optional(node) {
                return Ok(());
            }
            return Err(GraphError::NullRequiredEdge {
                node: owner,
                slot: position.name(node),
            });
        };
        self.check_target(target)?;
        if position.edges_type() == EdgesType::Successors && position.get(node) != Some(target) {
            if let Some(existing) = self.nodes[target].predecessor {
                return Err(GraphError::PredecessorConflict {
                    successor: target,
                    existing,
                    predecessor: owner,
                });
            }
        }
        Ok(())
    }

    /// Retarget the edge at `position`, maintaining usages and predecessors.
    pub fn set_edge(
        &mut self,
        owner: NodeId,
        position: Position,
        target: Option<NodeId>,
    ) -> GraphResult<()> {
        self.check_mutable()?;
        self.check_edge_write(owner, position, target)?;
        self.write_edge(owner, position, target);
        self.flush_events();
        Ok(())
    }

    /// Replace the first input of `id` pointing at `old`.
    ///
    /// Slots are searched direct slots first, then lists. Returns `Ok(false)`
    /// and changes nothing if no input points at `old`.
    pub fn replace_first_input(
        &mut self,
        id: NodeId,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<bool> {
        self.replace_first(id, EdgesType::Inputs, old, new)
    }

    /// Like [`Graph::replace_first_input`], but a missing edge is an error.
    pub fn replace_required_input(
        &mut self,
        id: NodeId,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<()> {
        self.replace_required(id, EdgesType::Inputs, old, new)
    }

    /// Replace every input of `id` pointing at `old`. Returns how many changed.
    pub fn replace_all_inputs(
        &mut self,
        id: NodeId,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<usize> {
        self.check_mutable()?;
        let node = self.check_alive(id)?;
        let positions: SmallVec<[Position; 4]> = node
            .input_positions()
            .filter(|pos| pos.get(node) == Some(old))
            .collect();
        for &position in &positions {
            self.check_edge_write(id, position, new)?;
        }
        for &position in &positions {
            self.write_edge(id, position, new);
        }
        self.flush_events();
        Ok(positions.len())
    }

    /// Replace the first successor of `id` pointing at `old`.
    ///
    /// The predecessor of `old` is cleared and `new` gets `id` as its
    /// predecessor. Returns `Ok(false)` if no successor points at `old`.
    pub fn replace_first_successor(
        &mut self,
        id: NodeId,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<bool> {
        self.replace_first(id, EdgesType::Successors, old, new)
    }

    /// Like [`Graph::replace_first_successor`], but a missing edge is an error.
    pub fn replace_required_successor(
        &mut self,
        id: NodeId,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<()> {
        self.replace_required(id, EdgesType::Successors, old, new)
    }

    fn replace_first(
        &mut self,
        id: NodeId,
        edges: EdgesType,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<bool> {
        self.check_mutable()?;
        let node = self.check_alive(id)?;
        let Some(address) = node.edges(edges).find_first(old) else {
            return Ok(false);
        };
        let position = Position::from_address(edges, address);
        self.check_edge_write(id, position, new)?;
        self.write_edge(id, position, new);
        self.flush_events();
        Ok(true)
    }

    fn replace_required(
        &mut self,
        id: NodeId,
        edges: EdgesType,
        old: NodeId,
        new: Option<NodeId>,
    ) -> GraphResult<()> {
        if self.replace_first(id, edges, old, new)? {
            Ok(())
        } else {
            Err(GraphError::EdgeNotFound {
                node: id,
                target: old,
            })
        }
    }

    /// Append an element to an input list slot.
    pub fn append_input(
        &mut self,
        id: NodeId,
        slot: usize,
        target: Option<NodeId>,
    ) -> GraphResult<Position> {
        self.append(id, EdgesType::Inputs, slot, target)
    }

    /// Append an element to a successor list slot.
    pub fn append_successor(
        &mut self,
        id: NodeId,
        slot: usize,
        target: NodeId,
    ) -> GraphResult<Position> {
        self.append(id, EdgesType::Successors, slot, Some(target))
    }

    fn append(
        &mut self,
        id: NodeId,
        edges: EdgesType,
        slot: usize,
        target: Option<NodeId>,
    ) -> GraphResult<Position> {
        self.check_mutable()?;
        let node = self.check_alive(id)?;
        let len = match node.edges(edges).slot(slot) {
            Some(EdgeValue::List(list)) => list.len(),
            _ => {
                return Err(GraphError::InvalidPosition {
                    node: id,
                    position: Position::direct(edges, slot).to_string(),
                })
            }
        };
        // Validate against the first element of the slot; the list is not grown yet.
        let position = Position::element(edges, slot, len);
        let probe = Position::element(edges, slot, 0);
        let slot_info = probe.slot_info(node);
        match target {
            None if !slot_info.is_some_and(|s| s.is_optional()) => {
                return Err(GraphError::NullRequiredEdge {
                    node: id,
                    slot: slot_info.map_or("?", |s| s.name()),
                });
            }
            None => {}
            Some(target) => {
                self.check_target(target)?;
                if edges == EdgesType::Successors {
                    if let Some(existing) = self.nodes[target].predecessor {
                        return Err(GraphError::PredecessorConflict {
                            successor: target,
                            existing,
                            predecessor: id,
                        });
                    }
                }
            }
        }
        if let Some(EdgeValue::List(list)) = self.nodes[id].edges_mut(edges).slot_mut(slot) {
            list.push(None);
        }
        self.write_edge(id, position, target);
        self.flush_events();
        Ok(position)
    }

    // =========================================================================
    // Clearing
    // =========================================================================

    /// Null every input of `id` and empty its input lists.
    ///
    /// Required inputs are cleared too; this is the first step of deletion.
    pub fn clear_inputs(&mut self, id: NodeId) -> GraphResult<()> {
        self.check_mutable()?;
        self.check_alive(id)?;
        self.clear_inputs_unchecked(id);
        self.flush_events();
        Ok(())
    }

    pub(crate) fn clear_inputs_unchecked(&mut self, id: NodeId) {
        let mut old = self.nodes[id].inputs.clear();
        if old.is_empty() {
            return;
        }
        self.edge_mod_count += 1;
        self.bump_node(id);
        self.notify(NodeEvent::InputChanged, id);
        old.sort_unstable();
        for run in old.chunk_by(|a, b| a == b) {
            let target = run[0];
            let removed = self.remove_usage_n_times(target, id, run.len());
            debug_assert_eq!(removed, run.len());
            if self.nodes[target].usages.is_empty() {
                self.notify(NodeEvent::ZeroUsages, target);
            }
        }
        self.note_inputs_changed(id);
    }

    /// Null every successor of `id` and release their predecessor pointers.
    pub fn clear_successors(&mut self, id: NodeId) -> GraphResult<()> {
        self.check_mutable()?;
        self.check_alive(id)?;
        self.clear_successors_unchecked(id);
        self.flush_events();
        Ok(())
    }

    pub(crate) fn clear_successors_unchecked(&mut self, id: NodeId) {
        let old = self.nodes[id].successors.clear();
        if old.is_empty() {
            return;
        }
        self.edge_mod_count += 1;
        for successor in old {
            self.nodes[successor].predecessor = None;
            self.notify(NodeEvent::ControlFlowChanged, successor);
        }
        self.notify(NodeEvent::ControlFlowChanged, id);
    }

    // =========================================================================
    // Usage Queries
    // =========================================================================

    /// Number of input edges tagged `ty` that point at `id`, counted over all usages.
    pub fn count_usages_of_type(&self, id: NodeId, ty: InputType) -> usize {
        let Some(node) = self.nodes.get(id) else {
            return 0;
        };
        let mut usages: SmallVec<[NodeId; 8]> = node.usages().collect();
        usages.sort_unstable();
        usages.dedup();
        usages
            .into_iter()
            .map(|usage| {
                let user = &self.nodes[usage];
                user.input_positions()
                    .filter(|pos| pos.get(user) == Some(id) && pos.input_type(user) == ty)
                    .count()
            })
            .sum()
    }

    /// Whether some usage points at `id` through an input tagged `ty`.
    pub fn has_usages_of_type(&self, id: NodeId, ty: InputType) -> bool {
        self.nodes.get(id).is_some_and(|node| {
            node.usages()
                .any(|usage| self.nodes[usage].has_input_of_type(id, ty))
        })
    }

    /// Whether exactly one input edge tagged `ty` points at `id`.
    pub fn has_exactly_one_usage_of_type(&self, id: NodeId, ty: InputType) -> bool {
        self.count_usages_of_type(id, ty) == 1
    }
}

// =============================================================================
// Tests
// =============================================================================
