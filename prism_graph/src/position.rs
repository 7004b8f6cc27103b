//! Edge iteration and addressable edge positions.
//!
//! A [`Position`] names one edge of a node (family, slot, and element index
//! for list slots) without knowing the node's kind. Kind-agnostic passes walk
//! positions with [`Node::input_positions`] and rewrite them through
//! [`Graph::set_edge`], which keeps the usage and predecessor bookkeeping in
//! step.

use std::fmt;

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::node::{EdgeTable, EdgeValue, Node, NodeId};
use crate::schema::{EdgeSlot, EdgesType, InputType};

/// Sub-index sentinel for direct slots.
const NOT_ITERABLE: u32 = u32::MAX;

// =============================================================================
// Position
// =============================================================================

/// Opaque handle to one edge slot of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    edges: EdgesType,
    slot: u16,
    index: u32,
}

impl Position {
    /// Position of a direct input slot.
    pub const fn input(slot: usize) -> Self {
        Self::direct(EdgesType::Inputs, slot)
    }

    /// Position of one element of an input list slot.
    pub const fn input_list(slot: usize, index: usize) -> Self {
        Self::element(EdgesType::Inputs, slot, index)
    }

    /// Position of a direct successor slot.
    pub const fn successor(slot: usize) -> Self {
        Self::direct(EdgesType::Successors, slot)
    }

    /// Position of one element of a successor list slot.
    pub const fn successor_list(slot: usize, index: usize) -> Self {
        Self::element(EdgesType::Successors, slot, index)
    }

    pub(crate) const fn direct(edges: EdgesType, slot: usize) -> Self {
        Position {
            edges,
            slot: slot as u16,
            index: NOT_ITERABLE,
        }
    }

    pub(crate) const fn element(edges: EdgesType, slot: usize, index: usize) -> Self {
        Position {
            edges,
            slot: slot as u16,
            index: index as u32,
        }
    }

    pub(crate) fn from_address(edges: EdgesType, (slot, sub): (usize, Option<usize>)) -> Self {
        match sub {
            Some(index) => Self::element(edges, slot, index),
            None => Self::direct(edges, slot),
        }
    }

    #[inline]
    pub fn edges_type(&self) -> EdgesType {
        self.edges
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.edges == EdgesType::Inputs
    }

    /// Slot index within the node class.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    /// Element index for list slots, `None` for direct slots.
    #[inline]
    pub fn sub_index(&self) -> Option<usize> {
        (self.index != NOT_ITERABLE).then_some(self.index as usize)
    }

    /// Current target of the edge.
    pub fn get(&self, node: &Node) -> Option<NodeId> {
        node.edges(self.edges).get(self.slot(), self.sub_index())
    }

    /// Retarget the edge, maintaining usages and predecessors.
    ///
    /// Shorthand for [`Graph::set_edge`].
    pub fn set(&self, graph: &mut Graph, node: NodeId, target: Option<NodeId>) -> GraphResult<()> {
        graph.set_edge(node, *self, target)
    }

    /// Schema entry of the slot this position lives in.
    pub fn slot_info<'n>(&self, node: &'n Node) -> Option<&'n EdgeSlot> {
        node.class().slots(self.edges).get(self.slot())
    }

    /// Name of the slot, `"?"` if the position does not fit the node.
    pub fn name(&self, node: &Node) -> &'static str {
        self.slot_info(node).map_or("?", |slot| slot.name())
    }

    /// Declared input tag. Successor positions report `Unchecked`.
    pub fn input_type(&self, node: &Node) -> InputType {
        self.slot_info(node)
            .map_or(InputType::Unchecked, |slot| slot.input_type())
    }

    /// Whether the edge may be null.
    pub fn is_optional(&self, node: &Node) -> bool {
        self.slot_info(node).is_some_and(|slot| slot.is_optional())
    }

    /// Whether the position addresses an existing edge of `node`.
    pub fn is_valid_for(&self, node: &Node) -> bool {
        match (node.edges(self.edges).slot(self.slot()), self.sub_index()) {
            (Some(EdgeValue::Direct(_)), None) => true,
            (Some(EdgeValue::List(list)), Some(i)) => i < list.len(),
            _ => false,
        }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.edges {
            EdgesType::Inputs => "input",
            EdgesType::Successors => "successor",
        };
        match self.sub_index() {
            Some(index) => write!(f, "{}[{}][{}]", family, self.slot, index),
            None => write!(f, "{}[{}]", family, self.slot),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Non-null targets of one edge family, in slot order.
pub struct EdgeTargets<'a> {
    table: &'a EdgeTable,
    slot: usize,
    index: usize,
}

impl<'a> EdgeTargets<'a> {
    pub(crate) fn new(table: &'a EdgeTable) -> Self {
        EdgeTargets {
            table,
            slot: 0,
            index: 0,
        }
    }
}

impl Iterator for EdgeTargets<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            match self.table.slot(self.slot)? {
                EdgeValue::Direct(target) => {
                    self.slot += 1;
                    if let Some(target) = target {
                        return Some(*target);
                    }
                }
                EdgeValue::List(list) => match list.get(self.index) {
                    Some(element) => {
                        self.index += 1;
                        if let Some(target) = element {
                            return Some(*target);
                        }
                    }
                    None => {
                        self.slot += 1;
                        self.index = 0;
                    }
                },
            }
        }
    }
}

/// Every position of one edge family, null edges included.
pub struct PositionIter<'a> {
    edges: EdgesType,
    table: &'a EdgeTable,
    slot: usize,
    index: usize,
}

impl<'a> PositionIter<'a> {
    pub(crate) fn new(edges: EdgesType, table: &'a EdgeTable) -> Self {
        PositionIter {
            edges,
            table,
            slot: 0,
            index: 0,
        }
    }
}

impl Iterator for PositionIter<'_> {
    type Item = Position;

    fn next(&mut self) -> Option<Position> {
        loop {
            match self.table.slot(self.slot)? {
                EdgeValue::Direct(_) => {
                    let position = Position::direct(self.edges, self.slot);
                    self.slot += 1;
                    return Some(position);
                }
                EdgeValue::List(list) => {
                    if self.index < list.len() {
                        let position = Position::element(self.edges, self.slot, self.index);
                        self.index += 1;
                        return Some(position);
                    }
                    self.slot += 1;
                    self.index = 0;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeClass;

    fn merge_node() -> Node {
        let class = NodeClass::build("Phi")
            .input("merge", InputType::Association)
            .optional_input("state", InputType::State)
            .optional_input_list("values", InputType::Value)
            .finish();
        Node::new(&class, ())
            .with_input(0, NodeId::new(1))
            .with_list_input(2, Some(NodeId::new(2)))
            .with_list_input(2, None)
            .with_list_input(2, Some(NodeId::new(3)))
    }

    #[test]
    fn test_targets_skip_null_edges() {
        let node = merge_node();
        let targets: Vec<u32> = node.inputs().map(|id| id.index()).collect();
        assert_eq!(targets, vec![1, 2, 3]);
    }

    #[test]
    fn test_positions_include_null_edges() {
        let node = merge_node();
        let positions: Vec<Position> = node.input_positions().collect();
        assert_eq!(positions.len(), 5);
        assert_eq!(positions[1], Position::input(1));
        assert_eq!(positions[3], Position::input_list(2, 1));
        assert_eq!(positions[1].get(&node), None);
        assert_eq!(positions[4].get(&node), Some(NodeId::new(3)));
    }

    #[test]
    fn test_position_metadata() {
        let node = merge_node();
        let pos = Position::input_list(2, 0);
        assert_eq!(pos.name(&node), "values");
        assert_eq!(pos.input_type(&node), InputType::Value);
        assert!(pos.is_optional(&node));
        assert!(!Position::input(0).is_optional(&node));
        assert!(pos.is_valid_for(&node));
        assert!(!Position::input_list(2, 3).is_valid_for(&node));
        assert!(!Position::input(2).is_valid_for(&node));
        assert_eq!(format!("{:?}", pos), "input[2][0]");
        assert_eq!(format!("{}", Position::successor(0)), "successor[0]");
    }
}
