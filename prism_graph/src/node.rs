//! Graph vertices.
//!
//! A [`Node`] owns its plain data, its edges (laid out by its
//! [`NodeClass`]), its usage list and its predecessor pointer.
//!
//! # Lifecycle
//!
//! ```text
//! Unregistered --register--> Alive --delete--> Deleted
//! ```
//!
//! Unregistered nodes are ordinary owned values. Their edges may be set
//! directly because no other node knows about them yet. Registering moves the
//! node into a [`Graph`](crate::Graph), which wires its edges into the usage
//! and predecessor bookkeeping of the targets. From then on the graph is the
//! only way to change its edges. A deleted node keeps its slot as a tombstone
//! until the graph is compressed; its id is never handed out again before that.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::arena::Id;
use crate::position::{EdgeTargets, Position, PositionIter};
use crate::schema::{CloneEdges, EdgeSlot, EdgesType, InputType, NodeClass};
use crate::usage::{UsageIter, UsageList};

// =============================================================================
// Identity
// =============================================================================

/// Identifier of a node slot in its graph.
///
/// Stable while the node is alive and the graph is not compressed.
pub type NodeId = Id<Node>;

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Not yet part of any graph.
    Unregistered,
    /// Registered and participating in its graph.
    Alive(NodeId),
    /// Removed from its graph. Holds the id the node had while alive.
    Deleted(NodeId),
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Unregistered => f.write_str("unregistered"),
            NodeState::Alive(id) => write!(f, "alive {}", id),
            NodeState::Deleted(id) => write!(f, "deleted (was {})", id),
        }
    }
}

// =============================================================================
// Node Data
// =============================================================================

/// Plain (non-edge) data of a node kind.
///
/// Implemented for every `Clone + PartialEq + Hash + Debug` type, so node
/// kinds just pick a data struct (or `()` when they have none).
pub trait NodeData: Any + fmt::Debug + Send + Sync {
    /// Field-by-field copy used by cloning.
    fn clone_data(&self) -> Box<dyn NodeData>;

    /// Value comparison. Data of different concrete types is never equal.
    fn data_eq(&self, other: &dyn NodeData) -> bool;

    /// Hash consistent with [`NodeData::data_eq`].
    fn data_hash(&self) -> u64;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T> NodeData for T
where
    T: Any + Clone + PartialEq + Hash + fmt::Debug + Send + Sync,
{
    fn clone_data(&self) -> Box<dyn NodeData> {
        Box::new(self.clone())
    }

    fn data_eq(&self, other: &dyn NodeData) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn data_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// =============================================================================
// Edge Storage
// =============================================================================

/// Inline capacity of an edge list before it spills to the heap.
const INLINE_LIST_EDGES: usize = 4;

/// List storage for a list slot.
pub type EdgeList = SmallVec<[Option<NodeId>; INLINE_LIST_EDGES]>;

/// Value of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum EdgeValue {
    Direct(Option<NodeId>),
    List(EdgeList),
}

impl EdgeValue {
    fn empty_for(slot: &EdgeSlot) -> Self {
        if slot.is_list() {
            EdgeValue::List(EdgeList::new())
        } else {
            EdgeValue::Direct(None)
        }
    }
}

/// All slots of one edge family, in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct EdgeTable {
    slots: Box<[EdgeValue]>,
}

impl EdgeTable {
    pub(crate) fn empty(slots: &[EdgeSlot]) -> Self {
        EdgeTable {
            slots: slots.iter().map(EdgeValue::empty_for).collect(),
        }
    }

    #[inline]
    pub(crate) fn slot(&self, slot: usize) -> Option<&EdgeValue> {
        self.slots.get(slot)
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut EdgeValue> {
        self.slots.get_mut(slot)
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Read the edge at a (slot, sub-index) pair. Direct slots ignore `sub`.
    pub(crate) fn get(&self, slot: usize, sub: Option<usize>) -> Option<NodeId> {
        match (self.slots.get(slot)?, sub) {
            (EdgeValue::Direct(target), None) => *target,
            (EdgeValue::List(list), Some(i)) => list.get(i).copied().flatten(),
            _ => None,
        }
    }

    /// Overwrite the edge at a (slot, sub-index) pair, returning the old value.
    ///
    /// Returns `None` (and writes nothing) if the address does not exist.
    pub(crate) fn set(
        &mut self,
        slot: usize,
        sub: Option<usize>,
        value: Option<NodeId>,
    ) -> Option<Option<NodeId>> {
        match (self.slots.get_mut(slot)?, sub) {
            (EdgeValue::Direct(target), None) => Some(std::mem::replace(target, value)),
            (EdgeValue::List(list), Some(i)) => {
                list.get_mut(i).map(|edge| std::mem::replace(edge, value))
            }
            _ => None,
        }
    }

    /// Address of the first edge pointing at `target`, direct slots first.
    pub(crate) fn find_first(&self, target: NodeId) -> Option<(usize, Option<usize>)> {
        self.addresses()
            .find(|&(slot, sub)| self.get(slot, sub) == Some(target))
    }

    /// Every edge address in search order, null edges included.
    pub(crate) fn addresses(&self) -> impl Iterator<Item = (usize, Option<usize>)> + '_ {
        self.slots.iter().enumerate().flat_map(|(slot, value)| {
            let (direct, len) = match value {
                EdgeValue::Direct(_) => (true, 1),
                EdgeValue::List(list) => (false, list.len()),
            };
            (0..len).map(move |i| (slot, if direct { None } else { Some(i) }))
        })
    }

    /// Every non-null target in search order.
    pub(crate) fn targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().flat_map(|value| {
            let (direct, list): (Option<NodeId>, &[Option<NodeId>]) = match value {
                EdgeValue::Direct(target) => (*target, &[]),
                EdgeValue::List(list) => (None, list.as_slice()),
            };
            direct.into_iter().chain(list.iter().flatten().copied())
        })
    }

    /// Number of non-null edges pointing at `target`.
    pub(crate) fn count_of(&self, target: NodeId) -> usize {
        self.targets().filter(|&t| t == target).count()
    }

    /// Whether no edge is set.
    pub(crate) fn is_clear(&self) -> bool {
        self.targets().next().is_none()
    }

    /// Null every direct slot and empty every list, returning the old targets.
    pub(crate) fn clear(&mut self) -> Vec<NodeId> {
        let old: Vec<NodeId> = self.targets().collect();
        for value in self.slots.iter_mut() {
            match value {
                EdgeValue::Direct(target) => *target = None,
                EdgeValue::List(list) => list.clear(),
            }
        }
        old
    }

    /// Rewrite every non-null target through `map`.
    pub(crate) fn remap(&mut self, mut map: impl FnMut(NodeId) -> NodeId) {
        for value in self.slots.iter_mut() {
            match value {
                EdgeValue::Direct(target) => {
                    if let Some(t) = target {
                        *t = map(*t);
                    }
                }
                EdgeValue::List(list) => {
                    for t in list.iter_mut().flatten() {
                        *t = map(*t);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// A vertex of the sea-of-nodes graph.
pub struct Node {
    class: Arc<NodeClass>,
    data: Box<dyn NodeData>,
    pub(crate) inputs: EdgeTable,
    pub(crate) successors: EdgeTable,
    pub(crate) usages: UsageList,
    pub(crate) predecessor: Option<NodeId>,
    pub(crate) state: NodeState,
}

impl Node {
    /// Create an unregistered node with all edges empty.
    pub fn new(class: &Arc<NodeClass>, data: impl NodeData) -> Self {
        Self::from_parts(class.clone(), Box::new(data))
    }

    fn from_parts(class: Arc<NodeClass>, data: Box<dyn NodeData>) -> Self {
        Node {
            inputs: EdgeTable::empty(class.inputs()),
            successors: EdgeTable::empty(class.successors()),
            class,
            data,
            usages: UsageList::new(),
            predecessor: None,
            state: NodeState::Unregistered,
        }
    }

    // =========================================================================
    // Direct Edge Setup (unregistered nodes only)
    // =========================================================================

    /// Set a direct input slot.
    ///
    /// Only unregistered nodes are ever owned by callers, so no bookkeeping
    /// is needed; registration wires the edge.
    pub fn with_input(mut self, slot: usize, target: NodeId) -> Self {
        self.set_direct(EdgesType::Inputs, slot, Some(target));
        self
    }

    /// Append to an input list slot.
    pub fn with_list_input(mut self, slot: usize, target: Option<NodeId>) -> Self {
        self.push_list(EdgesType::Inputs, slot, target);
        self
    }

    /// Fill an input list slot.
    pub fn with_inputs(mut self, slot: usize, targets: impl IntoIterator<Item = NodeId>) -> Self {
        for target in targets {
            self.push_list(EdgesType::Inputs, slot, Some(target));
        }
        self
    }

    /// Set a direct successor slot.
    pub fn with_successor(mut self, slot: usize, target: NodeId) -> Self {
        self.set_direct(EdgesType::Successors, slot, Some(target));
        self
    }

    /// Fill a successor list slot.
    pub fn with_successors(
        mut self,
        slot: usize,
        targets: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        for target in targets {
            self.push_list(EdgesType::Successors, slot, Some(target));
        }
        self
    }

    /// Set a direct slot of an unregistered node to any value, including `None`.
    pub fn set_edge(&mut self, position: Position, target: Option<NodeId>) -> bool {
        self.edges_mut(position.edges_type())
            .set(position.slot(), position.sub_index(), target)
            .is_some()
    }

    fn set_direct(&mut self, edges: EdgesType, slot: usize, target: Option<NodeId>) {
        if let Some(EdgeValue::Direct(value)) = self.edges_mut(edges).slot_mut(slot) {
            *value = target;
        }
    }

    fn push_list(&mut self, edges: EdgesType, slot: usize, target: Option<NodeId>) {
        if let Some(EdgeValue::List(list)) = self.edges_mut(edges).slot_mut(slot) {
            list.push(target);
        }
    }

    #[inline]
    pub(crate) fn edges(&self, edges: EdgesType) -> &EdgeTable {
        match edges {
            EdgesType::Inputs => &self.inputs,
            EdgesType::Successors => &self.successors,
        }
    }

    #[inline]
    pub(crate) fn edges_mut(&mut self, edges: EdgesType) -> &mut EdgeTable {
        match edges {
            EdgesType::Inputs => &mut self.inputs,
            EdgesType::Successors => &mut self.successors,
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// The node's id while it is alive.
    #[inline]
    pub fn id(&self) -> Option<NodeId> {
        match self.state {
            NodeState::Alive(id) => Some(id),
            _ => None,
        }
    }

    /// The id the node had before it was deleted.
    #[inline]
    pub fn id_before_deletion(&self) -> Option<NodeId> {
        match self.state {
            NodeState::Deleted(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        matches!(self.state, NodeState::Alive(_))
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        matches!(self.state, NodeState::Deleted(_))
    }

    #[inline]
    pub fn is_unregistered(&self) -> bool {
        matches!(self.state, NodeState::Unregistered)
    }

    // =========================================================================
    // Schema & Data
    // =========================================================================

    #[inline]
    pub fn class(&self) -> &Arc<NodeClass> {
        &self.class
    }

    #[inline]
    pub fn data(&self) -> &dyn NodeData {
        self.data.as_ref()
    }

    /// Downcast the plain data to its concrete type.
    pub fn data_as<T: NodeData>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    pub(crate) fn data_as_mut<T: NodeData>(&mut self) -> Option<&mut T> {
        self.data.as_any_mut().downcast_mut::<T>()
    }

    /// Whether the plain data of `self` and `other` are equal.
    ///
    /// Nodes of different classes never compare equal.
    pub fn value_equals(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.class, &other.class) && self.data.data_eq(other.data.as_ref())
    }

    /// Equal class, equal data and identical inputs; successors are ignored.
    pub fn data_flow_equals(&self, other: &Node) -> bool {
        self.value_equals(other) && self.inputs == other.inputs
    }

    /// Hash consistent with [`Node::data_flow_equals`].
    pub(crate) fn data_flow_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        (Arc::as_ptr(&self.class) as usize).hash(&mut hasher);
        self.data.data_hash().hash(&mut hasher);
        self.inputs.hash(&mut hasher);
        hasher.finish()
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Non-null input targets in schema order.
    pub fn inputs(&self) -> EdgeTargets<'_> {
        EdgeTargets::new(&self.inputs)
    }

    /// Non-null successor targets in schema order.
    pub fn successors(&self) -> EdgeTargets<'_> {
        EdgeTargets::new(&self.successors)
    }

    /// Every input position, null edges included.
    pub fn input_positions(&self) -> PositionIter<'_> {
        PositionIter::new(EdgesType::Inputs, &self.inputs)
    }

    /// Every successor position, null edges included.
    pub fn successor_positions(&self) -> PositionIter<'_> {
        PositionIter::new(EdgesType::Successors, &self.successors)
    }

    /// Target of a direct input slot.
    pub fn input_at(&self, slot: usize) -> Option<NodeId> {
        self.inputs.get(slot, None)
    }

    /// Elements of an input list slot.
    pub fn input_list(&self, slot: usize) -> &[Option<NodeId>] {
        match self.inputs.slot(slot) {
            Some(EdgeValue::List(list)) => list.as_slice(),
            _ => &[],
        }
    }

    /// Target of a direct successor slot.
    pub fn successor_at(&self, slot: usize) -> Option<NodeId> {
        self.successors.get(slot, None)
    }

    /// Elements of a successor list slot.
    pub fn successor_list(&self, slot: usize) -> &[Option<NodeId>] {
        match self.successors.slot(slot) {
            Some(EdgeValue::List(list)) => list.as_slice(),
            _ => &[],
        }
    }

    /// Number of input edges (of any tag) pointing at `target`.
    pub fn input_count_of(&self, target: NodeId) -> usize {
        self.inputs.count_of(target)
    }

    /// Whether some input of tag `ty` points at `target`.
    pub fn has_input_of_type(&self, target: NodeId, ty: InputType) -> bool {
        self.input_positions()
            .any(|pos| pos.input_type(self) == ty && pos.get(self) == Some(target))
    }

    // =========================================================================
    // Usages & Predecessor
    // =========================================================================

    /// Nodes using this one, one entry per edge.
    #[inline]
    pub fn usages(&self) -> UsageIter<'_> {
        self.usages.iter()
    }

    #[inline]
    pub fn usage_count(&self) -> usize {
        self.usages.len()
    }

    #[inline]
    pub fn has_usages(&self) -> bool {
        !self.usages.is_empty()
    }

    #[inline]
    pub fn has_no_usages(&self) -> bool {
        self.usages.is_empty()
    }

    #[inline]
    pub fn has_more_than_one_usage(&self) -> bool {
        self.usages.get(1).is_some()
    }

    #[inline]
    pub fn has_exactly_one_usage(&self) -> bool {
        self.usages.len() == 1
    }

    /// The only usage, if there is exactly one.
    pub fn single_usage(&self) -> Option<NodeId> {
        if self.has_exactly_one_usage() {
            self.usages.first()
        } else {
            None
        }
    }

    /// The node whose successor edge points here.
    #[inline]
    pub fn predecessor(&self) -> Option<NodeId> {
        self.predecessor
    }

    // =========================================================================
    // Cloning
    // =========================================================================

    /// Build an unregistered copy of this node.
    ///
    /// Plain data is copied through the data's own copy routine. Each edge
    /// family is copied if selected by `edges`, otherwise initialized empty.
    /// Usages and predecessor always start empty.
    pub fn clone_with(&self, edges: CloneEdges) -> Node {
        let mut copy = Node::from_parts(self.class.clone(), self.data.clone_data());
        if edges.copies(EdgesType::Inputs) {
            copy.inputs = self.inputs.clone();
        }
        if edges.copies(EdgesType::Successors) {
            copy.successors = self.successors.clone();
        }
        copy
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            NodeState::Alive(id) => write!(f, "{:?} ", id)?,
            NodeState::Deleted(id) => write!(f, "{:?}(deleted) ", id)?,
            NodeState::Unregistered => write!(f, "#? ")?,
        }
        write!(f, "{} {:?}", self.class.name(), self.data)?;
        let inputs: Vec<NodeId> = self.inputs().collect();
        if !inputs.is_empty() {
            write!(f, " {:?}", inputs)?;
        }
        let successors: Vec<NodeId> = self.successors().collect();
        if !successors.is_empty() {
            write!(f, " -> {:?}", successors)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
