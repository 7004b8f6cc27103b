//! Edge schema: the static, per-kind description of a node's edges.
//!
//! Every node kind is described once by a [`NodeClass`] and all instances of
//! that kind share it through an `Arc`. The class tells the graph core, without
//! knowing anything about the concrete kind:
//!
//! - which edge slots exist and in which order they are searched,
//! - whether a slot is an input, an optional input or a successor,
//! - whether a slot holds one edge or a growable list of edges,
//! - which [`InputType`] an input slot carries and which node kinds it accepts,
//! - whether the kind takes part in value numbering.
//!
//! # Slot Order
//!
//! Direct (single) slots always come before list slots, each group in
//! declaration order. Every "first edge" search (`replace_first_input`,
//! `replace_first_successor`, typed usage replacement) walks slots in this
//! order, so the builder sorts slots once when the class is finished.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Maximum number of direct input slots a leaf class may declare.
pub const MAX_LEAF_INPUTS: usize = 2;

// =============================================================================
// Edge Classification
// =============================================================================

/// The two edge families a node owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgesType {
    /// Input and optional input edges (data and anchoring dependencies).
    Inputs,
    /// Successor edges (control flow).
    Successors,
}

/// Classification of a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Required input. Must be non-null while the owner is alive.
    Input,
    /// Nullable input.
    OptionalInput,
    /// Control-flow edge. The target's predecessor is the owner.
    Successor,
}

impl EdgeKind {
    /// The edge family this kind belongs to.
    #[inline]
    pub const fn edges_type(self) -> EdgesType {
        match self {
            EdgeKind::Input | EdgeKind::OptionalInput => EdgesType::Inputs,
            EdgeKind::Successor => EdgesType::Successors,
        }
    }
}

/// Whether a slot holds one edge or a list of edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Single,
    List,
}

/// Tag describing what an input edge means to its target.
///
/// A target only accepts an input whose tag is in its class's
/// [`NodeClass::allowed_usage_types`], unless the tag is `Unchecked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    /// A value produced by the target.
    Value,
    /// A frame state.
    State,
    /// A memory dependency.
    Memory,
    /// A guard the owner depends on.
    Guard,
    /// An anchoring (scheduling) dependency.
    Anchor,
    /// A loose association that carries no data.
    Association,
    /// A dependency on an extension of the target.
    Extension,
    /// A branch condition.
    Condition,
    /// Not checked against the target's allowed usage types.
    Unchecked,
}

impl InputType {
    /// The flag bit for this tag, `None` for `Unchecked`.
    pub const fn as_flag(self) -> Option<InputTypes> {
        match self {
            InputType::Value => Some(InputTypes::VALUE),
            InputType::State => Some(InputTypes::STATE),
            InputType::Memory => Some(InputTypes::MEMORY),
            InputType::Guard => Some(InputTypes::GUARD),
            InputType::Anchor => Some(InputTypes::ANCHOR),
            InputType::Association => Some(InputTypes::ASSOCIATION),
            InputType::Extension => Some(InputTypes::EXTENSION),
            InputType::Condition => Some(InputTypes::CONDITION),
            InputType::Unchecked => None,
        }
    }
}

bitflags::bitflags! {
    /// A set of [`InputType`] tags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InputTypes: u16 {
        const VALUE = 1 << 0;
        const STATE = 1 << 1;
        const MEMORY = 1 << 2;
        const GUARD = 1 << 3;
        const ANCHOR = 1 << 4;
        const ASSOCIATION = 1 << 5;
        const EXTENSION = 1 << 6;
        const CONDITION = 1 << 7;
    }
}

impl InputTypes {
    /// Whether an edge tagged `ty` may point at a node allowing `self`.
    #[inline]
    pub fn permits(self, ty: InputType) -> bool {
        match ty.as_flag() {
            Some(flag) => self.contains(flag),
            None => true,
        }
    }
}

bitflags::bitflags! {
    /// Edge families to copy when cloning a node.
    ///
    /// Families not in the set are initialized empty on the clone: `None`
    /// for direct slots, an empty list for list slots.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CloneEdges: u8 {
        const INPUTS = 1 << 0;
        const SUCCESSORS = 1 << 1;
    }
}

impl CloneEdges {
    /// Literal duplication: copy every edge.
    pub const WITH_ALL_EDGES: CloneEdges = CloneEdges::all();
    /// Duplicate a value node that will be re-attached into new control flow.
    pub const WITH_ONLY_INPUT_EDGES: CloneEdges = CloneEdges::INPUTS;

    /// Whether the given family is copied.
    #[inline]
    pub fn copies(self, edges: EdgesType) -> bool {
        match edges {
            EdgesType::Inputs => self.contains(CloneEdges::INPUTS),
            EdgesType::Successors => self.contains(CloneEdges::SUCCESSORS),
        }
    }
}

/// The node kinds a slot accepts as targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// Any node kind.
    Any,
    /// Only classes with one of these names.
    OneOf(&'static [&'static str]),
}

impl TargetType {
    /// Whether a node of class `class` is an acceptable target.
    #[inline]
    pub fn accepts(&self, class: &NodeClass) -> bool {
        match self {
            TargetType::Any => true,
            TargetType::OneOf(names) => names.contains(&class.name()),
        }
    }
}

// =============================================================================
// Edge Slot
// =============================================================================

/// Static description of one edge slot of a node class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSlot {
    name: &'static str,
    kind: EdgeKind,
    arity: Arity,
    input_type: InputType,
    target: TargetType,
}

impl EdgeSlot {
    /// Slot name, used in diagnostics.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    #[inline]
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// The input tag. Successor slots report `Unchecked`.
    #[inline]
    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    #[inline]
    pub fn target(&self) -> TargetType {
        self.target
    }

    /// Whether the slot may hold `None`.
    ///
    /// Successor slots may be transiently empty while control flow is being
    /// rewired, so only required inputs report `false`.
    #[inline]
    pub fn is_optional(&self) -> bool {
        !matches!(self.kind, EdgeKind::Input)
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        self.arity == Arity::List
    }
}

// =============================================================================
// Node Class
// =============================================================================

/// The edge schema of one node kind.
///
/// Built once by [`NodeClassBuilder`] and shared by every node of the kind.
#[derive(Debug)]
pub struct NodeClass {
    name: &'static str,
    inputs: Box<[EdgeSlot]>,
    successors: Box<[EdgeSlot]>,
    direct_inputs: usize,
    direct_successors: usize,
    allowed_usage_types: InputTypes,
    value_numberable: bool,
}

impl NodeClass {
    /// Start describing a new node kind.
    pub fn build(name: &'static str) -> NodeClassBuilder {
        NodeClassBuilder::new(name)
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Input slots: direct slots first, then list slots.
    #[inline]
    pub fn inputs(&self) -> &[EdgeSlot] {
        &self.inputs
    }

    /// Successor slots: direct slots first, then list slots.
    #[inline]
    pub fn successors(&self) -> &[EdgeSlot] {
        &self.successors
    }

    /// Slots of one edge family.
    #[inline]
    pub fn slots(&self, edges: EdgesType) -> &[EdgeSlot] {
        match edges {
            EdgesType::Inputs => &self.inputs,
            EdgesType::Successors => &self.successors,
        }
    }

    /// Number of leading direct slots in a family.
    #[inline]
    pub fn direct_count(&self, edges: EdgesType) -> usize {
        match edges {
            EdgesType::Inputs => self.direct_inputs,
            EdgesType::Successors => self.direct_successors,
        }
    }

    /// Index of the input slot with this name.
    pub fn input_slot(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    /// Index of the successor slot with this name.
    pub fn successor_slot(&self, name: &str) -> Option<usize> {
        self.successors.iter().position(|s| s.name == name)
    }

    /// Input tags other nodes may use when pointing at this kind.
    #[inline]
    pub fn allowed_usage_types(&self) -> InputTypes {
        self.allowed_usage_types
    }

    #[inline]
    pub fn is_value_numberable(&self) -> bool {
        self.value_numberable
    }

    /// No successors, no list slots, few direct inputs.
    pub fn is_leaf(&self) -> bool {
        self.successors.is_empty()
            && self.direct_inputs == self.inputs.len()
            && self.direct_inputs <= MAX_LEAF_INPUTS
    }

    /// Whether clones of this kind are deduplicated through the leaf cache.
    #[inline]
    pub fn uses_leaf_cache(&self) -> bool {
        self.value_numberable && self.is_leaf()
    }
}

impl PartialEq for NodeClass {
    /// Classes are compared by identity.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for NodeClass {}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Declarative builder for a [`NodeClass`].
///
/// ```ignore
/// let add = NodeClass::build("Add")
///     .input("x", InputType::Value)
///     .input("y", InputType::Value)
///     .value_numberable()
///     .finish();
/// ```
#[derive(Debug, Clone)]
pub struct NodeClassBuilder {
    name: &'static str,
    inputs: Vec<EdgeSlot>,
    successors: Vec<EdgeSlot>,
    allowed_usage_types: InputTypes,
    value_numberable: bool,
}

impl NodeClassBuilder {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            successors: Vec::new(),
            allowed_usage_types: InputTypes::VALUE,
            value_numberable: false,
        }
    }

    fn slot(
        mut self,
        name: &'static str,
        kind: EdgeKind,
        arity: Arity,
        input_type: InputType,
        target: TargetType,
    ) -> Self {
        let slot = EdgeSlot {
            name,
            kind,
            arity,
            input_type,
            target,
        };
        match kind.edges_type() {
            EdgesType::Inputs => self.inputs.push(slot),
            EdgesType::Successors => self.successors.push(slot),
        }
        self
    }

    /// A required single input accepting any node kind.
    pub fn input(self, name: &'static str, ty: InputType) -> Self {
        self.slot(name, EdgeKind::Input, Arity::Single, ty, TargetType::Any)
    }

    /// A required single input restricted to the given kinds.
    pub fn typed_input(
        self,
        name: &'static str,
        ty: InputType,
        kinds: &'static [&'static str],
    ) -> Self {
        self.slot(name, EdgeKind::Input, Arity::Single, ty, TargetType::OneOf(kinds))
    }

    /// A nullable single input.
    pub fn optional_input(self, name: &'static str, ty: InputType) -> Self {
        self.slot(name, EdgeKind::OptionalInput, Arity::Single, ty, TargetType::Any)
    }

    /// A list of required inputs.
    pub fn input_list(self, name: &'static str, ty: InputType) -> Self {
        self.slot(name, EdgeKind::Input, Arity::List, ty, TargetType::Any)
    }

    /// A list of inputs whose elements may be null.
    pub fn optional_input_list(self, name: &'static str, ty: InputType) -> Self {
        self.slot(name, EdgeKind::OptionalInput, Arity::List, ty, TargetType::Any)
    }

    /// A single successor.
    pub fn successor(self, name: &'static str) -> Self {
        self.slot(
            name,
            EdgeKind::Successor,
            Arity::Single,
            InputType::Unchecked,
            TargetType::Any,
        )
    }

    /// A single successor restricted to the given kinds.
    pub fn typed_successor(self, name: &'static str, kinds: &'static [&'static str]) -> Self {
        self.slot(
            name,
            EdgeKind::Successor,
            Arity::Single,
            InputType::Unchecked,
            TargetType::OneOf(kinds),
        )
    }

    /// A list of successors.
    pub fn successor_list(self, name: &'static str) -> Self {
        self.slot(
            name,
            EdgeKind::Successor,
            Arity::List,
            InputType::Unchecked,
            TargetType::Any,
        )
    }

    /// Input tags other nodes may use when pointing at this kind.
    ///
    /// Defaults to `VALUE`.
    pub fn allowed_usages(mut self, types: InputTypes) -> Self {
        self.allowed_usage_types = types;
        self
    }

    /// Mark the kind as free of identity: equal data and inputs mean equal nodes.
    pub fn value_numberable(mut self) -> Self {
        self.value_numberable = true;
        self
    }

    /// Freeze the description into a shareable class.
    pub fn finish(self) -> Arc<NodeClass> {
        let (inputs, direct_inputs) = order_slots(self.inputs);
        let (successors, direct_successors) = order_slots(self.successors);
        Arc::new(NodeClass {
            name: self.name,
            inputs,
            successors,
            direct_inputs,
            direct_successors,
            allowed_usage_types: self.allowed_usage_types,
            value_numberable: self.value_numberable,
        })
    }
}

/// Stable partition: direct slots first, then lists.
fn order_slots(slots: Vec<EdgeSlot>) -> (Box<[EdgeSlot]>, usize) {
    let (mut direct, lists): (Vec<_>, Vec<_>) = slots.into_iter().partition(|s| !s.is_list());
    let direct_count = direct.len();
    direct.extend(lists);
    (direct.into_boxed_slice(), direct_count)
}

// =============================================================================
// Registry
// =============================================================================

/// Interns node classes by name so each kind is described exactly once.
///
/// Shared between compilation threads; the graphs themselves are not.
#[derive(Debug, Default)]
pub struct NodeClassRegistry {
    classes: RwLock<FxHashMap<&'static str, Arc<NodeClass>>>,
}

impl NodeClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a class by name.
    pub fn get(&self, name: &str) -> Option<Arc<NodeClass>> {
        self.classes.read().get(name).cloned()
    }

    /// Return the class registered under `name`, building it on first request.
    pub fn get_or_build(
        &self,
        name: &'static str,
        describe: impl FnOnce(NodeClassBuilder) -> NodeClassBuilder,
    ) -> Arc<NodeClass> {
        if let Some(class) = self.classes.read().get(name) {
            return class.clone();
        }
        let mut classes = self.classes.write();
        classes
            .entry(name)
            .or_insert_with(|| describe(NodeClass::build(name)).finish())
            .clone()
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
