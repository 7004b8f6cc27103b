//! Sea-of-nodes graph container.
//!
//! The graph provides:
//! - **Arena-based storage**: Nodes live in one slot arena addressed by `NodeId`
//! - **Usage/predecessor bookkeeping**: Every edge write updates the reverse maps
//! - **Value numbering**: A leaf cache deduplicates value-numberable leaf nodes
//! - **Freezing**: A finalized graph rejects every further mutation
//! - **Change notification**: Listeners observe structural changes after the fact
//!
//! # Mutation Protocol
//!
//! Alive nodes are only reachable through `&Node`; every edge change goes
//! through a `Graph` method. Each method checks all of its preconditions
//! first, then writes edges, then delivers queued events. A method that
//! returns `Err` has not touched the graph.
//!
//! The methods are grouped by concern:
//!
//! - [`edges`]: single-edge writes and usage bookkeeping
//! - [`replace`]: usage-directed replacement and deletion
//! - [`clone`]: cloning and copying
//! - [`gvn`]: value numbering
//! - [`verify`]: structural checks
//! - [`compress`]: id compaction

mod clone;
mod compress;
mod edges;
mod gvn;
mod replace;
mod verify;

pub use compress::IdMap;

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::arena::{Arena, SecondaryMap};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::event::{ListenerId, NodeEvent, NodeEventListener};
use crate::node::{Node, NodeData, NodeId, NodeState};
use crate::position::EdgeTargets;
use crate::progress::{Polled, ProgressMonitor, ProgressSignal};
use crate::usage::UsageIter;

/// Leaf cache bucket: candidates sharing one data-flow hash.
type CacheBucket = SmallVec<[NodeId; 2]>;

// =============================================================================
// Graph Structure
// =============================================================================

/// A sea-of-nodes graph.
///
/// Owns every node registered into it and keeps the usage lists and
/// predecessor pointers consistent with the edges.
pub struct Graph {
    /// Node storage. Deleted nodes stay as tombstones until compression.
    nodes: Arena<Node>,
    config: GraphConfig,
    frozen: bool,
    /// Number of alive nodes.
    live: usize,
    mod_count: u64,
    edge_mod_count: u64,
    node_mod_counts: SecondaryMap<Node, u32>,
    usage_mod_counts: SecondaryMap<Node, u32>,
    leaf_cache: FxHashMap<u64, CacheBucket>,
    listeners: Vec<(ListenerId, Box<dyn NodeEventListener>)>,
    next_listener: u32,
    pending_events: Vec<(NodeEvent, NodeId)>,
    progress: ProgressMonitor,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(config: GraphConfig) -> Self {
        Graph {
            nodes: Arena::with_capacity(config.initial_capacity),
            progress: ProgressMonitor::new(config.progress_poll_interval),
            config,
            frozen: false,
            live: 0,
            mod_count: 0,
            edge_mod_count: 0,
            node_mod_counts: SecondaryMap::new(),
            usage_mod_counts: SecondaryMap::new(),
            leaf_cache: FxHashMap::default(),
            listeners: Vec::new(),
            next_listener: 0,
            pending_events: Vec::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Toggle the bidirectional edge checks run by verification.
    pub fn set_verify_edges(&mut self, enabled: bool) {
        self.config.verify_edges = enabled;
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    /// Get a node by id, whatever its state.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a slot of this graph.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Get a node by id, if the slot exists.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether `id` names an alive node of this graph.
    #[inline]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::is_alive)
    }

    /// Number of alive nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots, tombstones included.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of tombstones left by deleted nodes.
    #[inline]
    pub fn deleted_count(&self) -> usize {
        self.nodes.len() - self.live
    }

    /// Iterate over alive nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().filter(|(_, node)| node.is_alive())
    }

    /// Iterate over alive node ids.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Mutate the plain data of an alive node.
    ///
    /// Returns `Ok(None)` if the node's data is not a `T`.
    pub fn data_mut<T: NodeData, R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut T) -> R,
    ) -> GraphResult<Option<R>> {
        self.check_mutable()?;
        self.check_alive(id)?;
        let Some(data) = self.nodes[id].data_as_mut::<T>() else {
            return Ok(None);
        };
        let result = f(data);
        self.bump_node(id);
        self.note_inputs_changed(id);
        Ok(Some(result))
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Usages of a node, polling the progress signal.
    ///
    /// Stops early once the signal fires; see [`Graph::check_progress`].
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a slot of this graph.
    pub fn usages(&self, id: NodeId) -> Polled<'_, UsageIter<'_>> {
        Polled::new(self.nodes[id].usages(), &self.progress)
    }

    /// Non-null inputs of a node, polling the progress signal.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a slot of this graph.
    pub fn inputs(&self, id: NodeId) -> Polled<'_, EdgeTargets<'_>> {
        Polled::new(self.nodes[id].inputs(), &self.progress)
    }

    /// Non-null successors of a node, polling the progress signal.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a slot of this graph.
    pub fn successors(&self, id: NodeId) -> Polled<'_, EdgeTargets<'_>> {
        Polled::new(self.nodes[id].successors(), &self.progress)
    }

    /// Install (or remove) the signal polled by traversals.
    ///
    /// Resets the aborted state.
    pub fn set_progress_signal(&mut self, signal: Option<Arc<dyn ProgressSignal>>) {
        self.progress.install(signal);
    }

    /// `Err(Cancelled)` once any traversal has been cut short.
    pub fn check_progress(&self) -> GraphResult<()> {
        if self.progress.is_tripped() {
            Err(GraphError::Cancelled)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Add an unregistered node to the graph.
    ///
    /// Assigns the next id, adds the node to the usage list of every input
    /// target and becomes the predecessor of every successor target.
    pub fn register(&mut self, node: Node) -> GraphResult<NodeId> {
        self.check_mutable()?;
        if !node.is_unregistered() {
            return Err(GraphError::AlreadyRegistered {
                state: node.state().to_string(),
            });
        }
        for target in node.inputs() {
            self.check_target(target)?;
        }
        let id = self.nodes.next_id();
        let mut seen = FxHashSet::default();
        for target in node.successors() {
            self.check_target(target)?;
            let existing = self.nodes[target].predecessor.or_else(|| {
                (!seen.insert(target)).then_some(id)
            });
            if let Some(existing) = existing {
                return Err(GraphError::PredecessorConflict {
                    successor: target,
                    existing,
                    predecessor: id,
                });
            }
        }
        Ok(self.register_unchecked(node))
    }

    /// Registration without precondition checks.
    pub(crate) fn register_unchecked(&mut self, mut node: Node) -> NodeId {
        let id = self.nodes.next_id();
        node.state = NodeState::Alive(id);
        let inputs: SmallVec<[NodeId; 4]> = node.inputs().collect();
        let successors: SmallVec<[NodeId; 4]> = node.successors().collect();
        let cached = node.class().uses_leaf_cache();
        self.nodes.alloc(node);
        self.live += 1;
        self.mod_count += 1;

        for target in inputs {
            self.nodes[target].usages.push(id);
            self.bump_usages(target);
        }
        for target in successors {
            self.nodes[target].predecessor = Some(id);
        }
        if cached {
            self.put_in_cache(id);
        }
        log::trace!("registered {:?}", self.nodes[id]);
        self.notify(NodeEvent::NodeAdded, id);
        self.flush_events();
        id
    }

    // =========================================================================
    // Freezing
    // =========================================================================

    /// Forbid every further mutation.
    pub fn freeze(&mut self) {
        if !self.frozen {
            log::debug!("freezing graph with {} node(s)", self.live);
        }
        self.frozen = true;
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    // =========================================================================
    // Modification Counters
    // =========================================================================

    /// Bumped on every registration, deletion and compression.
    #[inline]
    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    /// Bumped on every edge write.
    #[inline]
    pub fn edge_mod_count(&self) -> u64 {
        self.edge_mod_count
    }

    /// Number of input changes of a node, when tracking is enabled.
    pub fn node_mod_count(&self, id: NodeId) -> u32 {
        self.node_mod_counts.get_or_default(id)
    }

    /// Number of usage list changes of a node, when tracking is enabled.
    pub fn usage_mod_count(&self, id: NodeId) -> u32 {
        self.usage_mod_counts.get_or_default(id)
    }

    pub(crate) fn bump_node(&mut self, id: NodeId) {
        if self.config.track_node_mod_counts {
            *self.node_mod_counts.entry(id) += 1;
        }
    }

    pub(crate) fn bump_usages(&mut self, id: NodeId) {
        if self.config.track_node_mod_counts {
            *self.usage_mod_counts.entry(id) += 1;
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Install a listener. Events are delivered after each mutation completes.
    pub fn add_listener(&mut self, listener: impl NodeEventListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        log::debug!("added node event listener {:?}", id);
        id
    }

    /// Uninstall a listener. Returns false if it was not installed.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        let removed = self.listeners.len() != before;
        if removed {
            log::debug!("removed node event listener {:?}", id);
        }
        removed
    }

    #[inline]
    pub(crate) fn notify(&mut self, event: NodeEvent, node: NodeId) {
        if !self.listeners.is_empty() {
            self.pending_events.push((event, node));
        }
    }

    /// Deliver queued events to every listener, skipping nodes no longer alive.
    pub(crate) fn flush_events(&mut self) {
        if self.pending_events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending_events);
        let mut listeners = std::mem::take(&mut self.listeners);
        for (event, node) in events {
            if !self.is_alive(node) {
                continue;
            }
            for (_, listener) in listeners.iter_mut() {
                listener.event(self, event, node);
            }
        }
        self.listeners = listeners;
    }

    // =========================================================================
    // Precondition Checks
    // =========================================================================

    #[inline]
    pub(crate) fn check_mutable(&self) -> GraphResult<()> {
        if self.frozen {
            Err(GraphError::Frozen)
        } else {
            Ok(())
        }
    }

    /// The node, if it is alive.
    pub(crate) fn check_alive(&self, id: NodeId) -> GraphResult<&Node> {
        let node = self.nodes.get(id).ok_or(GraphError::UnknownNode(id))?;
        match node.state {
            NodeState::Alive(_) => Ok(node),
            NodeState::Deleted(_) => Err(GraphError::Deleted { node: id }),
            NodeState::Unregistered => Err(GraphError::NotAlive { node: id }),
        }
    }

    /// An edge target must be an alive node of this graph.
    #[inline]
    pub(crate) fn check_target(&self, target: NodeId) -> GraphResult<()> {
        self.check_alive(target).map(|_| ())
    }

    /// Shared checks for every replacement of `id` by `replacement`.
    pub(crate) fn check_replace_with(
        &self,
        id: NodeId,
        replacement: Option<NodeId>,
    ) -> GraphResult<()> {
        self.check_mutable()?;
        self.check_alive(id)?;
        let Some(replacement) = replacement else {
            return Ok(());
        };
        if replacement == id {
            return Err(GraphError::SelfReplacement { node: id });
        }
        match self.nodes.get(replacement) {
            None => Err(GraphError::UnknownNode(replacement)),
            Some(node) if node.is_alive() => Ok(()),
            Some(_) => Err(GraphError::ReplacementNotAlive { node: id, replacement }),
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Graph ({} nodes, {} deleted{}):",
            self.live,
            self.deleted_count(),
            if self.frozen { ", frozen" } else { "" }
        )?;
        for (_, node) in self.iter() {
            writeln!(f, "  {:?}", node)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
