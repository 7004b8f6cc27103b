//! Sea-of-nodes graph substrate for the Prism optimizing compiler.
//!
//! Computation and control flow are both nodes connected by typed edges. This
//! crate provides the generic machinery every node kind is built on:
//!
//! - [`NodeClass`]: the static edge schema of a node kind
//! - [`Node`]: a vertex with its data, edges, usages and predecessor
//! - [`Graph`]: the owning container, with replacement, deletion, cloning,
//!   value numbering, verification and id compression
//! - [`Position`]: a kind-agnostic handle to one edge slot
//! - [`NodeEventListener`]: notification of structural changes
//!
//! # Example
//!
//! ```ignore
//! use prism_graph::{Graph, GraphConfig, InputType, Node, NodeClass};
//!
//! let constant = NodeClass::build("Const").value_numberable().finish();
//! let neg = NodeClass::build("Neg").input("x", InputType::Value).finish();
//!
//! let mut graph = Graph::new(GraphConfig::default());
//! let one = graph.register(Node::new(&constant, 1i64))?;
//! let two = graph.register(Node::new(&constant, 2i64))?;
//! let negated = graph.register(Node::new(&neg, ()).with_input(0, one))?;
//!
//! graph.replace_at_usages(one, Some(two))?;
//! assert_eq!(graph.node(negated).input_at(0), Some(two));
//! graph.safe_delete(one)?;
//! ```

pub mod arena;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod node;
pub mod position;
pub mod progress;
pub mod schema;
pub mod usage;

pub use config::GraphConfig;
pub use error::{GraphError, GraphResult};
pub use event::{ChangedNodes, ListenerId, NodeEvent, NodeEventListener, NodeEvents};
pub use graph::{Graph, IdMap};
pub use node::{Node, NodeData, NodeId, NodeState};
pub use position::Position;
pub use progress::{CancellationToken, Deadline, ProgressSignal};
pub use schema::{
    CloneEdges, EdgeKind, EdgeSlot, EdgesType, InputType, InputTypes, NodeClass,
    NodeClassBuilder, NodeClassRegistry, TargetType,
};
