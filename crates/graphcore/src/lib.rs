//! Core abstractions for the flow execution engine
//!
//! Graph model, node catalog, type system, execution context, adapter
//! contracts and fingerprinting. Everything here is independent of how
//! nodes are scheduled; the runtime crate builds on it.

mod adapter;
mod catalog;
mod context;
mod error;
pub mod events;
pub mod fingerprint;
mod graph;
mod node;
mod run;
pub mod typing;
mod value;
mod variables;

pub use adapter::{AdapterRegistry, DataSource, OutputDestination};
pub use catalog::{Catalog, Category, DynamicType, HandleSpec, HandleType, Handles, NodeDefinition};
pub use context::{BehaviorResolver, ExecutionContext};
pub use error::{AdapterError, FlowError, GraphError, NodeError, RegistryError};
pub use events::*;
pub use graph::{
    is_execution_handle, ConfigMap, Edge, EdgeKind, EdgeSpec, FlowDocument, Graph, Link, Node,
    NodeConfig, NodeId, Position, EXECUTION_EDGE_MARKER, EXECUTION_HANDLE_PREFIX,
};
pub use node::{
    NodeBehavior, NodeContext, NodeMetadata, NodeOutput, NodeResult, NodeValidator, Validation,
};
pub use run::{NodeFailure, RunStatus, SkipReason};
pub use value::Value;
pub use variables::VariableStore;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
