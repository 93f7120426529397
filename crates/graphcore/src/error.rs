use crate::NodeId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Missing required inputs: {}", .missing.join(", "))]
    MissingRequiredInputs { missing: Vec<String> },

    #[error("Invalid configuration for node '{node_id}': {}", .errors.join("; "))]
    InvalidNodeConfig { node_id: NodeId, errors: Vec<String> },

    #[error("Node '{node_id}' failed: {source}")]
    Node {
        node_id: NodeId,
        #[source]
        source: NodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structural problems detected before any node runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    #[error("Edge '{edge_id}' references unknown {side} node '{node_id}'")]
    DanglingEdge {
        edge_id: String,
        node_id: NodeId,
        side: &'static str,
    },

    #[error("Duplicate edge {source_node}.{source_handle} -> {target_node}.{target_handle}")]
    DuplicateEdge {
        source_node: NodeId,
        source_handle: String,
        target_node: NodeId,
        target_handle: String,
    },

    #[error("Unknown node type '{node_type}' on node '{node_id}'")]
    UnknownNodeType { node_id: NodeId, node_type: String },

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("No definition for node type '{0}'")]
    DefinitionNotFound(String),

    #[error("Cannot resolve {kind} '{reference}' for node type '{node_type}': {reason}")]
    FunctionResolution {
        node_type: String,
        kind: &'static str,
        reference: String,
        reason: String,
    },
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Resolution(#[from] RegistryError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl NodeError {
    pub fn invalid_type(field: &str, expected: &str, actual: &crate::Value) -> Self {
        NodeError::InvalidInputType {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.type_name().to_string(),
        }
    }
}

/// Raised by data sources and output destinations.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("No data source registered for '{0}'")]
    SourceNotFound(String),

    #[error("No output destination registered for '{0}'")]
    DestinationNotFound(String),

    #[error("Invalid adapter configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("{adapter} fetch failed: {message}")]
    Fetch { adapter: String, message: String },

    #[error("{adapter} send failed: {message}")]
    Send { adapter: String, message: String },
}
