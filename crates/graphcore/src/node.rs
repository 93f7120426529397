use crate::{
    events::EventEmitter, is_execution_handle, ExecutionContext, NodeConfig, NodeDefinition,
    NodeError, NodeId, Value,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Executable behavior of a node type
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Run the node and return its raw result; output extraction maps it
    /// onto declared handles afterwards.
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError>;
}

/// Raw result of one behavior invocation
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// One value, bound whole to the first declared data output
    Value(Value),
    /// Values keyed by output handle id, `exec-*` handles included
    Handles(BTreeMap<String, Value>),
}

impl NodeResult {
    pub fn handles<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        NodeResult::Handles(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Value> for NodeResult {
    fn from(value: Value) -> Self {
        NodeResult::Value(value)
    }
}

/// Config validation for a node type
pub trait NodeValidator: Send + Sync {
    fn validate(&self, config: &NodeConfig) -> Validation;
}

impl<F> NodeValidator for F
where
    F: Fn(&NodeConfig) -> Validation + Send + Sync,
{
    fn validate(&self, config: &NodeConfig) -> Validation {
        self(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Everything a behavior sees for one invocation
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,
    pub node_type: String,

    /// Input values gathered from data predecessors
    pub inputs: HashMap<String, Value>,

    /// Static configuration for this node
    pub config: NodeConfig,

    /// Run-wide context: input values, variables, adapters, resolver
    pub context: ExecutionContext,

    pub events: EventEmitter,
}

impl NodeContext {
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    pub fn require_config(&self, name: &str) -> Result<&Value, NodeError> {
        self.config
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing config: {}", name)))
    }

    pub fn config_str(&self, name: &str) -> Result<&str, NodeError> {
        let value = self.require_config(name)?;
        value
            .as_str()
            .ok_or_else(|| NodeError::Configuration(format!("'{}' must be a string", name)))
    }

    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }

    /// Input handle value if connected, otherwise the config field of the
    /// same name.
    pub fn input_or_config(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name).or_else(|| self.config.get(name))
    }
}

/// Extracted result of one node execution, keyed by output handle id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub outputs: BTreeMap<String, Value>,
    pub metadata: NodeMetadata,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, handle: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(handle.into(), value.into());
        self
    }

    pub fn get(&self, handle: &str) -> Option<&Value> {
        self.outputs.get(handle)
    }

    /// Map a raw behavior result onto output handles.
    ///
    /// `Handles` is taken as given. A `Value` binds whole, objects included,
    /// to the first declared data output (`"output"` when none is declared).
    pub fn extract(definition: Option<&NodeDefinition>, raw: NodeResult) -> Self {
        let outputs = match raw {
            NodeResult::Handles(handles) => handles,
            NodeResult::Value(value) => {
                let handle = definition
                    .and_then(|d| d.data_outputs().next())
                    .map(|h| h.id.clone())
                    .unwrap_or_else(|| "output".to_string());
                BTreeMap::from([(handle, value)])
            }
        };

        Self {
            outputs,
            metadata: NodeMetadata::default(),
        }
    }

    /// `exec-*` handles that fired, or `None` when the node reported no
    /// control-flow outputs at all.
    pub fn fired_execution_handles(&self) -> Option<Vec<&str>> {
        let mut any = false;
        let fired: Vec<&str> = self
            .outputs
            .iter()
            .filter(|(k, _)| is_execution_handle(k))
            .inspect(|_| any = true)
            .filter(|(_, v)| v.is_truthy())
            .map(|(k, _)| k.as_str())
            .collect();
        any.then_some(fired)
    }
}

/// Metadata about node execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub execution_time_ms: u64,
}
