use crate::{
    AdapterRegistry, NodeBehavior, NodeDefinition, NodeValidator, RegistryError, Value,
    VariableStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Resolves node types to their behaviors; implemented by the runtime's
/// capability registry.
pub trait BehaviorResolver: Send + Sync {
    fn definition(&self, node_type: &str) -> Option<NodeDefinition>;

    fn method(&self, node_type: &str) -> Result<Arc<dyn NodeBehavior>, RegistryError>;

    fn validator(&self, node_type: &str) -> Result<Arc<dyn NodeValidator>, RegistryError>;
}

/// Per-run state handed to every node behavior.
///
/// `variables` is shared by reference: cloning the context, or starting a
/// new run with the same store, does not copy it.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    pub input_values: Arc<BTreeMap<String, Value>>,
    pub variables: VariableStore,
    pub adapters: Arc<AdapterRegistry>,
    resolver: Option<Arc<dyn BehaviorResolver>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs(mut self, inputs: BTreeMap<String, Value>) -> Self {
        self.input_values = Arc::new(inputs);
        self
    }

    pub fn with_variables(mut self, variables: VariableStore) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_adapters(mut self, adapters: Arc<AdapterRegistry>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn BehaviorResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.input_values.get(name)
    }

    pub fn resolver(&self) -> Option<&Arc<dyn BehaviorResolver>> {
        self.resolver.as_ref()
    }
}
