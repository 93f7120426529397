use crate::executor::{FlowExecutor, FlowRun, RunRequest};
use crate::reactive::ReactiveEngine;
use crate::registry::CapabilityRegistry;
use graphcore::{
    AdapterRegistry, EventBus, ExecutionContext, ExecutionEvent, FlowDocument, FlowError, Graph,
    VariableStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Main entry point for running flows
pub struct FlowRuntime {
    registry: Arc<CapabilityRegistry>,
    adapters: Arc<AdapterRegistry>,
    executor: Arc<FlowExecutor>,
    event_bus: Arc<EventBus>,
    variables: VariableStore,
    config: RuntimeConfig,
}

impl FlowRuntime {
    pub fn new(registry: CapabilityRegistry, adapters: AdapterRegistry) -> Self {
        Self::with_config(registry, adapters, RuntimeConfig::default())
    }

    pub fn with_config(
        registry: CapabilityRegistry,
        adapters: AdapterRegistry,
        config: RuntimeConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let executor = Arc::new(FlowExecutor::new(registry.clone(), event_bus.clone()));

        Self {
            registry,
            adapters: Arc::new(adapters),
            executor,
            event_bus,
            variables: VariableStore::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    /// Process-wide variable store shared by every run of this runtime
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Context carrying this runtime's adapters and variable store
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::new()
            .with_adapters(self.adapters.clone())
            .with_variables(self.variables.clone())
    }

    /// Run with the request's own context.
    pub async fn run_flow(&self, request: RunRequest) -> Result<FlowRun, FlowError> {
        self.executor.run_flow(request).await
    }

    /// Run a document against the runtime's shared context.
    pub async fn run_document(&self, document: FlowDocument) -> Result<FlowRun, FlowError> {
        let request = RunRequest::from_document(document).with_context(self.context());
        self.executor.run_flow(request).await
    }

    /// Reactive engine over `document`, seeded with the results of `run`
    /// when given.
    pub async fn reactive(
        &self,
        document: &FlowDocument,
        run: Option<&FlowRun>,
    ) -> Result<ReactiveEngine, FlowError> {
        let graph = Graph::from_document(document)?;
        let context = self.context().with_inputs(document.input_data.clone());
        let engine = ReactiveEngine::new(
            self.executor.clone(),
            self.event_bus.clone(),
            graph,
            document.node_config_by_node_id.clone(),
            context,
            self.config.debounce(),
        );
        if let Some(run) = run {
            engine.seed(run.results.clone()).await;
        }
        Ok(engine)
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Quiet period before a reactive flush, in milliseconds
    pub debounce_ms: u64,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            event_buffer_size: 1000,
        }
    }
}
