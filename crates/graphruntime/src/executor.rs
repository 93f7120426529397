use crate::registry::CapabilityRegistry;
use chrono::Utc;
use graphcore::{
    Category, ConfigMap, EdgeSpec, EventBus, ExecutionContext, ExecutionEvent, FlowDocument,
    FlowError, Graph, GraphError, Node, NodeConfig, NodeContext, NodeDefinition, NodeError,
    NodeFailure, NodeId, NodeOutput, RunId, RunStatus, SkipReason, Value,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Input to a single flow run
#[derive(Clone, Default)]
pub struct RunRequest {
    pub nodes: Vec<Node>,
    pub edges: Vec<EdgeSpec>,
    pub configs: ConfigMap,
    pub input_data: BTreeMap<String, Value>,
    pub context: ExecutionContext,
}

impl RunRequest {
    pub fn new(nodes: Vec<Node>, edges: Vec<EdgeSpec>) -> Self {
        Self {
            nodes,
            edges,
            ..Default::default()
        }
    }

    pub fn from_document(document: FlowDocument) -> Self {
        Self {
            nodes: document.nodes,
            edges: document.edges,
            configs: document.node_config_by_node_id,
            input_data: document.input_data,
            context: ExecutionContext::default(),
        }
    }

    pub fn with_configs(mut self, configs: ConfigMap) -> Self {
        self.configs = configs;
        self
    }

    pub fn with_input_data(mut self, input_data: BTreeMap<String, Value>) -> Self {
        self.input_data = input_data;
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }
}

/// Value a run hands back to its caller
#[derive(Debug, Clone)]
pub enum FlowOutput {
    Single(NodeId, Arc<NodeOutput>),
    /// Several output nodes executed, in execution order.
    Multiple(Vec<(NodeId, Arc<NodeOutput>)>),
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub run_id: RunId,
    pub status: RunStatus,
    pub results: HashMap<NodeId, Arc<NodeOutput>>,
    /// Nodes that executed successfully, in execution order.
    pub executed_node_ids: Vec<NodeId>,
    pub skipped: Vec<(NodeId, SkipReason)>,
    pub failures: Vec<NodeFailure>,
    pub output: Option<FlowOutput>,
    pub global_variables: BTreeMap<String, Value>,
    pub duration_ms: u64,
}

impl FlowRun {
    pub fn value(&self, node_id: &str, handle: &str) -> Option<&Value> {
        self.results.get(node_id).and_then(|output| output.get(handle))
    }

    pub fn was_executed(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id)
    }

    pub fn skip_reason(&self, node_id: &str) -> Option<SkipReason> {
        self.skipped
            .iter()
            .find(|(id, _)| id == node_id)
            .map(|(_, reason)| *reason)
    }

    pub fn failure(&self, node_id: &str) -> Option<&NodeFailure> {
        self.failures.iter().find(|f| f.node_id == node_id)
    }
}

/// Result of executing one node outside a full run
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Completed(NodeOutput),
    Skipped(SkipReason),
    Failed(NodeFailure),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NodeState {
    Completed,
    Failed,
    Skipped(SkipReason),
}

/// What a data predecessor looks like to the node being scheduled
enum Upstream<'a> {
    Ready(&'a NodeOutput),
    Failed,
    Skipped(SkipReason),
    Absent,
}

enum InputProblem {
    Blocked(SkipReason),
    Missing(NodeError),
}

/// Runs flows one node at a time in dependency order
pub struct FlowExecutor {
    registry: Arc<CapabilityRegistry>,
    events: Arc<EventBus>,
}

impl FlowExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, events: Arc<EventBus>) -> Self {
        Self { registry, events }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Execute a flow and return every result it produced.
    ///
    /// Structural errors, invalid configs and missing required inputs abort
    /// before any node runs. Per-node failures are recorded in the returned
    /// [`FlowRun`] and only stop the nodes that depend on them.
    #[instrument(skip_all, fields(nodes = request.nodes.len(), edges = request.edges.len()))]
    pub async fn run_flow(&self, request: RunRequest) -> Result<FlowRun, FlowError> {
        let RunRequest {
            nodes,
            edges,
            configs,
            input_data,
            context,
        } = request;

        let graph = Graph::new(nodes, edges)?;
        let order: Vec<NodeId> = graph
            .execution_order()?
            .into_iter()
            .map(String::from)
            .collect();
        self.check_node_types(&graph)?;

        let missing = self.missing_required_inputs(&graph, &configs, &input_data);
        if !missing.is_empty() {
            tracing::warn!("Run rejected, missing required inputs: {}", missing.join(", "));
            return Err(FlowError::MissingRequiredInputs { missing });
        }
        self.validate_configs(&graph, &configs)?;

        let run_id = RunId::new_v4();
        let start = Instant::now();
        let context = context
            .with_inputs(input_data)
            .with_resolver(self.registry.clone());

        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            node_count: order.len(),
            timestamp: Utc::now(),
        });
        tracing::info!("Starting flow run {} ({} nodes)", run_id, order.len());

        let empty = NodeConfig::new();
        let mut states: HashMap<NodeId, NodeState> = HashMap::new();
        let mut results: HashMap<NodeId, Arc<NodeOutput>> = HashMap::new();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();
        let mut failures = Vec::new();

        for node_id in &order {
            // at most once per run
            if states.contains_key(node_id) {
                continue;
            }
            let Some(node) = graph.node(node_id) else {
                continue;
            };
            let definition = self.registry.get_definition(&node.node_type);
            let config = configs.get(node_id).unwrap_or(&empty);

            let gathered = match execution_gate(&graph, node_id, &states, &results) {
                Some(reason) => Err(InputProblem::Blocked(reason)),
                None => collect_inputs(&graph, node_id, definition, config, |source| {
                    match (states.get(source), results.get(source)) {
                        (Some(NodeState::Completed), Some(output)) => Upstream::Ready(output),
                        (Some(NodeState::Failed), _) => Upstream::Failed,
                        (Some(NodeState::Skipped(reason)), _) => Upstream::Skipped(*reason),
                        _ => Upstream::Absent,
                    }
                }),
            };

            let state = match gathered {
                Err(InputProblem::Blocked(reason)) => {
                    self.record_skip(run_id, node_id, reason);
                    skipped.push((node_id.clone(), reason));
                    NodeState::Skipped(reason)
                }
                Err(InputProblem::Missing(error)) => {
                    failures.push(self.record_failure(run_id, node_id, &error));
                    NodeState::Failed
                }
                Ok(inputs) => {
                    match self
                        .invoke(run_id, node, definition, config.clone(), inputs, &context)
                        .await
                    {
                        Ok(output) => {
                            results.insert(node_id.clone(), Arc::new(output));
                            executed.push(node_id.clone());
                            NodeState::Completed
                        }
                        Err(error) => {
                            failures.push(self.record_failure(run_id, node_id, &error));
                            NodeState::Failed
                        }
                    }
                }
            };
            states.insert(node_id.clone(), state);
        }

        let status = if failures.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let output = self.terminal_output(&graph, &executed, &results);
        let global_variables = context.variables.snapshot().await;

        self.events.emit(ExecutionEvent::RunCompleted {
            run_id,
            status,
            duration_ms,
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Flow run {} finished {:?} in {}ms: {} executed, {} skipped, {} failed",
            run_id,
            status,
            duration_ms,
            executed.len(),
            skipped.len(),
            failures.len()
        );

        Ok(FlowRun {
            run_id,
            status,
            results,
            executed_node_ids: executed,
            skipped,
            failures,
            output,
            global_variables,
            duration_ms,
        })
    }

    /// Execute one node against an existing result map. Execution edges are
    /// not consulted; a data predecessor without a result blocks the node.
    pub async fn execute_node(
        &self,
        run_id: RunId,
        graph: &Graph,
        node_id: &str,
        configs: &ConfigMap,
        results: &HashMap<NodeId, Arc<NodeOutput>>,
        context: &ExecutionContext,
    ) -> NodeOutcome {
        let Some(node) = graph.node(node_id) else {
            let error = NodeError::ExecutionFailed(format!("node '{}' is not in the graph", node_id));
            return NodeOutcome::Failed(self.record_failure(run_id, node_id, &error));
        };
        let definition = self.registry.get_definition(&node.node_type);
        let empty = NodeConfig::new();
        let config = configs.get(node_id).unwrap_or(&empty);

        let gathered = collect_inputs(graph, node_id, definition, config, |source| {
            results
                .get(source)
                .map_or(Upstream::Absent, |output| Upstream::Ready(output))
        });

        match gathered {
            Err(InputProblem::Blocked(reason)) => {
                self.record_skip(run_id, node_id, reason);
                NodeOutcome::Skipped(reason)
            }
            Err(InputProblem::Missing(error)) => {
                NodeOutcome::Failed(self.record_failure(run_id, node_id, &error))
            }
            Ok(inputs) => {
                let context = context.clone().with_resolver(self.registry.clone());
                match self
                    .invoke(run_id, node, definition, config.clone(), inputs, &context)
                    .await
                {
                    Ok(output) => NodeOutcome::Completed(output),
                    Err(error) => NodeOutcome::Failed(self.record_failure(run_id, node_id, &error)),
                }
            }
        }
    }

    /// Pre-execution checks that need the registry.
    fn check_node_types(&self, graph: &Graph) -> Result<(), FlowError> {
        for node in graph.nodes() {
            if self.registry.get_definition(&node.node_type).is_none() {
                return Err(GraphError::UnknownNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn validate_configs(&self, graph: &Graph, configs: &ConfigMap) -> Result<(), FlowError> {
        let empty = NodeConfig::new();
        for node in graph.nodes() {
            let validator = self.registry.validator(&node.node_type)?;
            let validation = validator.validate(configs.get(&node.id).unwrap_or(&empty));
            if !validation.valid {
                return Err(FlowError::InvalidNodeConfig {
                    node_id: node.id.clone(),
                    errors: validation.errors,
                });
            }
        }
        Ok(())
    }

    /// Names of required flow parameters absent from `input_data`.
    pub fn missing_required_inputs(
        &self,
        graph: &Graph,
        configs: &ConfigMap,
        input_data: &BTreeMap<String, Value>,
    ) -> Vec<String> {
        let empty = NodeConfig::new();
        let mut missing = Vec::new();

        for node in graph.nodes() {
            let is_input = self
                .registry
                .get_definition(&node.node_type)
                .is_some_and(|d| d.category == Category::Input);
            if !is_input {
                continue;
            }
            let config = configs.get(&node.id).unwrap_or(&empty);
            let required = config.get("required").is_some_and(Value::is_truthy);
            let has_default = config.get("default").is_some();
            let name = config
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&node.id);

            if required && !has_default && !input_data.contains_key(name) && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }
        missing
    }

    async fn invoke(
        &self,
        run_id: RunId,
        node: &Node,
        definition: Option<&NodeDefinition>,
        config: NodeConfig,
        inputs: HashMap<String, Value>,
        context: &ExecutionContext,
    ) -> Result<NodeOutput, NodeError> {
        let behavior = self.registry.method(&node.node_type)?;

        self.events.emit(ExecutionEvent::NodeStarted {
            run_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            timestamp: Utc::now(),
        });
        tracing::debug!("Executing node {} ({})", node.id, node.node_type);

        let ctx = NodeContext {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            inputs,
            config,
            context: context.clone(),
            events: self.events.create_emitter(run_id, node.id.clone()),
        };

        let start = Instant::now();
        let raw = behavior.execute(ctx).await?;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut output = NodeOutput::extract(definition, raw);
        output.metadata.execution_time_ms = duration_ms;

        tracing::info!("Node {} completed in {}ms", node.id, duration_ms);
        self.events.emit(ExecutionEvent::NodeCompleted {
            run_id,
            node_id: node.id.clone(),
            outputs: output.outputs.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(output)
    }

    fn record_skip(&self, run_id: RunId, node_id: &str, reason: SkipReason) {
        tracing::warn!("Skipping node {}: {:?}", node_id, reason);
        self.events.emit(ExecutionEvent::NodeSkipped {
            run_id,
            node_id: node_id.to_string(),
            reason,
            timestamp: Utc::now(),
        });
    }

    fn record_failure(&self, run_id: RunId, node_id: &str, error: &NodeError) -> NodeFailure {
        tracing::error!("Node {} failed: {}", node_id, error);
        self.events.emit(ExecutionEvent::NodeFailed {
            run_id,
            node_id: node_id.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        NodeFailure::from_error(node_id, error)
    }

    fn terminal_output(
        &self,
        graph: &Graph,
        executed: &[NodeId],
        results: &HashMap<NodeId, Arc<NodeOutput>>,
    ) -> Option<FlowOutput> {
        let result_of = |id: &NodeId| results.get(id).map(|output| (id.clone(), output.clone()));

        let mut outputs: Vec<(NodeId, Arc<NodeOutput>)> = executed
            .iter()
            .filter(|id| {
                graph
                    .node(id)
                    .and_then(|node| self.registry.get_definition(&node.node_type))
                    .is_some_and(NodeDefinition::is_output)
            })
            .filter_map(result_of)
            .collect();

        match outputs.len() {
            0 => executed
                .last()
                .and_then(result_of)
                .map(|(id, output)| FlowOutput::Single(id, output)),
            1 => outputs
                .pop()
                .map(|(id, output)| FlowOutput::Single(id, output)),
            _ => Some(FlowOutput::Multiple(outputs)),
        }
    }
}

/// `None` when the node may run as far as control flow is concerned.
fn execution_gate(
    graph: &Graph,
    node_id: &str,
    states: &HashMap<NodeId, NodeState>,
    results: &HashMap<NodeId, Arc<NodeOutput>>,
) -> Option<SkipReason> {
    let mut incoming = graph.execution_edges_into(node_id).peekable();
    incoming.peek()?;

    let mut reason = SkipReason::Pruned;
    for link in incoming {
        match states.get(&link.source) {
            Some(NodeState::Completed) => {
                let fired = results.get(&link.source).is_some_and(|output| {
                    match output.fired_execution_handles() {
                        None => true,
                        Some(handles) => handles.contains(&link.source_handle.as_str()),
                    }
                });
                if fired {
                    return None;
                }
            }
            Some(NodeState::Failed) | Some(NodeState::Skipped(SkipReason::UpstreamFailed)) => {
                reason = SkipReason::UpstreamFailed;
            }
            _ => {}
        }
    }
    Some(reason)
}

/// Gather data inputs for `node_id`.
///
/// A predecessor that did not complete blocks the node when it feeds a
/// required or undeclared handle. Handles still absent afterwards take the
/// catalog default; a required handle with neither a value, a default nor a
/// same-named config field is a missing input.
fn collect_inputs<'a>(
    graph: &Graph,
    node_id: &str,
    definition: Option<&NodeDefinition>,
    config: &NodeConfig,
    upstream: impl Fn(&str) -> Upstream<'a>,
) -> Result<HashMap<String, Value>, InputProblem> {
    let mut inputs = HashMap::new();
    let mut connected = HashSet::new();
    let mut blocked: Option<SkipReason> = None;

    for link in graph.data_edges_into(node_id) {
        connected.insert(link.target_handle.as_str());
        let blocking = definition
            .and_then(|d| d.input(&link.target_handle))
            .map_or(true, |spec| spec.required);

        let reason = match upstream(&link.source) {
            Upstream::Ready(output) => {
                if let Some(value) = output.get(&link.source_handle) {
                    inputs.insert(link.target_handle.clone(), value.clone());
                }
                continue;
            }
            Upstream::Failed | Upstream::Skipped(SkipReason::UpstreamFailed) => {
                SkipReason::UpstreamFailed
            }
            Upstream::Skipped(SkipReason::MissingDependencies) | Upstream::Absent => {
                SkipReason::MissingDependencies
            }
            Upstream::Skipped(_) => SkipReason::UpstreamPruned,
        };
        if blocking && blocked != Some(SkipReason::UpstreamFailed) {
            blocked = Some(reason);
        }
    }

    if let Some(reason) = blocked {
        return Err(InputProblem::Blocked(reason));
    }

    let mut missing = Vec::new();
    if let Some(definition) = definition {
        for spec in definition.handles.inputs.iter().filter(|h| !h.is_execution()) {
            if inputs.contains_key(&spec.id) {
                continue;
            }
            if let Some(default) = &spec.default {
                inputs.insert(spec.id.clone(), default.clone());
            } else if spec.required && !config.contains_key(&spec.id) {
                if connected.contains(spec.id.as_str()) {
                    missing.push(format!("{} (upstream produced no value)", spec.id));
                } else {
                    missing.push(spec.id.clone());
                }
            }
        }
    }

    if missing.is_empty() {
        Ok(inputs)
    } else {
        Err(InputProblem::Missing(NodeError::MissingInput(missing.join(", "))))
    }
}
