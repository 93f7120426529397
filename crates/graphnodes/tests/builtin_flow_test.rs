use async_trait::async_trait;
use graphcore::typing::{HandlePosition, TypeResolver};
use graphcore::{
    AdapterRegistry, Catalog, Category, FlowDocument, FlowError, Graph, HandleSpec, Node,
    NodeBehavior, NodeConfig, NodeContext, NodeDefinition, NodeError, NodeResult, RunStatus,
    SkipReason, Value,
};
use graphnodes::adapters::{MemoryDestination, StaticDataSource};
use graphruntime::{CapabilityRegistry, CatalogSource, FlowOutput, FlowRuntime, NodeModule};
use std::sync::Arc;

fn config(json: &str) -> NodeConfig {
    serde_json::from_str(json).unwrap()
}

fn runtime_with(adapters: AdapterRegistry) -> FlowRuntime {
    let mut registry = CapabilityRegistry::new();
    graphnodes::register_all(&mut registry);
    FlowRuntime::new(registry, adapters)
}

fn runtime() -> FlowRuntime {
    runtime_with(graphnodes::default_adapters())
}

/// connector -> filter -> aggregate -> conditional, with a `set` on each
/// branch and an unconnected `get` declared last.
fn event_branching(threshold: i32) -> FlowDocument {
    let mut doc = FlowDocument::new("events");
    doc.add_node(
        Node::new("source", "connector"),
        config(
            r#"{"sourceType": "static", "records": [
                {"eventName": "x", "n": 1},
                {"eventName": "y", "n": 2},
                {"eventName": "x", "n": 3}
            ]}"#,
        ),
    );
    doc.add_node(
        Node::new("only_x", "filter"),
        config(r#"{"field": "eventName", "operator": "==", "value": "x"}"#),
    );
    doc.add_node(Node::new("count", "aggregate"), config(r#"{"operation": "count"}"#));
    doc.add_node(
        Node::new("check", "conditional"),
        config(&format!(r#"{{"operator": ">", "compareTo": {}}}"#, threshold)),
    );
    doc.add_node(
        Node::new("set_many", "variable"),
        config(r#"{"name": "outcome", "operation": "set", "value": "many"}"#),
    );
    doc.add_node(
        Node::new("set_few", "variable"),
        config(r#"{"name": "outcome", "operation": "set", "value": "few"}"#),
    );
    doc.add_node(
        Node::new("read", "variable"),
        config(r#"{"name": "outcome", "operation": "get"}"#),
    );

    doc.connect("source", "data", "only_x", "data");
    doc.connect("only_x", "data", "count", "data");
    doc.connect("count", "result", "check", "value");
    doc.connect_execution("check", "exec-out-true", "set_many", "exec-in");
    doc.connect_execution("check", "exec-out-false", "set_few", "exec-in");
    doc
}

#[tokio::test]
async fn test_only_matching_branch_sets_variable() {
    let runtime = runtime();
    let run = runtime.run_document(event_branching(1)).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.value("count", "result"), Some(&Value::from(2)));
    assert_eq!(run.value("check", "result"), Some(&Value::Bool(true)));
    assert!(run.was_executed("set_many"));
    assert_eq!(run.skip_reason("set_few"), Some(SkipReason::Pruned));
    assert_eq!(run.value("read", "value"), Some(&Value::from("many")));
    assert_eq!(run.global_variables.get("outcome"), Some(&Value::from("many")));

    let runtime = self::runtime();
    let run = runtime.run_document(event_branching(5)).await.unwrap();
    assert!(!run.was_executed("set_many"));
    assert_eq!(run.value("read", "value"), Some(&Value::from("few")));
}

#[tokio::test]
async fn test_variables_persist_across_runs_of_one_runtime() {
    let runtime = runtime();
    runtime.run_document(event_branching(1)).await.unwrap();

    let mut reader = FlowDocument::new("reader");
    reader.add_node(
        Node::new("read", "variable"),
        config(r#"{"name": "outcome", "operation": "get"}"#),
    );
    reader.add_node(
        Node::new("bump", "variable"),
        config(r#"{"name": "runs", "operation": "increment"}"#),
    );

    let run = runtime.run_document(reader.clone()).await.unwrap();
    assert_eq!(run.value("read", "value"), Some(&Value::from("many")));
    assert_eq!(run.value("bump", "value"), Some(&Value::from(1)));

    let run = runtime.run_document(reader).await.unwrap();
    assert_eq!(run.value("bump", "value"), Some(&Value::from(2)));
}

#[tokio::test]
async fn test_scenario_a_with_builtin_nodes() {
    let runtime = runtime();
    let mut doc = FlowDocument::new("sum");
    doc.add_node(Node::new("A", "math.add"), config(r#"{"a": 7, "b": 3}"#));
    doc.add_node(Node::new("B", "output"), config("{}"));
    doc.connect("A", "result", "B", "value");

    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.executed_node_ids, vec!["A", "B"]);
    match run.output {
        Some(FlowOutput::Single(id, output)) => {
            assert_eq!(id, "B");
            assert_eq!(output.get("value"), Some(&Value::from(10)));
        }
        other => panic!("unexpected output {:?}", other),
    }
}

#[tokio::test]
async fn test_required_parameter_reported_up_front() {
    let runtime = runtime();
    let mut doc = FlowDocument::new("params");
    doc.add_node(
        Node::new("limit", "input"),
        config(r#"{"name": "limit", "required": true, "valueType": "number"}"#),
    );
    doc.add_node(Node::new("sum", "math.add"), config(r#"{"b": 1}"#));
    doc.connect("limit", "value", "sum", "a");

    match runtime.run_document(doc.clone()).await {
        Err(FlowError::MissingRequiredInputs { missing }) => assert_eq!(missing, vec!["limit"]),
        other => panic!("expected missing inputs, got {:?}", other.map(|r| r.status)),
    }

    doc.input_data.insert("limit".into(), Value::from(41));
    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.value("sum", "result"), Some(&Value::from(42)));
}

#[tokio::test]
async fn test_object_parameter_reaches_output_whole() {
    let runtime = runtime();
    let mut doc = FlowDocument::new("passthrough");
    doc.add_node(Node::new("in", "input"), config(r#"{"name": "p"}"#));
    doc.add_node(Node::new("out", "output"), config("{}"));
    doc.connect("in", "value", "out", "value");
    let payload: Value = serde_json::from_str(r#"{"value": 1, "extra": 2}"#).unwrap();
    doc.input_data.insert("p".into(), payload.clone());

    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.value("in", "value"), Some(&payload));
    assert_eq!(run.value("out", "value"), Some(&payload));
}

#[tokio::test]
async fn test_unnamed_input_binds_by_node_id() {
    let runtime = runtime();
    let mut doc = FlowDocument::new("unnamed");
    doc.add_node(Node::new("limit", "input"), config(r#"{"required": true}"#));
    doc.add_node(Node::new("sum", "math.add"), config(r#"{"b": 1}"#));
    doc.connect("limit", "value", "sum", "a");

    match runtime.run_document(doc.clone()).await {
        Err(FlowError::MissingRequiredInputs { missing }) => assert_eq!(missing, vec!["limit"]),
        other => panic!("expected missing inputs, got {:?}", other.map(|r| r.status)),
    }

    doc.input_data.insert("limit".into(), Value::from(9));
    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.value("sum", "result"), Some(&Value::from(10)));
}

#[tokio::test]
async fn test_missing_inputs_reported_before_config_errors() {
    let runtime = runtime();
    let mut doc = FlowDocument::new("both");
    doc.add_node(
        Node::new("limit", "input"),
        config(r#"{"name": "limit", "required": true}"#),
    );
    doc.add_node(Node::new("agg", "aggregate"), config(r#"{"operation": "sum"}"#));
    doc.connect("limit", "value", "agg", "data");

    match runtime.run_document(doc).await {
        Err(FlowError::MissingRequiredInputs { missing }) => assert_eq!(missing, vec!["limit"]),
        other => panic!("expected missing inputs, got {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn test_destination_receives_payload() {
    let memory = MemoryDestination::new();
    let mut adapters = AdapterRegistry::new();
    adapters.register_data_source(
        "static",
        Arc::new(StaticDataSource::with_records(vec![Value::from(1), Value::from(2)])),
    );
    adapters.register_output_destination("memory", Arc::new(memory.clone()));
    let runtime = runtime_with(adapters);

    let mut doc = FlowDocument::new("deliver");
    doc.add_node(Node::new("src", "connector"), config(r#"{"sourceType": "static"}"#));
    doc.add_node(Node::new("sink", "destination"), config(r#"{"destinationType": "memory"}"#));
    doc.connect("src", "data", "sink", "data");

    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        memory.sent().await,
        vec![Value::Array(vec![Value::from(1), Value::from(2)])]
    );
    let receipt = run.value("sink", "result").unwrap();
    assert_eq!(receipt.get("delivered"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn test_adapter_error_surfaces_as_node_failure() {
    let runtime = runtime_with(AdapterRegistry::new());
    let mut doc = FlowDocument::new("no-adapter");
    doc.add_node(Node::new("src", "connector"), config(r#"{"sourceType": "warehouse"}"#));
    doc.add_node(Node::new("unrelated", "math.add"), config(r#"{"a": 1, "b": 1}"#));

    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    let failure = run.failure("src").unwrap();
    assert_eq!(failure.message, "No data source registered for 'warehouse'");
    assert!(run.was_executed("unrelated"));
}

#[tokio::test]
async fn test_invalid_builtin_config_is_rejected() {
    let runtime = runtime();
    let mut doc = FlowDocument::new("bad");
    doc.add_node(Node::new("agg", "aggregate"), config(r#"{"operation": "sum"}"#));

    match runtime.run_document(doc).await {
        Err(FlowError::InvalidNodeConfig { node_id, errors }) => {
            assert_eq!(node_id, "agg");
            assert_eq!(errors, vec!["'sum' needs a 'field'"]);
        }
        other => panic!("expected invalid config, got {:?}", other.map(|r| r.status)),
    }
}

struct CannedConnector;

#[async_trait]
impl NodeBehavior for CannedConnector {
    async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Ok(Value::Array(vec![Value::from("local")]).into())
    }
}

#[tokio::test]
async fn test_override_replaces_one_builtin() {
    let mut registry = CapabilityRegistry::new();
    graphnodes::register_all(&mut registry);
    registry.register_override(
        CatalogSource::new(
            "local",
            Catalog::new().with(
                NodeDefinition::new("connector", Category::Source)
                    .with_method("local/io:connector")
                    .with_output(HandleSpec::new("data", &["array"])),
            ),
        )
        .with_module(NodeModule::new("local/io").method("connector", CannedConnector)),
    );
    let runtime = FlowRuntime::new(registry, AdapterRegistry::new());

    let mut doc = FlowDocument::new("override");
    doc.add_node(Node::new("src", "connector"), config("{}"));
    doc.add_node(Node::new("n", "aggregate"), config("{}"));
    doc.connect("src", "data", "n", "data");

    let run = runtime.run_document(doc).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.value("n", "result"), Some(&Value::from(1)));
}

#[test]
fn test_builtin_catalog_types_guard_connections() {
    let doc = event_branching(1);
    let graph = Graph::from_document(&doc).unwrap();
    let catalog = graphnodes::catalog();
    let resolver = TypeResolver::new(&graph, &doc.node_config_by_node_id, &catalog);

    assert!(resolver.validate_connections().is_empty());
    assert!(resolver.can_connect("count", "result", "check", "value"));
    assert!(!resolver.can_connect("count", "result", "only_x", "data"));
    assert!(!resolver.can_connect("check", "exec-out-true", "count", "data"));

    let filtered = resolver.handle_type("only_x", "data", HandlePosition::Output);
    assert!(filtered.contains("any"), "connector output is undetected until it runs");
}

#[test]
fn test_every_builtin_reference_resolves() {
    let mut registry = CapabilityRegistry::new();
    graphnodes::register_all(&mut registry);

    for node_type in registry.node_types() {
        assert!(registry.method(&node_type).is_ok(), "method for {}", node_type);
        assert!(registry.validator(&node_type).is_ok(), "validator for {}", node_type);
    }
    assert!(registry.node_types().len() >= 12);
}
