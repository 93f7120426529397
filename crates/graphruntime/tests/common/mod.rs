#![allow(dead_code)]

use async_trait::async_trait;
use graphcore::{
    Catalog, Category, HandleSpec, NodeBehavior, NodeConfig, NodeContext, NodeDefinition,
    NodeError, NodeResult, Validation, Value,
};
use graphruntime::{CapabilityRegistry, CatalogSource, NodeModule};
use std::sync::{Arc, Mutex};

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Returns its `value` config.
pub struct Emit;

#[async_trait]
impl NodeBehavior for Emit {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Ok(ctx.get_config_or("value", Value::Null).into())
    }
}

/// Sums `a` and `b`, from inputs or config, logging each call.
pub struct Add {
    pub log: CallLog,
}

#[async_trait]
impl NodeBehavior for Add {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(ctx.node_id.clone());
        }
        let operand = |name: &str| -> Result<f64, NodeError> {
            match ctx.input_or_config(name) {
                None => Ok(0.0),
                Some(value) => value
                    .as_f64()
                    .ok_or_else(|| NodeError::invalid_type(name, "number", value)),
            }
        };
        Ok(Value::from(operand("a")? + operand("b")?).into())
    }
}

/// Passes its `value` input through.
pub struct Output;

#[async_trait]
impl NodeBehavior for Output {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Ok(ctx.require_input("value")?.clone().into())
    }
}

pub struct Fail;

#[async_trait]
impl NodeBehavior for Fail {
    async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Err(NodeError::ExecutionFailed("boom".into()))
    }
}

/// Fires `exec-out-true` or `exec-out-false` from its `condition` config.
pub struct Branch;

#[async_trait]
impl NodeBehavior for Branch {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let condition = ctx.get_config_or("condition", Value::Bool(false)).is_truthy();
        Ok(NodeResult::handles([
            ("result", Value::Bool(condition)),
            ("exec-out-true", Value::Bool(condition)),
            ("exec-out-false", Value::Bool(!condition)),
        ]))
    }
}

/// Reads the flow parameter named by its `name` config.
pub struct Param;

#[async_trait]
impl NodeBehavior for Param {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let name = ctx.config_str("name")?;
        Ok(ctx
            .context
            .input(name)
            .cloned()
            .unwrap_or_else(|| ctx.get_config_or("default", Value::Null))
            .into())
    }
}

pub fn catalog() -> Catalog {
    Catalog::new()
        .with(
            NodeDefinition::new("emit", Category::Source)
                .with_method("test/nodes:emit")
                .with_output(HandleSpec::new("value", &["any"])),
        )
        .with(
            NodeDefinition::new("add", Category::Transform)
                .with_method("test/nodes:add")
                .with_input(HandleSpec::new("a", &["number"]))
                .with_input(HandleSpec::new("b", &["number"]))
                .with_output(HandleSpec::new("result", &["number"])),
        )
        .with(
            NodeDefinition::new("output", Category::Output)
                .with_method("test/nodes:output")
                .with_input(HandleSpec::new("value", &["any"]).required())
                .with_output(HandleSpec::new("value", &["any"])),
        )
        .with(
            NodeDefinition::new("fail", Category::Utility)
                .with_method("test/nodes:fail")
                .with_input(HandleSpec::new("value", &["any"]))
                .with_output(HandleSpec::new("value", &["any"])),
        )
        .with(
            NodeDefinition::new("branch", Category::Logic)
                .with_method("test/nodes:branch")
                .with_output(HandleSpec::new("result", &["boolean"]))
                .with_output(HandleSpec::execution("exec-out-true"))
                .with_output(HandleSpec::execution("exec-out-false")),
        )
        .with(
            NodeDefinition::new("param", Category::Input)
                .with_method("test/nodes:param")
                .with_output(HandleSpec::new("value", &["any"])),
        )
        .with(
            NodeDefinition::new("strict", Category::Utility)
                .with_method("test/nodes:emit")
                .with_validator("test/nodes:needsLimit"),
        )
        .with(NodeDefinition::new("broken", Category::Utility).with_method("test/missing:run"))
}

pub fn registry(log: CallLog) -> CapabilityRegistry {
    let module = NodeModule::new("test/nodes")
        .method("emit", Emit)
        .method("add", Add { log })
        .method("output", Output)
        .method("fail", Fail)
        .method("branch", Branch)
        .method("param", Param)
        .validator("needsLimit", |config: &NodeConfig| {
            if config.contains_key("limit") {
                Validation::ok()
            } else {
                Validation::from_errors(vec!["limit is required".into()])
            }
        });

    let mut registry = CapabilityRegistry::new();
    registry.register_source(CatalogSource::new("test", catalog()).with_module(module));
    registry
}

pub fn config(json: &str) -> NodeConfig {
    serde_json::from_str(json).unwrap()
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
