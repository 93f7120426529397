use async_trait::async_trait;
use graphcore::{
    Category, DynamicType, HandleSpec, NodeBehavior, NodeConfig, NodeContext, NodeDefinition,
    NodeError, NodeResult, Validation, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/flow";

/// Binds a flow parameter from the run's input values, keyed by `name` or
/// by the node id when no name is configured
pub struct InputNode;

#[async_trait]
impl NodeBehavior for InputNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let name = ctx
            .config
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&ctx.node_id);
        if let Some(value) = ctx.context.input(name) {
            return Ok(value.clone().into());
        }
        if let Some(default) = ctx.config.get("default") {
            return Ok(default.clone().into());
        }
        ctx.events.warn(format!("No value supplied for parameter '{}'", name));
        Ok(Value::Null.into())
    }
}

fn validate_input(config: &NodeConfig) -> Validation {
    let mut errors = Vec::new();
    match config.get("name") {
        None => {}
        Some(Value::String(name)) if !name.is_empty() => {}
        Some(_) => errors.push("'name' must be a non-empty string".to_string()),
    }
    if let Some(required) = config.get("required") {
        if required.as_bool().is_none() {
            errors.push("'required' must be a boolean".to_string());
        }
    }
    Validation::from_errors(errors)
}

/// Terminal node; its input becomes part of the run's output
pub struct OutputNode;

#[async_trait]
impl NodeBehavior for OutputNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.require_input("value")?.clone();
        if let Some(label) = ctx.config.get("label").and_then(Value::as_str) {
            ctx.events.info(format!("{}: {}", label, value.to_json()));
        }
        Ok(value.into())
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition::new("input", Category::Input)
            .with_description("Flow parameter supplied by the caller")
            .with_method(format!("{MODULE}:input"))
            .with_validator(format!("{MODULE}:validateInput"))
            .with_output(HandleSpec::dynamic(
                "value",
                DynamicType::ConfigBased {
                    field: "valueType".into(),
                },
            )),
        NodeDefinition::new("output", Category::Output)
            .with_description("Flow result")
            .with_method(format!("{MODULE}:output"))
            .with_input(HandleSpec::new("value", &["any"]).required())
            .with_output(HandleSpec::dynamic(
                "value",
                DynamicType::InputInference {
                    input: "value".into(),
                },
            )),
    ]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("input", InputNode)
        .validator("validateInput", validate_input)
        .method("output", OutputNode)
}
