use crate::compare::{field, Operator};
use async_trait::async_trait;
use graphcore::{
    Category, HandleSpec, NodeBehavior, NodeConfig, NodeContext, NodeDefinition, NodeError, NodeResult,
    Validation, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/logic";

/// Evaluates a condition and fires exactly one of its two execution outputs
pub struct ConditionalNode;

#[async_trait]
impl NodeBehavior for ConditionalNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let operator = match ctx.config.get("operator") {
            None => Operator::Truthy,
            Some(name) => name
                .as_str()
                .and_then(Operator::parse)
                .ok_or_else(|| NodeError::Configuration(format!("Unknown operator: {:?}", name)))?,
        };
        let compare_to = ctx.get_config_or("compareTo", Value::Null);

        let subject = ctx.input_or_config("value");
        let subject = match ctx.config.get("field").and_then(Value::as_str) {
            Some(path) => subject.and_then(|value| field(value, path)),
            None => subject,
        };

        let outcome = operator.apply(subject, &compare_to);
        ctx.events.info(format!("Condition evaluated to {}", outcome));

        Ok(NodeResult::handles([
            ("result", Value::Bool(outcome)),
            ("exec-out-true", Value::Bool(outcome)),
            ("exec-out-false", Value::Bool(!outcome)),
        ]))
    }
}

fn validate_conditional(config: &NodeConfig) -> Validation {
    match config.get("operator") {
        Some(op) if op.as_str().and_then(Operator::parse).is_none() => Validation::from_errors(
            vec![format!("'operator' must be one of {}", Operator::NAMES.join(", "))],
        ),
        _ => Validation::ok(),
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new("conditional", Category::Logic)
        .with_description("Branch on a condition")
        .with_method(format!("{MODULE}:conditional"))
        .with_validator(format!("{MODULE}:validateConditional"))
        .with_input(HandleSpec::execution("exec-in"))
        .with_input(HandleSpec::new("value", &["any"]))
        .with_output(HandleSpec::new("result", &["boolean"]))
        .with_output(HandleSpec::execution("exec-out-true"))
        .with_output(HandleSpec::execution("exec-out-false"))]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("conditional", ConditionalNode)
        .validator("validateConditional", validate_conditional)
}
