//! Name-addressed global variables.
//!
//! A `get` sees whatever the most recent `set` of the same name wrote,
//! whether or not an edge connects them. Ordering between the two comes from
//! execution order alone.

use async_trait::async_trait;
use graphcore::{
    Category, DynamicType, HandleSpec, NodeBehavior, NodeConfig, NodeContext, NodeDefinition,
    NodeError, NodeResult, Validation, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/variable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Get,
    Set,
    Append,
    Increment,
    Decrement,
    Delete,
}

impl Operation {
    const NAMES: &'static [&'static str] =
        &["get", "set", "append", "increment", "decrement", "delete"];

    fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "get" => Operation::Get,
            "set" => Operation::Set,
            "append" => Operation::Append,
            "increment" => Operation::Increment,
            "decrement" => Operation::Decrement,
            "delete" => Operation::Delete,
            _ => return None,
        };
        Some(op)
    }
}

pub struct VariableNode;

impl VariableNode {
    fn operand(ctx: &NodeContext) -> Result<Value, NodeError> {
        ctx.input_or_config("value")
            .cloned()
            .ok_or_else(|| NodeError::MissingInput("value".to_string()))
    }

    fn step(ctx: &NodeContext) -> Result<f64, NodeError> {
        match ctx.config.get("by") {
            None => Ok(1.0),
            Some(by) => by
                .as_f64()
                .ok_or_else(|| NodeError::invalid_type("by", "number", by)),
        }
    }
}

#[async_trait]
impl NodeBehavior for VariableNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let name = ctx.config_str("name")?;
        let operation = ctx
            .config
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("get");
        let operation = Operation::parse(operation)
            .ok_or_else(|| NodeError::Configuration(format!("Unknown operation: {}", operation)))?;
        let variables = &ctx.context.variables;

        let value = match operation {
            Operation::Get => match variables.get(name).await {
                Some(value) => value,
                None => ctx.get_config_or("default", Value::Null),
            },
            Operation::Set => {
                let value = Self::operand(&ctx)?;
                variables.set(name, value.clone()).await;
                value
            }
            Operation::Append => variables.append(name, Self::operand(&ctx)?).await,
            Operation::Increment => variables.increment(name, Self::step(&ctx)?).await?,
            Operation::Decrement => variables.decrement(name, Self::step(&ctx)?).await?,
            Operation::Delete => variables.delete(name).await.unwrap_or(Value::Null),
        };

        tracing::debug!("Variable {} {:?} -> {:?}", name, operation, value);
        Ok(value.into())
    }
}

fn validate_variable(config: &NodeConfig) -> Validation {
    let mut errors = Vec::new();
    match config.get("name") {
        Some(Value::String(name)) if !name.is_empty() => {}
        _ => errors.push("'name' must be a non-empty string".to_string()),
    }
    if let Some(op) = config.get("operation") {
        if op.as_str().and_then(Operation::parse).is_none() {
            errors.push(format!(
                "'operation' must be one of {}",
                Operation::NAMES.join(", ")
            ));
        }
    }
    Validation::from_errors(errors)
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new("variable", Category::Variable)
        .with_description("Read or write a global variable by name")
        .with_method(format!("{MODULE}:variable"))
        .with_validator(format!("{MODULE}:validateVariable"))
        .with_input(HandleSpec::execution("exec-in"))
        .with_input(HandleSpec::dynamic(
            "value",
            DynamicType::Wildcard {
                paired: "value".into(),
            },
        ))
        .with_output(HandleSpec::dynamic(
            "value",
            DynamicType::Wildcard {
                paired: "value".into(),
            },
        ))
        .with_output(HandleSpec::execution("exec-out"))]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("variable", VariableNode)
        .validator("validateVariable", validate_variable)
}
