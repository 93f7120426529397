use crate::compare::{field, Operator};
use async_trait::async_trait;
use graphcore::{
    Category, DynamicType, HandleSpec, NodeBehavior, NodeConfig, NodeContext, NodeDefinition,
    NodeError, NodeResult, Validation, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/collection";

const AGGREGATIONS: &[&str] = &["count", "sum", "avg", "min", "max"];

fn records<'a>(ctx: &'a NodeContext) -> Result<&'a [Value], NodeError> {
    let data = ctx.require_input("data")?;
    data.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| NodeError::invalid_type("data", "array", data))
}

/// Keeps the records whose `field` satisfies `operator` against `value`
pub struct FilterNode;

#[async_trait]
impl NodeBehavior for FilterNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let path = ctx.config_str("field")?;
        let operator = match ctx.config.get("operator") {
            None => Operator::Equals,
            Some(name) => name
                .as_str()
                .and_then(Operator::parse)
                .ok_or_else(|| NodeError::Configuration(format!("Unknown operator: {:?}", name)))?,
        };
        let expected = ctx.get_config_or("value", Value::Null);

        let data = records(&ctx)?;
        let kept: Vec<Value> = data
            .iter()
            .filter(|record| operator.apply(field(record, path), &expected))
            .cloned()
            .collect();

        tracing::debug!("{} kept {} of {} records", ctx.node_id, kept.len(), data.len());
        Ok(Value::Array(kept).into())
    }
}

fn validate_filter(config: &NodeConfig) -> Validation {
    let mut errors = Vec::new();
    if config.get("field").and_then(Value::as_str).is_none() {
        errors.push("'field' must be a string".to_string());
    }
    if let Some(op) = config.get("operator") {
        if op.as_str().and_then(Operator::parse).is_none() {
            errors.push(format!(
                "'operator' must be one of {}",
                Operator::NAMES.join(", ")
            ));
        }
    }
    Validation::from_errors(errors)
}

/// Reduces an array of records to one number
pub struct AggregateNode;

#[async_trait]
impl NodeBehavior for AggregateNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let operation = ctx
            .config
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("count");
        let data = records(&ctx)?;

        if operation == "count" {
            return Ok(Value::from(data.len()).into());
        }

        let path = ctx.config_str("field")?;
        let numbers: Vec<f64> = data
            .iter()
            .filter_map(|record| field(record, path))
            .filter_map(|value| match value {
                Value::Number(n) => Some(*n),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect();

        let result = match operation {
            "sum" => Value::from(numbers.iter().sum::<f64>()),
            "avg" if numbers.is_empty() => Value::Null,
            "avg" => Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64),
            "min" => numbers.iter().copied().reduce(f64::min).map_or(Value::Null, Value::from),
            "max" => numbers.iter().copied().reduce(f64::max).map_or(Value::Null, Value::from),
            other => {
                return Err(NodeError::Configuration(format!(
                    "Unknown aggregation: {}",
                    other
                )))
            }
        };
        Ok(result.into())
    }
}

fn validate_aggregate(config: &NodeConfig) -> Validation {
    let operation = config
        .get("operation")
        .map(|v| v.as_str().unwrap_or_default())
        .unwrap_or("count");

    let mut errors = Vec::new();
    if !AGGREGATIONS.contains(&operation) {
        errors.push(format!("'operation' must be one of {}", AGGREGATIONS.join(", ")));
    } else if operation != "count" && config.get("field").and_then(Value::as_str).is_none() {
        errors.push(format!("'{}' needs a 'field'", operation));
    }
    Validation::from_errors(errors)
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition::new("filter", Category::Transform)
            .with_description("Keep records matching a condition")
            .with_method(format!("{MODULE}:filter"))
            .with_validator(format!("{MODULE}:validateFilter"))
            .with_input(HandleSpec::new("data", &["array"]).required())
            .with_output(HandleSpec::dynamic(
                "data",
                DynamicType::InputInference {
                    input: "data".into(),
                },
            )),
        NodeDefinition::new("aggregate", Category::Transform)
            .with_description("Count, sum, average, min or max over records")
            .with_method(format!("{MODULE}:aggregate"))
            .with_validator(format!("{MODULE}:validateAggregate"))
            .with_input(HandleSpec::new("data", &["array"]).required())
            .with_output(HandleSpec::new("result", &["number"])),
    ]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("filter", FilterNode)
        .validator("validateFilter", validate_filter)
        .method("aggregate", AggregateNode)
        .validator("validateAggregate", validate_aggregate)
}
