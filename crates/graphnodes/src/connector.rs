//! Nodes that reach outside the flow through the adapter registry.
//!
//! The node logic is the same everywhere; which transport serves a given
//! `sourceType` or `destinationType` is decided by the adapters registered in
//! the execution context.

use async_trait::async_trait;
use graphcore::{
    AdapterError, Category, DynamicType, HandleSpec, NodeBehavior, NodeConfig, NodeContext,
    NodeDefinition, NodeError, NodeResult, Validation, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/connector";

fn adapter_config(ctx: &NodeContext) -> Value {
    Value::Object(ctx.config.clone())
}

/// Fetches data from the data source named by `sourceType`
pub struct ConnectorNode;

#[async_trait]
impl NodeBehavior for ConnectorNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let source_type = ctx.config_str("sourceType")?;
        let source = ctx.context.adapters.data_source(source_type)?;

        let config = adapter_config(&ctx);
        let validation = source.validate(&config);
        if !validation.valid {
            return Err(AdapterError::InvalidConfig(validation.errors).into());
        }

        ctx.events.info(format!("Fetching from {}", source.describe_type()));
        let data = source.fetch(&config, &ctx.context).await?;
        Ok(data.into())
    }
}

/// Sends its `data` input to the destination named by `destinationType`
pub struct DestinationNode;

#[async_trait]
impl NodeBehavior for DestinationNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let destination_type = ctx.config_str("destinationType")?;
        let destination = ctx.context.adapters.output_destination(destination_type)?;
        let payload = ctx.require_input("data")?;

        let config = adapter_config(&ctx);
        let validation = destination.validate(&config);
        if !validation.valid {
            return Err(AdapterError::InvalidConfig(validation.errors).into());
        }

        ctx.events
            .info(format!("Sending to {}", destination.describe_type()));
        let receipt = destination.send(payload, &config, &ctx.context).await?;
        Ok(receipt.into())
    }
}

fn require_string(config: &NodeConfig, key: &str) -> Validation {
    match config.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Validation::ok(),
        _ => Validation::from_errors(vec![format!("'{}' must be a non-empty string", key)]),
    }
}

fn validate_connector(config: &NodeConfig) -> Validation {
    require_string(config, "sourceType")
}

fn validate_destination(config: &NodeConfig) -> Validation {
    require_string(config, "destinationType")
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition::new("connector", Category::Source)
            .with_description("Fetch records from a data source adapter")
            .with_method(format!("{MODULE}:connector"))
            .with_validator(format!("{MODULE}:validateConnector"))
            .with_input(HandleSpec::execution("exec-in"))
            .with_output(HandleSpec::dynamic("data", DynamicType::RuntimeDetection)),
        NodeDefinition::new("destination", Category::Output)
            .with_description("Deliver data to an output destination adapter")
            .with_method(format!("{MODULE}:destination"))
            .with_validator(format!("{MODULE}:validateDestination"))
            .with_input(HandleSpec::execution("exec-in"))
            .with_input(HandleSpec::new("data", &["any"]).required())
            .with_output(HandleSpec::new("result", &["object"])),
    ]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("connector", ConnectorNode)
        .validator("validateConnector", validate_connector)
        .method("destination", DestinationNode)
        .validator("validateDestination", validate_destination)
}
