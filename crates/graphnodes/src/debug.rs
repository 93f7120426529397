use async_trait::async_trait;
use graphcore::{Category, HandleSpec, NodeBehavior, NodeContext, NodeDefinition, NodeError, NodeResult, Value};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/debug";

/// Simple debug node that logs its inputs
pub struct DebugNode;

#[async_trait]
impl NodeBehavior for DebugNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let message = ctx
            .input_or_config("message")
            .and_then(Value::as_str)
            .unwrap_or("(no message)")
            .to_string();

        ctx.events.info(format!("DEBUG: {}", message));
        tracing::info!(node_id = %ctx.node_id, "{}", message);

        let mut inputs: Vec<_> = ctx.inputs.iter().collect();
        inputs.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in inputs {
            ctx.events.info(format!("  {}: {}", key, value.to_json()));
        }

        Ok(ctx
            .inputs
            .get("value")
            .cloned()
            .unwrap_or(Value::String(message))
            .into())
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new("debug.log", Category::Utility)
        .with_description("Logs input values for debugging")
        .with_method(format!("{MODULE}:log"))
        .with_input(HandleSpec::execution("exec-in"))
        .with_input(HandleSpec::new("message", &["string"]))
        .with_input(HandleSpec::new("value", &["any"]))
        .with_output(HandleSpec::new("value", &["any"]))
        .with_output(HandleSpec::execution("exec-out"))]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE).method("log", DebugNode)
}
