use async_trait::async_trait;
use graphcore::{
    Category, HandleSpec, NodeBehavior, NodeConfig, NodeContext, NodeDefinition, NodeError, NodeResult,
    Validation, Value,
};
use graphruntime::NodeModule;
use tokio::time::{sleep, Duration};

const MODULE: &str = "builtin/time";

const DEFAULT_DELAY_MS: f64 = 1000.0;

/// Delay execution for a specified duration, then pass `value` through
pub struct DelayNode;

#[async_trait]
impl NodeBehavior for DelayNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let delay_ms = ctx
            .config
            .get("delay_ms")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_DELAY_MS) as u64;

        ctx.events.info(format!("Delaying for {}ms", delay_ms));
        sleep(Duration::from_millis(delay_ms)).await;

        Ok(ctx.inputs.get("value").cloned().unwrap_or(Value::Null).into())
    }
}

fn validate_delay(config: &NodeConfig) -> Validation {
    match config.get("delay_ms") {
        None => Validation::ok(),
        Some(Value::Number(ms)) if *ms >= 0.0 => Validation::ok(),
        Some(_) => Validation::from_errors(vec!["'delay_ms' must be a non-negative number".into()]),
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new("time.delay", Category::Utility)
        .with_description("Delay execution for specified milliseconds")
        .with_method(format!("{MODULE}:delay"))
        .with_validator(format!("{MODULE}:validateDelay"))
        .with_input(HandleSpec::execution("exec-in"))
        .with_input(HandleSpec::new("value", &["any"]))
        .with_output(HandleSpec::new("value", &["any"]))
        .with_output(HandleSpec::execution("exec-out"))]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("delay", DelayNode)
        .validator("validateDelay", validate_delay)
}
