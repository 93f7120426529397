use async_trait::async_trait;
use graphcore::{
    Category, HandleSpec, NodeBehavior, NodeContext, NodeDefinition, NodeError, NodeResult, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/math";

/// Adds `a` and `b`, each taken from its input handle or else from config
pub struct AddNode;

impl AddNode {
    fn operand(ctx: &NodeContext, name: &str) -> Result<f64, NodeError> {
        let value = ctx
            .input_or_config(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))?;
        match value {
            Value::Number(n) => Ok(*n),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| NodeError::invalid_type(name, "number", value)),
            other => Err(NodeError::invalid_type(name, "number", other)),
        }
    }
}

#[async_trait]
impl NodeBehavior for AddNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let a = Self::operand(&ctx, "a")?;
        let b = Self::operand(&ctx, "b")?;
        Ok(Value::from(a + b).into())
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new("math.add", Category::Transform)
        .with_description("Add two numbers")
        .with_method(format!("{MODULE}:add"))
        .with_input(HandleSpec::new("a", &["number"]))
        .with_input(HandleSpec::new("b", &["number"]))
        .with_output(HandleSpec::new("result", &["number"]))]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE).method("add", AddNode)
}
