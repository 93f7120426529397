use async_trait::async_trait;
use graphcore::{
    Category, HandleSpec, NodeBehavior, NodeContext, NodeDefinition, NodeError, NodeResult, Value,
};
use graphruntime::NodeModule;

const MODULE: &str = "builtin/transform";

/// Parse JSON string to Value
pub struct JsonParseNode;

#[async_trait]
impl NodeBehavior for JsonParseNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let json = ctx.require_input("json")?;
        let text = json
            .as_str()
            .ok_or_else(|| NodeError::invalid_type("json", "string", json))?;

        serde_json::from_str::<Value>(text)
            .map(NodeResult::Value)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyNode;

#[async_trait]
impl NodeBehavior for JsonStringifyNode {
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.require_input("value")?;
        let pretty = ctx.config.get("pretty").is_some_and(Value::is_truthy);

        let json = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(Value::String(json).into())
    }
}

pub(crate) fn definitions() -> Vec<NodeDefinition> {
    vec![
        NodeDefinition::new("transform.json_parse", Category::Transform)
            .with_description("Parse JSON string")
            .with_method(format!("{MODULE}:jsonParse"))
            .with_input(HandleSpec::new("json", &["string"]).required())
            .with_output(HandleSpec::new("parsed", &["any"])),
        NodeDefinition::new("transform.json_stringify", Category::Transform)
            .with_description("Convert value to JSON string")
            .with_method(format!("{MODULE}:jsonStringify"))
            .with_input(HandleSpec::new("value", &["any"]).required())
            .with_output(HandleSpec::new("json", &["string"])),
    ]
}

pub(crate) fn module() -> NodeModule {
    NodeModule::new(MODULE)
        .method("jsonParse", JsonParseNode)
        .method("jsonStringify", JsonStringifyNode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphcore::{EventEmitter, ExecutionContext};
    use std::collections::HashMap;

    fn ctx(inputs: HashMap<String, Value>) -> NodeContext {
        NodeContext {
            node_id: "t".into(),
            node_type: "transform".into(),
            inputs,
            config: Default::default(),
            context: ExecutionContext::new(),
            events: EventEmitter::detached("t"),
        }
    }

    #[tokio::test]
    async fn test_parse_then_stringify() {
        let inputs = HashMap::from([("json".to_string(), Value::from(r#"{"b": [1, 2], "a": null}"#))]);
        let NodeResult::Value(parsed) = JsonParseNode.execute(ctx(inputs)).await.unwrap() else {
            panic!("expected single value result")
        };
        assert_eq!(parsed.get("b"), Some(&Value::Array(vec![Value::from(1), Value::from(2)])));

        let inputs = HashMap::from([("value".to_string(), parsed)]);
        let NodeResult::Value(json) = JsonStringifyNode.execute(ctx(inputs)).await.unwrap() else {
            panic!("expected single value result")
        };
        assert_eq!(json, Value::from(r#"{"a":null,"b":[1.0,2.0]}"#));
    }

    #[tokio::test]
    async fn test_parse_rejects_non_string() {
        let inputs = HashMap::from([("json".to_string(), Value::from(3))]);
        let err = JsonParseNode.execute(ctx(inputs)).await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidInputType { .. }));
    }
}
