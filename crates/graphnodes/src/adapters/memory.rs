use async_trait::async_trait;
use graphcore::{AdapterError, ExecutionContext, OutputDestination, Validation, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Keeps every payload it is sent; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    sent: Arc<Mutex<Vec<Value>>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Value> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl OutputDestination for MemoryDestination {
    async fn send(
        &self,
        payload: &Value,
        _config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, AdapterError> {
        let mut sent = self.sent.lock().await;
        sent.push(payload.clone());
        Ok(Value::Object(BTreeMap::from([
            ("delivered".to_string(), Value::Bool(true)),
            ("count".to_string(), Value::from(sent.len())),
        ])))
    }

    fn validate(&self, _config: &Value) -> Validation {
        Validation::ok()
    }

    fn describe_type(&self) -> &str {
        "memory"
    }
}
