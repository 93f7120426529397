use async_trait::async_trait;
use graphcore::{AdapterError, DataSource, ExecutionContext, Validation, Value};

/// Serves records from the node config (`records`) or, failing that, the
/// records it was built with. Used for mock data and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticDataSource {
    records: Vec<Value>,
}

impl StaticDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl DataSource for StaticDataSource {
    async fn fetch(&self, config: &Value, _ctx: &ExecutionContext) -> Result<Value, AdapterError> {
        match config.get("records") {
            Some(records) => Ok(records.clone()),
            None => Ok(Value::Array(self.records.clone())),
        }
    }

    fn validate(&self, config: &Value) -> Validation {
        match config.get("records") {
            None | Some(Value::Array(_)) => Validation::ok(),
            Some(_) => Validation::from_errors(vec!["'records' must be an array".into()]),
        }
    }

    fn describe_type(&self) -> &str {
        "static"
    }
}
