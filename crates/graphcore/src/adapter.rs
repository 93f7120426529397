//! I/O adapter contracts and their registry.
//!
//! Node logic is resolved by node type through the capability registry; the
//! transport a node talks to is resolved here, by a second, independent
//! source/destination type. Swapping the adapters registered under a type
//! moves the same graph onto a different environment.

use crate::{AdapterError, ExecutionContext, Validation, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a connector node reads its data from
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, config: &Value, ctx: &ExecutionContext) -> Result<Value, AdapterError>;

    fn validate(&self, config: &Value) -> Validation;

    fn describe_type(&self) -> &str;
}

/// Where a destination node delivers its payload
#[async_trait]
pub trait OutputDestination: Send + Sync {
    async fn send(
        &self,
        payload: &Value,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, AdapterError>;

    fn validate(&self, config: &Value) -> Validation;

    fn describe_type(&self) -> &str;
}

/// Plain type-to-adapter mapping, populated by the caller's bootstrap
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
    destinations: HashMap<String, Arc<dyn OutputDestination>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_data_source(&mut self, source_type: impl Into<String>, adapter: Arc<dyn DataSource>) {
        let source_type = source_type.into();
        tracing::debug!("Registering data source: {}", source_type);
        self.sources.insert(source_type, adapter);
    }

    pub fn get_data_source(&self, source_type: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(source_type).cloned()
    }

    pub fn has_data_source(&self, source_type: &str) -> bool {
        self.sources.contains_key(source_type)
    }

    pub fn list_data_sources(&self) -> Vec<String> {
        let mut types: Vec<String> = self.sources.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn register_output_destination(
        &mut self,
        destination_type: impl Into<String>,
        adapter: Arc<dyn OutputDestination>,
    ) {
        let destination_type = destination_type.into();
        tracing::debug!("Registering output destination: {}", destination_type);
        self.destinations.insert(destination_type, adapter);
    }

    pub fn get_output_destination(&self, destination_type: &str) -> Option<Arc<dyn OutputDestination>> {
        self.destinations.get(destination_type).cloned()
    }

    pub fn has_output_destination(&self, destination_type: &str) -> bool {
        self.destinations.contains_key(destination_type)
    }

    pub fn list_output_destinations(&self) -> Vec<String> {
        let mut types: Vec<String> = self.destinations.keys().cloned().collect();
        types.sort();
        types
    }

    /// Like [`get_data_source`](Self::get_data_source) but as an error.
    pub fn data_source(&self, source_type: &str) -> Result<Arc<dyn DataSource>, AdapterError> {
        self.get_data_source(source_type)
            .ok_or_else(|| AdapterError::SourceNotFound(source_type.to_string()))
    }

    pub fn output_destination(
        &self,
        destination_type: &str,
    ) -> Result<Arc<dyn OutputDestination>, AdapterError> {
        self.get_output_destination(destination_type)
            .ok_or_else(|| AdapterError::DestinationNotFound(destination_type.to_string()))
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.destinations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl DataSource for Fixed {
        async fn fetch(&self, _config: &Value, _ctx: &ExecutionContext) -> Result<Value, AdapterError> {
            Ok(Value::from(self.0))
        }

        fn validate(&self, _config: &Value) -> Validation {
            Validation::ok()
        }

        fn describe_type(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn registered_source_is_swappable() {
        let mut adapters = AdapterRegistry::new();
        adapters.register_data_source("events", Arc::new(Fixed("server")));
        adapters.register_data_source("events", Arc::new(Fixed("browser")));

        let ctx = ExecutionContext::new();
        let source = adapters.data_source("events").unwrap();
        assert_eq!(source.fetch(&Value::Null, &ctx).await.unwrap(), Value::from("browser"));
        assert_eq!(adapters.list_data_sources(), vec!["events".to_string()]);
    }

    #[test]
    fn lookups_and_clear() {
        let mut adapters = AdapterRegistry::new();
        adapters.register_data_source("events", Arc::new(Fixed("x")));
        assert!(adapters.has_data_source("events"));
        assert!(!adapters.has_output_destination("events"));
        assert!(matches!(
            adapters.output_destination("sink"),
            Err(AdapterError::DestinationNotFound(t)) if t == "sink"
        ));

        adapters.clear();
        assert!(adapters.get_data_source("events").is_none());
    }
}
