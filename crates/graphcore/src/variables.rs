use crate::{NodeError, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name-addressed variables shared by every run holding a clone.
///
/// Clones share the same map. There is no transactional isolation between
/// interleaved runs: the last write wins.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    inner: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn set(&self, name: impl Into<String>, value: Value) {
        self.inner.write().await.insert(name.into(), value);
    }

    /// Append to an array variable, creating it if absent. A scalar already
    /// stored under the name becomes the first element.
    pub async fn append(&self, name: &str, value: Value) -> Value {
        let mut vars = self.inner.write().await;
        let next = match vars.remove(name) {
            None => vec![value],
            Some(Value::Array(mut items)) => {
                items.push(value);
                items
            }
            Some(existing) => vec![existing, value],
        };
        let next = Value::Array(next);
        vars.insert(name.to_string(), next.clone());
        next
    }

    /// Add `by` to a numeric variable; an absent variable starts at zero.
    pub async fn increment(&self, name: &str, by: f64) -> Result<Value, NodeError> {
        let mut vars = self.inner.write().await;
        let current = match vars.get(name) {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => *n,
            Some(other) => return Err(NodeError::invalid_type(name, "number", other)),
        };
        let next = Value::Number(current + by);
        vars.insert(name.to_string(), next.clone());
        Ok(next)
    }

    pub async fn decrement(&self, name: &str, by: f64) -> Result<Value, NodeError> {
        self.increment(name, -by).await
    }

    pub async fn delete(&self, name: &str) -> Option<Value> {
        self.inner.write().await.remove(name)
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.read().await.clone()
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    /// True when both handles point at the same underlying map.
    pub fn shares_with(&self, other: &VariableStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_writes() {
        let store = VariableStore::new();
        let other = store.clone();
        store.set("x", Value::from(1)).await;
        assert_eq!(other.get("x").await, Some(Value::from(1)));
        assert!(store.shares_with(&other));
    }

    #[tokio::test]
    async fn append_builds_arrays() {
        let store = VariableStore::new();
        store.append("log", Value::from("a")).await;
        let all = store.append("log", Value::from("b")).await;
        assert_eq!(all, Value::Array(vec![Value::from("a"), Value::from("b")]));
    }

    #[tokio::test]
    async fn increment_starts_from_zero_and_rejects_strings() {
        let store = VariableStore::new();
        assert_eq!(store.increment("n", 2.0).await.unwrap(), Value::from(2));
        assert_eq!(store.decrement("n", 5.0).await.unwrap(), Value::from(-3));

        store.set("s", Value::from("text")).await;
        assert!(store.increment("s", 1.0).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_value() {
        let store = VariableStore::new();
        store.set("x", Value::from(true)).await;
        assert_eq!(store.delete("x").await, Some(Value::from(true)));
        assert_eq!(store.get("x").await, None);
    }
}
