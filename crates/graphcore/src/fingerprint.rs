//! Content-addressable node fingerprints.
//!
//! A fingerprint covers a node's id, type, configuration, behavior reference,
//! upstream fingerprints and optional external input. It is computed over a
//! canonical JSON rendering with recursively sorted keys, so semantically
//! equal configurations always hash alike.

use crate::{Catalog, Category, ConfigMap, Graph, GraphError, NodeConfig, NodeId, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// What a node is, independent of where it sits in the graph.
#[derive(Debug, Clone, Copy)]
pub struct NodeIdentity<'a> {
    pub node_type: &'a str,
    pub config: &'a NodeConfig,
    /// Behavior reference (`"<module>:<export>"`) when known.
    pub function: Option<&'a str>,
}

/// `sha256:<hex>` fingerprint of one node. `upstream` may be in any order.
pub fn fingerprint(
    node_id: &str,
    identity: &NodeIdentity<'_>,
    upstream: &[String],
    input: Option<&Value>,
) -> String {
    let mut sorted = upstream.to_vec();
    sorted.sort();
    let upstream: Vec<Value> = sorted.into_iter().map(Value::from).collect();

    let mut document = BTreeMap::new();
    document.insert("id".to_string(), Value::from(node_id));
    document.insert("type".to_string(), Value::from(identity.node_type));
    document.insert("config".to_string(), Value::Object(identity.config.clone()));
    document.insert(
        "function".to_string(),
        identity.function.map(Value::from).unwrap_or(Value::Null),
    );
    document.insert("upstream".to_string(), Value::Array(upstream));
    document.insert("input".to_string(), input.cloned().unwrap_or(Value::Null));

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&Value::Object(document)).as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Fingerprints for every node, computed in execution order so each node
/// sees its data predecessors' fingerprints. Input-category nodes also hash
/// the external value bound to their `name`, or to their id when unnamed.
pub fn fingerprint_graph(
    graph: &Graph,
    configs: &ConfigMap,
    catalog: &Catalog,
    input_data: &BTreeMap<String, Value>,
) -> Result<HashMap<NodeId, String>, GraphError> {
    let empty = NodeConfig::new();
    let mut fingerprints: HashMap<NodeId, String> = HashMap::new();

    for node_id in graph.execution_order()? {
        let node = graph
            .node(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;
        let config = configs.get(node_id).unwrap_or(&empty);
        let definition = catalog.get(&node.node_type);

        let upstream: Vec<String> = graph
            .data_predecessors(node_id)
            .into_iter()
            .filter_map(|pred| fingerprints.get(pred).cloned())
            .collect();

        let input = definition
            .filter(|d| d.category == Category::Input)
            .map(|_| config.get("name").and_then(Value::as_str).unwrap_or(node_id))
            .and_then(|name| input_data.get(name));

        let identity = NodeIdentity {
            node_type: &node.node_type,
            config,
            function: definition.and_then(|d| d.method.as_deref()),
        };
        let print = fingerprint(node_id, &identity, &upstream, input);
        fingerprints.insert(node_id.to_string(), print);
    }

    Ok(fingerprints)
}

/// Compact JSON with object keys in sorted order. Non-finite numbers
/// render as `null`.
pub fn canonical_json(value: &Value) -> String {
    value.to_json().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EdgeSpec, HandleSpec, Node, NodeDefinition};

    fn config(json: &str) -> NodeConfig {
        serde_json::from_str(json).unwrap()
    }

    fn print(node_type: &str, cfg: &NodeConfig, upstream: &[String]) -> String {
        let identity = NodeIdentity {
            node_type,
            config: cfg,
            function: None,
        };
        fingerprint("n1", &identity, upstream, None)
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value: Value = serde_json::from_str(r#"{"b": {"y": 1, "x": [true]}, "a": "q"}"#).unwrap();
        assert_eq!(canonical_json(&value), r#"{"a":"q","b":{"x":[true],"y":1.0}}"#);
    }

    #[test]
    fn canonical_json_renders_non_finite_numbers_as_null() {
        let value = Value::Array(vec![
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::from("a\"b"),
        ]);
        assert_eq!(canonical_json(&value), r#"[null,null,"a\"b"]"#);
    }

    #[test]
    fn key_order_does_not_change_fingerprint() {
        let first = config(r#"{"a": 7, "b": {"k": 1, "j": 2}}"#);
        let second = config(r#"{"b": {"j": 2, "k": 1}, "a": 7}"#);
        assert_eq!(print("math.add", &first, &[]), print("math.add", &second, &[]));
    }

    #[test]
    fn config_type_and_upstream_all_matter() {
        let cfg = config(r#"{"a": 7}"#);
        let base = print("math.add", &cfg, &[]);
        assert_ne!(base, print("math.add", &config(r#"{"a": 8}"#), &[]));
        assert_ne!(base, print("math.sub", &cfg, &[]));
        assert_ne!(base, print("math.add", &cfg, &["sha256:up".into()]));
        assert!(base.starts_with("sha256:") && base.len() == 71);
    }

    #[test]
    fn upstream_order_is_irrelevant() {
        let cfg = NodeConfig::new();
        let ab = print("t", &cfg, &["a".into(), "b".into()]);
        let ba = print("t", &cfg, &["b".into(), "a".into()]);
        assert_eq!(ab, ba);
    }

    #[test]
    fn upstream_change_propagates_through_graph() {
        let graph = Graph::new(
            vec![Node::new("x", "input"), Node::new("a", "math.add"), Node::new("b", "output")],
            vec![EdgeSpec::new("a", "result", "b", "value")],
        )
        .unwrap();
        let catalog = Catalog::new()
            .with(NodeDefinition::new("input", Category::Input))
            .with(
                NodeDefinition::new("math.add", Category::Transform)
                    .with_method("nodes/math:add")
                    .with_output(HandleSpec::new("result", &["number"])),
            );

        let mut configs = ConfigMap::new();
        configs.insert("x".into(), config(r#"{"name": "limit"}"#));
        configs.insert("a".into(), config(r#"{"a": 7, "b": 3}"#));
        let inputs = BTreeMap::from([("limit".to_string(), Value::from(5))]);

        let before = fingerprint_graph(&graph, &configs, &catalog, &inputs).unwrap();
        let again = fingerprint_graph(&graph, &configs, &catalog, &inputs).unwrap();
        assert_eq!(before, again);

        configs.insert("a".into(), config(r#"{"a": 7, "b": 4}"#));
        let after = fingerprint_graph(&graph, &configs, &catalog, &inputs).unwrap();
        assert_ne!(before["a"], after["a"]);
        assert_ne!(before["b"], after["b"]);
        assert_eq!(before["x"], after["x"]);

        let other_inputs = BTreeMap::from([("limit".to_string(), Value::from(6))]);
        let rebound = fingerprint_graph(&graph, &configs, &catalog, &other_inputs).unwrap();
        assert_ne!(after["x"], rebound["x"]);
    }

    #[test]
    fn unnamed_input_hashes_value_bound_to_its_id() {
        let graph = Graph::new(vec![Node::new("limit", "input")], vec![]).unwrap();
        let catalog = Catalog::new().with(NodeDefinition::new("input", Category::Input));
        let configs = ConfigMap::new();

        let five = BTreeMap::from([("limit".to_string(), Value::from(5))]);
        let six = BTreeMap::from([("limit".to_string(), Value::from(6))]);
        let first = fingerprint_graph(&graph, &configs, &catalog, &five).unwrap();
        let second = fingerprint_graph(&graph, &configs, &catalog, &six).unwrap();
        assert_ne!(first["limit"], second["limit"]);
    }
}
