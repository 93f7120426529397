//! Read-only node catalog: what each node type accepts, produces, and which
//! module exports implement it.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Input,
    Source,
    Transform,
    Logic,
    Variable,
    Output,
    Utility,
}

/// How the type of a dynamic handle is worked out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum DynamicType {
    /// Last execution result for the handle, then the persisted detection.
    RuntimeDetection,
    /// Whatever is connected to the named input handle.
    InputInference { input: String },
    /// A config field's value looked up in the fixed type table.
    ConfigBased { field: String },
    /// Mirrors the data flowing through the paired handle.
    Wildcard { paired: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandleType {
    Single(String),
    Static(Vec<String>),
    Dynamic(DynamicType),
}

impl Default for HandleType {
    fn default() -> Self {
        HandleType::Single(crate::typing::ANY.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleSpec {
    pub id: String,
    #[serde(default)]
    pub types: HandleType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl HandleSpec {
    pub fn new(id: impl Into<String>, types: &[&str]) -> Self {
        let types = match types {
            [single] => HandleType::Single(single.to_string()),
            many => HandleType::Static(many.iter().map(|t| t.to_string()).collect()),
        };
        Self {
            id: id.into(),
            types,
            required: false,
            default: None,
        }
    }

    pub fn dynamic(id: impl Into<String>, strategy: DynamicType) -> Self {
        Self {
            id: id.into(),
            types: HandleType::Dynamic(strategy),
            required: false,
            default: None,
        }
    }

    /// Control-flow handle; the id must carry the `exec-` prefix.
    pub fn execution(id: impl Into<String>) -> Self {
        Self::new(id, &[crate::typing::EXEC])
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_execution(&self) -> bool {
        crate::is_execution_handle(&self.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handles {
    #[serde(default)]
    pub inputs: Vec<HandleSpec>,
    #[serde(default)]
    pub outputs: Vec<HandleSpec>,
}

/// Catalog entry for one node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    #[serde(rename = "type", default)]
    pub node_type: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub handles: Handles,
    /// `"<module>:<export>"` of the execute behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// `"<module>:<export>"` of the config validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

impl NodeDefinition {
    pub fn new(node_type: impl Into<String>, category: Category) -> Self {
        Self {
            node_type: node_type.into(),
            category,
            description: String::new(),
            handles: Handles::default(),
            method: None,
            validator: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, handle: HandleSpec) -> Self {
        self.handles.inputs.push(handle);
        self
    }

    pub fn with_output(mut self, handle: HandleSpec) -> Self {
        self.handles.outputs.push(handle);
        self
    }

    pub fn with_method(mut self, reference: impl Into<String>) -> Self {
        self.method = Some(reference.into());
        self
    }

    pub fn with_validator(mut self, reference: impl Into<String>) -> Self {
        self.validator = Some(reference.into());
        self
    }

    pub fn input(&self, id: &str) -> Option<&HandleSpec> {
        self.handles.inputs.iter().find(|h| h.id == id)
    }

    pub fn output(&self, id: &str) -> Option<&HandleSpec> {
        self.handles.outputs.iter().find(|h| h.id == id)
    }

    pub fn data_outputs(&self) -> impl Iterator<Item = &HandleSpec> {
        self.handles.outputs.iter().filter(|h| !h.is_execution())
    }

    pub fn is_output(&self) -> bool {
        self.category == Category::Output
    }
}

/// Node types keyed by type name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    definitions: BTreeMap<String, NodeDefinition>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a catalog document (`{"<type>": {...}}`); entries that omit
    /// `type` take it from their key.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut catalog: Catalog = serde_json::from_str(json)?;
        for (key, definition) in catalog.definitions.iter_mut() {
            if definition.node_type.is_empty() {
                definition.node_type = key.clone();
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, definition: NodeDefinition) {
        self.definitions
            .insert(definition.node_type.clone(), definition);
    }

    pub fn with(mut self, definition: NodeDefinition) -> Self {
        self.insert(definition);
        self
    }

    /// Entries of `other` replace entries of the same type.
    pub fn merge(&mut self, other: Catalog) {
        self.definitions.extend(other.definitions);
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.definitions.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.definitions.contains_key(node_type)
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_and_dynamic_handles() {
        let catalog = Catalog::from_json(
            r#"{
                "math.add": {
                    "category": "transform",
                    "method": "nodes/math:add",
                    "handles": {
                        "inputs": [{"id": "a", "types": ["number", "integer"], "required": true}],
                        "outputs": [{"id": "result", "types": "number"}]
                    }
                },
                "variable": {
                    "category": "variable",
                    "handles": {
                        "outputs": [{"id": "value", "types": {"strategy": "wildcard", "paired": "value"}}]
                    }
                }
            }"#,
        )
        .unwrap();

        let add = catalog.get("math.add").unwrap();
        assert_eq!(add.node_type, "math.add");
        assert!(add.input("a").unwrap().required);
        assert_eq!(
            add.output("result").unwrap().types,
            HandleType::Single("number".into())
        );

        let variable = catalog.get("variable").unwrap();
        assert_eq!(
            variable.output("value").unwrap().types,
            HandleType::Dynamic(DynamicType::Wildcard { paired: "value".into() })
        );
    }

    #[test]
    fn merge_overrides_same_type() {
        let mut base = Catalog::new().with(
            NodeDefinition::new("connector", Category::Source).with_method("server/io:fetch"),
        );
        base.merge(Catalog::new().with(
            NodeDefinition::new("connector", Category::Source).with_method("browser/io:fetch"),
        ));
        assert_eq!(base.len(), 1);
        assert_eq!(
            base.get("connector").unwrap().method.as_deref(),
            Some("browser/io:fetch")
        );
    }

    #[test]
    fn missing_types_default_to_any() {
        let handle: HandleSpec = serde_json::from_str(r#"{"id": "in"}"#).unwrap();
        assert_eq!(handle.types, HandleType::Single("any".into()));
        assert!(!handle.required);
    }
}
