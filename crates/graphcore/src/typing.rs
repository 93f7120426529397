//! Handle types and connection validation.
//!
//! Types are an editing-time guard only: a mismatch is reported, never
//! enforced, and the scheduler does not consult this module.

use crate::{
    is_execution_handle, Catalog, ConfigMap, DynamicType, Graph, HandleType, Link, NodeId,
    NodeOutput, Value,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub const ANY: &str = "any";
pub const EXEC: &str = "exec";

const NUMERIC: [&str; 3] = ["number", "integer", "float"];

/// Config value to type name, for `config-based` handles.
const CONFIG_TYPE_TABLE: &[(&str, &str)] = &[
    ("text", "string"),
    ("string", "string"),
    ("number", "number"),
    ("integer", "integer"),
    ("float", "float"),
    ("decimal", "float"),
    ("boolean", "boolean"),
    ("bool", "boolean"),
    ("json", "object"),
    ("object", "object"),
    ("array", "array"),
    ("list", "array"),
    ("csv", "array"),
];

/// Config key under which editors persist the last detected handle types,
/// as `{"<handle>": "<type>"}`.
pub const DETECTED_TYPES_KEY: &str = "_detectedTypes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlePosition {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSet(BTreeSet<String>);

impl TypeSet {
    pub fn any() -> Self {
        Self::of(&[ANY])
    }

    pub fn of(types: &[&str]) -> Self {
        Self(types.iter().map(|t| t.to_string()).collect())
    }

    pub fn is_any(&self) -> bool {
        self.0.contains(ANY)
    }

    pub fn is_execution(&self) -> bool {
        self.0.contains(EXEC)
    }

    pub fn contains(&self, ty: &str) -> bool {
        self.0.contains(ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn is_numeric(ty: &str) -> bool {
        NUMERIC.contains(&ty)
    }
}

/// Declared types of a static handle; `None` for dynamic handles.
pub fn static_types(types: &HandleType) -> Option<TypeSet> {
    match types {
        HandleType::Single(ty) => Some(TypeSet::of(&[ty.as_str()])),
        HandleType::Static(list) => Some(TypeSet(list.iter().cloned().collect())),
        HandleType::Dynamic(_) => None,
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Whether data of `source` type may flow into a handle accepting `accepted`.
pub fn is_connection_valid(source: &TypeSet, accepted: &TypeSet) -> bool {
    if source.is_execution() || accepted.is_execution() {
        return source.is_execution() && accepted.is_execution();
    }
    if source.is_any() || accepted.is_any() {
        return true;
    }
    source.iter().any(|ty| {
        accepted.contains(ty)
            || (TypeSet::is_numeric(ty) && accepted.iter().any(TypeSet::is_numeric))
    })
}

/// Advisory finding about one edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionIssue {
    pub edge_id: String,
    pub source_types: TypeSet,
    pub target_types: TypeSet,
}

impl fmt::Display for ConnectionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "edge '{}': {} is not accepted by {}",
            self.edge_id, self.source_types, self.target_types
        )
    }
}

/// Resolves static and dynamic handle types against a graph.
pub struct TypeResolver<'a> {
    graph: &'a Graph,
    configs: &'a ConfigMap,
    catalog: &'a Catalog,
    results: Option<&'a HashMap<NodeId, Arc<NodeOutput>>>,
    variables: Option<&'a BTreeMap<String, Value>>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(graph: &'a Graph, configs: &'a ConfigMap, catalog: &'a Catalog) -> Self {
        Self {
            graph,
            configs,
            catalog,
            results: None,
            variables: None,
        }
    }

    /// Live results consulted by `runtime-detection` and `wildcard` handles.
    pub fn with_results(mut self, results: &'a HashMap<NodeId, Arc<NodeOutput>>) -> Self {
        self.results = Some(results);
        self
    }

    /// Variable values consulted by `wildcard` handles on variable nodes.
    pub fn with_variables(mut self, variables: &'a BTreeMap<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn handle_type(&self, node_id: &str, handle_id: &str, position: HandlePosition) -> TypeSet {
        self.resolve(node_id, handle_id, position, &mut HashSet::new())
    }

    /// Check a prospective connection before the edge exists.
    pub fn can_connect(
        &self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> bool {
        if is_execution_handle(source_handle) != is_execution_handle(target_handle) {
            return false;
        }
        let source_types = self.handle_type(source, source_handle, HandlePosition::Output);
        let target_types = self.handle_type(target, target_handle, HandlePosition::Input);
        is_connection_valid(&source_types, &target_types)
    }

    pub fn check_link(&self, link: &Link) -> Option<ConnectionIssue> {
        if self.can_connect(&link.source, &link.source_handle, &link.target, &link.target_handle) {
            return None;
        }
        Some(ConnectionIssue {
            edge_id: link.id.clone(),
            source_types: self.handle_type(&link.source, &link.source_handle, HandlePosition::Output),
            target_types: self.handle_type(&link.target, &link.target_handle, HandlePosition::Input),
        })
    }

    pub fn validate_connections(&self) -> Vec<ConnectionIssue> {
        self.graph
            .edges()
            .iter()
            .filter_map(|edge| self.check_link(edge.link()))
            .collect()
    }

    fn resolve(
        &self,
        node_id: &str,
        handle_id: &str,
        position: HandlePosition,
        visited: &mut HashSet<(String, String, HandlePosition)>,
    ) -> TypeSet {
        if is_execution_handle(handle_id) {
            return TypeSet::of(&[EXEC]);
        }
        if !visited.insert((node_id.to_string(), handle_id.to_string(), position)) {
            return TypeSet::any();
        }

        let Some(definition) = self
            .graph
            .node(node_id)
            .and_then(|node| self.catalog.get(&node.node_type))
        else {
            return TypeSet::any();
        };
        let spec = match position {
            HandlePosition::Input => definition.input(handle_id),
            HandlePosition::Output => definition.output(handle_id),
        };
        let Some(spec) = spec else {
            return TypeSet::any();
        };

        let strategy = match &spec.types {
            HandleType::Dynamic(strategy) => strategy,
            fixed => return static_types(fixed).unwrap_or_else(TypeSet::any),
        };

        let config = self.configs.get(node_id);
        match strategy {
            DynamicType::RuntimeDetection => self
                .live_type(node_id, handle_id)
                .or_else(|| {
                    config
                        .and_then(|c| c.get(DETECTED_TYPES_KEY))
                        .and_then(|detected| detected.get(handle_id))
                        .and_then(Value::as_str)
                        .map(|ty| TypeSet::of(&[ty]))
                })
                .unwrap_or_else(TypeSet::any),
            DynamicType::InputInference { input } => {
                self.upstream_type(node_id, input, visited)
            }
            DynamicType::ConfigBased { field } => config
                .and_then(|c| c.get(field))
                .and_then(Value::as_str)
                .and_then(|value| {
                    CONFIG_TYPE_TABLE
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(value))
                        .map(|(_, ty)| TypeSet::of(&[*ty]))
                })
                .unwrap_or_else(TypeSet::any),
            DynamicType::Wildcard { paired } => self
                .live_type(node_id, paired)
                .or_else(|| {
                    let name = config.and_then(|c| c.get("name")).and_then(Value::as_str)?;
                    let value = self.variables?.get(name)?;
                    Some(TypeSet::of(&[value.type_name()]))
                })
                .unwrap_or_else(|| self.upstream_type(node_id, paired, visited)),
        }
    }

    fn live_type(&self, node_id: &str, handle_id: &str) -> Option<TypeSet> {
        let value = self.results?.get(node_id)?.get(handle_id)?;
        Some(TypeSet::of(&[value.type_name()]))
    }

    fn upstream_type(
        &self,
        node_id: &str,
        input: &str,
        visited: &mut HashSet<(String, String, HandlePosition)>,
    ) -> TypeSet {
        let upstream = self
            .graph
            .data_edges_into(node_id)
            .find(|link| link.target_handle == input)
            .map(|link| (link.source.clone(), link.source_handle.clone()));
        match upstream {
            Some((source, handle)) => self.resolve(&source, &handle, HandlePosition::Output, visited),
            None => TypeSet::any(),
        }
    }
}
