use dashmap::DashMap;
use graphcore::{
    BehaviorResolver, Catalog, NodeBehavior, NodeConfig, NodeDefinition, NodeValidator,
    RegistryError, Validation,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Method,
    Validator,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FunctionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::Method => "method",
            FunctionKind::Validator => "validator",
        }
    }
}

/// A resolved export of a [`NodeModule`]
#[derive(Clone)]
pub enum Export {
    Method(Arc<dyn NodeBehavior>),
    Validator(Arc<dyn NodeValidator>),
}

impl Export {
    fn kind(&self) -> FunctionKind {
        match self {
            Export::Method(_) => FunctionKind::Method,
            Export::Validator(_) => FunctionKind::Validator,
        }
    }
}

/// Named table of behaviors and validators, addressed by catalog
/// references of the form `"<module path>:<export name>"`.
pub struct NodeModule {
    path: String,
    exports: HashMap<String, Export>,
}

impl NodeModule {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            exports: HashMap::new(),
        }
    }

    pub fn method(mut self, name: impl Into<String>, behavior: impl NodeBehavior + 'static) -> Self {
        self.exports
            .insert(name.into(), Export::Method(Arc::new(behavior)));
        self
    }

    pub fn validator(
        mut self,
        name: impl Into<String>,
        validator: impl NodeValidator + 'static,
    ) -> Self {
        self.exports
            .insert(name.into(), Export::Validator(Arc::new(validator)));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&Export> {
        self.exports.get(name)
    }
}

/// A catalog together with the modules its references point into
pub struct CatalogSource {
    name: String,
    catalog: Catalog,
    modules: HashMap<String, NodeModule>,
}

impl CatalogSource {
    pub fn new(name: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            name: name.into(),
            catalog,
            modules: HashMap::new(),
        }
    }

    pub fn with_module(mut self, module: NodeModule) -> Self {
        self.modules.insert(module.path.clone(), module);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Validator used for definitions that declare none
struct AcceptAll;

impl NodeValidator for AcceptAll {
    fn validate(&self, _config: &NodeConfig) -> Validation {
        Validation::ok()
    }
}

/// Resolves node types to executable behavior.
///
/// Sources are consulted in priority order: an override source shadows every
/// source registered before it, for definitions and module lookups alike.
/// Resolutions are memoized per `(type, kind)`; racing first resolutions
/// may both insert, which is harmless.
#[derive(Default)]
pub struct CapabilityRegistry {
    sources: Vec<CatalogSource>,
    cache: DashMap<(String, FunctionKind), Export>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source below every existing one.
    pub fn register_source(&mut self, source: CatalogSource) {
        tracing::info!(
            "Registering catalog source '{}' ({} node types)",
            source.name,
            source.catalog.len()
        );
        self.sources.push(source);
        self.cache.clear();
    }

    /// Add a source above every existing one.
    pub fn register_override(&mut self, source: CatalogSource) {
        tracing::info!(
            "Registering override source '{}' ({} node types)",
            source.name,
            source.catalog.len()
        );
        self.sources.insert(0, source);
        self.cache.clear();
    }

    pub fn get_definition(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.sources
            .iter()
            .find_map(|source| source.catalog.get(node_type))
    }

    /// All definitions merged, higher-priority sources winning.
    pub fn catalog(&self) -> Catalog {
        let mut merged = Catalog::new();
        for source in self.sources.iter().rev() {
            merged.merge(source.catalog.clone());
        }
        merged
    }

    pub fn node_types(&self) -> Vec<String> {
        let types: BTreeSet<&str> = self
            .sources
            .iter()
            .flat_map(|source| source.catalog.types())
            .collect();
        types.into_iter().map(String::from).collect()
    }

    pub fn get_function(&self, node_type: &str, kind: FunctionKind) -> Result<Export, RegistryError> {
        let key = (node_type.to_string(), kind);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.value().clone());
        }

        let definition = self
            .get_definition(node_type)
            .ok_or_else(|| RegistryError::DefinitionNotFound(node_type.to_string()))?;

        let reference = match kind {
            FunctionKind::Method => definition.method.as_deref(),
            FunctionKind::Validator => definition.validator.as_deref(),
        };

        let export = match reference {
            Some(reference) => self.resolve_reference(node_type, kind, reference)?,
            None if kind == FunctionKind::Validator => Export::Validator(Arc::new(AcceptAll)),
            None => {
                return Err(RegistryError::FunctionResolution {
                    node_type: node_type.to_string(),
                    kind: kind.as_str(),
                    reference: String::new(),
                    reason: "definition declares no method".to_string(),
                })
            }
        };

        tracing::debug!("Resolved {} for node type '{}'", kind, node_type);
        self.cache.insert(key, export.clone());
        Ok(export)
    }

    pub fn method(&self, node_type: &str) -> Result<Arc<dyn NodeBehavior>, RegistryError> {
        match self.get_function(node_type, FunctionKind::Method)? {
            Export::Method(behavior) => Ok(behavior),
            Export::Validator(_) => Err(self.kind_mismatch(node_type, FunctionKind::Method)),
        }
    }

    pub fn validator(&self, node_type: &str) -> Result<Arc<dyn NodeValidator>, RegistryError> {
        match self.get_function(node_type, FunctionKind::Validator)? {
            Export::Validator(validator) => Ok(validator),
            Export::Method(_) => Err(self.kind_mismatch(node_type, FunctionKind::Validator)),
        }
    }

    pub fn is_cached(&self, node_type: &str, kind: FunctionKind) -> bool {
        self.cache.contains_key(&(node_type.to_string(), kind))
    }

    /// Drop every source and every memoized resolution.
    pub fn clear(&mut self) {
        self.sources.clear();
        self.cache.clear();
    }

    fn resolve_reference(
        &self,
        node_type: &str,
        kind: FunctionKind,
        reference: &str,
    ) -> Result<Export, RegistryError> {
        let failure = |reason: String| RegistryError::FunctionResolution {
            node_type: node_type.to_string(),
            kind: kind.as_str(),
            reference: reference.to_string(),
            reason,
        };

        let (module_path, export_name) = reference
            .split_once(':')
            .ok_or_else(|| failure("expected '<module>:<export>'".to_string()))?;

        let module = self
            .sources
            .iter()
            .find_map(|source| source.modules.get(module_path))
            .ok_or_else(|| failure(format!("module '{}' not found", module_path)))?;

        let export = module
            .get(export_name)
            .ok_or_else(|| failure(format!("module '{}' has no export '{}'", module_path, export_name)))?;

        if export.kind() != kind {
            return Err(failure(format!("export '{}' is not a {}", export_name, kind)));
        }
        Ok(export.clone())
    }

    fn kind_mismatch(&self, node_type: &str, kind: FunctionKind) -> RegistryError {
        RegistryError::FunctionResolution {
            node_type: node_type.to_string(),
            kind: kind.as_str(),
            reference: String::new(),
            reason: format!("cached export is not a {}", kind),
        }
    }
}

impl BehaviorResolver for CapabilityRegistry {
    fn definition(&self, node_type: &str) -> Option<NodeDefinition> {
        self.get_definition(node_type).cloned()
    }

    fn method(&self, node_type: &str) -> Result<Arc<dyn NodeBehavior>, RegistryError> {
        CapabilityRegistry::method(self, node_type)
    }

    fn validator(&self, node_type: &str) -> Result<Arc<dyn NodeValidator>, RegistryError> {
        CapabilityRegistry::validator(self, node_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphcore::{
        Category, EventEmitter, ExecutionContext, NodeContext, NodeError, NodeResult, Value,
    };

    struct Constant(&'static str);

    #[async_trait]
    impl NodeBehavior for Constant {
        async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeError> {
            Ok(Value::from(self.0).into())
        }
    }

    fn ctx() -> NodeContext {
        NodeContext {
            node_id: "n".into(),
            node_type: "io.fetch".into(),
            inputs: Default::default(),
            config: Default::default(),
            context: ExecutionContext::new(),
            events: EventEmitter::detached("n"),
        }
    }

    fn shared_source() -> CatalogSource {
        let catalog = Catalog::new()
            .with(
                NodeDefinition::new("io.fetch", Category::Source)
                    .with_method("shared/io:fetch")
                    .with_validator("shared/io:validateFetch"),
            )
            .with(NodeDefinition::new("math.add", Category::Transform).with_method("shared/math:add"));
        CatalogSource::new("shared", catalog)
            .with_module(
                NodeModule::new("shared/io")
                    .method("fetch", Constant("server"))
                    .validator("validateFetch", |config: &NodeConfig| {
                        if config.contains_key("url") {
                            Validation::ok()
                        } else {
                            Validation::from_errors(vec!["url is required".into()])
                        }
                    }),
            )
            .with_module(NodeModule::new("shared/math").method("add", Constant("sum")))
    }

    #[tokio::test]
    async fn resolves_and_memoizes_method() {
        let mut registry = CapabilityRegistry::new();
        registry.register_source(shared_source());

        assert!(!registry.is_cached("io.fetch", FunctionKind::Method));
        let behavior = registry.method("io.fetch").unwrap();
        assert!(registry.is_cached("io.fetch", FunctionKind::Method));
        assert_eq!(behavior.execute(ctx()).await.unwrap(), NodeResult::from(Value::from("server")));
    }

    #[tokio::test]
    async fn override_source_wins_for_definitions_and_modules() {
        let mut registry = CapabilityRegistry::new();
        registry.register_source(shared_source());
        registry.register_override(
            CatalogSource::new(
                "browser",
                Catalog::new().with(
                    NodeDefinition::new("io.fetch", Category::Source)
                        .with_method("browser/io:fetch"),
                ),
            )
            .with_module(NodeModule::new("browser/io").method("fetch", Constant("browser"))),
        );

        let behavior = registry.method("io.fetch").unwrap();
        assert_eq!(behavior.execute(ctx()).await.unwrap(), NodeResult::from(Value::from("browser")));
        assert_eq!(
            registry.get_definition("io.fetch").unwrap().method.as_deref(),
            Some("browser/io:fetch")
        );
        // untouched types keep resolving from the shared source
        assert!(registry.method("math.add").is_ok());
        assert_eq!(registry.node_types(), vec!["io.fetch", "math.add"]);
    }

    #[test]
    fn unknown_type_is_definition_not_found() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.method("nope"),
            Err(RegistryError::DefinitionNotFound(t)) if t == "nope"
        ));
    }

    #[test]
    fn missing_module_and_export_are_resolution_errors() {
        let catalog = Catalog::new()
            .with(NodeDefinition::new("a", Category::Utility).with_method("gone/module:run"))
            .with(NodeDefinition::new("b", Category::Utility).with_method("shared/math:missing"))
            .with(NodeDefinition::new("c", Category::Utility).with_method("no-separator"))
            .with(NodeDefinition::new("d", Category::Utility).with_method("shared/io:validateFetch"))
            .with(NodeDefinition::new("e", Category::Utility));
        let mut registry = CapabilityRegistry::new();
        registry.register_source(shared_source());
        registry.register_source(CatalogSource::new("broken", catalog));

        for (node_type, needle) in [
            ("a", "module 'gone/module' not found"),
            ("b", "has no export 'missing'"),
            ("c", "expected '<module>:<export>'"),
            ("d", "is not a method"),
            ("e", "declares no method"),
        ] {
            match registry.method(node_type) {
                Err(RegistryError::FunctionResolution { reason, .. }) => {
                    assert!(reason.contains(needle), "{node_type}: {reason}")
                }
                Err(other) => panic!("{node_type}: unexpected error {other}"),
                Ok(_) => panic!("{node_type}: unexpectedly resolved"),
            }
            assert!(!registry.is_cached(node_type, FunctionKind::Method));
        }
    }

    #[test]
    fn validator_defaults_to_accept_all() {
        let mut registry = CapabilityRegistry::new();
        registry.register_source(shared_source());

        let fetch = registry.validator("io.fetch").unwrap();
        assert!(!fetch.validate(&NodeConfig::new()).valid);

        let add = registry.validator("math.add").unwrap();
        assert!(add.validate(&NodeConfig::new()).valid);
    }

    #[test]
    fn clear_resets_catalog_and_cache() {
        let mut registry = CapabilityRegistry::new();
        registry.register_source(shared_source());
        registry.method("math.add").unwrap();

        registry.clear();
        assert!(!registry.is_cached("math.add", FunctionKind::Method));
        assert!(registry.get_definition("math.add").is_none());
        assert!(registry.catalog().is_empty());
    }
}
