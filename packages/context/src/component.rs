//! Component kinds and the configuration a factory receives.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cairn_config::{ConfigError, Node, ValueExtractor};
use cairn_store::{Formatter, FormatterRegistry, Result, Storage};

use crate::{ContextRef, StorageRef};

/// Builds a storage from its declaration.
///
/// Factories must not resolve other components: they receive a
/// [`ContextRef`] to resolve references lazily at first use.
pub type Factory = Arc<dyn Fn(ComponentConfig) -> Result<Arc<dyn Storage>> + Send + Sync>;

/// Kind name to factory.
#[derive(Clone, Default)]
pub struct KindRegistry {
    factories: BTreeMap<String, Factory>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A kind can only be registered once.
    pub fn register<F>(&mut self, kind: &str, factory: F) -> Result<()>
    where
        F: Fn(ComponentConfig) -> Result<Arc<dyn Storage>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(kind) {
            return Err(ConfigError::Duplicate {
                name: kind.to_string(),
            }
            .into());
        }
        self.factories.insert(kind.to_string(), Arc::new(factory));
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&Factory> {
        self.factories.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

/// What a factory gets: the component's name, its configuration subtree,
/// a weak handle on the registry, and the formatter registry.
#[derive(Clone)]
pub struct ComponentConfig {
    name: String,
    node: Node,
    context: ContextRef,
    formatters: Arc<FormatterRegistry>,
}

impl ComponentConfig {
    pub fn new(
        name: impl Into<String>,
        node: Node,
        context: ContextRef,
        formatters: Arc<FormatterRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            node,
            context,
            formatters,
        }
    }

    /// A configuration with no registry behind it. References resolve to
    /// errors; useful for standalone storages and tests.
    pub fn detached(name: impl Into<String>, node: Node) -> Self {
        Self::new(
            name,
            node,
            ContextRef::detached(),
            Arc::new(FormatterRegistry::with_defaults()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn context(&self) -> &ContextRef {
        &self.context
    }

    pub fn formatters(&self) -> &Arc<FormatterRegistry> {
        &self.formatters
    }

    pub fn extractor(&self) -> ValueExtractor<'_> {
        ValueExtractor::new(&self.node)
    }

    pub fn kind(&self) -> Option<&str> {
        self.node.get("kind").and_then(|v| v.as_str())
    }

    /// The formatter named by the `format` option, identity when unset.
    pub fn formatter(&self) -> Result<Arc<dyn Formatter>> {
        let spec = self.extractor().get_str("format")?.unwrap_or_default();
        self.formatters.get(&spec)
    }

    pub fn require_str(&self, option: &str) -> Result<String> {
        self.extractor()
            .get_str(option)?
            .ok_or_else(|| self.missing(option))
    }

    /// A lazy reference to the component named by `option`.
    pub fn reference(&self, option: &str) -> Result<StorageRef> {
        let name = self.require_str(option)?;
        Ok(StorageRef::new(name, self.context.clone()))
    }

    /// Lazy references to every component named in the list `option`.
    pub fn references(&self, option: &str) -> Result<Vec<StorageRef>> {
        let names = self
            .extractor()
            .get_str_list(option)?
            .ok_or_else(|| self.missing(option))?;
        Ok(names
            .into_iter()
            .map(|name| StorageRef::new(name, self.context.clone()))
            .collect())
    }

    fn missing(&self, option: &str) -> cairn_store::Error {
        ConfigError::MissingOption {
            component: self.name.clone(),
            option: option.to_string(),
        }
        .into()
    }
}

impl fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("name", &self.name)
            .field("node", &self.node)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_store::{ErrorKind, MemoryStorage, Value};
    use serde_json::json;

    fn config(value: serde_json::Value) -> ComponentConfig {
        ComponentConfig::detached("c", Node::from_value(value).unwrap())
    }

    #[test]
    fn duplicate_kinds_are_rejected() {
        let mut kinds = KindRegistry::new();
        kinds
            .register("memory", |c| Ok(Arc::new(MemoryStorage::new(c.name()))))
            .unwrap();
        let err = kinds
            .register("memory", |c| Ok(Arc::new(MemoryStorage::new(c.name()))))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(kinds.kinds().collect::<Vec<_>>(), ["memory"]);
    }

    #[test]
    fn options() {
        let c = config(json!({
            "kind": "meta.cache",
            "storage": "fast",
            "storages": ["a", "b"],
            "format": "json",
        }));
        assert_eq!(c.kind(), Some("meta.cache"));
        assert_eq!(c.reference("storage").unwrap().name(), "fast");
        let names: Vec<_> = c
            .references("storages")
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b"]);
        let f = c.formatter().unwrap();
        assert_eq!(f.name(), "json");
        assert!(f.encode(Value::from(1)).is_ok());
    }

    #[test]
    fn missing_and_bad_options() {
        let c = config(json!({"kind": "x", "format": "nope"}));
        let err = c.reference("source").unwrap_err();
        assert!(err.to_string().contains("missing option source"));
        assert_eq!(c.formatter().unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(config(json!({})).formatter().unwrap().name(), "bytes");
    }
}
