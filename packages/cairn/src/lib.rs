//! Cairn: async key-value storages composed from configuration.
//!
//! A configuration tree declares components (any mapping with a `kind`);
//! the [`Context`] builds them on first use and hands them out as
//! `Arc<dyn Storage>`.
//!
//! ```rust
//! use cairn::{bootstrap, ConfigLoader, Key, Value};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let context = bootstrap(
//!     &ConfigLoader::new(),
//!     [json!({
//!         "cache": {"kind": "meta.cache", "storage": "fast", "source": "slow"},
//!         "fast": {"kind": "memory"},
//!         "slow": {"kind": "memory"},
//!     })],
//! )
//! .unwrap();
//!
//! let slow = context.resolve("slow").await.unwrap();
//! slow.set(&Key::from("k"), Some(Value::from(1))).await.unwrap();
//! let cache = context.resolve("cache").await.unwrap();
//! assert_eq!(cache.get(&Key::from("k")).await.unwrap(), Some(Value::from(1)));
//! context.shutdown().await.unwrap();
//! # }
//! ```
//!
//! Built-in kinds: `memory`, `fs`, `fs.hash`, `meta.fallback`,
//! `meta.replicator` and `meta.cache`.

use std::sync::Arc;

pub use cairn_config::{self as config, ConfigError, ConfigLoader, Node, Source};
pub use cairn_context::{ComponentConfig, Context, ContextRef, KindRegistry, State, StorageRef};
pub use cairn_fs_store::{self as fs, FileSystemStorage, StoragePath};
pub use cairn_meta_store::{self as meta, Cache, Fallback, Replicator};
pub use cairn_store::{
    self as store, Error, ErrorKind, FieldAccess, FieldStorage, Formatter, FormatterRegistry, Key,
    KeyPath, MemoryStorage, OpenMode, Result, Storage, StreamHandle, Value,
};

/// Every kind this workspace ships, ready for [`Context::new`].
pub fn builtin_kinds() -> Result<KindRegistry> {
    let mut kinds = KindRegistry::new();
    kinds.register("memory", |config| {
        let memory = MemoryStorage::new(config.name());
        let storage: Arc<dyn Storage> = if config.extractor().get_bool("fields")?.unwrap_or(false) {
            Arc::new(FieldStorage::new(memory))
        } else {
            Arc::new(memory)
        };
        Ok(storage)
    })?;
    cairn_fs_store::register_kinds(&mut kinds)?;
    cairn_meta_store::register_kinds(&mut kinds)?;
    Ok(kinds)
}

/// Merge `sources`, resolve environment references once, and register
/// the declared components against [`builtin_kinds`].
///
/// Nothing is constructed yet; components are built at first resolution.
pub fn bootstrap<I, S>(loader: &ConfigLoader, sources: I) -> Result<Context>
where
    I: IntoIterator<Item = S>,
    S: Into<Source>,
{
    let mut node = loader.load(sources)?;
    let rewritten = cairn_config::resolve_env(&mut node);
    let context = Context::new(node, builtin_kinds()?)?;
    tracing::info!(
        components = context.names().count(),
        env_references = rewritten,
        "configuration loaded"
    );
    Ok(context)
}
