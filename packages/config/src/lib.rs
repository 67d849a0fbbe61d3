//! Cairn configuration tree.
//!
//! A configuration is a single ordered tree merged from any number of sources:
//! - `Node`: the tree itself, addressed with dotted paths (`"storage.cache.source"`)
//! - `ConfigLoader` / `Source`: JSON, YAML, TOML and INI-style inputs, merged left to right
//! - `ValueExtractor`: typed, coercing getters over a tree
//! - `resolve_references`: one-shot rewrite of `$NAME` style leaves
//!
//! # Merge rules
//!
//! Mapping values merge key by key; every other value replaces what was there.
//! A `!` suffix on the last path segment replaces the subtree instead of merging:
//!
//! ```rust
//! use cairn_config::Node;
//! use serde_json::json;
//!
//! let mut node = Node::from_value(json!({"d": {"g": 1}})).unwrap();
//! node.set("d.g.r!", 4);
//! assert_eq!(node.get("d.g.r"), Some(&json!(4)));
//! ```

mod error;
mod extractor;
mod ini;
mod loader;
mod node;
mod resolve;
pub mod scalar;

pub use error::{ConfigError, Result};
pub use extractor::ValueExtractor;
pub use ini::IniLoader;
pub use loader::{load, ConfigLoader, Source, SourceFormat};
pub use node::{ConfigPath, Node};
pub use resolve::{resolve_env, resolve_references};

/// The value type stored in a configuration tree.
pub use serde_json::Value;
