//! Error types for configuration loading and extraction.

use std::path::PathBuf;

/// Errors raised while building or reading a configuration.
///
/// All of these are startup errors: they are surfaced immediately and never
/// retried.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Strict lookup of a path that is not present.
    #[error("key not found: {path}")]
    KeyNotFound { path: String },

    /// A configuration file could not be read.
    #[error("cannot read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source could not be parsed.
    #[error("malformed {format} configuration ({origin}): {message}")]
    Malformed {
        format: &'static str,
        origin: String,
        message: String,
    },

    /// A file source has an extension no loader understands.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// A value exists but cannot be coerced to the requested type.
    #[error("value at {path} is not a valid {expected}: {found}")]
    Coercion {
        path: String,
        expected: &'static str,
        found: String,
    },

    /// A required option is missing from a component declaration.
    #[error("component {component} is missing option {option}")]
    MissingOption { component: String, option: String },

    /// Component references form a cycle.
    #[error("cyclic reference: {}", chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    /// A component declares a kind nothing is registered for.
    #[error("unknown kind {kind:?} for component {component}")]
    UnknownKind { component: String, kind: String },

    /// A storage names a formatter nothing is registered for.
    #[error("unknown formatter: {0}")]
    UnknownFormatter(String),

    /// A name does not resolve to any declared component.
    #[error("unknown component: {name}")]
    UnknownComponent { name: String },

    /// A name was registered twice in a registry that forbids it.
    #[error("duplicate registration: {name}")]
    Duplicate { name: String },
}

impl ConfigError {
    pub(crate) fn malformed(
        format: &'static str,
        origin: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        ConfigError::Malformed {
            format,
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn coercion(path: &str, expected: &'static str, found: &crate::Value) -> Self {
        ConfigError::Coercion {
            path: path.to_string(),
            expected,
            found: found.to_string(),
        }
    }
}

/// Result alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
