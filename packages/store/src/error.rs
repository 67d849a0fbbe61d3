//! Error types for the storage layer.

use cairn_config::ConfigError;

/// The three families of failure a storage operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration. Fatal at startup.
    Config,
    /// The caller did something invalid. Never retried.
    Usage,
    /// The backend failed (I/O, quota, encoding). Propagated to the caller.
    Fault,
}

/// Errors at the storage layer.
///
/// A missing key is not an error: reads return `Ok(None)`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration problem surfaced while wiring storages.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Invalid key shape, root escape, or an operation the storage lacks.
    #[error("usage error: {message}")]
    Usage { message: String },

    /// The backend failed to perform the operation.
    #[error("storage fault in {storage}: {message}")]
    Fault {
        storage: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A formatter failed to encode a value.
    #[error("encode error ({format}): {message}")]
    Encode { format: String, message: String },

    /// A formatter failed to decode stored bytes.
    #[error("decode error ({format}): {message}")]
    Decode { format: String, message: String },
}

impl Error {
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
        }
    }

    pub fn unsupported(storage: &str, operation: &str) -> Self {
        Error::Usage {
            message: format!("{} does not support {}", storage, operation),
        }
    }

    pub fn fault(storage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Fault {
            storage: storage.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an I/O error with what was being attempted.
    pub fn io(storage: impl Into<String>, context: impl Into<String>, error: std::io::Error) -> Self {
        Error::Fault {
            storage: storage.into(),
            message: format!("{}: {}", context.into(), error),
            source: Some(error),
        }
    }

    pub fn encode(format: impl Into<String>, message: impl ToString) -> Self {
        Error::Encode {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(format: impl Into<String>, message: impl ToString) -> Self {
        Error::Decode {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Usage { .. } => ErrorKind::Usage,
            Error::Fault { .. } | Error::Encode { .. } | Error::Decode { .. } => ErrorKind::Fault,
        }
    }
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
