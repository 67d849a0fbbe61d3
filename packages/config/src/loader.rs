//! Loading and merging configuration sources.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{ConfigError, IniLoader, Node, Result};

/// Text formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Yaml,
    Toml,
    Ini,
}

impl SourceFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(SourceFormat::Json),
            "yaml" | "yml" => Ok(SourceFormat::Yaml),
            "toml" => Ok(SourceFormat::Toml),
            "ini" | "cfg" | "conf" => Ok(SourceFormat::Ini),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn name(self) -> &'static str {
        match self {
            SourceFormat::Json => "json",
            SourceFormat::Yaml => "yaml",
            SourceFormat::Toml => "toml",
            SourceFormat::Ini => "ini",
        }
    }

    /// Parse `text` in this format into a tree.
    pub fn parse(self, text: &str, origin: &str) -> Result<Node> {
        Node::from_value(self.parse_raw(text, origin)?)
    }

    /// Parse `text` into its top-level mapping, dotted keys and `!` markers
    /// left as written.
    fn parse_raw(self, text: &str, origin: &str) -> Result<Value> {
        let value: Value = match self {
            SourceFormat::Json => serde_json::from_str(text)
                .map_err(|e| ConfigError::malformed(self.name(), origin, e))?,
            SourceFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|e| ConfigError::malformed(self.name(), origin, e))?,
            SourceFormat::Toml => {
                toml::from_str(text).map_err(|e| ConfigError::malformed(self.name(), origin, e))?
            }
            SourceFormat::Ini => return IniLoader::new().assignments(text, origin).map(Value::Object),
        };
        match value {
            // An empty YAML document is a valid, empty configuration.
            Value::Null => Ok(Value::Object(Map::new())),
            value @ Value::Object(_) => Ok(value),
            _ => Err(ConfigError::malformed(self.name(), origin, "top level is not a mapping")),
        }
    }
}

/// One input to [`ConfigLoader::load`].
#[derive(Debug, Clone)]
pub enum Source {
    /// A file; the format comes from its extension. Relative paths are
    /// looked up in the loader's search directories.
    File(PathBuf),
    /// Literal text in a known format.
    Text { format: SourceFormat, text: String },
    /// An in-memory mapping.
    Value(Value),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::File(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::File(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::File(PathBuf::from(path))
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Source::Value(value)
    }
}

/// Merges sources left to right into one tree.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    search_dirs: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories searched, in order, for relative file sources.
    pub fn with_search_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Load and merge every source; later sources override earlier ones.
    pub fn load<I, S>(&self, sources: I) -> Result<Node>
    where
        I: IntoIterator<Item = S>,
        S: Into<Source>,
    {
        let mut node = Node::new();
        for source in sources {
            // Merge the raw mapping so a `!` replaces what earlier sources set.
            node.merge_value(self.load_one(source.into())?)?;
        }
        Ok(node)
    }

    fn load_one(&self, source: Source) -> Result<Value> {
        match source {
            Source::Value(value) => Ok(value),
            Source::Text { format, text } => format.parse_raw(&text, "<text>"),
            Source::File(path) => {
                let path = self.find(&path)?;
                let format = SourceFormat::from_path(&path)?;
                tracing::debug!(path = %path.display(), format = format.name(), "loading configuration");
                let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                format.parse_raw(&text, &path.display().to_string())
            }
        }
    }

    fn find(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() || path.exists() {
            return Ok(path.to_path_buf());
        }
        self.search_dirs
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }
}

/// Merge `sources` with a loader that has no search directories.
pub fn load<I, S>(sources: I) -> Result<Node>
where
    I: IntoIterator<Item = S>,
    S: Into<Source>,
{
    ConfigLoader::new().load(sources)
}
