//! Formatters: the encode/decode stage between values and stored bytes.
//!
//! Storages pick a formatter by name from a [`FormatterRegistry`]. A name
//! may chain stages with `:` or `|`; encoding runs left to right and
//! decoding right to left.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cairn_config::ConfigError;
use lazy_static::lazy_static;

use crate::{Error, Result, Value};

/// One reversible encode/decode stage.
///
/// A stage sees only its own input: it must not assume anything about its
/// neighbors in a chain.
pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, value: Value) -> Result<Value>;

    fn decode(&self, value: Value) -> Result<Value>;
}

impl fmt::Debug for dyn Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Formatter({})", self.name())
    }
}

/// Build a formatter instance.
pub type FormatterFactory = fn() -> Arc<dyn Formatter>;

/// Passes values through untouched. Selected by `""` and `"bytes"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsIs;

impl Formatter for AsIs {
    fn name(&self) -> &str {
        "bytes"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    fn decode(&self, value: Value) -> Result<Value> {
        Ok(value)
    }
}

/// Stages applied in order on encode and in reverse on decode.
pub struct ChainFormatter {
    name: String,
    stages: Vec<Arc<dyn Formatter>>,
}

impl ChainFormatter {
    pub fn new(name: impl Into<String>, stages: Vec<Arc<dyn Formatter>>) -> Self {
        Self {
            name: name.into(),
            stages,
        }
    }

    pub fn stages(&self) -> &[Arc<dyn Formatter>] {
        &self.stages
    }
}

impl Formatter for ChainFormatter {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, value: Value) -> Result<Value> {
        self.stages
            .iter()
            .try_fold(value, |value, stage| stage.encode(value))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        self.stages
            .iter()
            .rev()
            .try_fold(value, |value, stage| stage.decode(value))
    }
}

/// Name to factory mapping.
///
/// Populated once at startup; registering a name twice is a configuration
/// error.
pub struct FormatterRegistry {
    factories: BTreeMap<String, FormatterFactory>,
}

impl FormatterRegistry {
    /// An empty registry. Only the identity names resolve.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every stock formatter.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (name, factory) in BUILTIN {
            // The builtin table is checked for duplicates by its own test.
            registry.factories.insert(name.to_string(), *factory);
        }
        registry
    }

    pub fn register(&mut self, name: &str, factory: FormatterFactory) -> Result<()> {
        if name.is_empty() || name == "bytes" || self.factories.contains_key(name) {
            return Err(ConfigError::Duplicate {
                name: name.to_string(),
            }
            .into());
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Resolve a formatter spec: a name, or a `:`/`|` separated chain.
    pub fn get(&self, spec: &str) -> Result<Arc<dyn Formatter>> {
        let spec = spec.trim();
        if spec.is_empty() || spec == "bytes" {
            return Ok(Arc::new(AsIs));
        }
        if let Some(factory) = self.factories.get(spec) {
            return Ok(factory());
        }
        let separator = if spec.contains(':') {
            ':'
        } else if spec.contains('|') {
            '|'
        } else {
            return Err(ConfigError::UnknownFormatter(spec.to_string()).into());
        };
        let stages = spec
            .split(separator)
            .map(|part| self.get(part))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(ChainFormatter::new(spec, stages)))
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

lazy_static! {
    static ref DEFAULT_REGISTRY: FormatterRegistry = FormatterRegistry::with_defaults();
}

/// The process-wide registry of stock formatters.
pub fn default_registry() -> &'static FormatterRegistry {
    &DEFAULT_REGISTRY
}

/// Encode through `formatter` and require the result to be bytes.
pub fn encode_bytes(formatter: &dyn Formatter, value: Value) -> Result<Vec<u8>> {
    match formatter.encode(value)? {
        Value::Bytes(bytes) => Ok(bytes),
        other => Err(Error::encode(
            formatter.name(),
            format!("produced {}, expected bytes", other.type_name()),
        )),
    }
}

pub fn decode_bytes(formatter: &dyn Formatter, bytes: Vec<u8>) -> Result<Value> {
    formatter.decode(Value::Bytes(bytes))
}

/// A [`FormatterFactory`] for any default-constructible formatter.
pub fn factory<F: Formatter + Default + 'static>() -> Arc<dyn Formatter> {
    Arc::new(F::default())
}

const BUILTIN: &[(&str, FormatterFactory)] = &[
    ("str", factory::<Utf8>),
    ("from_str", factory::<FromUtf8>),
    ("newline", factory::<NewLine>),
    ("bnewline", factory::<BytesNewLine>),
    ("json", factory::<Json>),
    ("yaml", factory::<Yaml>),
    ("bincode", factory::<Bincode>),
];

fn expect_bytes(stage: &str, value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        other => Err(Error::decode(
            stage,
            format!("expected bytes, got {}", other.type_name()),
        )),
    }
}

fn expect_string(stage: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::encode(
            stage,
            format!("expected string, got {}", other.type_name()),
        )),
    }
}

/// `str`: string to UTF-8 bytes.
#[derive(Default)]
struct Utf8;

impl Formatter for Utf8 {
    fn name(&self) -> &str {
        "str"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        Ok(Value::Bytes(expect_string("str", value)?.into_bytes()))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        let bytes = expect_bytes("str", value)?;
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| Error::decode("str", e))
    }
}

/// `from_str`: the inverse of `str`, for chains that start from bytes.
#[derive(Default)]
struct FromUtf8;

impl Formatter for FromUtf8 {
    fn name(&self) -> &str {
        "from_str"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        let bytes = match value {
            Value::Bytes(bytes) => bytes,
            other => {
                return Err(Error::encode(
                    "from_str",
                    format!("expected bytes, got {}", other.type_name()),
                ))
            }
        };
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| Error::encode("from_str", e))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(Error::decode(
                "from_str",
                format!("expected string, got {}", other.type_name()),
            )),
        }
    }
}

/// `newline`: appends a line separator to strings, trims trailing space on read.
#[derive(Default)]
struct NewLine;

impl Formatter for NewLine {
    fn name(&self) -> &str {
        "newline"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        let mut s = expect_string("newline", value)?;
        s.push('\n');
        Ok(Value::String(s))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(s.trim_end().to_string())),
            other => Err(Error::decode(
                "newline",
                format!("expected string, got {}", other.type_name()),
            )),
        }
    }
}

/// `bnewline`: the byte-level `newline`.
#[derive(Default)]
struct BytesNewLine;

impl Formatter for BytesNewLine {
    fn name(&self) -> &str {
        "bnewline"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        match value {
            Value::Bytes(mut bytes) => {
                bytes.push(b'\n');
                Ok(Value::Bytes(bytes))
            }
            other => Err(Error::encode(
                "bnewline",
                format!("expected bytes, got {}", other.type_name()),
            )),
        }
    }

    fn decode(&self, value: Value) -> Result<Value> {
        let mut bytes = expect_bytes("bnewline", value)?;
        while bytes.last().is_some_and(|b| b.is_ascii_whitespace()) {
            bytes.pop();
        }
        Ok(Value::Bytes(bytes))
    }
}

/// `json`: any value to JSON text bytes.
#[derive(Default)]
struct Json;

impl Formatter for Json {
    fn name(&self) -> &str {
        "json"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        serde_json::to_vec(&value.to_json())
            .map(Value::Bytes)
            .map_err(|e| Error::encode("json", e))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        let bytes = expect_bytes("json", value)?;
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| Error::decode("json", e))?;
        Ok(Value::from_json(json))
    }
}

/// `yaml`: any value to YAML text bytes.
#[derive(Default)]
struct Yaml;

impl Formatter for Yaml {
    fn name(&self) -> &str {
        "yaml"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        serde_yaml::to_string(&value.to_json())
            .map(|text| Value::Bytes(text.into_bytes()))
            .map_err(|e| Error::encode("yaml", e))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        let bytes = expect_bytes("yaml", value)?;
        let json: serde_json::Value =
            serde_yaml::from_slice(&bytes).map_err(|e| Error::decode("yaml", e))?;
        Ok(Value::from_json(json))
    }
}

/// `bincode`: a compact binary encoding that keeps every [`Value`] variant,
/// bytes included.
#[derive(Default)]
struct Bincode;

impl Formatter for Bincode {
    fn name(&self) -> &str {
        "bincode"
    }

    fn encode(&self, value: Value) -> Result<Value> {
        bincode::serialize(&value)
            .map(Value::Bytes)
            .map_err(|e| Error::encode("bincode", e))
    }

    fn decode(&self, value: Value) -> Result<Value> {
        let bytes = expect_bytes("bincode", value)?;
        bincode::deserialize(&bytes).map_err(|e| Error::decode("bincode", e))
    }
}
