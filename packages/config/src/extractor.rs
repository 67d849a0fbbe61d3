//! Typed, coercing access to a configuration tree.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{scalar, ConfigError, Node, Result};

/// A read-only typed view over a [`Node`].
///
/// Every getter returns `Ok(None)` when the path is absent and
/// `Err(ConfigError::Coercion)` when a value is present but cannot be turned
/// into the requested type. Text is coerced on demand, so `"12"` reads as an
/// integer and `"~/data"` as a path under the home directory.
#[derive(Debug, Clone)]
pub struct ValueExtractor<'a> {
    node: Cow<'a, Node>,
    base_dir: Option<PathBuf>,
}

impl<'a> ValueExtractor<'a> {
    pub fn new(node: &'a Node) -> Self {
        ValueExtractor {
            node: Cow::Borrowed(node),
            base_dir: None,
        }
    }

    /// An extractor over an arbitrary flat mapping such as the process
    /// environment. Keys are taken literally, not as dotted paths.
    ///
    /// ```rust
    /// use cairn_config::ValueExtractor;
    ///
    /// let env = ValueExtractor::from_pairs([("DATA_DIR", "/var/lib/data")]);
    /// assert_eq!(
    ///     env.get_path("DATA_DIR").unwrap().unwrap(),
    ///     std::path::PathBuf::from("/var/lib/data"),
    /// );
    /// ```
    pub fn from_pairs<I, K, V>(pairs: I) -> ValueExtractor<'static>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut node = Node::new();
        for (key, value) in pairs {
            node.as_map_mut()
                .insert(key.into(), Value::String(value.into()));
        }
        ValueExtractor {
            node: Cow::Owned(node),
            base_dir: None,
        }
    }

    /// Relative paths returned by [`get_path`](Self::get_path) are joined
    /// onto `dir`.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        // Flat mappings may carry keys that contain dots.
        self.node
            .as_map()
            .get(path)
            .or_else(|| self.node.get(path))
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.lookup(path)
    }

    pub fn get_int(&self, path: &str) -> Result<Option<i64>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| ConfigError::coercion(path, "integer", value)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ConfigError::coercion(path, "integer", value)),
            _ => Err(ConfigError::coercion(path, "integer", value)),
        }
    }

    pub fn get_float(&self, path: &str) -> Result<Option<f64>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| ConfigError::coercion(path, "float", value)),
            Value::String(s) => match scalar::parse(s) {
                Value::Number(n) => Ok(n.as_f64()),
                _ => Err(ConfigError::coercion(path, "float", value)),
            },
            _ => Err(ConfigError::coercion(path, "float", value)),
        }
    }

    pub fn get_bool(&self, path: &str) -> Result<Option<bool>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        match value {
            Value::Bool(b) => Ok(Some(*b)),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(Some(false)),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(Some(true)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                _ => Err(ConfigError::coercion(path, "boolean", value)),
            },
            _ => Err(ConfigError::coercion(path, "boolean", value)),
        }
    }

    /// Strings, numbers and booleans read as text.
    pub fn get_str(&self, path: &str) -> Result<Option<String>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        match value {
            Value::String(s) => Ok(Some(s.clone())),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::Bool(b) => Ok(Some(b.to_string())),
            _ => Err(ConfigError::coercion(path, "string", value)),
        }
    }

    /// A filesystem path. A leading `~` expands to the home directory.
    pub fn get_path(&self, path: &str) -> Result<Option<PathBuf>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        let Value::String(text) = value else {
            return Err(ConfigError::coercion(path, "path", value));
        };
        let expanded = expand_home(text).ok_or_else(|| ConfigError::coercion(path, "path", value))?;
        Ok(Some(match &self.base_dir {
            Some(base) if expanded.is_relative() => base.join(expanded),
            _ => expanded,
        }))
    }

    /// A list. A bracketed string is parsed; any other scalar becomes a
    /// one-element list.
    pub fn get_list(&self, path: &str) -> Result<Option<Vec<Value>>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        match value {
            Value::Array(items) => Ok(Some(items.clone())),
            Value::String(s) => match scalar::parse(s) {
                Value::Array(items) => Ok(Some(items)),
                other => Ok(Some(vec![other])),
            },
            Value::Object(_) => Err(ConfigError::coercion(path, "list", value)),
            other => Ok(Some(vec![other.clone()])),
        }
    }

    /// A list of names, e.g. the `storages` option of a combinator.
    pub fn get_str_list(&self, path: &str) -> Result<Option<Vec<String>>> {
        let Some(items) = self.get_list(path)? else {
            return Ok(None);
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(ConfigError::coercion(path, "list of strings", &other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// A byte count: an integer, or text with a `k`, `M`, `G` or `T`
    /// suffix (powers of 1024).
    pub fn get_size(&self, path: &str) -> Result<Option<u64>> {
        let Some(value) = self.lookup(path) else {
            return Ok(None);
        };
        match value {
            Value::Number(n) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| ConfigError::coercion(path, "byte size", value)),
            Value::String(s) => parse_size(s)
                .map(Some)
                .ok_or_else(|| ConfigError::coercion(path, "byte size", value)),
            _ => Err(ConfigError::coercion(path, "byte size", value)),
        }
    }
}

fn expand_home(text: &str) -> Option<PathBuf> {
    if text == "~" {
        return dirs::home_dir();
    }
    match text.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(Path::new(text).to_path_buf()),
    }
}

fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let base: u64 = digits.parse().ok()?;
    let shift = match unit.trim().trim_end_matches(['b', 'B']) {
        "" => 0,
        "k" | "K" => 10,
        "m" | "M" => 20,
        "g" | "G" => 30,
        "t" | "T" => 40,
        _ => return None,
    };
    base.checked_mul(1u64 << shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> Node {
        Node::from_value(json!({
            "n": 3,
            "text_n": "12",
            "f": "1.5",
            "flag": "yes",
            "dir": "data/files",
            "home": "~/cache",
            "names": "[a, b]",
            "single": "a",
            "size": "2M",
            "bad": {"x": 1},
        }))
        .unwrap()
    }

    #[test]
    fn integers() {
        let node = node();
        let x = ValueExtractor::new(&node);
        assert_eq!(x.get_int("n").unwrap(), Some(3));
        assert_eq!(x.get_int("text_n").unwrap(), Some(12));
        assert_eq!(x.get_int("missing").unwrap(), None);
        assert!(matches!(
            x.get_int("bad"),
            Err(ConfigError::Coercion { expected: "integer", .. })
        ));
        assert!(x.get_int("f").is_err());
    }

    #[test]
    fn floats_and_bools() {
        let node = node();
        let x = ValueExtractor::new(&node);
        assert_eq!(x.get_float("f").unwrap(), Some(1.5));
        assert_eq!(x.get_float("n").unwrap(), Some(3.0));
        assert_eq!(x.get_bool("flag").unwrap(), Some(true));
        assert!(x.get_bool("dir").is_err());
    }

    #[test]
    fn paths() {
        let node = node();
        let x = ValueExtractor::new(&node).with_base_dir("/srv");
        assert_eq!(
            x.get_path("dir").unwrap(),
            Some(PathBuf::from("/srv/data/files"))
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(x.get_path("home").unwrap(), Some(home.join("cache")));
        }
        assert!(x.get_path("n").is_err());
    }

    #[test]
    fn lists() {
        let node = node();
        let x = ValueExtractor::new(&node);
        assert_eq!(
            x.get_str_list("names").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(x.get_list("single").unwrap(), Some(vec![json!("a")]));
        assert!(x.get_list("bad").is_err());
    }

    #[test]
    fn sizes() {
        let node = node();
        let x = ValueExtractor::new(&node);
        assert_eq!(x.get_size("size").unwrap(), Some(2 * 1024 * 1024));
        assert_eq!(x.get_size("n").unwrap(), Some(3));
        assert_eq!(parse_size("10kb"), Some(10 * 1024));
        assert_eq!(parse_size("ten"), None);
    }

    #[test]
    fn flat_pairs_keep_dotted_keys() {
        let x = ValueExtractor::from_pairs([("a.b", "/tmp/x"), ("PORT", "80")]);
        assert_eq!(x.get_path("a.b").unwrap(), Some(PathBuf::from("/tmp/x")));
        assert_eq!(x.get_int("PORT").unwrap(), Some(80));
    }
}
