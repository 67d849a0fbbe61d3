//! The merge dictionary at the heart of the configuration.

use std::fmt;

use serde_json::{Map, Value};

use crate::{ConfigError, Result};

/// A parsed dotted path with its optional override marker.
///
/// `"a.b.c!"` parses to the segments `a`, `b`, `c` with `replace` set.
/// Empty segments are ignored, so `"a..b"` and `"a.b"` are the same path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigPath {
    segments: Vec<String>,
    replace: bool,
}

impl ConfigPath {
    pub fn parse(path: &str) -> Self {
        let (body, replace) = match path.strip_suffix('!') {
            Some(body) => (body, true),
            None => (path, false),
        };
        let segments = body
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        ConfigPath { segments, replace }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path carries the `!` override marker.
    pub fn is_replace(&self) -> bool {
        self.replace
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))?;
        if self.replace {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// An ordered configuration tree addressed by dotted paths.
///
/// Reads never fail: a missing path is `None`. Use [`Node::index`] when a
/// value is mandatory. Writes go through [`Node::set`], which merges mapping
/// values key by key and replaces everything else; a trailing `!` replaces
/// the whole subtree.
///
/// Sibling order is the order keys were first inserted; overriding an
/// existing key keeps its position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    root: Map<String, Value>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a JSON-like mapping, expanding dotted keys.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut node = Node::new();
        node.merge_value(value)?;
        Ok(node)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.root
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Iterate over top-level entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.root.iter()
    }

    /// Look up a dotted path. Numeric segments index into arrays.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, ConfigPath::parse(path).segments())
    }

    /// Strict lookup: a missing path is an error.
    pub fn index(&self, path: &str) -> Result<&Value> {
        self.get(path).ok_or_else(|| ConfigError::KeyNotFound {
            path: path.to_string(),
        })
    }

    /// Presence test. Performs no coercion.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// A copy of the mapping at `path`, if there is one.
    pub fn child(&self, path: &str) -> Option<Node> {
        match self.get(path)? {
            Value::Object(map) => Some(Node { root: map.clone() }),
            _ => None,
        }
    }

    /// Write `value` at `path`.
    ///
    /// Intermediate non-mapping values on the way are replaced by mappings.
    /// Setting the root path merges (or, with `"!"`, replaces) the whole tree
    /// and ignores non-mapping values.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let path = ConfigPath::parse(path);
        let value = value.into();
        if path.is_root() {
            match value {
                Value::Object(map) => {
                    if path.is_replace() {
                        self.root.clear();
                    }
                    for (key, value) in map {
                        set_key(&mut self.root, &key, value);
                    }
                }
                other => {
                    tracing::warn!(value = %other, "ignoring non-mapping value set at configuration root");
                }
            }
            return;
        }
        assign(&mut self.root, path.segments(), value, path.is_replace());
    }

    /// Remove the value at `path`, returning it.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let path = ConfigPath::parse(path);
        let (last, parents) = path.segments().split_last()?;
        let mut current = &mut self.root;
        for segment in parents {
            current = match current.get_mut(segment)? {
                Value::Object(map) => map,
                _ => return None,
            };
        }
        current.shift_remove(last)
    }

    /// Merge another tree on top of this one; `other` wins.
    pub fn merge(&mut self, other: Node) {
        for (key, value) in other.root {
            set_key(&mut self.root, &key, value);
        }
    }

    /// Merge a mapping value on top of this tree.
    pub fn merge_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Object(map) => {
                for (key, value) in map {
                    set_key(&mut self.root, &key, value);
                }
                Ok(())
            }
            other => Err(ConfigError::coercion("", "mapping", &other)),
        }
    }
}

impl From<Map<String, Value>> for Node {
    fn from(map: Map<String, Value>) -> Self {
        let mut node = Node::new();
        for (key, value) in map {
            set_key(&mut node.root, &key, value);
        }
        node
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string_pretty(&self.root).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, segments: &[String]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = map.get(first)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_key(map: &mut Map<String, Value>, key: &str, value: Value) {
    let path = ConfigPath::parse(key);
    if path.is_root() {
        return;
    }
    assign(map, path.segments(), value, path.is_replace());
}

fn assign(map: &mut Map<String, Value>, segments: &[String], value: Value, replace: bool) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        if replace {
            map.insert(first.clone(), expand(value));
        } else {
            merge_into(map, first, value);
        }
        return;
    }

    let slot = map
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        assign(child, rest, value, replace);
    }
}

fn merge_into(map: &mut Map<String, Value>, key: &str, value: Value) {
    if let Value::Object(incoming) = value {
        if let Some(Value::Object(existing)) = map.get_mut(key) {
            for (k, v) in incoming {
                set_key(existing, &k, v);
            }
            return;
        }
        map.insert(key.to_string(), expand(Value::Object(incoming)));
        return;
    }
    map.insert(key.to_string(), expand(value));
}

/// Rebuild a value so nested mappings have their dotted keys expanded.
fn expand(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut expanded = Map::new();
            for (key, value) in map {
                set_key(&mut expanded, &key, value);
            }
            Value::Object(expanded)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(expand).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Node {
        Node::from_value(json!({"f": 3, "d": {"g": 1}})).unwrap()
    }

    #[test]
    fn dotted_get() {
        let d = base();
        assert_eq!(d.get("d.g"), Some(&json!(1)));
        assert_eq!(d.get("f.d.e.d"), None);
        assert!(d.contains("d.g"));
        assert!(!d.contains("d.h"));
    }

    #[test]
    fn strict_index_fails_on_missing() {
        let d = base();
        assert_eq!(d.index("d.g").unwrap(), &json!(1));
        assert!(matches!(
            d.index("d.nope"),
            Err(ConfigError::KeyNotFound { path }) if path == "d.nope"
        ));
    }

    #[test]
    fn replace_scalar_with_subtree() {
        let mut d = base();
        d.set("d.g.r!", 4);
        assert_eq!(d.get("d.g.r"), Some(&json!(4)));
    }

    #[test]
    fn replace_with_mapping() {
        let mut d = base();
        d.set("d.g!", json!({"r": 4}));
        assert_eq!(d.get("d.g.r"), Some(&json!(4)));

        let mut d = base();
        d.set("d!", json!({"r": 4}));
        assert_eq!(d.get("d.r"), Some(&json!(4)));
        assert_eq!(d.get("d.g"), None);
    }

    #[test]
    fn set_merges_mappings() {
        let mut d = base();
        d.set("d.g", json!({"r": 4}));
        assert_eq!(d.get("d.g.r"), Some(&json!(4)));

        let mut d = base();
        d.set("d", json!({"r": 4}));
        assert_eq!(d.get("d.r"), Some(&json!(4)));
        assert_eq!(d.get("d.g"), Some(&json!(1)));
    }

    #[test]
    fn set_into_empty_mapping() {
        let mut d = Node::from_value(json!({"f": 3, "d": {"g": {}}})).unwrap();
        d.set("d.g", json!({"r": 4}));
        assert_eq!(d.get("d.g.r"), Some(&json!(4)));
    }

    #[test]
    fn merge_later_wins() {
        let mut d = Node::from_value(json!({"f": 4})).unwrap();
        d.merge_value(json!({"g": 3})).unwrap();
        assert_eq!(d.get("g"), Some(&json!(3)));
        assert_eq!(d.get("f"), Some(&json!(4)));

        d.merge_value(json!({"f": {"g": 2}})).unwrap();
        d.merge_value(json!({"f": 4})).unwrap();
        assert_eq!(d.get("g"), Some(&json!(3)));
        assert_eq!(d.get("f"), Some(&json!(4)));
    }

    #[test]
    fn override_marker_in_later_source() {
        let mut d = Node::from_value(json!({"d": {"g": 1}})).unwrap();
        d.merge_value(json!({"d.g.r!": 4})).unwrap();
        assert_eq!(d.get("d.g.r"), Some(&json!(4)));
    }

    #[test]
    fn merge_equals_per_key_merge() {
        let a = json!({"x": {"y": 1, "z": [1, 2]}, "k": "v", "n": {"m": {"o": 1}}});
        let b = json!({"x": {"y": 2, "w": 3}, "n.m": {"p": 2}, "k": {"now": "map"}});

        let mut whole = Node::from_value(a.clone()).unwrap();
        whole.merge_value(b.clone()).unwrap();

        let mut per_key = Node::from_value(a).unwrap();
        for (key, value) in b.as_object().unwrap() {
            per_key.merge_value(json!({ key.clone(): value.clone() })).unwrap();
        }

        assert_eq!(whole, per_key);
        assert_eq!(whole.get("n.m.o"), Some(&json!(1)));
        assert_eq!(whole.get("n.m.p"), Some(&json!(2)));
    }

    #[test]
    fn sibling_order_is_preserved() {
        let mut d = Node::from_value(json!({"a": 1, "b": 2, "c": 3})).unwrap();
        d.set("b", 20);
        d.set("d", 4);
        let keys: Vec<&String> = d.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b", "c", "d"]);
    }

    #[test]
    fn dotted_keys_in_nested_values_are_expanded() {
        let d = Node::from_value(json!({"a": {"b.c": 1}})).unwrap();
        assert_eq!(d.get("a.b.c"), Some(&json!(1)));
    }

    #[test]
    fn array_index_segments() {
        let d = Node::from_value(json!({"list": [{"name": "x"}, {"name": "y"}]})).unwrap();
        assert_eq!(d.get("list.1.name"), Some(&json!("y")));
        assert_eq!(d.get("list.7.name"), None);
    }

    #[test]
    fn child_and_remove() {
        let mut d = base();
        let child = d.child("d").unwrap();
        assert_eq!(child.get("g"), Some(&json!(1)));
        assert!(d.child("f").is_none());

        assert_eq!(d.remove("d.g"), Some(json!(1)));
        assert!(!d.contains("d.g"));
        assert!(d.contains("d"));
    }

    #[test]
    fn non_mapping_source_is_rejected() {
        assert!(Node::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn config_path_parse() {
        let p = ConfigPath::parse("a.b.c!");
        assert_eq!(p.segments(), ["a", "b", "c"]);
        assert!(p.is_replace());
        assert_eq!(p.to_string(), "a.b.c!");
        assert!(ConfigPath::parse("").is_root());
    }
}
