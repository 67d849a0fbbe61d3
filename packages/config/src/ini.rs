//! A small INI-style loader producing typed values.
//!
//! ```text
//! [section]
//! int: 1
//! float = -1.5
//! list: [a, b]
//! multiline =
//!     a
//!     b
//! ```
//!
//! Section names are dotted paths, so `[storage.cache]` nests.

use serde_json::{Map, Value};

use crate::{scalar, ConfigError, Node, Result};

/// Loader for the INI-style text format.
#[derive(Debug, Default, Clone, Copy)]
pub struct IniLoader;

/// A key whose value continues on the following indented lines.
struct Pending {
    path: String,
    indent: usize,
    items: Vec<Value>,
}

impl IniLoader {
    pub fn new() -> Self {
        IniLoader
    }

    /// Parse INI text. `origin` only appears in error messages.
    pub fn load_str(&self, text: &str) -> Result<Node> {
        self.load_str_from(text, "<string>")
    }

    pub(crate) fn load_str_from(&self, text: &str, origin: &str) -> Result<Node> {
        Node::from_value(Value::Object(self.assignments(text, origin)?))
    }

    /// Every assignment as a dotted path, in file order. Paths keep their
    /// `!` marker so the caller decides what it overrides.
    pub(crate) fn assignments(&self, text: &str, origin: &str) -> Result<Map<String, Value>> {
        let mut assignments = Map::new();
        let mut section = String::new();
        let mut pending: Option<Pending> = None;

        let common = common_indent(text);
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.get(common..).unwrap_or_else(|| raw.trim_start());
            let content = line.trim();
            if content.is_empty() || content.starts_with('#') || content.starts_with(';') {
                continue;
            }
            let indent = line.len() - line.trim_start().len();

            if let Some(p) = pending.as_mut() {
                if indent > p.indent {
                    p.items.push(scalar::parse(content));
                    continue;
                }
            }
            if let Some(p) = pending.take() {
                finish(&mut assignments, p);
            }

            if let Some(name) = content.strip_prefix('[').and_then(|c| c.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }

            let Some((key, value)) = split_assignment(content) else {
                return Err(ConfigError::malformed(
                    "ini",
                    origin,
                    format!("line {}: expected `key: value` or `key = value`", lineno + 1),
                ));
            };
            let path = if section.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", section, key)
            };

            if value.is_empty() {
                pending = Some(Pending {
                    path,
                    indent,
                    items: Vec::new(),
                });
            } else {
                assignments.insert(path, scalar::parse(value));
            }
        }

        if let Some(p) = pending.take() {
            finish(&mut assignments, p);
        }
        Ok(assignments)
    }
}

fn finish(assignments: &mut Map<String, Value>, pending: Pending) {
    let value = if pending.items.is_empty() {
        Value::String(String::new())
    } else {
        Value::Array(pending.items)
    };
    assignments.insert(pending.path, value);
}

/// Split on whichever of `:` or `=` comes first.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let at = line.find([':', '='])?;
    let key = line[..at].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[at + 1..].trim()))
}

fn common_indent(text: &str) -> usize {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0)
}
