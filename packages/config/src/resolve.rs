//! Tree-wide rewrite of environment references.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::{scalar, Node};

lazy_static! {
    static ref REFERENCE: Regex =
        Regex::new(r"^\$(?:([A-Za-z_][A-Za-z0-9_]*)|\{([A-Za-z_][A-Za-z0-9_]*)(?::-(.*))?\})$")
            .unwrap();
}

/// Replace every string leaf that is a whole reference (`$NAME`, `${NAME}`
/// or `${NAME:-default}`) with the looked-up text, typed as precisely as
/// possible.
///
/// References that resolve to nothing and have no default are left as they
/// are, so running the pass twice changes nothing the second time.
///
/// Returns the number of leaves rewritten.
pub fn resolve_references<F>(node: &mut Node, lookup: F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    let mut rewritten = 0;
    for (_, value) in node.as_map_mut().iter_mut() {
        rewritten += walk(value, &lookup);
    }
    tracing::debug!(rewritten, "resolved configuration references");
    rewritten
}

/// [`resolve_references`] against the process environment.
pub fn resolve_env(node: &mut Node) -> usize {
    resolve_references(node, |name| std::env::var(name).ok())
}

fn walk<F>(value: &mut Value, lookup: &F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::Object(map) => map.iter_mut().map(|(_, v)| walk(v, lookup)).sum(),
        Value::Array(items) => items.iter_mut().map(|v| walk(v, lookup)).sum(),
        Value::String(text) => match resolve_one(text, lookup) {
            Some(resolved) => {
                *value = scalar::parse(&resolved);
                1
            }
            None => 0,
        },
        _ => 0,
    }
}

fn resolve_one<F>(text: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let captures = REFERENCE.captures(text)?;
    let name = captures.get(1).or_else(|| captures.get(2))?.as_str();
    lookup(name).or_else(|| captures.get(3).map(|d| d.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env() -> HashMap<&'static str, &'static str> {
        HashMap::from([("ONE", "1"), ("LIST", "[2]"), ("DIR", "/data"), ("PI", "2.5")])
    }

    #[test]
    fn references_are_typed() {
        let env = env();
        let mut node = Node::from_value(json!({
            "a": "$ONE",
            "b": {"c": "${LIST}", "d": ["${DIR}", "plain"]},
            "e": "${MISSING:-7}",
            "f": "$MISSING",
            "g": "not $ONE",
            "h": "$PI",
        }))
        .unwrap();

        let n = resolve_references(&mut node, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(n, 5);
        assert_eq!(node.get("a"), Some(&json!(1)));
        assert_eq!(node.get("b.c"), Some(&json!([2])));
        assert_eq!(node.get("b.d"), Some(&json!(["/data", "plain"])));
        assert_eq!(node.get("e"), Some(&json!(7)));
        assert_eq!(node.get("f"), Some(&json!("$MISSING")));
        assert_eq!(node.get("g"), Some(&json!("not $ONE")));
        assert_eq!(node.get("h"), Some(&json!(2.5)));
    }

    #[test]
    fn pass_is_idempotent() {
        let env = env();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        let mut node = Node::from_value(json!({"a": "$ONE", "f": "$MISSING"})).unwrap();
        resolve_references(&mut node, lookup);
        let once = node.clone();
        assert_eq!(resolve_references(&mut node, lookup), 0);
        assert_eq!(node, once);
    }
}
