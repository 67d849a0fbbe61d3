//! Typing of scalar text.
//!
//! Shared by the INI loader and the reference pass: text becomes the most
//! specific value it can represent.

use serde_json::{Number, Value};

/// Parse `text` into an integer, float, boolean, list or string, in that
/// order of preference.
///
/// Lists are bracket delimited and comma separated; items are typed
/// recursively and may themselves be lists.
///
/// ```rust
/// use cairn_config::scalar::parse;
/// use serde_json::json;
///
/// assert_eq!(parse("-3"), json!(-3));
/// assert_eq!(parse("1.5"), json!(1.5));
/// assert_eq!(parse("[a, 2, [3]]"), json!(["a", 2, [3]]));
/// assert_eq!(parse("hello"), json!("hello"));
/// ```
pub fn parse(text: &str) -> Value {
    let text = text.trim();

    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return Value::Array(split_list(inner).into_iter().map(parse).collect());
    }

    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }

    if looks_like_float(text) {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }

    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

// Rust accepts "inf" and "NaN" as floats; configuration text should not.
fn looks_like_float(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
}

fn split_list(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_with_sign() {
        assert_eq!(parse("1"), json!(1));
        assert_eq!(parse("+7"), json!(7));
        assert_eq!(parse(" -12 "), json!(-12));
    }

    #[test]
    fn floats_with_sign() {
        assert_eq!(parse("1.1"), json!(1.1));
        assert_eq!(parse("-0.5"), json!(-0.5));
        assert_eq!(parse("1e3"), json!(1000.0));
    }

    #[test]
    fn non_numeric_words_stay_strings() {
        assert_eq!(parse("inf"), json!("inf"));
        assert_eq!(parse("NaN"), json!("NaN"));
        assert_eq!(parse("1.2.3"), json!("1.2.3"));
    }

    #[test]
    fn lists() {
        assert_eq!(parse("[a,b]"), json!(["a", "b"]));
        assert_eq!(parse("[2]"), json!([2]));
        assert_eq!(parse("[]"), json!([]));
        assert_eq!(parse("[1, [2, x], 3.5]"), json!([1, [2, "x"], 3.5]));
    }

    #[test]
    fn booleans() {
        assert_eq!(parse("true"), json!(true));
        assert_eq!(parse("false"), json!(false));
    }
}
