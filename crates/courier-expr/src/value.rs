//! Value helpers shared by the interpreter and the template engine

use indexmap::IndexMap;
use serde_json::{Number, Value};

/// Named values visible to expressions
pub type Bindings = IndexMap<String, Value>;

/// Textual form of a value
///
/// Strings are unquoted, numbers keep their source text, containers are JSON.
#[must_use]
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Truthiness used by `!`, `&&`, `||` and conditionals
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality that compares numbers by value (`1 == 1.0`)
#[must_use]
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.to_string() == y.to_string(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| loosely_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| loosely_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Number from an `f64`, preferring an integer representation
#[must_use]
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        return Value::Number(Number::from(value as i64));
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Look up a dotted path (`user.id`) in bindings
#[must_use]
pub fn lookup_path<'a>(bindings: &'a Bindings, path: &str) -> Option<&'a Value> {
    if let Some(value) = bindings.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = bindings.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_of_scalars() {
        assert_eq!(to_text(&json!("a")), "a");
        assert_eq!(to_text(&json!(5)), "5");
        assert_eq!(to_text(&json!(null)), "null");
    }

    #[test]
    fn numbers_keep_source_text() {
        let value: Value = serde_json::from_str("1.50").unwrap();
        assert_eq!(to_text(&value), "1.50");
    }

    #[test]
    fn loose_number_equality() {
        let a: Value = serde_json::from_str("1.0").unwrap();
        assert!(loosely_equal(&a, &json!(1)));
    }

    #[test]
    fn dotted_lookup() {
        let mut b = Bindings::new();
        b.insert("user".into(), json!({"id": 7, "tags": ["x"]}));
        assert_eq!(lookup_path(&b, "user.id"), Some(&json!(7)));
        assert_eq!(lookup_path(&b, "user.tags.0"), Some(&json!("x")));
        assert_eq!(lookup_path(&b, "user.missing"), None);
    }

    #[test]
    fn integral_numbers() {
        assert_eq!(number(6.0), json!(6));
    }
}
