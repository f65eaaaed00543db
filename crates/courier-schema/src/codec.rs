//! Encoding codecs

use crate::{Encoding, Template};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use courier_expr::to_text;
use serde_json::Value;
use url::form_urlencoded;

/// Decode `text` into a template
///
/// # Errors
/// Returns a description of why `text` is not valid for `encoding`.
pub fn decode(encoding: Encoding, text: &str) -> Result<Template, String> {
    match encoding {
        Encoding::Json => serde_json::from_str::<Value>(text)
            .map(|value| Template::from_value(&value))
            .map_err(|e| format!("invalid json: {e}")),
        Encoding::Form => Ok(Template::KeyedList(
            form_urlencoded::parse(text.as_bytes())
                .map(|(k, v)| (k.into_owned(), Template::text(v.into_owned())))
                .collect(),
        )),
        Encoding::Base64 => {
            let bytes = STANDARD
                .decode(text.trim())
                .map_err(|e| format!("invalid base64: {e}"))?;
            String::from_utf8(bytes)
                .map(Template::text)
                .map_err(|e| format!("base64 content is not utf-8: {e}"))
        }
        Encoding::Text => Ok(Template::text(text)),
    }
}

/// Encode a rendered value
///
/// Form encoding takes an object or a list of `[key, value]` pairs; array
/// field values repeat the key.
///
/// # Errors
/// Returns a description of why `value` cannot be encoded.
pub fn encode(encoding: Encoding, value: &Value) -> Result<String, String> {
    match encoding {
        Encoding::Json => serde_json::to_string(value).map_err(|e| e.to_string()),
        Encoding::Form => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in form_pairs(value)? {
                serializer.append_pair(&key, &value);
            }
            Ok(serializer.finish())
        }
        Encoding::Base64 => Ok(STANDARD.encode(to_text(value))),
        Encoding::Text => Ok(to_text(value)),
    }
}

fn form_pairs(value: &Value) -> Result<Vec<(String, String)>, String> {
    match value {
        Value::Object(fields) => Ok(fields
            .iter()
            .flat_map(|(key, value)| match value {
                Value::Array(items) => items.iter().map(|v| (key.clone(), to_text(v))).collect(),
                other => vec![(key.clone(), to_text(other))],
            })
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([key, value]) => Ok((to_text(key), to_text(value))),
                _ => Err(format!("form entry must be a [key, value] pair, found {item}")),
            })
            .collect(),
        other => Err(format!("cannot form-encode {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn form_round_trip() {
        let text = encode(Encoding::Form, &json!({"q": "a b", "tag": ["x", "y"]})).unwrap();
        assert_eq!(text, "q=a+b&tag=x&tag=y");
        let Template::KeyedList(pairs) = decode(Encoding::Form, &text).unwrap() else {
            panic!("expected keyed list");
        };
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], ("q".to_string(), Template::text("a b")));
    }

    #[test]
    fn json_keeps_number_text() {
        let Template::Object(fields) = decode(Encoding::Json, r#"{"price": 1.50}"#).unwrap() else {
            panic!("expected object");
        };
        let Template::Value(price) = &fields["price"] else {
            panic!("expected value");
        };
        assert_eq!(encode(Encoding::Json, price).unwrap(), "1.50");
    }

    #[test]
    fn base64() {
        assert_eq!(encode(Encoding::Base64, &json!("user:pass")).unwrap(), "dXNlcjpwYXNz");
        assert_eq!(decode(Encoding::Base64, "dXNlcjpwYXNz").unwrap(), Template::text("user:pass"));
        assert!(decode(Encoding::Base64, "!!").is_err());
    }
}
