//! Raw request and response values to templates
//!
//! Requests are written as `"METHOD URL"` or as objects with `method`,
//! `url` (or `origin`/`pathname`/`search`), `headers`, `body` and
//! `computations`. Headers and search accept objects or `[key, value]`
//! pair lists. Responses use `status`, `headers` and `body`; a status of
//! `2xx` stands for any status in that class.

use crate::address::split_url;
use crate::error::{HttpError, Result};
use crate::object::{HttpsRequestObject, HttpsResponseObject};
use courier_expr::to_text;
use courier_pattern::is_templated;
use courier_schema::{Encoding, Template};
use indexmap::IndexMap;
use serde_json::Value;

fn text_pairs(pairs: &[(String, String)]) -> Template {
    Template::KeyedList(pairs.iter().map(|(k, v)| (k.clone(), Template::text(v.clone()))).collect())
}

fn keyed(value: &Value, what: &str) -> Result<Template> {
    match value {
        Value::Object(fields) => Ok(Template::KeyedList(
            fields
                .iter()
                .flat_map(|(key, value)| match value {
                    Value::Array(items) => items.iter().map(|v| (key.clone(), Template::from_value(v))).collect(),
                    other => vec![(key.clone(), Template::from_value(other))],
                })
                .collect(),
        )),
        Value::Array(items) => items
            .iter()
            .map(|item| match item.as_array().map(Vec::as_slice) {
                Some([key, value]) => Ok((to_text(key), Template::from_value(value))),
                _ => Err(HttpError::Template(format!("{what} entry must be a [name, value] pair, found {item}"))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Template::KeyedList),
        Value::Null => Ok(Template::KeyedList(Vec::new())),
        other => Err(HttpError::Template(format!("{what} must be an object or a pair list, found {other}"))),
    }
}

fn method(text: &str) -> Template {
    if is_templated(text) {
        Template::text(text)
    } else {
        Template::text(text.to_ascii_uppercase())
    }
}

fn body(value: &Value) -> Template {
    match value {
        Value::String(text) => Template::text(text.clone()),
        other => Template::from_value(other),
    }
}

fn insert_url(fields: &mut IndexMap<String, Template>, url: &str) {
    let parts = split_url(url);
    if !parts.origin.is_empty() {
        fields.insert("origin".into(), Template::text(parts.origin));
    }
    if !parts.pathname.is_empty() {
        fields.insert("pathname".into(), Template::text(parts.pathname));
    }
    if !parts.search.is_empty() {
        fields.insert("search".into(), text_pairs(&parts.search));
    }
}

/// Request template from a raw value
pub(crate) fn request(value: &Value) -> Result<Template> {
    let mut fields = IndexMap::new();
    match value {
        Value::String(line) => {
            let line = line.trim();
            let (method, url) = line.split_once(char::is_whitespace).unwrap_or(("GET", line));
            fields.insert("method".into(), self::method(method));
            insert_url(&mut fields, url.trim());
        }
        Value::Object(map) => {
            for (key, value) in map {
                match key.as_str() {
                    "method" => {
                        fields.insert("method".into(), self::method(&to_text(value)));
                    }
                    "url" => insert_url(&mut fields, &to_text(value)),
                    "origin" | "pathname" => {
                        fields.insert(key.clone(), Template::from_value(value));
                    }
                    "search" | "headers" => {
                        fields.insert(key.clone(), keyed(value, key)?);
                    }
                    "body" => {
                        fields.insert("body".into(), body(value));
                    }
                    "computations" => {
                        let Value::Object(computations) = value else {
                            return Err(HttpError::Template(format!(
                                "computations must map names to expressions, found {value}"
                            )));
                        };
                        fields.insert(
                            "computations".into(),
                            Template::Object(
                                computations
                                    .iter()
                                    .map(|(name, expr)| (name.clone(), Template::text(to_text(expr))))
                                    .collect(),
                            ),
                        );
                    }
                    other => return Err(HttpError::Template(format!("unknown request field `{other}`"))),
                }
            }
        }
        other => return Err(HttpError::Template(format!("expected a request, found {other}"))),
    }
    Ok(Template::Object(fields))
}

/// Request template holding a concrete request as data
pub(crate) fn request_object(request: &HttpsRequestObject) -> Template {
    let mut fields = IndexMap::new();
    fields.insert("method".into(), Template::text(request.method.to_ascii_uppercase()));
    insert_url(&mut fields, &request.url);
    fields.insert("headers".into(), text_pairs(&request.headers));
    if let Some(text) = &request.body {
        fields.insert("body".into(), Template::text(text.clone()));
    }
    Template::Object(fields)
}

/// Status template; `4xx` becomes a regex-backed anonymous placeholder
pub(crate) fn status(value: &Value) -> Template {
    if let Value::String(text) = value {
        let text = text.trim();
        if let [class @ b'1'..=b'5', rest @ ..] = text.as_bytes() {
            if rest.eq_ignore_ascii_case(b"xx") {
                return Template::text(format!("{{{{ % /{}\\d\\d/}}}}", char::from(*class)));
            }
        }
        if let Ok(code) = text.parse::<u16>() {
            return Template::Value(Value::from(code));
        }
    }
    Template::from_value(value)
}

/// Response template from a raw value
pub(crate) fn response(value: &Value) -> Result<Template> {
    let mut fields = IndexMap::new();
    match value {
        Value::Number(_) | Value::String(_) => {
            fields.insert("status".into(), status(value));
        }
        Value::Object(map) => {
            for (key, value) in map {
                match key.as_str() {
                    "status" => {
                        fields.insert("status".into(), status(value));
                    }
                    "headers" => {
                        fields.insert("headers".into(), keyed(value, key)?);
                    }
                    "body" => {
                        fields.insert("body".into(), body(value));
                    }
                    "statusText" | "status_text" => {}
                    other => return Err(HttpError::Template(format!("unknown response field `{other}`"))),
                }
            }
        }
        other => return Err(HttpError::Template(format!("expected a response, found {other}"))),
    }
    Ok(Template::Object(fields))
}

/// Response template holding a concrete response as data
pub(crate) fn response_object(response: &HttpsResponseObject) -> Template {
    let mut fields = IndexMap::new();
    fields.insert("status".into(), Template::Value(Value::from(response.status)));
    fields.insert("headers".into(), text_pairs(&response.headers));
    if let Some(text) = &response.body {
        fields.insert("body".into(), Template::text(text.clone()));
    }
    Template::Object(fields)
}

/// Encoding declared by a literal `content-type` entry of a header template
pub(crate) fn declared_encoding(fields: &IndexMap<String, Template>) -> Option<Encoding> {
    let Some(Template::KeyedList(headers)) = fields.get("headers") else {
        return None;
    };
    headers.iter().find_map(|(name, value)| match value {
        Template::Value(Value::String(content_type)) if name.eq_ignore_ascii_case("content-type") => {
            Encoding::from_content_type(content_type)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_line() {
        let Template::Object(fields) = request(&json!("post https://h.io/a?x=1")).unwrap() else {
            panic!("expected object");
        };
        assert_eq!(fields["method"], Template::text("POST"));
        assert_eq!(fields["origin"], Template::text("https://h.io"));
        assert_eq!(fields["pathname"], Template::text("/a"));
        assert_eq!(fields["search"], Template::KeyedList(vec![("x".into(), Template::text("1"))]));
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(matches!(request(&json!({"verb": "GET"})), Err(HttpError::Template(_))));
    }

    #[test]
    fn status_shorthand() {
        assert_eq!(status(&json!("2xx")), Template::text("{{ % /2\\d\\d/}}"));
        assert_eq!(status(&json!("404")), Template::Value(json!(404)));
        assert_eq!(status(&json!(201)), Template::Value(json!(201)));
    }

    #[test]
    fn content_type_declares_encoding() {
        let Template::Object(fields) =
            request(&json!({"headers": {"Content-Type": "application/x-www-form-urlencoded"}})).unwrap()
        else {
            panic!("expected object");
        };
        assert_eq!(declared_encoding(&fields), Some(Encoding::Form));
    }
}
