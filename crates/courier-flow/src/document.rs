//! Flow documents
//!
//! A document is an optional YAML configuration block followed by steps:
//!
//! ```text
//! attempts: 2
//! defaults: { page: 1 }
//!
//! >>> list/1
//! GET https://{{host}}/items?page={{page}}
//! Accept: application/json
//!
//! <<< 2xx next
//!
//! {"items": "{{items}}"}
//!
//! ::: next
//! page = page + 1
//! ```
//!
//! `>>> [name]` opens a request (method line, headers, blank line, body),
//! `<<< [status] [outcome]` an expected response of the same shape without
//! the method line, and `::: [name]` a script. Lines starting with `#` are
//! comments everywhere except inside bodies and scripts.

use crate::compiler::SequenceStep;
use crate::config::SequenceConfiguration;
use crate::error::{FlowError, Result};
use serde_json::{json, Map, Value};

const REQUEST: &str = ">>>";
const RESPONSE: &str = "<<<";
const SCRIPT: &str = ":::";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Request,
    Response,
    Script,
}

fn marker(line: &str) -> Option<(Marker, &str)> {
    [(REQUEST, Marker::Request), (RESPONSE, Marker::Response), (SCRIPT, Marker::Script)]
        .into_iter()
        .find_map(|(prefix, kind)| line.strip_prefix(prefix).map(|rest| (kind, rest.trim())))
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn optional(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

/// Header lines up to the first blank line, then the body
fn head_and_body(lines: &[&str], start: usize) -> Result<(Vec<Value>, Option<String>)> {
    let mut headers = Vec::new();
    let mut rest = lines.iter().skip(start);
    for line in rest.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if is_comment(line) {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(FlowError::Parse(format!(
                "expected `Name: value` header, found `{}`",
                line.trim()
            )));
        };
        headers.push(json!([name.trim(), value.trim()]));
    }
    let body = rest.copied().collect::<Vec<_>>().join("\n");
    Ok((headers, optional(body.trim_matches('\n').trim_end())))
}

fn message(fields: Vec<(&str, Value)>, headers: Vec<Value>, body: Option<String>) -> Value {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key.to_string(), value);
    }
    if !headers.is_empty() {
        map.insert("headers".into(), Value::Array(headers));
    }
    if let Some(body) = body {
        map.insert("body".into(), Value::String(body));
    }
    Value::Object(map)
}

fn request_step(name: &str, lines: &[&str]) -> Result<SequenceStep> {
    let Some(start) = lines.iter().position(|line| !line.trim().is_empty() && !is_comment(line)) else {
        return Err(FlowError::Parse(format!("request `{name}` has no method line")));
    };
    let line = lines[start].trim();
    let (method, url) = line.split_once(char::is_whitespace).unwrap_or(("GET", line));
    let (headers, body) = head_and_body(lines, start + 1)?;
    let template = message(
        vec![("method", json!(method)), ("url", json!(url.trim()))],
        headers,
        body,
    );
    Ok(SequenceStep::Request {
        name: optional(name),
        template,
    })
}

fn response_step(header: &str, lines: &[&str]) -> Result<SequenceStep> {
    let mut words = header.split_whitespace();
    let status = words.next();
    let outcome = words.next().map(str::to_string);
    if let Some(extra) = words.next() {
        return Err(FlowError::Parse(format!("unexpected `{extra}` after response outcome")));
    }
    let (headers, body) = head_and_body(lines, 0)?;
    let fields = status.map(|status| vec![("status", json!(status))]).unwrap_or_default();
    Ok(SequenceStep::Response {
        template: message(fields, headers, body),
        outcome,
    })
}

fn script_step(name: &str, lines: &[&str]) -> SequenceStep {
    SequenceStep::Script {
        name: optional(name),
        source: lines.join("\n").trim().to_string(),
    }
}

/// Parse a flow document into its configuration and steps
///
/// # Errors
/// Returns [`FlowError::Parse`] for invalid configuration YAML, a request
/// without a method line or a malformed header.
pub fn parse_document(text: &str) -> Result<(SequenceConfiguration, Vec<SequenceStep>)> {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines
        .iter()
        .position(|line| marker(line).is_some())
        .unwrap_or(lines.len());

    let yaml: Vec<&str> = lines[..first].iter().copied().filter(|line| !is_comment(line)).collect();
    let configuration = SequenceConfiguration::from_yaml(&yaml.join("\n"))
        .map_err(|e| FlowError::Parse(format!("configuration: {e}")))?;

    let mut steps = Vec::new();
    let mut at = first;
    while at < lines.len() {
        let Some((kind, header)) = marker(lines[at]) else {
            at += 1;
            continue;
        };
        let end = lines[at + 1..]
            .iter()
            .position(|line| marker(line).is_some())
            .map_or(lines.len(), |offset| at + 1 + offset);
        let block = &lines[at + 1..end];
        steps.push(match kind {
            Marker::Request => request_step(header, block)?,
            Marker::Response => response_step(header, block)?,
            Marker::Script => script_step(header, block),
        });
        at = end;
    }

    tracing::debug!(steps = steps.len(), "flow document parsed");
    Ok((configuration, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"# paging
attempts: 2
defaults:
  page: 1

>>> list/1
POST https://{{host}}/items
# comment
Content-Type: application/json

{"page": "{{page}}"}

<<< 2xx next+10ms
x-total: {{total}}

<<< 404 fail

::: next
page = page + 1
"#;

    #[test]
    fn parses_steps() {
        let (configuration, steps) = parse_document(DOCUMENT).unwrap();
        assert_eq!(configuration.attempts(), 2);
        assert_eq!(configuration.defaults["page"], json!(1));
        assert_eq!(steps.len(), 4);
        assert_eq!(
            steps[0],
            SequenceStep::Request {
                name: Some("list/1".into()),
                template: json!({
                    "method": "POST",
                    "url": "https://{{host}}/items",
                    "headers": [["Content-Type", "application/json"]],
                    "body": "{\"page\": \"{{page}}\"}"
                }),
            }
        );
        assert_eq!(
            steps[1],
            SequenceStep::Response {
                template: json!({"status": "2xx", "headers": [["x-total", "{{total}}"]]}),
                outcome: Some("next+10ms".into()),
            }
        );
        assert_eq!(
            steps[2],
            SequenceStep::Response {
                template: json!({"status": "404"}),
                outcome: Some("fail".into()),
            }
        );
        assert_eq!(
            steps[3],
            SequenceStep::Script {
                name: Some("next".into()),
                source: "page = page + 1".into(),
            }
        );
    }

    #[test]
    fn bare_document() {
        let (configuration, steps) = parse_document(">>>\nGET /ping\n<<<\n").unwrap();
        assert_eq!(configuration, SequenceConfiguration::default());
        assert_eq!(
            steps,
            vec![
                SequenceStep::Request {
                    name: None,
                    template: json!({"method": "GET", "url": "/ping"}),
                },
                SequenceStep::Response {
                    template: json!({}),
                    outcome: None,
                },
            ]
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_document(">>> a\n\n").is_err());
        assert!(parse_document(">>> a\nGET /\nnot a header\n").is_err());
        assert!(parse_document("attempts: [\n>>>\nGET /\n").is_err());
    }
}
