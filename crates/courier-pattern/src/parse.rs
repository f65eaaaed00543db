//! Placeholder syntax
//!
//! `{{ hints name [= expression] [% /regex/] }}`

use crate::hints::Hints;
use crate::PatternError;
use serde::{Deserialize, Serialize};

/// A variable bound by a placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternVar {
    /// Variable name (empty for anonymous placeholders)
    pub param: String,
    /// Hints from the placeholder prefix
    pub hint: Hints,
    /// Placeholder text including braces
    pub source: String,
    /// Computed-binding expression after `=`
    pub expression: Option<String>,
    /// Regex override after `%`
    pub regex: Option<String>,
}

impl PatternVar {
    /// Anonymous placeholders match but bind nothing
    #[inline]
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.param.is_empty()
    }
}

/// Piece of a parsed pattern source
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Text(String),
    Var(usize),
}

/// Split `source` into literal text and placeholders
pub(crate) fn parse_segments(source: &str) -> Result<(Vec<Segment>, Vec<PatternVar>), PatternError> {
    let mut segments = Vec::new();
    let mut vars = Vec::new();
    let mut text = String::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        text.push_str(&rest[..start]);
        let body_start = start + 2;
        let end = find_close(&rest[body_start..]).ok_or_else(|| PatternError::Syntax {
            offset: offset + start,
            message: "unterminated placeholder".to_string(),
        })?;
        let body = &rest[body_start..body_start + end];
        let placeholder = &rest[start..body_start + end + 2];

        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }
        let var = parse_placeholder(body, placeholder, offset + body_start)?;
        segments.push(Segment::Var(vars.len()));
        vars.push(var);

        let consumed = body_start + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok((segments, vars))
}

/// Find the `}}` closing a placeholder body, skipping nested braces and quotes
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn parse_placeholder(body: &str, source: &str, offset: usize) -> Result<PatternVar, PatternError> {
    let trimmed = body.trim();
    let (hint, rest) = Hints::split_prefix(trimmed);
    let rest = rest.trim_start();

    let name_len = rest
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map_or(rest.len(), |(i, _)| i);
    let param = &rest[..name_len];
    if param.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(PatternError::Syntax {
            offset,
            message: format!("invalid placeholder name `{param}`"),
        });
    }

    let mut tail = rest[name_len..].trim();
    let mut expression = None;
    let mut regex = None;

    if let Some((before, re)) = split_regex(tail) {
        regex = Some(re.to_string());
        tail = before.trim();
    }
    if let Some(expr) = tail.strip_prefix('=') {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(PatternError::Syntax {
                offset,
                message: "missing expression after `=`".to_string(),
            });
        }
        expression = Some(expr.to_string());
    } else if !tail.is_empty() {
        return Err(PatternError::Syntax {
            offset,
            message: format!("unexpected `{tail}` in placeholder"),
        });
    }

    Ok(PatternVar {
        param: param.to_string(),
        hint,
        source: source.to_string(),
        expression,
        regex,
    })
}

/// Split a trailing `% /regex/` off a placeholder tail
fn split_regex(tail: &str) -> Option<(&str, &str)> {
    if !tail.ends_with('/') {
        return None;
    }
    let mut search = tail.len();
    while let Some(at) = tail[..search].rfind('%') {
        let after = tail[at + 1..].trim_start();
        if after.len() >= 2 && after.starts_with('/') {
            return Some((&tail[..at], &after[1..after.len() - 1]));
        }
        search = at;
    }
    None
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_vars() {
        let (segments, vars) = parse_segments("/users/{{id}}/posts").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(vars[0].param, "id");
        assert_eq!(vars[0].source, "{{id}}");
    }

    #[test]
    fn expression_and_regex() {
        let (_, vars) = parse_segments("{{?n = (a + 1) % /\\d+/}}").unwrap();
        let var = &vars[0];
        assert!(var.hint.is_optional());
        assert_eq!(var.param, "n");
        assert_eq!(var.expression.as_deref(), Some("(a + 1)"));
        assert_eq!(var.regex.as_deref(), Some("\\d+"));
    }

    #[test]
    fn modulo_in_expression_is_not_a_regex() {
        let (_, vars) = parse_segments("{{n = a % 2}}").unwrap();
        assert_eq!(vars[0].expression.as_deref(), Some("a % 2"));
        assert!(vars[0].regex.is_none());
    }

    #[test]
    fn nested_braces_in_expression() {
        let (_, vars) = parse_segments("{{o = {a: 1}}}").unwrap();
        assert_eq!(vars[0].expression.as_deref(), Some("{a: 1}"));
    }

    #[test]
    fn anonymous_placeholder() {
        let (_, vars) = parse_segments("{{}}").unwrap();
        assert!(vars[0].is_anonymous());
    }

    #[test]
    fn unterminated_is_located() {
        let err = parse_segments("abc{{name").unwrap_err();
        assert!(matches!(err, PatternError::Syntax { offset: 3, .. }));
    }

    #[test]
    fn garbage_after_name() {
        assert!(parse_segments("{{name junk}}").is_err());
    }
}
