//! Raw template shapes and expression lowering

use crate::LowerError;
use courier_expr::{Expr, UnaryOp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Content encoding wrapping a nested template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// `application/json`
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
    /// Base64 text of the inner value
    Base64,
    /// Plain text
    Text,
}

impl Encoding {
    /// Encoding named by an encoding call (`json(...)`)
    #[must_use]
    pub fn from_call(name: &str) -> Option<Self> {
        match name {
            "json" => Some(Self::Json),
            "form" => Some(Self::Form),
            "base64" => Some(Self::Base64),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Encoding declared by a `content-type` value
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Some(Self::Json)
        } else if essence == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else if essence.starts_with("text/") {
            Some(Self::Text)
        } else {
            None
        }
    }

    /// Canonical `content-type`
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
            Self::Base64 => "application/octet-stream",
            Self::Text => "text/plain",
        }
    }

    /// Call name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Form => "form",
            Self::Base64 => "base64",
            Self::Text => "text",
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw nested template before schema expansion
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Scalar leaf; strings may carry placeholders
    Value(Value),
    /// Keyed fields
    Object(IndexMap<String, Template>),
    /// Ordered elements
    Array(Vec<Template>),
    /// Ordered, possibly repeated key/value pairs (headers, search params)
    KeyedList(Vec<(String, Template)>),
    /// Nested template serialized with an encoding
    Encoded {
        /// Encoding
        encoding: Encoding,
        /// Encoded content
        inner: Box<Template>,
    },
    /// Alias for a bound identifier
    Reference(String),
}

impl Template {
    /// Template from a JSON value by shape
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_value(v)))
                    .collect(),
            ),
            Value::Array(items) => Self::Array(items.iter().map(Self::from_value).collect()),
            scalar => Self::Value(scalar.clone()),
        }
    }

    /// String leaf
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Value(Value::String(text.into()))
    }

    /// Concrete value of the template, if it carries no references
    ///
    /// Keyed lists become arrays of `[key, value]` pairs.
    #[must_use]
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value.clone()),
            Self::Object(fields) => {
                let mut map = Map::new();
                for (key, field) in fields {
                    map.insert(key.clone(), field.to_value()?);
                }
                Some(Value::Object(map))
            }
            Self::Array(items) => items
                .iter()
                .map(Self::to_value)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::KeyedList(entries) => entries
                .iter()
                .map(|(k, v)| Some(Value::Array(vec![Value::String(k.clone()), v.to_value()?])))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Self::Encoded { inner, .. } => inner.to_value(),
            Self::Reference(_) => None,
        }
    }

    /// Short name of the shape, used in diagnostics
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Value(Value::String(_)) => "string",
            Self::Value(Value::Number(_)) => "number",
            Self::Value(Value::Bool(_)) => "boolean",
            Self::Value(Value::Null) => "null",
            Self::Value(_) | Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::KeyedList(_) => "keyed list",
            Self::Encoded { .. } => "encoded",
            Self::Reference(_) => "reference",
        }
    }
}

impl From<Value> for Template {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}

/// Lower a parsed expression to a template
///
/// Encoding calls become [`Template::Encoded`], literals become leaves,
/// identifiers and member paths become references and `name = expr`
/// becomes a computed placeholder.
///
/// # Errors
/// Returns [`LowerError`] for expressions with no template form.
pub fn lower(expr: &Expr) -> Result<Template, LowerError> {
    match expr {
        Expr::Literal(value) => Ok(Template::Value(value.clone())),
        Expr::Interpolation(text) => Ok(Template::text(text.clone())),
        Expr::Unary {
            op: UnaryOp::Neg,
            expr: operand,
        } => match operand.as_ref() {
            Expr::Literal(Value::Number(n)) => format!("-{n}")
                .parse::<serde_json::Number>()
                .map(|n| Template::Value(Value::Number(n)))
                .map_err(|_| LowerError::Unsupported(expr.to_string())),
            _ => Err(LowerError::Unsupported(expr.to_string())),
        },
        Expr::Ident(_) | Expr::Member { .. } => {
            member_path(expr).map(Template::Reference).ok_or_else(|| LowerError::Unsupported(expr.to_string()))
        }
        Expr::Object(fields) => fields
            .iter()
            .map(|(key, value)| Ok((key.clone(), lower(value)?)))
            .collect::<Result<IndexMap<_, _>, LowerError>>()
            .map(Template::Object),
        Expr::Array(items) => items
            .iter()
            .map(lower)
            .collect::<Result<Vec<_>, _>>()
            .map(Template::Array),
        Expr::Assign { name, value } => Ok(Template::text(format!("{{{{ {name} = {value} }}}}"))),
        Expr::Call { args, .. } => {
            let name = expr.call_name().unwrap_or_default();
            let Some(encoding) = Encoding::from_call(name) else {
                return Err(LowerError::Unsupported(expr.to_string()));
            };
            let [arg] = args.as_slice() else {
                return Err(LowerError::Arity {
                    name: name.to_string(),
                    count: args.len(),
                });
            };
            Ok(Template::Encoded {
                encoding,
                inner: Box::new(lower(arg)?),
            })
        }
        other => Err(LowerError::Unsupported(other.to_string())),
    }
}

fn member_path(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member { object, property } => Some(format!("{}.{property}", member_path(object)?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_expr::parse_expression;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn content_types() {
        assert_eq!(Encoding::from_content_type("application/json; charset=utf-8"), Some(Encoding::Json));
        assert_eq!(Encoding::from_content_type("application/problem+json"), Some(Encoding::Json));
        assert_eq!(Encoding::from_content_type("text/html"), Some(Encoding::Text));
        assert_eq!(Encoding::from_content_type("image/png"), None);
    }

    #[test]
    fn lower_json_call() {
        let expr = parse_expression("json({ id: user.id, name: '{{name}}', tags: [1] })").unwrap();
        let template = lower(&expr).unwrap();
        let Template::Encoded { encoding, inner } = template else {
            panic!("expected encoded template");
        };
        assert_eq!(encoding, Encoding::Json);
        let Template::Object(fields) = *inner else {
            panic!("expected object");
        };
        assert_eq!(fields["id"], Template::Reference("user.id".into()));
        assert_eq!(fields["name"], Template::text("{{name}}"));
        assert_eq!(fields["tags"], Template::Array(vec![Template::Value(json!(1))]));
    }

    #[test]
    fn lower_computed_field() {
        let expr = parse_expression("form({ page: next = page + 1 })").unwrap();
        let Template::Encoded { inner, .. } = lower(&expr).unwrap() else {
            panic!("expected encoded template");
        };
        let Template::Object(fields) = *inner else {
            panic!("expected object");
        };
        assert_eq!(fields["page"], Template::text("{{ next = page + 1 }}"));
    }

    #[test]
    fn lower_rejects_arithmetic() {
        let expr = parse_expression("a + 1").unwrap();
        assert!(matches!(lower(&expr), Err(LowerError::Unsupported(_))));
    }

    #[test]
    fn lower_checks_arity() {
        let expr = parse_expression("json(a, b)").unwrap();
        assert!(matches!(lower(&expr), Err(LowerError::Arity { count: 2, .. })));
    }

    #[test]
    fn keyed_list_value() {
        let template = Template::KeyedList(vec![("a".into(), Template::text("1"))]);
        assert_eq!(template.to_value(), Some(json!([["a", "1"]])));
    }
}
