//! Message bodies
//!
//! An unannotated body string is tried against each way it could be read,
//! in order, until one merges:
//!
//! 1. the encoding an earlier merge already settled on
//! 2. an encoding call such as `form({ q: '{{q}}' })`
//! 3. a JSON literal
//! 4. the encoding declared by `content-type`, else the default
//! 5. opaque text
//!
//! A failed attempt leaves no trace; only when every attempt fails are the
//! diagnostics of the first one kept.

use courier_expr::parse_expression;
use courier_schema::{
    expand, lower, Diagnostic, Encoding, MergeContext, Mode, RenderError, RenderPass, Schema, SchemaRef, Scope,
    Template,
};
use serde_json::Value;
use std::sync::Arc;

/// Body position of a request or response
#[derive(Debug, Clone, Default)]
pub struct BodySchema {
    inner: Option<SchemaRef>,
    declared: Option<Encoding>,
    fallback: Encoding,
}

impl BodySchema {
    /// Empty body falling back to `fallback` for undeclared content
    #[inline]
    #[must_use]
    pub fn new(fallback: Encoding) -> Self {
        Self {
            inner: None,
            declared: None,
            fallback,
        }
    }

    /// Same body with the encoding a `content-type` header declares
    #[must_use]
    pub fn declared(&self, encoding: Option<Encoding>) -> Self {
        Self {
            declared: encoding.or(self.declared),
            ..self.clone()
        }
    }

    /// Encoded content, once a merge has settled on one
    #[inline]
    #[must_use]
    pub fn inner(&self) -> Option<&SchemaRef> {
        self.inner.as_ref()
    }

    fn with_inner(&self, inner: SchemaRef) -> Self {
        Self {
            inner: Some(inner),
            ..self.clone()
        }
    }

    /// Merge `template` into this body
    ///
    /// Returns `None` after recording diagnostics on `ctx`.
    pub fn merge_body(&self, template: &Template, ctx: &mut MergeContext) -> Option<Self> {
        if ctx.mode() == Mode::Match && self.inner.is_none() {
            return Some(self.clone());
        }
        match template {
            Template::Value(Value::Null) => Some(self.clone()),
            Template::Value(Value::String(text)) => self.merge_text(text, ctx),
            Template::Encoded { .. } => self.attempt(template, ctx, &mut None, "annotated"),
            structured if self.inner.is_some() => self.attempt(structured, ctx, &mut None, "structured"),
            structured => {
                let encoded = Template::Encoded {
                    encoding: self.declared.unwrap_or(self.fallback),
                    inner: Box::new(structured.clone()),
                };
                self.attempt(&encoded, ctx, &mut None, "structured")
            }
        }
    }

    fn merge_text(&self, text: &str, ctx: &mut MergeContext) -> Option<Self> {
        let mut failure = None;

        if self.inner.as_ref().and_then(|s| s.encoding()).is_some() {
            let raw = Template::Value(Value::String(text.to_string()));
            if let Some(body) = self.attempt(&raw, ctx, &mut failure, "existing") {
                return Some(body);
            }
        }

        if let Some(call) = encoding_call(text) {
            if let Some(body) = self.attempt(&call, ctx, &mut failure, "call") {
                return Some(body);
            }
        }

        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(text) {
                let literal = Template::Encoded {
                    encoding: Encoding::Json,
                    inner: Box::new(Template::from_value(&value)),
                };
                if let Some(body) = self.attempt(&literal, ctx, &mut failure, "json") {
                    return Some(body);
                }
            }
        }

        let encoding = self.declared.unwrap_or(self.fallback);
        if let Ok(decoded) = courier_schema::codec::decode(encoding, text) {
            let declared = Template::Encoded {
                encoding,
                inner: Box::new(decoded),
            };
            if let Some(body) = self.attempt(&declared, ctx, &mut failure, "declared") {
                return Some(body);
            }
        }

        let opaque = Template::Encoded {
            encoding: Encoding::Text,
            inner: Box::new(Template::text(text)),
        };
        if let Some(body) = self.attempt(&opaque, ctx, &mut failure, "text") {
            return Some(body);
        }

        if let Some(failed) = failure {
            *ctx = failed;
        }
        None
    }

    /// Merge on a scratch context, committing it only on success
    fn attempt(
        &self,
        template: &Template,
        ctx: &mut MergeContext,
        failure: &mut Option<MergeContext>,
        step: &'static str,
    ) -> Option<Self> {
        let mut scratch = ctx.clone();
        let merged = match &self.inner {
            Some(inner) => inner.merge(template, &mut scratch),
            None => expand(template, &mut scratch),
        };
        match merged {
            Some(inner) => {
                tracing::debug!(step, encoding = ?inner.encoding(), "body read");
                *ctx = scratch;
                Some(self.with_inner(inner))
            }
            None => {
                failure.get_or_insert(scratch);
                None
            }
        }
    }
}

fn encoding_call(text: &str) -> Option<Template> {
    let expr = parse_expression(text.trim()).ok()?;
    Encoding::from_call(expr.call_name()?)?;
    lower(&expr).ok()
}

#[async_trait::async_trait]
impl Schema for BodySchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        if let Some(inner) = &self.inner {
            inner.scope(scope, diagnostics);
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        self.merge_body(template, ctx).map(|body| Arc::new(body) as SchemaRef)
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        match &self.inner {
            Some(inner) => inner.render(pass, chain).await,
            None => Ok(None),
        }
    }

    fn is_required(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| s.is_required())
    }

    fn is_empty(&self) -> bool {
        self.inner.as_ref().map_or(true, |s| s.is_empty())
    }

    fn encoding(&self) -> Option<Encoding> {
        self.inner.as_ref().and_then(|s| s.encoding())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read(body: &BodySchema, text: &str) -> Option<BodySchema> {
        body.merge_body(&Template::text(text), &mut MergeContext::new(Mode::Merge))
    }

    #[test]
    fn json_literal() {
        let body = read(&BodySchema::new(Encoding::Json), r#"{"id": "{{id}}"}"#).unwrap();
        assert_eq!(body.encoding(), Some(Encoding::Json));
    }

    #[test]
    fn encoding_call_wins_over_default() {
        let body = read(&BodySchema::new(Encoding::Json), "form({ q: '{{q}}' })").unwrap();
        assert_eq!(body.encoding(), Some(Encoding::Form));
    }

    #[test]
    fn declared_encoding() {
        let body = BodySchema::new(Encoding::Json).declared(Some(Encoding::Form));
        let body = read(&body, "a=1&b={{b}}").unwrap();
        assert_eq!(body.encoding(), Some(Encoding::Form));
    }

    #[test]
    fn opaque_text_last() {
        let body = read(&BodySchema::new(Encoding::Json), "hello {{name}}").unwrap();
        assert_eq!(body.encoding(), Some(Encoding::Text));
    }

    #[test]
    fn existing_encoding_reused() {
        let body = read(&BodySchema::new(Encoding::Json), r#"{"id": "{{id}}"}"#).unwrap();
        let mut ctx = MergeContext::new(Mode::Match);
        let matched = body.merge_body(&Template::text(r#"{"id": 7, "extra": true}"#), &mut ctx);
        assert!(matched.is_some(), "{:?}", ctx.diagnostics());
        assert_eq!(matched.unwrap().encoding(), Some(Encoding::Json));
    }

    #[test]
    fn failed_match_keeps_diagnostics() {
        let body = read(&BodySchema::new(Encoding::Json), r#"{"kind": "user"}"#).unwrap();
        let mut ctx = MergeContext::new(Mode::Match);
        assert!(body.merge_body(&Template::text(r#"{"kind": "admin"}"#), &mut ctx).is_none());
        assert!(!ctx.diagnostics().is_empty());
    }

    #[test]
    fn structured_body_uses_declared_encoding() {
        let body = BodySchema::new(Encoding::Json).declared(Some(Encoding::Form));
        let merged = body
            .merge_body(&Template::from_value(&json!({"q": "x"})), &mut MergeContext::new(Mode::Merge))
            .unwrap();
        assert_eq!(merged.encoding(), Some(Encoding::Form));
    }

    #[test]
    fn match_without_template_accepts_anything() {
        let body = BodySchema::new(Encoding::Json);
        let mut ctx = MergeContext::new(Mode::Match);
        assert!(body.merge_body(&Template::text("anything"), &mut ctx).is_some());
    }
}
