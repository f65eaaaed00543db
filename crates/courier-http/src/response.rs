//! Response templates and matching

use crate::body::BodySchema;
use crate::error::{HttpError, Result};
use crate::message::{merge_field, pairs, pairs_value};
use crate::object::HttpsResponseObject;
use crate::shape;
use courier_expr::Bindings;
use courier_schema::{
    build_scope, unify, ConfigurationSpace, Diagnostic, DiagnosticKind, Encoding, KeyedListSchema, MergeContext, Mode,
    RenderError, RenderMode, RenderPass, Renderer, ScalarSchema, Schema, SchemaRef, Scope, Template,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Schema of an inbound response
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    status: SchemaRef,
    headers: SchemaRef,
    body: BodySchema,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self::new(Encoding::default())
    }
}

impl ResponseSchema {
    /// Empty response whose undeclared bodies use `encoding`
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        Self {
            status: Arc::new(ScalarSchema::new()),
            headers: Arc::new(KeyedListSchema::case_insensitive()),
            body: BodySchema::new(encoding),
        }
    }
}

#[async_trait::async_trait]
impl Schema for ResponseSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        self.status.scope(scope, diagnostics);
        self.headers.scope(scope, diagnostics);
        self.body.scope(scope, diagnostics);
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let Template::Object(fields) = template else {
            ctx.report(
                DiagnosticKind::Mismatch,
                format!("expected a response, found {}", template.shape()),
            );
            return None;
        };

        let mut next = self.clone();
        let mut ok = merge_field(&mut next.status, "status", fields, ctx);
        ok &= merge_field(&mut next.headers, "headers", fields, ctx);
        if let Some(body) = fields.get("body") {
            let declared = next.body.declared(shape::declared_encoding(fields));
            match ctx.nested("body", |ctx| declared.merge_body(body, ctx)) {
                Some(merged) => next.body = merged,
                None => ok = false,
            }
        }
        ok.then(|| Arc::new(next) as SchemaRef)
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> std::result::Result<Option<Value>, RenderError> {
        let mut out = Map::new();
        out.insert(
            "status".into(),
            self.status.render(pass, chain).await?.unwrap_or(Value::Null),
        );
        out.insert(
            "headers".into(),
            pairs_value(&pairs(self.headers.render(pass, chain).await?)),
        );
        out.insert(
            "body".into(),
            self.body.render(pass, chain).await?.unwrap_or(Value::Null),
        );
        Ok(Some(Value::Object(out)))
    }

    fn encoding(&self) -> Option<Encoding> {
        self.body.encoding()
    }
}

/// Outcome of matching one response against one template
#[derive(Debug, Clone, Default)]
pub struct ResponseMatch {
    /// The response fits the template
    pub matched: bool,
    /// Values captured from the response
    pub values: Bindings,
    /// Why the response does not fit
    pub diagnostics: Vec<Diagnostic>,
    /// Redacted rendering of the template, filled in on a mismatch
    pub preview: Option<Value>,
}

/// Expected response
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    schema: SchemaRef,
    config: ConfigurationSpace,
}

impl ResponseTemplate {
    /// Build from a raw response value
    ///
    /// # Errors
    /// Returns [`HttpError::Template`] for a malformed value and
    /// [`HttpError::Merge`] when its parts contradict each other.
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_with(value, Encoding::default())
    }

    /// Build from a raw response value; undeclared bodies use `encoding`
    ///
    /// # Errors
    /// See [`ResponseTemplate::parse`].
    pub fn parse_with(value: &Value, encoding: Encoding) -> Result<Self> {
        let schema: SchemaRef = Arc::new(ResponseSchema::new(encoding));
        let config = ConfigurationSpace::new();
        let merged = unify(&schema, &shape::response(value)?, Mode::Merge, &Bindings::new(), &config)
            .map_err(HttpError::Merge)?;
        Ok(Self {
            schema: merged.schema,
            config: merged.config,
        })
    }

    /// Match under `config`
    #[must_use]
    pub fn with_config(mut self, config: ConfigurationSpace) -> Self {
        self.config = config;
        self
    }

    /// Underlying schema
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Check `response` against this template
    ///
    /// Computed bindings are prerendered from `inputs` first, so the
    /// response must carry the values they evaluate to. Captures must agree
    /// with `inputs`. A mismatch carries every diagnostic found and a
    /// redacted preview of what was expected.
    pub async fn match_response(
        &self,
        response: &HttpsResponseObject,
        renderer: &Renderer,
        inputs: &Bindings,
    ) -> ResponseMatch {
        let observed = shape::response_object(response);
        let matched = self.expectations(renderer, inputs).await.and_then(|computed| {
            let mut known = inputs.clone();
            known.extend(computed.iter().map(|(k, v)| (k.clone(), v.clone())));
            unify(&self.schema, &observed, Mode::Match, &known, &self.config).map(|merged| {
                let mut values = computed;
                values.extend(merged.scope.exported());
                values
            })
        });

        match matched {
            Ok(values) => ResponseMatch {
                matched: true,
                values,
                diagnostics: Vec::new(),
                preview: None,
            },
            Err(diagnostics) => {
                let preview = self.preview(renderer, inputs).await.ok();
                tracing::debug!(
                    status = response.status,
                    diagnostics = diagnostics.len(),
                    "response does not match"
                );
                ResponseMatch {
                    matched: false,
                    values: Bindings::new(),
                    diagnostics,
                    preview,
                }
            }
        }
    }

    /// Computed bindings of the template that `inputs` already resolve
    async fn expectations(
        &self,
        renderer: &Renderer,
        inputs: &Bindings,
    ) -> std::result::Result<Bindings, Vec<Diagnostic>> {
        let rendered = match renderer
            .render(self.schema.as_ref(), inputs, &self.config, RenderMode::Prerender)
            .await
        {
            Ok(rendered) => rendered,
            Err(RenderError::Inconsistent(diagnostics)) => return Err(diagnostics),
            Err(RenderError::Evaluation { name, message }) => {
                return Err(vec![Diagnostic::new(
                    "",
                    DiagnosticKind::Mismatch,
                    format!("cannot compute `{name}`: {message}"),
                )])
            }
            Err(e) => {
                tracing::debug!(error = %e, "response prerender incomplete");
                return Ok(Bindings::new());
            }
        };

        let (scope, _) = build_scope(self.schema.as_ref(), inputs);
        Ok(rendered
            .values
            .into_iter()
            .filter(|(name, _)| !inputs.contains_key(name))
            .filter(|(name, _)| scope.declaration(name).is_some_and(|d| d.expression.is_some()))
            .collect())
    }

    /// Template rendered with what `inputs` resolve, secrets redacted
    ///
    /// # Errors
    /// Returns [`HttpError::Render`] when the inputs contradict captures.
    pub async fn preview(&self, renderer: &Renderer, inputs: &Bindings) -> Result<Value> {
        Ok(renderer
            .render(self.schema.as_ref(), inputs, &self.config, RenderMode::Preview)
            .await?
            .value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn check(template: Value, response: HttpsResponseObject) -> ResponseMatch {
        ResponseTemplate::parse(&template)
            .unwrap()
            .match_response(&response, &Renderer::new(), &Bindings::new())
            .await
    }

    #[tokio::test]
    async fn status_class() {
        assert!(check(json!("2xx"), HttpsResponseObject::new(204)).await.matched);
        assert!(!check(json!("2xx"), HttpsResponseObject::new(404)).await.matched);
        assert!(check(json!(404), HttpsResponseObject::new(404)).await.matched);
    }

    #[tokio::test]
    async fn captures_from_body() {
        let result = check(
            json!({"status": 200, "body": r#"{"id": "{{id}}", "kind": "user"}"#}),
            HttpsResponseObject::new(200).with_body(r#"{"id": 7, "kind": "user", "extra": 1}"#),
        )
        .await;
        assert!(result.matched, "{:?}", result.diagnostics);
        assert_eq!(result.values.get("id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn mismatch_reports_location_and_preview() {
        let result = check(
            json!({"status": 200, "body": r#"{"kind": "user"}"#}),
            HttpsResponseObject::new(500).with_body(r#"{"kind": "admin"}"#),
        )
        .await;
        assert!(!result.matched);
        let paths: Vec<&str> = result.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["status", "body.kind"]);
        assert!(result.diagnostics.iter().all(|d| d.kind == DiagnosticKind::Mismatch));
        assert_eq!(result.preview.unwrap()["status"], json!(200));
    }

    #[tokio::test]
    async fn headers_ignore_case() {
        let result = check(
            json!({"headers": {"x-request-id": "{{rid}}"}}),
            HttpsResponseObject::new(200).with_header("X-Request-Id", "abc"),
        )
        .await;
        assert!(result.matched);
        assert_eq!(result.values.get("rid"), Some(&json!("abc")));
    }

    #[tokio::test]
    async fn captures_must_agree_with_inputs() {
        let template = ResponseTemplate::parse(&json!({"body": r#"{"id": "{{id}}"}"#})).unwrap();
        let mut inputs = Bindings::new();
        inputs.insert("id".into(), json!(8));
        let result = template
            .match_response(
                &HttpsResponseObject::new(200).with_body(r#"{"id": 7}"#),
                &Renderer::new(),
                &inputs,
            )
            .await;
        assert!(!result.matched);
        assert!(result.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Conflict));
    }
}
