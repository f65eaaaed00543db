//! Request templates

use crate::address::join_url;
use crate::body::BodySchema;
use crate::error::{HttpError, Result};
use crate::message::{merge_field, pairs, pairs_value, text};
use crate::object::HttpsRequestObject;
use crate::shape;
use courier_expr::{to_text, Bindings};
use courier_pattern::PatternOptions;
use courier_schema::{
    unify, ConfigurationSpace, Declaration, Diagnostic, DiagnosticKind, Encoding, KeyedListSchema, MergeContext,
    Mode, RenderError, RenderMode, RenderPass, Renderer, ScalarSchema, Schema, SchemaRef, Scope, Template,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Schema of an outbound request
///
/// Origins split on `.` and pathnames on `/`, so a composite placeholder
/// covers one label or segment unless hinted `...`.
#[derive(Debug, Clone)]
pub struct RequestSchema {
    method: SchemaRef,
    origin: SchemaRef,
    pathname: SchemaRef,
    search: SchemaRef,
    headers: SchemaRef,
    body: BodySchema,
    computations: IndexMap<String, String>,
}

impl Default for RequestSchema {
    fn default() -> Self {
        Self::new(Encoding::default())
    }
}

impl RequestSchema {
    /// Empty request whose undeclared bodies use `encoding`
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        Self {
            method: Arc::new(ScalarSchema::new()),
            origin: Arc::new(ScalarSchema::with_options(PatternOptions::separated('.'))),
            pathname: Arc::new(ScalarSchema::with_options(PatternOptions::separated('/'))),
            search: Arc::new(KeyedListSchema::case_sensitive()),
            headers: Arc::new(KeyedListSchema::case_insensitive()),
            body: BodySchema::new(encoding),
            computations: IndexMap::new(),
        }
    }

    /// Computed bindings declared at the request root
    #[inline]
    #[must_use]
    pub fn computations(&self) -> &IndexMap<String, String> {
        &self.computations
    }

    /// Body position
    #[inline]
    #[must_use]
    pub fn body(&self) -> &BodySchema {
        &self.body
    }

    fn merge_computations(&mut self, template: &Template, ctx: &mut MergeContext) -> bool {
        let Template::Object(entries) = template else {
            ctx.report(DiagnosticKind::Mismatch, "computations must map names to expressions");
            return false;
        };
        let mut ok = true;
        for (name, expression) in entries {
            let Some(Value::String(expression)) = expression.to_value() else {
                ctx.nested(name.clone(), |ctx| {
                    ctx.report(DiagnosticKind::Mismatch, "expected an expression");
                });
                ok = false;
                continue;
            };
            match self.computations.get(name) {
                Some(existing) if *existing != expression && ctx.mode() != Mode::Mux => {
                    ctx.nested(name.clone(), |ctx| {
                        ctx.report(
                            DiagnosticKind::Conflict,
                            format!("`{existing}` conflicts with `{expression}`"),
                        );
                    });
                    ok = false;
                }
                _ => {
                    self.computations.insert(name.clone(), expression);
                }
            }
        }
        ok
    }
}

#[async_trait::async_trait]
impl Schema for RequestSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        for part in [&self.method, &self.origin, &self.pathname, &self.search, &self.headers] {
            part.scope(scope, diagnostics);
        }
        self.body.scope(scope, diagnostics);
        for (name, expression) in &self.computations {
            if let Err(d) = scope.declare(name, Declaration::computed(expression.clone())) {
                diagnostics.push(d);
            }
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let Template::Object(fields) = template else {
            ctx.report(
                DiagnosticKind::Mismatch,
                format!("expected a request, found {}", template.shape()),
            );
            return None;
        };

        let mut next = self.clone();
        let mut ok = merge_field(&mut next.method, "method", fields, ctx);
        ok &= merge_field(&mut next.origin, "origin", fields, ctx);
        ok &= merge_field(&mut next.pathname, "pathname", fields, ctx);
        ok &= merge_field(&mut next.search, "search", fields, ctx);
        ok &= merge_field(&mut next.headers, "headers", fields, ctx);

        if let Some(body) = fields.get("body") {
            let declared = next.body.declared(shape::declared_encoding(fields));
            match ctx.nested("body", |ctx| declared.merge_body(body, ctx)) {
                Some(merged) => next.body = merged,
                None => ok = false,
            }
        }
        if let Some(computations) = fields.get("computations") {
            ok &= ctx.nested("computations", |ctx| next.merge_computations(computations, ctx));
        }

        ok.then(|| Arc::new(next) as SchemaRef)
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> std::result::Result<Option<Value>, RenderError> {
        let method = self
            .method
            .render(pass, chain)
            .await?
            .map_or_else(|| "GET".to_string(), |v| to_text(&v));
        let origin = text(self.origin.render(pass, chain).await?);
        let pathname = text(self.pathname.render(pass, chain).await?);
        let search = pairs(self.search.render(pass, chain).await?);
        let mut headers = pairs(self.headers.render(pass, chain).await?);
        let body = self.body.render(pass, chain).await?;

        if let (Some(_), Some(encoding)) = (&body, self.body.encoding()) {
            if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                headers.push(("content-type".to_string(), encoding.content_type().to_string()));
            }
        }

        let url = join_url(&origin, &pathname, &search, pass.mode() == RenderMode::Render);
        let mut out = Map::new();
        out.insert("method".into(), Value::String(method));
        out.insert("url".into(), Value::String(url));
        out.insert("headers".into(), pairs_value(&headers));
        out.insert("body".into(), body.map_or(Value::Null, |b| Value::String(to_text(&b))));
        Ok(Some(Value::Object(out)))
    }

    fn encoding(&self) -> Option<Encoding> {
        self.body.encoding()
    }
}

/// Request rendered for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRequest {
    /// Concrete request
    pub request: HttpsRequestObject,
    /// Values bound while rendering, computed ones included
    pub values: Bindings,
}

/// Request schema together with the configuration it is rendered under
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    schema: SchemaRef,
    config: ConfigurationSpace,
}

impl RequestTemplate {
    /// Build from a raw request value
    ///
    /// # Errors
    /// Returns [`HttpError::Template`] for a malformed value and
    /// [`HttpError::Merge`] when its parts contradict each other.
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_with(value, Encoding::default())
    }

    /// Build from a raw request value; undeclared bodies use `encoding`
    ///
    /// # Errors
    /// See [`RequestTemplate::parse`].
    pub fn parse_with(value: &Value, encoding: Encoding) -> Result<Self> {
        let empty = Self {
            schema: Arc::new(RequestSchema::new(encoding)),
            config: ConfigurationSpace::new(),
        };
        empty.combine(&shape::request(value)?, Mode::Merge, &Bindings::new())
    }

    /// Render under `config`
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

    /// Configuration candidates still viable
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConfigurationSpace {
        &self.config
    }

    fn combine(&self, template: &Template, mode: Mode, inputs: &Bindings) -> Result<Self> {
        let merged = unify(&self.schema, template, mode, inputs, &self.config).map_err(HttpError::Merge)?;
        Ok(Self {
            schema: merged.schema,
            config: merged.config,
        })
    }

    /// Add a partial template describing the same request
    ///
    /// # Errors
    /// Returns [`HttpError::Merge`] when the partial contradicts this one.
    pub fn mix(&self, partial: &Value) -> Result<Self> {
        self.combine(&shape::request(partial)?, Mode::Mix, &Bindings::new())
    }

    /// Combine with runtime input; captures must agree with `inputs`
    ///
    /// # Errors
    /// Returns [`HttpError::Merge`] on conflicts or an exhausted configuration.
    pub fn merge(&self, input: &Value, inputs: &Bindings) -> Result<Self> {
        self.combine(&shape::request(input)?, Mode::Merge, inputs)
    }

    /// Fold a concrete request in as an example
    ///
    /// # Errors
    /// Returns [`HttpError::Merge`] when the request does not fit the
    /// template's placeholders.
    pub fn mux(&self, request: &HttpsRequestObject) -> Result<Self> {
        self.combine(&shape::request_object(request), Mode::Mux, &Bindings::new())
    }

    async fn run(&self, renderer: &Renderer, inputs: &Bindings, mode: RenderMode) -> Result<RenderedRequest> {
        let rendered = renderer.render(self.schema.as_ref(), inputs, &self.config, mode).await?;
        Ok(RenderedRequest {
            request: request_object(&rendered.value)?,
            values: rendered.values,
        })
    }

    /// Render a concrete request
    ///
    /// # Errors
    /// Returns [`HttpError::Render`] when a required placeholder stays
    /// unresolved or a value cannot be encoded.
    pub async fn render(&self, renderer: &Renderer, inputs: &Bindings) -> Result<RenderedRequest> {
        self.run(renderer, inputs, RenderMode::Render).await
    }

    /// Render what is known, keeping unresolved placeholders as text
    ///
    /// # Errors
    /// Returns [`HttpError::Render`] when the inputs contradict captures.
    pub async fn prerender(&self, renderer: &Renderer, inputs: &Bindings) -> Result<HttpsRequestObject> {
        Ok(self.run(renderer, inputs, RenderMode::Prerender).await?.request)
    }

    /// Prerender with secret values redacted
    ///
    /// # Errors
    /// See [`RequestTemplate::prerender`].
    pub async fn preview(&self, renderer: &Renderer, inputs: &Bindings) -> Result<HttpsRequestObject> {
        Ok(self.run(renderer, inputs, RenderMode::Preview).await?.request)
    }
}

fn request_object(value: &Value) -> Result<HttpsRequestObject> {
    let Value::Object(fields) = value else {
        return Err(HttpError::Malformed(format!("expected an object, found {value}")));
    };
    let field = |name: &str| fields.get(name).cloned();
    let url = text(field("url"));
    if url.is_empty() {
        return Err(HttpError::Malformed("request has no url".into()));
    }
    Ok(HttpsRequestObject {
        method: text(field("method")).to_ascii_uppercase(),
        url,
        headers: pairs(field("headers")),
        body: match field("body") {
            None | Some(Value::Null) => None,
            Some(body) => Some(to_text(&body)),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn bindings(value: Value) -> Bindings {
        value
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn renders_url_headers_and_body() {
        let template = RequestTemplate::parse(&json!({
            "method": "post",
            "url": "https://{{...host}}/users/{{id}}?verbose={{?verbose}}",
            "headers": {"authorization": "Bearer {{@token}}"},
            "body": r#"{"name": "{{name}}"}"#
        }))
        .unwrap();
        let rendered = template
            .render(
                &Renderer::new(),
                &bindings(json!({"host": "api.example.com", "id": 7, "token": "t0k", "name": "Ada"})),
            )
            .await
            .unwrap();

        assert_eq!(rendered.request.method, "POST");
        assert_eq!(rendered.request.url, "https://api.example.com/users/7");
        assert_eq!(rendered.request.header("authorization"), Some("Bearer t0k"));
        assert_eq!(rendered.request.header("content-type"), Some("application/json"));
        assert_eq!(rendered.request.body.as_deref(), Some(r#"{"name":"Ada"}"#));
    }

    #[tokio::test]
    async fn prerender_keeps_placeholders() {
        let template = RequestTemplate::parse(&json!("GET {{base}}/users/{{id}}")).unwrap();
        let request = template.prerender(&Renderer::new(), &Bindings::new()).await.unwrap();
        assert_eq!(request.url, "{{base}}/users/{{id}}");
    }

    #[tokio::test]
    async fn unresolved_is_an_error() {
        let template = RequestTemplate::parse(&json!("GET /users/{{id}}")).unwrap();
        let err = template.render(&Renderer::new(), &Bindings::new()).await.unwrap_err();
        assert!(matches!(err, HttpError::Render(RenderError::Unresolved { .. })));
    }

    #[tokio::test]
    async fn computations_resolve_at_render() {
        let template = RequestTemplate::parse(&json!({
            "url": "/items?page={{next}}",
            "computations": {"next": "page + 1"}
        }))
        .unwrap();
        let rendered = template
            .render(&Renderer::new(), &bindings(json!({"page": 2})))
            .await
            .unwrap();
        assert_eq!(rendered.request.url, "/items?page=3");
        assert_eq!(rendered.values.get("next").map(to_text).as_deref(), Some("3"));
    }

    #[test]
    fn mix_conflict() {
        let template = RequestTemplate::parse(&json!("GET /users")).unwrap();
        let err = template.mix(&json!({"method": "DELETE"})).unwrap_err();
        assert_eq!(err.diagnostics()[0].path, "method");
    }

    #[tokio::test]
    async fn mux_captures_from_examples() {
        let template = RequestTemplate::parse(&json!("GET /users/{{id}}")).unwrap();
        let muxed = template.mux(&HttpsRequestObject::new("GET", "/users/42")).unwrap();
        let rendered = muxed.render(&Renderer::new(), &Bindings::new()).await.unwrap();
        assert_eq!(rendered.request.url, "/users/42");
        assert!(template.mux(&HttpsRequestObject::new("GET", "/accounts/42")).is_err());
    }

    #[test]
    fn merge_rejects_disagreeing_inputs() {
        let template = RequestTemplate::parse(&json!("GET /users/{{id}}")).unwrap();
        assert!(template.merge(&json!("GET /users/7"), &bindings(json!({"id": 7}))).is_ok());
        let err = template.merge(&json!("GET /users/8"), &bindings(json!({"id": 7}))).unwrap_err();
        assert!(!err.diagnostics().is_empty());
    }
}
