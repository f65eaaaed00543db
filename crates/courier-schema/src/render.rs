//! Render passes
//!
//! A [`RenderPass`] owns the scope tree built for one render call and
//! resolves identifiers in a fixed order:
//!
//! 1. values bound along the scope chain
//! 2. input values (dotted paths allowed)
//! 3. the declared expression, memoized for the pass
//! 4. a value every configuration candidate agrees on
//! 5. configuration defaults
//!
//! `~` distinct variables stop after their own scope. An identifier met
//! again while its own expression is being evaluated skips step 3 instead
//! of recursing.

use crate::config::ConfigurationSpace;
use crate::redact::{MaskRedactor, Redactor};
use crate::schema::{build_scope, Schema};
use crate::scope::Scope;
use crate::{RenderError, RenderMode};
use courier_expr::{lookup_path, parse_expression, to_text, Bindings, Evaluator, ExprError, Interpreter};
use courier_pattern::{is_templated, Hints, Pattern, PatternRenderError, PatternVar};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use moka::future::Cache;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Result of rendering a schema
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Rendered value
    pub value: Value,
    /// Values bound or computed by the pass, for the caller to carry forward
    pub values: Bindings,
}

/// Renders schemas against input values
#[derive(Debug, Clone)]
pub struct Renderer {
    evaluator: Arc<dyn Evaluator>,
    redactor: Arc<dyn Redactor>,
    redact_secrets: bool,
    cache_capacity: u64,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            evaluator: Arc::new(Interpreter),
            redactor: Arc::new(MaskRedactor),
            redact_secrets: true,
            cache_capacity: 1024,
        }
    }
}

impl Renderer {
    /// Renderer with the default interpreter and mask redactor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `evaluator` for computed bindings
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Use `redactor` for previews
    #[must_use]
    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    /// Toggle redaction of secret and hidden values in previews
    #[must_use]
    pub fn with_redact_secrets(mut self, redact: bool) -> Self {
        self.redact_secrets = redact;
        self
    }

    /// Capacity of the per-pass expression cache
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Evaluator used for computed bindings
    #[inline]
    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Render `schema` against `inputs`
    ///
    /// # Errors
    /// - [`RenderError::Inconsistent`] when captures contradict the inputs
    /// - [`RenderError::Exhausted`] when no configuration candidate fits
    /// - any failure of the schema's own render
    pub async fn render(
        &self,
        schema: &dyn Schema,
        inputs: &Bindings,
        config: &ConfigurationSpace,
        mode: RenderMode,
    ) -> Result<Rendered, RenderError> {
        let (scope, diagnostics) = build_scope(schema, inputs);
        if !diagnostics.is_empty() {
            return Err(RenderError::Inconsistent(diagnostics));
        }
        let mut config = config.clone();
        if !config.narrow(&scope) {
            return Err(RenderError::Exhausted);
        }

        let pass = RenderPass {
            mode,
            scope,
            inputs: inputs.clone(),
            config,
            evaluator: Arc::clone(&self.evaluator),
            redactor: Arc::clone(&self.redactor),
            redact: self.redact_secrets,
            cache: Cache::new(self.cache_capacity),
            resolved: Mutex::new(Bindings::new()),
        };

        let value = schema.render(&pass, &[]).await?.unwrap_or(Value::Null);
        if mode == RenderMode::Render {
            pass.resolve_computations().await?;
        }

        let mut values = pass.scope.exported();
        values.extend(pass.resolved.into_inner());
        Ok(Rendered { value, values })
    }
}

/// State of one render call
#[derive(Debug)]
pub struct RenderPass {
    mode: RenderMode,
    scope: Scope,
    inputs: Bindings,
    config: ConfigurationSpace,
    evaluator: Arc<dyn Evaluator>,
    redactor: Arc<dyn Redactor>,
    redact: bool,
    cache: Cache<String, Option<Value>>,
    resolved: Mutex<Bindings>,
}

impl RenderPass {
    /// Render mode of this pass
    #[inline]
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Scope tree built for this pass
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Location of `chain` for error messages
    #[must_use]
    pub fn path(chain: &[String]) -> String {
        chain.iter().map(|k| format!("[{k}]")).collect()
    }

    /// Redacted form of `value` when this pass redacts, else `value`
    #[must_use]
    pub fn redact(&self, hint: Hints, value: Value) -> Value {
        if self.mode == RenderMode::Preview && self.redact && hint.is_redacted() {
            self.redactor.redact(&value)
        } else {
            value
        }
    }

    /// Resolve the variable of a placeholder at `chain`
    ///
    /// # Errors
    /// Returns [`RenderError::Evaluation`] when a computed binding fails.
    pub async fn resolve(&self, chain: &[String], var: &PatternVar) -> Result<Option<Value>, RenderError> {
        self.resolve_inner(
            chain,
            &var.param,
            var.hint.contains(Hints::DISTINCT),
            var.expression.as_deref(),
            &[],
        )
        .await
    }

    /// Render `pattern` at `chain` according to the pass mode
    ///
    /// Simple patterns keep the type of the bound value. Returns `None` for
    /// an unresolved optional simple pattern in render mode.
    ///
    /// # Errors
    /// - [`RenderError::Unresolved`] for missing required values in render mode
    /// - [`RenderError::PatternViolation`] for values failing a regex override
    pub async fn render_pattern(&self, pattern: &Pattern, chain: &[String]) -> Result<Option<Value>, RenderError> {
        let values = self.resolve_all(pattern, chain, &[]).await?;

        if let Some(var) = pattern.simple_var() {
            return match values.get(&var.param).cloned().flatten() {
                Some(value) => {
                    if self.mode == RenderMode::Render && var.regex.is_some() {
                        pattern
                            .render(|_| Some(to_text(&value)))
                            .map_err(|e| convert(e, chain))?;
                    }
                    Ok(Some(self.redact(var.hint, value)))
                }
                None if self.mode == RenderMode::Render && var.hint.is_optional() => Ok(None),
                None if self.mode == RenderMode::Render => Err(RenderError::Unresolved {
                    path: Self::path(chain),
                    names: vec![name_of(var)],
                }),
                None => Ok(Some(Value::String(pattern.source().to_string()))),
            };
        }

        let lookup = |var: &PatternVar| {
            values
                .get(&var.param)
                .cloned()
                .flatten()
                .map(|v| to_text(&self.redact(var.hint, v)))
        };
        if self.mode == RenderMode::Render {
            pattern
                .render(lookup)
                .map(|text| Some(Value::String(text)))
                .map_err(|e| convert(e, chain))
        } else {
            Ok(Some(Value::String(pattern.prerender(lookup))))
        }
    }

    async fn resolve_all(
        &self,
        pattern: &Pattern,
        chain: &[String],
        evaluating: &[String],
    ) -> Result<IndexMap<String, Option<Value>>, RenderError> {
        let mut values = IndexMap::new();
        for var in pattern.vars() {
            if var.is_anonymous() || values.contains_key(&var.param) {
                continue;
            }
            let value = self
                .resolve_inner(
                    chain,
                    &var.param,
                    var.hint.contains(Hints::DISTINCT),
                    var.expression.as_deref(),
                    evaluating,
                )
                .await?;
            values.insert(var.param.clone(), value);
        }
        Ok(values)
    }

    fn resolve_inner<'a>(
        &'a self,
        chain: &'a [String],
        name: &'a str,
        distinct: bool,
        inline: Option<&'a str>,
        evaluating: &'a [String],
    ) -> BoxFuture<'a, Result<Option<Value>, RenderError>> {
        async move {
            if let Some(value) = self.bound(chain, name, distinct) {
                return Ok(Some(value));
            }
            if !distinct {
                if let Some(value) = lookup_path(&self.inputs, name) {
                    return Ok(Some(value.clone()));
                }
            }

            if !evaluating.iter().any(|n| n == name) {
                let declared = if distinct {
                    self.scope
                        .at(chain)
                        .and_then(|s| s.declaration(name))
                        .map(|d| (chain.len(), d))
                } else {
                    self.scope.lookup_declaration(chain, name)
                };
                let expression = declared
                    .and_then(|(depth, d)| d.expression.as_deref().map(|e| (depth, e)))
                    .or_else(|| inline.map(|e| (chain.len(), e)));
                if let Some((depth, expression)) = expression {
                    let owner = &chain[..depth.min(chain.len())];
                    if let Some(value) = self.evaluate(owner, name, expression, evaluating).await? {
                        self.record(owner, name, &value);
                        return Ok(Some(value));
                    }
                }
            }
            if distinct {
                return Ok(None);
            }

            if let Some(agreed) = self.config.resolved(name) {
                match &agreed {
                    Value::String(source) if is_templated(source) => {
                        if !evaluating.iter().any(|n| n == name) {
                            if let Some(text) = self.fill(source, chain, name, evaluating).await? {
                                self.record(chain, name, &text);
                                return Ok(Some(text));
                            }
                        }
                    }
                    _ => {
                        self.record(chain, name, &agreed);
                        return Ok(Some(agreed));
                    }
                }
            }

            if let Some(value) = self.config.default_value(name) {
                self.record(chain, name, value);
                return Ok(Some(value.clone()));
            }
            Ok(None)
        }
        .boxed()
    }

    fn bound(&self, chain: &[String], name: &str, distinct: bool) -> Option<Value> {
        let lookup = |name: &str| {
            if distinct {
                self.scope.at(chain).and_then(|s| s.value(name))
            } else {
                self.scope.lookup(chain, name)
            }
        };
        if let Some(binding) = lookup(name) {
            return Some(binding.value.clone());
        }
        let (head, rest) = name.split_once('.')?;
        let root = lookup(head)?;
        let mut wrapper = Bindings::new();
        wrapper.insert(head.to_string(), root.value.clone());
        lookup_path(&wrapper, &format!("{head}.{rest}")).cloned()
    }

    async fn evaluate(
        &self,
        owner: &[String],
        name: &str,
        expression: &str,
        evaluating: &[String],
    ) -> Result<Option<Value>, RenderError> {
        let key = format!("{}::{name}", owner.join("/"));
        let mut chain = evaluating.to_vec();
        chain.push(name.to_string());

        let init = async {
            let expr = parse_expression(expression).map_err(|e| RenderError::Evaluation {
                name: name.to_string(),
                message: e.to_string(),
            })?;
            let mut env = Bindings::new();
            for ident in expr.free_identifiers() {
                if let Some(value) = self.resolve_inner(owner, &ident, false, None, &chain).await? {
                    env.insert(ident, value);
                }
            }
            match self.evaluator.evaluate(&expr, &env) {
                Ok(value) => Ok(Some(value)),
                Err(ExprError::Unbound(missing)) => {
                    tracing::debug!(name, missing = %missing, "computed binding unresolved");
                    Ok(None)
                }
                Err(e) => Err(RenderError::Evaluation {
                    name: name.to_string(),
                    message: e.to_string(),
                }),
            }
        };

        self.cache
            .try_get_with(key, init)
            .await
            .map_err(|e: Arc<RenderError>| (*e).clone())
    }

    async fn fill(
        &self,
        source: &str,
        chain: &[String],
        name: &str,
        evaluating: &[String],
    ) -> Result<Option<Value>, RenderError> {
        let Ok(pattern) = Pattern::parse(source) else {
            return Ok(None);
        };
        let mut next = evaluating.to_vec();
        next.push(name.to_string());
        let values = self.resolve_all(&pattern, chain, &next).await?;
        Ok(pattern
            .render(|var| values.get(&var.param).cloned().flatten().map(|v| to_text(&v)))
            .ok()
            .map(Value::String))
    }

    fn record(&self, owner: &[String], name: &str, value: &Value) {
        if !owner.is_empty() {
            return;
        }
        let private = self
            .scope
            .declaration(name)
            .is_some_and(|d| d.hint.contains(Hints::NO_EXPORT));
        if !private {
            self.resolved.lock().insert(name.to_string(), value.clone());
        }
    }

    async fn resolve_computations(&self) -> Result<(), RenderError> {
        let pending: Vec<String> = self
            .scope
            .declarations()
            .filter(|(name, d)| d.expression.is_some() && self.scope.value(name).is_none())
            .map(|(name, _)| name.clone())
            .collect();
        for name in pending {
            self.resolve_inner(&[], &name, false, None, &[]).await?;
        }
        Ok(())
    }
}

fn name_of(var: &PatternVar) -> String {
    if var.is_anonymous() {
        var.source.clone()
    } else {
        var.param.clone()
    }
}

fn convert(error: PatternRenderError, chain: &[String]) -> RenderError {
    match error {
        PatternRenderError::Unresolved { names } => RenderError::Unresolved {
            path: RenderPass::path(chain),
            names,
        },
        PatternRenderError::Violation { param, value } => RenderError::PatternViolation { param, value },
    }
}
