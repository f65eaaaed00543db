//! Scalar leaves

use super::{combine_datum, report_shape, Schema, SchemaRef};
use crate::render::RenderPass;
use crate::scope::{Declaration, Provenance, Scope};
use crate::{Diagnostic, DiagnosticKind, MergeContext, RenderError, Template};
use courier_expr::to_text;
use courier_pattern::{is_templated, meldable, patternize, Hints, Pattern, PatternOptions};
use serde_json::Value;
use std::sync::Arc;

/// Leaf holding placeholder patterns and an observed value
///
/// Numbers keep their source text, so `1.50` renders as `1.50`.
#[derive(Debug, Clone, Default)]
pub struct ScalarSchema {
    patterns: Vec<Pattern>,
    value: Option<Value>,
    options: PatternOptions,
}

impl ScalarSchema {
    /// Empty scalar
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty scalar whose patterns parse with `options`
    #[inline]
    #[must_use]
    pub fn with_options(options: PatternOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Observed value
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Placeholder patterns constraining this position
    #[inline]
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    fn hint(&self) -> Hints {
        self.patterns
            .iter()
            .filter_map(Pattern::simple_var)
            .fold(Hints::NONE, |acc, var| acc.union(var.hint))
    }

    fn with_pattern(&self, source: &str, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let pattern = match patternize(source, self.options) {
            Ok(pattern) => pattern,
            Err(e) => {
                ctx.report(DiagnosticKind::Mismatch, e.to_string());
                return None;
            }
        };
        if self.patterns.iter().any(|p| p.source() == source) {
            return Some(Arc::new(self.clone()));
        }
        if let Some(other) = self.patterns.iter().find(|p| !meldable(p, &pattern)) {
            ctx.report(
                DiagnosticKind::Unmeldable,
                format!("`{pattern}` cannot share a position with `{other}`"),
            );
            return None;
        }
        if let Some(value) = &self.value {
            if pattern.matches(&to_text(value)).is_none() {
                ctx.report(DiagnosticKind::Mismatch, format!("{value} does not match `{pattern}`"));
                return None;
            }
        }
        let mut next = self.clone();
        next.patterns.push(pattern);
        Some(Arc::new(next))
    }

    fn with_datum(&self, value: &Value, ctx: &mut MergeContext) -> Option<SchemaRef> {
        if !combine_datum(self.value.as_ref(), value, ctx) {
            return None;
        }
        let text = to_text(value);
        let mut ok = true;
        for pattern in &self.patterns {
            if pattern.matches(&text).is_none() {
                ctx.report(DiagnosticKind::Mismatch, format!("{value} does not match `{pattern}`"));
                ok = false;
            }
        }
        ok.then(|| {
            let mut next = self.clone();
            next.value = Some(value.clone());
            Arc::new(next) as SchemaRef
        })
    }
}

#[async_trait::async_trait]
impl Schema for ScalarSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        for pattern in &self.patterns {
            for var in pattern.vars().iter().filter(|v| !v.is_anonymous()) {
                if let Err(d) = scope.declare(&var.param, Declaration::from(var)) {
                    diagnostics.push(d);
                }
            }
        }

        let Some(value) = &self.value else {
            return;
        };
        for pattern in &self.patterns {
            if let Some(var) = pattern.simple_var() {
                if !var.is_anonymous() {
                    if let Err(d) = scope.define(&var.param, value.clone(), Provenance::Capture) {
                        diagnostics.push(d);
                    }
                }
                continue;
            }
            let known = |name: &str| scope.value(name).map(|b| to_text(&b.value));
            let Some(captures) = pattern.match_with(&to_text(value), known) else {
                diagnostics.push(Diagnostic::new(
                    scope.path(),
                    DiagnosticKind::Conflict,
                    format!("{value} does not agree with bound values of `{pattern}`"),
                ));
                continue;
            };
            for (name, text) in captures {
                if let Err(d) = scope.define(&name, Value::String(text), Provenance::Capture) {
                    diagnostics.push(d);
                }
            }
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        match template {
            Template::Value(Value::String(s)) if !ctx.mode().strings_are_data() && is_templated(s) => {
                self.with_pattern(s, ctx)
            }
            Template::Value(value) => self.with_datum(value, ctx),
            Template::Reference(name) => self.with_pattern(&format!("{{{{{name}}}}}"), ctx),
            other => {
                report_shape(ctx, "a scalar", other);
                None
            }
        }
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        if let Some(value) = &self.value {
            return Ok(Some(pass.redact(self.hint(), value.clone())));
        }
        match self.patterns.first() {
            Some(pattern) => pass.render_pattern(pattern, chain).await,
            None => Ok(None),
        }
    }

    fn is_required(&self) -> bool {
        self.value.is_some()
            || self
                .patterns
                .iter()
                .any(|p| p.vars().iter().any(|v| v.hint.is_required()))
    }

    fn is_empty(&self) -> bool {
        self.value.is_none() && self.patterns.is_empty()
    }
}
