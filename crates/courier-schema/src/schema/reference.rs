//! Aliases for bound identifiers

use super::{combine_datum, Schema, SchemaRef};
use crate::render::RenderPass;
use crate::scope::{Declaration, Provenance, Scope};
use crate::{Diagnostic, DiagnosticKind, MergeContext, RenderError, RenderMode, Template};
use courier_pattern::{Hints, PatternVar};
use serde_json::Value;
use std::sync::Arc;

/// Position whose value is whatever `name` is bound to
///
/// Unlike a `{{name}}` scalar the bound value may be an object or array.
#[derive(Debug, Clone)]
pub struct ReferenceSchema {
    name: String,
    value: Option<Value>,
}

impl ReferenceSchema {
    /// Alias for `name`
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Referenced identifier
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn var(&self) -> PatternVar {
        PatternVar {
            param: self.name.clone(),
            hint: Hints::NONE,
            source: format!("{{{{{}}}}}", self.name),
            expression: None,
            regex: None,
        }
    }
}

#[async_trait::async_trait]
impl Schema for ReferenceSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        if let Err(d) = scope.declare(&self.name, Declaration::default()) {
            diagnostics.push(d);
        }
        if let Some(value) = &self.value {
            if let Err(d) = scope.define(&self.name, value.clone(), Provenance::Capture) {
                diagnostics.push(d);
            }
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        if let Template::Reference(other) = template {
            if *other == self.name {
                return Some(Arc::new(self.clone()));
            }
            ctx.report(
                DiagnosticKind::Unmeldable,
                format!("`{other}` cannot alias the position bound to `{}`", self.name),
            );
            return None;
        }
        let Some(value) = template.to_value() else {
            ctx.report(DiagnosticKind::Mismatch, format!("cannot bind `{}` to a template", self.name));
            return None;
        };
        if !combine_datum(self.value.as_ref(), &value, ctx) {
            return None;
        }
        Some(Arc::new(Self {
            name: self.name.clone(),
            value: Some(value),
        }))
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        if let Some(value) = &self.value {
            return Ok(Some(value.clone()));
        }
        let var = self.var();
        match pass.resolve(chain, &var).await? {
            Some(value) => Ok(Some(value)),
            None if pass.mode() == RenderMode::Render => Err(RenderError::Unresolved {
                path: RenderPass::path(chain),
                names: vec![self.name.clone()],
            }),
            None => Ok(Some(Value::String(var.source))),
        }
    }
}
