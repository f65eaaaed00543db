//! Ordered elements
//!
//! Each element opens its own subscope keyed by index. Under `mix` a
//! one-element array is a rule merged into every element, present and
//! future.

use super::{child_chain, expand, report_shape, Schema, SchemaRef};
use crate::context::index_segment;
use crate::render::RenderPass;
use crate::scope::Scope;
use crate::{Diagnostic, DiagnosticKind, MergeContext, Mode, RenderError, Template};
use serde_json::Value;
use std::sync::Arc;

/// Array of element schemas with an optional broadcast rule
#[derive(Debug, Clone, Default)]
pub struct ArraySchema {
    items: Vec<SchemaRef>,
    rule: Option<SchemaRef>,
}

impl ArraySchema {
    /// Empty array
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Element schemas
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[SchemaRef] {
        &self.items
    }

    /// Rule applied to every element
    #[inline]
    #[must_use]
    pub fn rule(&self) -> Option<&SchemaRef> {
        self.rule.as_ref()
    }

    fn broadcast(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let rule = ctx.nested("[*]", |ctx| match &self.rule {
            Some(rule) => rule.merge(template, ctx),
            None => expand(template, ctx),
        });
        let mut items = Vec::with_capacity(self.items.len());
        let mut ok = rule.is_some();
        for (i, item) in self.items.iter().enumerate() {
            match ctx.nested(index_segment(i), |ctx| item.merge(template, ctx)) {
                Some(merged) => items.push(merged),
                None => ok = false,
            }
        }
        ok.then(|| Arc::new(Self { items, rule }) as SchemaRef)
    }

    fn validate(&self, elements: &[Template], ctx: &mut MergeContext) -> Option<SchemaRef> {
        let mut items = Vec::with_capacity(elements.len());
        let mut ok = true;
        for (i, element) in elements.iter().enumerate() {
            let Some(schema) = self.items.get(i).or(self.rule.as_ref()) else {
                break;
            };
            match ctx.nested(index_segment(i), |ctx| schema.merge(element, ctx)) {
                Some(merged) => items.push(merged),
                None => ok = false,
            }
        }
        for (i, item) in self.items.iter().enumerate().skip(elements.len()) {
            if item.is_required() {
                ctx.nested(index_segment(i), |ctx| {
                    ctx.report(DiagnosticKind::Missing, "required element is absent");
                });
                ok = false;
            }
        }
        ok.then(|| {
            Arc::new(Self {
                items,
                rule: self.rule.clone(),
            }) as SchemaRef
        })
    }

    fn positional(&self, elements: &[Template], ctx: &mut MergeContext) -> Option<SchemaRef> {
        let len = self.items.len().max(elements.len());
        let mut items = Vec::with_capacity(len);
        let mut ok = true;
        for i in 0..len {
            let merged = match (self.items.get(i), elements.get(i)) {
                (Some(item), Some(element)) => ctx.nested(index_segment(i), |ctx| item.merge(element, ctx)),
                (Some(item), None) => Some(Arc::clone(item)),
                (None, Some(element)) => ctx.nested(index_segment(i), |ctx| match &self.rule {
                    Some(rule) => rule.merge(element, ctx),
                    None => expand(element, ctx),
                }),
                (None, None) => None,
            };
            match merged {
                Some(schema) => items.push(schema),
                None => ok = false,
            }
        }
        ok.then(|| {
            Arc::new(Self {
                items,
                rule: self.rule.clone(),
            }) as SchemaRef
        })
    }
}

#[async_trait::async_trait]
impl Schema for ArraySchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        for (i, item) in self.items.iter().enumerate() {
            item.scope(scope.subscope(&i.to_string()), diagnostics);
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let Template::Array(elements) = template else {
            report_shape(ctx, "an array", template);
            return None;
        };
        match ctx.mode() {
            Mode::Mix if elements.len() == 1 => self.broadcast(&elements[0], ctx),
            Mode::Match => self.validate(elements, ctx),
            Mode::Mix | Mode::Mux | Mode::Merge => self.positional(elements, ctx),
        }
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        let mut out = Vec::with_capacity(self.items.len());
        for (i, item) in self.items.iter().enumerate() {
            if let Some(value) = item.render(pass, &child_chain(chain, i.to_string())).await? {
                out.push(value);
            }
        }
        Ok(Some(Value::Array(out)))
    }

    fn is_required(&self) -> bool {
        self.items.iter().any(|i| i.is_required())
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.rule.is_none()
    }
}
