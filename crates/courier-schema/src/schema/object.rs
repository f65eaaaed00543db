//! Keyed fields

use super::{expand, report_shape, Schema, SchemaRef};
use crate::render::RenderPass;
use crate::scope::Scope;
use crate::{Diagnostic, DiagnosticKind, MergeContext, Mode, RenderError, Template};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Object with named fields sharing the parent scope
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: IndexMap<String, SchemaRef>,
}

impl ObjectSchema {
    /// Object with no fields
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy with `key` set to `schema`
    #[must_use]
    pub fn with_field(&self, key: impl Into<String>, schema: SchemaRef) -> Self {
        let mut next = self.clone();
        next.fields.insert(key.into(), schema);
        next
    }

    /// Field schema for `key`
    #[inline]
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&SchemaRef> {
        self.fields.get(key)
    }

    /// Fields in declaration order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, SchemaRef> {
        &self.fields
    }
}

#[async_trait::async_trait]
impl Schema for ObjectSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        for field in self.fields.values() {
            field.scope(scope, diagnostics);
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let Template::Object(incoming) = template else {
            report_shape(ctx, "an object", template);
            return None;
        };

        let mut fields = self.fields.clone();
        let mut ok = true;
        for (key, field) in incoming {
            let merged = ctx.nested(key.clone(), |ctx| match fields.get(key) {
                Some(existing) => existing.merge(field, ctx).map(Some),
                None if ctx.mode() == Mode::Match => Some(None),
                None => expand(field, ctx).map(Some),
            });
            match merged {
                Some(Some(schema)) => {
                    fields.insert(key.clone(), schema);
                }
                Some(None) => {}
                None => ok = false,
            }
        }

        if ctx.mode() == Mode::Match {
            for (key, field) in &self.fields {
                if !incoming.contains_key(key) && field.is_required() {
                    ctx.nested(key.clone(), |ctx| {
                        ctx.report(DiagnosticKind::Missing, "required value is absent");
                    });
                    ok = false;
                }
            }
        }

        ok.then(|| Arc::new(Self { fields }) as SchemaRef)
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        let mut out = Map::new();
        for (key, field) in &self.fields {
            if let Some(value) = field.render(pass, chain).await? {
                out.insert(key.clone(), value);
            }
        }
        Ok(Some(Value::Object(out)))
    }

    fn is_required(&self) -> bool {
        self.fields.values().any(|f| f.is_required())
    }

    fn is_empty(&self) -> bool {
        self.fields.values().all(|f| f.is_empty())
    }
}
