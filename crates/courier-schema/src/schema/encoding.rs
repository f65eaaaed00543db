//! Encoding wrappers

use super::{Schema, SchemaRef};
use crate::codec::{decode, encode};
use crate::render::RenderPass;
use crate::scope::Scope;
use crate::{Diagnostic, DiagnosticKind, Encoding, MergeContext, RenderError, Template};
use serde_json::Value;
use std::sync::Arc;

/// Nested schema serialized with an encoding
///
/// Merging encoded text decodes it first; rendering encodes the inner value.
#[derive(Debug, Clone)]
pub struct EncodingSchema {
    encoding: Encoding,
    inner: SchemaRef,
}

impl EncodingSchema {
    /// Wrap `inner`
    #[inline]
    #[must_use]
    pub fn new(encoding: Encoding, inner: SchemaRef) -> Self {
        Self { encoding, inner }
    }

    /// Wrapped schema
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &SchemaRef {
        &self.inner
    }

    fn wrap(&self, inner: SchemaRef) -> SchemaRef {
        Arc::new(Self {
            encoding: self.encoding,
            inner,
        })
    }
}

#[async_trait::async_trait]
impl Schema for EncodingSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        self.inner.scope(scope, diagnostics);
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        match template {
            Template::Encoded { encoding, inner } if *encoding == self.encoding => {
                self.inner.merge(inner, ctx).map(|s| self.wrap(s))
            }
            Template::Encoded { encoding, .. } => {
                ctx.report(
                    DiagnosticKind::Mismatch,
                    format!("expected {} content, found {encoding}", self.encoding),
                );
                None
            }
            Template::Value(Value::String(text)) if self.encoding != Encoding::Text => {
                match decode(self.encoding, text) {
                    Ok(decoded) => self.inner.merge(&decoded, ctx).map(|s| self.wrap(s)),
                    Err(message) => {
                        ctx.report(DiagnosticKind::Decode, message);
                        None
                    }
                }
            }
            other => self.inner.merge(other, ctx).map(|s| self.wrap(s)),
        }
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        let Some(value) = self.inner.render(pass, chain).await? else {
            return Ok(None);
        };
        encode(self.encoding, &value)
            .map(|text| Some(Value::String(text)))
            .map_err(|message| RenderError::Conversion {
                path: RenderPass::path(chain),
                message,
            })
    }

    fn is_required(&self) -> bool {
        self.inner.is_required()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn encoding(&self) -> Option<Encoding> {
        Some(self.encoding)
    }
}
