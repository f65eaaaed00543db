//! Composable schemas
//!
//! Every schema exposes the same three operations:
//!
//! - `scope`: declare placeholders and define captured values
//! - `merge`: combine with a raw template under a [`Mode`], returning a new
//!   schema or `None` with diagnostics recorded on the context
//! - `render`: resolve to a concrete value
//!
//! Schemas are immutable. A failed merge leaves the original usable.

mod array;
mod encoding;
mod keyed;
mod object;
mod reference;
mod scalar;

pub use array::ArraySchema;
pub use encoding::EncodingSchema;
pub use keyed::KeyedListSchema;
pub use object::ObjectSchema;
pub use reference::ReferenceSchema;
pub use scalar::ScalarSchema;

use crate::config::ConfigurationSpace;
use crate::render::RenderPass;
use crate::scope::Scope;
use crate::{Diagnostic, DiagnosticKind, Encoding, MergeContext, Mode, RenderError, Template};
use courier_expr::Bindings;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Shared schema handle
pub type SchemaRef = Arc<dyn Schema>;

/// Composable template unit
#[async_trait::async_trait]
pub trait Schema: Send + Sync + Debug {
    /// Declare placeholders and define captures in `scope`
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>);

    /// Combine with `template` under the context's mode
    ///
    /// Returns `None` after recording at least one diagnostic.
    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef>;

    /// Resolve to a concrete value; `None` means omit
    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError>;

    /// A matched value must supply this position
    fn is_required(&self) -> bool {
        false
    }

    /// Schema carries no constraint yet
    fn is_empty(&self) -> bool {
        false
    }

    /// Encoding of this position, if it is an encoding wrapper
    fn encoding(&self) -> Option<Encoding> {
        None
    }
}

/// Build a schema from `template` by shape
///
/// In [`Mode::Match`] expansion runs as [`Mode::Mux`] so strings stay data.
pub fn expand(template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
    let empty: SchemaRef = match template {
        Template::Value(_) => Arc::new(ScalarSchema::new()),
        Template::Object(_) => Arc::new(ObjectSchema::new()),
        Template::Array(_) => Arc::new(ArraySchema::new()),
        Template::KeyedList(_) => Arc::new(KeyedListSchema::case_sensitive()),
        Template::Encoded { encoding, inner } => {
            let inner = expand(inner, ctx)?;
            return Some(Arc::new(EncodingSchema::new(*encoding, inner)));
        }
        Template::Reference(name) => return Some(Arc::new(ReferenceSchema::new(name.clone()))),
    };
    if ctx.mode() == Mode::Match {
        ctx.with_mode(Mode::Mux, |ctx| empty.merge(template, ctx))
    } else {
        empty.merge(template, ctx)
    }
}

/// Build the scope tree of `schema` seeded with `inputs`
#[must_use]
pub fn build_scope(schema: &dyn Schema, inputs: &Bindings) -> (Scope, Vec<Diagnostic>) {
    let mut scope = Scope::seeded(inputs);
    let mut diagnostics = Vec::new();
    schema.scope(&mut scope, &mut diagnostics);
    (scope, diagnostics)
}

/// Outcome of a successful [`unify`]
#[derive(Debug, Clone)]
pub struct Merged {
    /// Combined schema
    pub schema: SchemaRef,
    /// Configuration space narrowed by the bound values
    pub config: ConfigurationSpace,
    /// Scope tree of the combined schema
    pub scope: Scope,
}

/// Merge `template` into `schema`, then check the bindings it implies
///
/// Captures must agree with `inputs` and with each other, and at least one
/// configuration candidate must admit them.
///
/// # Errors
/// Returns every diagnostic collected; never an empty list.
pub fn unify(
    schema: &SchemaRef,
    template: &Template,
    mode: Mode,
    inputs: &Bindings,
    config: &ConfigurationSpace,
) -> Result<Merged, Vec<Diagnostic>> {
    let mut ctx = MergeContext::new(mode);
    let merged = schema.merge(template, &mut ctx);
    let mut diagnostics = ctx.into_diagnostics();
    let Some(merged) = merged else {
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::new("", DiagnosticKind::Mismatch, "template does not fit"));
        }
        return Err(diagnostics);
    };

    let (scope, scope_diagnostics) = build_scope(merged.as_ref(), inputs);
    diagnostics.extend(scope_diagnostics);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let mut config = config.clone();
    if !config.narrow(&scope) {
        return Err(vec![Diagnostic::new(
            "",
            DiagnosticKind::Exhausted,
            "no configuration admits the bound values",
        )]);
    }

    Ok(Merged {
        schema: merged,
        config,
        scope,
    })
}

pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    courier_expr::loosely_equal(a, b) || courier_expr::to_text(a) == courier_expr::to_text(b)
}

/// Replace, reject or accept a second concrete value for one position
pub(crate) fn combine_datum(existing: Option<&Value>, incoming: &Value, ctx: &mut MergeContext) -> bool {
    match existing {
        Some(existing) if !same_value(existing, incoming) => match ctx.mode() {
            Mode::Mux => true,
            Mode::Match => {
                ctx.report(DiagnosticKind::Mismatch, format!("expected {existing}, found {incoming}"));
                false
            }
            Mode::Mix | Mode::Merge => {
                ctx.report(DiagnosticKind::Conflict, format!("{existing} conflicts with {incoming}"));
                false
            }
        },
        _ => true,
    }
}

pub(crate) fn report_shape(ctx: &mut MergeContext, expected: &str, template: &Template) {
    ctx.report(
        DiagnosticKind::Mismatch,
        format!("expected {expected}, found {}", template.shape()),
    );
}

pub(crate) fn child_chain(chain: &[String], key: impl Into<String>) -> Vec<String> {
    let mut out = chain.to_vec();
    out.push(key.into());
    out
}
