//! Field plumbing shared by request and response schemas

use courier_expr::to_text;
use courier_schema::{MergeContext, SchemaRef, Template};
use indexmap::IndexMap;
use serde_json::Value;

/// Merge `fields[key]` into `slot`, if present
///
/// Returns `false` when the merge failed.
pub(crate) fn merge_field(
    slot: &mut SchemaRef,
    key: &str,
    fields: &IndexMap<String, Template>,
    ctx: &mut MergeContext,
) -> bool {
    let Some(template) = fields.get(key) else {
        return true;
    };
    match ctx.nested(key, |ctx| slot.merge(template, ctx)) {
        Some(merged) => {
            *slot = merged;
            true
        }
        None => false,
    }
}

/// Text of a rendered scalar, empty when omitted
pub(crate) fn text(value: Option<Value>) -> String {
    value.map(|v| to_text(&v)).unwrap_or_default()
}

/// `[key, value]` pairs of a rendered keyed list
pub(crate) fn pairs(value: Option<Value>) -> Vec<(String, String)> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item.as_array().map(Vec::as_slice) {
            Some([key, value]) => Some((to_text(key), to_text(value))),
            _ => None,
        })
        .collect()
}

/// Rendered pairs back to a JSON value
pub(crate) fn pairs_value(pairs: &[(String, String)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), Value::String(v.clone())]))
            .collect(),
    )
}
