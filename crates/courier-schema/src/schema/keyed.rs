//! Ordered, multivalued key/value lists
//!
//! Headers and search params. The n-th occurrence of a key in a template
//! lines up with the n-th occurrence in the schema. Repeated occurrences
//! open subscopes so each value can bind its own captures.

use super::{child_chain, expand, report_shape, Schema, SchemaRef};
use crate::render::RenderPass;
use crate::scope::Scope;
use crate::{Diagnostic, DiagnosticKind, MergeContext, Mode, RenderError, Template};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Key/value list schema
#[derive(Debug, Clone, Default)]
pub struct KeyedListSchema {
    entries: Vec<(String, SchemaRef)>,
    case_insensitive: bool,
}

impl KeyedListSchema {
    /// Empty list with exact key comparison
    #[inline]
    #[must_use]
    pub fn case_sensitive() -> Self {
        Self::default()
    }

    /// Empty list comparing keys without case
    #[inline]
    #[must_use]
    pub fn case_insensitive() -> Self {
        Self {
            entries: Vec::new(),
            case_insensitive: true,
        }
    }

    /// Entries in order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[(String, SchemaRef)] {
        &self.entries
    }

    /// First schema stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SchemaRef> {
        let key = self.normalize(key);
        self.entries
            .iter()
            .find(|(k, _)| self.normalize(k) == key)
            .map(|(_, schema)| schema)
    }

    fn normalize(&self, key: &str) -> String {
        if self.case_insensitive {
            key.to_ascii_lowercase()
        } else {
            key.to_string()
        }
    }

    fn nth_position(&self, entries: &[(String, SchemaRef)], key: &str, n: usize) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, (k, _))| self.normalize(k) == key)
            .nth(n)
            .map(|(i, _)| i)
    }

    /// Scope key for the `n`-th occurrence of `key`, `None` for the first
    fn occurrence_key(key: &str, n: usize) -> Option<String> {
        (n > 0).then(|| format!("{key}#{n}"))
    }
}

/// Pairs of a keyed-list-like template
///
/// Objects are accepted; an array field value expands to one pair per
/// element.
fn pairs(template: &Template) -> Option<Vec<(String, Template)>> {
    match template {
        Template::KeyedList(entries) => Some(entries.clone()),
        Template::Object(fields) => Some(
            fields
                .iter()
                .flat_map(|(key, value)| match value {
                    Template::Array(items) => items.iter().map(|item| (key.clone(), item.clone())).collect(),
                    other => vec![(key.clone(), other.clone())],
                })
                .collect(),
        ),
        Template::Array(items) => items
            .iter()
            .map(|item| match item {
                Template::Array(pair) => match pair.as_slice() {
                    [Template::Value(Value::String(key)), value] => Some((key.clone(), value.clone())),
                    _ => None,
                },
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl Schema for KeyedListSchema {
    fn scope(&self, scope: &mut Scope, diagnostics: &mut Vec<Diagnostic>) {
        let mut seen: IndexMap<String, usize> = IndexMap::new();
        for (key, schema) in &self.entries {
            let key = self.normalize(key);
            let n = seen.entry(key.clone()).or_insert(0);
            match Self::occurrence_key(&key, *n) {
                Some(sub) => schema.scope(scope.subscope(&sub), diagnostics),
                None => schema.scope(scope, diagnostics),
            }
            *n += 1;
        }
    }

    fn merge(&self, template: &Template, ctx: &mut MergeContext) -> Option<SchemaRef> {
        let Some(incoming) = pairs(template) else {
            report_shape(ctx, "a keyed list", template);
            return None;
        };

        let mut entries = self.entries.clone();
        let mut seen: IndexMap<String, usize> = IndexMap::new();
        let mut ok = true;
        for (key, value) in &incoming {
            let normalized = self.normalize(key);
            let n = seen.entry(normalized.clone()).or_insert(0);
            let occurrence = *n;
            *n += 1;

            match self.nth_position(&entries, &normalized, occurrence) {
                Some(position) => match ctx.nested(key.clone(), |ctx| entries[position].1.merge(value, ctx)) {
                    Some(merged) => entries[position].1 = merged,
                    None => ok = false,
                },
                None if ctx.mode() == Mode::Match => {}
                None => match ctx.nested(key.clone(), |ctx| expand(value, ctx)) {
                    Some(schema) => entries.push((key.clone(), schema)),
                    None => ok = false,
                },
            }
        }

        if ctx.mode() == Mode::Match {
            let mut counted: IndexMap<String, usize> = IndexMap::new();
            for (key, schema) in &self.entries {
                let normalized = self.normalize(key);
                let n = counted.entry(normalized.clone()).or_insert(0);
                let supplied = seen.get(&normalized).copied().unwrap_or(0);
                if *n >= supplied && schema.is_required() {
                    ctx.nested(key.clone(), |ctx| {
                        ctx.report(DiagnosticKind::Missing, "required entry is absent");
                    });
                    ok = false;
                }
                *n += 1;
            }
        }

        ok.then(|| {
            Arc::new(Self {
                entries,
                case_insensitive: self.case_insensitive,
            }) as SchemaRef
        })
    }

    async fn render(&self, pass: &RenderPass, chain: &[String]) -> Result<Option<Value>, RenderError> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut seen: IndexMap<String, usize> = IndexMap::new();
        for (key, schema) in &self.entries {
            let normalized = self.normalize(key);
            let n = seen.entry(normalized.clone()).or_insert(0);
            let rendered = match Self::occurrence_key(&normalized, *n) {
                Some(sub) => schema.render(pass, &child_chain(chain, sub)).await?,
                None => schema.render(pass, chain).await?,
            };
            *n += 1;
            if let Some(value) = rendered {
                out.push(Value::Array(vec![Value::String(key.clone()), value]));
            }
        }
        Ok(Some(Value::Array(out)))
    }

    fn is_required(&self) -> bool {
        self.entries.iter().any(|(_, s)| s.is_required())
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
