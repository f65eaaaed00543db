//! Scope tree
//!
//! One scope per structural nesting point. Array elements and repeated
//! keyed-list entries open subscopes; objects and encodings share their
//! parent's scope. Lookups walk the index chain from the deepest scope
//! back to the root.

use crate::{Diagnostic, DiagnosticKind};
use courier_expr::{loosely_equal, to_text, Bindings};
use courier_pattern::{Hints, PatternVar};
use indexmap::IndexMap;
use serde_json::Value;

/// Static metadata of an identifier in one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration {
    /// Union of hints from every placeholder naming it
    pub hint: Hints,
    /// Computed-binding expression
    pub expression: Option<String>,
    /// Regex constraint
    pub regex: Option<String>,
}

impl Declaration {
    /// Declaration of a computed binding
    #[must_use]
    pub fn computed(expression: impl Into<String>) -> Self {
        Self {
            hint: Hints::NONE,
            expression: Some(expression.into()),
            regex: None,
        }
    }
}

impl From<&PatternVar> for Declaration {
    fn from(var: &PatternVar) -> Self {
        Self {
            hint: var.hint,
            expression: var.expression.clone(),
            regex: var.regex.clone(),
        }
    }
}

/// Where a bound value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Caller-supplied input value
    Input,
    /// Captured by matching a pattern
    Capture,
    /// Computed from a declared expression
    Computed,
    /// Agreed by every configuration candidate
    Configuration,
    /// Configuration default
    Default,
}

/// Value bound in a scope
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Bound value
    pub value: Value,
    /// Source of the value
    pub provenance: Provenance,
}

/// Scope tree node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    path: String,
    declarations: IndexMap<String, Declaration>,
    values: IndexMap<String, Binding>,
    subscopes: IndexMap<String, Scope>,
}

impl Scope {
    /// Empty root scope
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Root scope holding `inputs` as input values
    #[must_use]
    pub fn seeded(inputs: &Bindings) -> Self {
        let mut scope = Self::root();
        for (name, value) in inputs {
            scope.values.insert(
                name.clone(),
                Binding {
                    value: value.clone(),
                    provenance: Provenance::Input,
                },
            );
        }
        scope
    }

    /// Location of this scope, empty for the root
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Register metadata for `name`
    ///
    /// Later declarations refine earlier ones: hints accumulate, an
    /// expression or regex may be added but never replaced by a different one.
    ///
    /// # Errors
    /// Returns a [`DiagnosticKind::Conflict`] diagnostic on a contradicting
    /// expression or regex.
    pub fn declare(&mut self, name: &str, declaration: Declaration) -> Result<(), Diagnostic> {
        let Some(existing) = self.declarations.get_mut(name) else {
            self.declarations.insert(name.to_string(), declaration);
            return Ok(());
        };
        existing.hint = existing.hint.union(declaration.hint);
        refine(&mut existing.expression, declaration.expression)
            .and_then(|()| refine(&mut existing.regex, declaration.regex))
            .map_err(|(old, new)| {
                Diagnostic::new(
                    self.path.clone(),
                    DiagnosticKind::Conflict,
                    format!("`{name}` declared as both `{old}` and `{new}`"),
                )
            })
    }

    /// Declaration of `name` in this scope
    #[inline]
    #[must_use]
    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    /// Declarations in this scope
    pub fn declarations(&self) -> impl Iterator<Item = (&String, &Declaration)> {
        self.declarations.iter()
    }

    /// Bind `name` to a concrete value
    ///
    /// Redefining with an equal value is a no-op.
    ///
    /// # Errors
    /// Returns a [`DiagnosticKind::Conflict`] diagnostic when `name` is
    /// already bound to a different value.
    pub fn define(&mut self, name: &str, value: Value, provenance: Provenance) -> Result<(), Diagnostic> {
        if let Some(existing) = self.values.get(name) {
            if loosely_equal(&existing.value, &value) || to_text(&existing.value) == to_text(&value) {
                return Ok(());
            }
            return Err(Diagnostic::new(
                self.path.clone(),
                DiagnosticKind::Conflict,
                format!(
                    "`{name}` is {} but {} was captured",
                    existing.value, value
                ),
            ));
        }
        self.values
            .insert(name.to_string(), Binding { value, provenance });
        Ok(())
    }

    /// Value bound to `name` in this scope only
    #[inline]
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Binding> {
        self.values.get(name)
    }

    /// Values bound in this scope only
    pub fn values(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.values.iter()
    }

    /// Child scope for `key`, created on first use
    pub fn subscope(&mut self, key: &str) -> &mut Scope {
        let path = format!("{}[{key}]", self.path);
        self.subscopes
            .entry(key.to_string())
            .or_insert_with(|| Scope {
                path,
                ..Scope::default()
            })
    }

    /// Existing child scope for `key`
    #[inline]
    #[must_use]
    pub fn child(&self, key: &str) -> Option<&Scope> {
        self.subscopes.get(key)
    }

    /// Scopes along `chain`, root first; stops at the first missing key
    #[must_use]
    pub fn chain<'a>(&'a self, chain: &[String]) -> Vec<&'a Scope> {
        let mut out = vec![self];
        let mut current = self;
        for key in chain {
            match current.subscopes.get(key) {
                Some(next) => {
                    out.push(next);
                    current = next;
                }
                None => break,
            }
        }
        out
    }

    /// Scope exactly at `chain`
    #[must_use]
    pub fn at(&self, chain: &[String]) -> Option<&Scope> {
        chain
            .iter()
            .try_fold(self, |scope, key| scope.subscopes.get(key))
    }

    /// Nearest binding of `name` walking from `chain` back to the root
    #[must_use]
    pub fn lookup(&self, chain: &[String], name: &str) -> Option<&Binding> {
        self.chain(chain)
            .into_iter()
            .rev()
            .find_map(|scope| scope.values.get(name))
    }

    /// Nearest declaration of `name` and the depth of its scope
    #[must_use]
    pub fn lookup_declaration(&self, chain: &[String], name: &str) -> Option<(usize, &Declaration)> {
        self.chain(chain)
            .into_iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.declarations.get(name).map(|d| (depth, d)))
    }

    /// Values to hand back to the caller after a render or match
    ///
    /// Root values that did not come from the inputs, unless hinted `-`,
    /// plus values hinted `+` anywhere in the tree.
    #[must_use]
    pub fn exported(&self) -> Bindings {
        let mut out = Bindings::new();
        for (name, binding) in &self.values {
            let hint = self.declarations.get(name).map(|d| d.hint).unwrap_or_default();
            if binding.provenance != Provenance::Input && !hint.contains(Hints::NO_EXPORT) {
                out.insert(name.clone(), binding.value.clone());
            }
        }
        for subscope in self.subscopes.values() {
            subscope.collect_exports(&mut out);
        }
        out
    }

    fn collect_exports(&self, out: &mut Bindings) {
        for (name, binding) in &self.values {
            let exported = self
                .declarations
                .get(name)
                .is_some_and(|d| d.hint.contains(Hints::EXPORT));
            if exported {
                out.insert(name.clone(), binding.value.clone());
            }
        }
        for subscope in self.subscopes.values() {
            subscope.collect_exports(out);
        }
    }
}

fn refine(slot: &mut Option<String>, new: Option<String>) -> Result<(), (String, String)> {
    match (slot.as_ref(), new) {
        (_, None) => Ok(()),
        (None, Some(new)) => {
            *slot = Some(new);
            Ok(())
        }
        (Some(old), Some(new)) if old.trim() == new.trim() => Ok(()),
        (Some(old), Some(new)) => Err((old.clone(), new)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declarations_refine() {
        let mut scope = Scope::root();
        scope
            .declare("a", Declaration { hint: Hints::SECRET, ..Declaration::default() })
            .unwrap();
        scope.declare("a", Declaration::computed("b + 1")).unwrap();
        let decl = scope.declaration("a").unwrap();
        assert!(decl.hint.contains(Hints::SECRET));
        assert_eq!(decl.expression.as_deref(), Some("b + 1"));

        let err = scope.declare("a", Declaration::computed("c")).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Conflict);
    }

    #[test]
    fn define_conflicts_are_diagnostics() {
        let mut scope = Scope::seeded(&[("id".to_string(), json!(5))].into_iter().collect());
        assert!(scope.define("id", json!("5"), Provenance::Capture).is_ok());
        let err = scope.define("id", json!(6), Provenance::Capture).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Conflict);
    }

    #[test]
    fn lookup_walks_index_chain() {
        let mut root = Scope::root();
        root.define("a", json!(1), Provenance::Capture).unwrap();
        root.subscope("0")
            .define("b", json!(2), Provenance::Capture)
            .unwrap();

        let chain = vec!["0".to_string()];
        assert_eq!(root.lookup(&chain, "a").unwrap().value, json!(1));
        assert_eq!(root.lookup(&chain, "b").unwrap().value, json!(2));
        assert!(root.lookup(&[], "b").is_none());
        assert_eq!(root.child("0").unwrap().path(), "[0]");
    }

    #[test]
    fn exports() {
        let mut root = Scope::seeded(&[("input".to_string(), json!(1))].into_iter().collect());
        root.define("captured", json!(2), Provenance::Capture).unwrap();
        root.declare("private", Declaration { hint: Hints::NO_EXPORT, ..Declaration::default() })
            .unwrap();
        root.define("private", json!(3), Provenance::Capture).unwrap();
        let item = root.subscope("0");
        item.declare("id", Declaration { hint: Hints::EXPORT, ..Declaration::default() })
            .unwrap();
        item.define("id", json!(4), Provenance::Capture).unwrap();
        item.define("local", json!(5), Provenance::Capture).unwrap();

        let exported = root.exported();
        assert_eq!(exported.keys().collect::<Vec<_>>(), vec!["captured", "id"]);
    }
}
