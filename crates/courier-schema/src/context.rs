//! Merge modes and the merge context

use crate::{Diagnostic, DiagnosticKind};
use serde::{Deserialize, Serialize};

/// How a template combines with an existing schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Validate only; literals must match exactly and no keys are added
    Match,
    /// Combine partial templates describing one entity; a one-element
    /// array is a rule for every element
    Mix,
    /// Combine concrete instances; strings are data and later values win
    Mux,
    /// Incremental combination of a template with runtime input
    #[default]
    Merge,
}

impl Mode {
    /// Strings are data rather than patterns in this mode
    #[inline]
    #[must_use]
    pub fn strings_are_data(self) -> bool {
        matches!(self, Self::Mux | Self::Match)
    }
}

/// What unresolved placeholders do at render time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Unresolved required placeholders are an error
    #[default]
    Render,
    /// Unresolved placeholders stay as source text
    Prerender,
    /// Prerender with secret and hidden values redacted
    Preview,
}

/// State threaded through one merge
#[derive(Debug, Clone)]
pub struct MergeContext {
    mode: Mode,
    path: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl MergeContext {
    /// Create context for `mode`
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            path: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Current mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current location, e.g. `body.items[0]`
    #[must_use]
    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            if !segment.starts_with('[') && !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    /// Run `f` one level deeper at `segment`
    ///
    /// Numeric index segments are written as `[n]`.
    pub fn nested<R>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> R) -> R {
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }

    /// Run `f` under a different mode
    pub fn with_mode<R>(&mut self, mode: Mode, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = std::mem::replace(&mut self.mode, mode);
        let result = f(self);
        self.mode = previous;
        result
    }

    /// Record a diagnostic at the current location
    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(self.path(), kind, message);
        tracing::debug!(%diagnostic, "merge diagnostic");
        self.diagnostics.push(diagnostic);
    }

    /// Diagnostics recorded so far
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Consume the context, returning its diagnostics
    #[inline]
    #[must_use]
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

/// Path segment for an array index
#[inline]
#[must_use]
pub fn index_segment(index: usize) -> String {
    format!("[{index}]")
}
