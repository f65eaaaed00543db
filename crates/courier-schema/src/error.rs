//! Diagnostics and render failures

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Category of a merge diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A name was bound to two different values
    Conflict,
    /// A value does not satisfy the schema at this position
    Mismatch,
    /// A required value is absent
    Missing,
    /// Two patterns cannot share a position
    Unmeldable,
    /// No configuration candidate remains
    Exhausted,
    /// Encoded content could not be decoded
    Decode,
}

/// Soft merge failure at a location
///
/// Diagnostics are collected, never thrown. The merge that produced them
/// yields no schema and the caller decides whether that is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Location, e.g. `body.items[0].id`
    pub path: String,
    /// Category
    pub kind: DiagnosticKind,
    /// Human readable detail
    pub message: String,
}

impl Diagnostic {
    /// Create diagnostic
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "$" } else { &self.path };
        write!(f, "{path}: {:?}: {}", self.kind, self.message)
    }
}

/// Render failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    /// Required placeholders had no value
    #[error("unresolved at {path}: {}", names.join(", "))]
    Unresolved {
        /// Location of the placeholder
        path: String,
        /// Unresolved names
        names: Vec<String>,
    },

    /// Configuration space has no remaining candidate
    #[error("no configuration matches the bound values")]
    Exhausted,

    /// Value could not be converted to the required form
    #[error("conversion failed at {path}: {message}")]
    Conversion {
        /// Location
        path: String,
        /// Detail
        message: String,
    },

    /// A value does not satisfy its placeholder's regex
    #[error("value {value:?} does not satisfy `{param}`")]
    PatternViolation {
        /// Variable name
        param: String,
        /// Offending value
        value: String,
    },

    /// Computed binding failed
    #[error("evaluating `{name}` failed: {message}")]
    Evaluation {
        /// Binding name
        name: String,
        /// Evaluator message
        message: String,
    },

    /// Bound values contradict the schema
    #[error("inconsistent bindings: {}", join(.0))]
    Inconsistent(Vec<Diagnostic>),
}

/// Expression cannot be lowered to a template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    /// Expression kind has no template form
    #[error("cannot use `{0}` as a template")]
    Unsupported(String),

    /// Encoding call with the wrong number of arguments
    #[error("`{name}` takes exactly one argument, got {count}")]
    Arity {
        /// Called encoding
        name: String,
        /// Supplied argument count
        count: usize,
    },
}

pub(crate) fn join(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
