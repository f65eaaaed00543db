//! Error types for the HTTP layer

use courier_schema::{Diagnostic, RenderError};
use thiserror::Error;

/// Errors raised building, combining or rendering HTTP templates
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// The raw template has the wrong shape
    #[error("malformed template: {0}")]
    Template(String),

    /// Combining templates failed
    #[error("template does not fit: {}", list(.0))]
    Merge(Vec<Diagnostic>),

    /// Rendering failed
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The rendered value is not a usable request
    #[error("rendered request is malformed: {0}")]
    Malformed(String),
}

impl HttpError {
    /// Diagnostics carried by a failed combination
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Merge(diagnostics) => diagnostics,
            Self::Render(RenderError::Inconsistent(diagnostics)) => diagnostics,
            _ => &[],
        }
    }
}

fn list(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for the HTTP layer
pub type Result<T> = std::result::Result<T, HttpError>;
