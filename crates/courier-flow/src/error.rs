//! Error types for flows

use courier_http::HttpError;
use courier_schema::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// Why one response template rejected a response
#[derive(Debug, Clone)]
pub struct Mismatch {
    /// Position of the template among the step's candidates
    pub candidate: usize,
    /// Where and how the response differs
    pub diagnostics: Vec<Diagnostic>,
    /// Redacted rendering of what was expected
    pub preview: Option<Value>,
}

/// Failure reported by a [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DispatchError {
    /// What went wrong
    pub message: String,
}

impl DispatchError {
    /// Error with `message`
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised compiling or running flows
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// Malformed flow document or step list
    #[error("parse error: {0}")]
    Parse(String),

    /// A request could not be rendered
    #[error("step `{step}`: {source}")]
    Render {
        /// Step name or index
        step: String,
        /// Underlying failure
        #[source]
        source: HttpError,
    },

    /// The dispatcher failed
    #[error("step `{step}`: dispatch failed: {source}")]
    Dispatch {
        /// Step name or index
        step: String,
        /// Underlying failure
        #[source]
        source: DispatchError,
    },

    /// The response fits none of the declared templates
    #[error("step `{step}`: status {status} matched none of {} response templates", .mismatches.len())]
    UnmatchedResponse {
        /// Step name or index
        step: String,
        /// Observed status
        status: u16,
        /// One entry per rejecting template
        mismatches: Vec<Mismatch>,
    },

    /// A step ran out of retries
    #[error("step `{step}` ran out of retries after {visits} tries")]
    RetryExhausted {
        /// Step name or index
        step: String,
        /// Times the step was entered
        visits: u32,
    },

    /// An outcome selected `fail`
    #[error("step `{step}` failed")]
    Failed {
        /// Step name or index
        step: String,
    },

    /// The cancellation signal fired
    #[error("flow cancelled")]
    Cancelled,

    /// A script step failed
    #[error("step `{step}`: script failed: {message}")]
    Script {
        /// Step name or index
        step: String,
        /// Evaluation error
        message: String,
    },

    /// A `use` names a flow that is not registered
    #[error("unknown flow `{0}`")]
    UnknownFlow(String),

    /// An attempt took more transitions than allowed
    #[error("flow exceeded {0} transitions")]
    TransitionLimit(usize),
}

impl FlowError {
    /// Check if a sequence-level attempt may be retried after this error
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Render { .. } | Self::Dispatch { .. } | Self::UnmatchedResponse { .. } | Self::Failed { .. }
        )
    }
}

/// Result alias for flows
pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable() {
        assert!(FlowError::Failed { step: "a".into() }.is_retryable());
        assert!(!FlowError::Cancelled.is_retryable());
        assert!(!FlowError::RetryExhausted {
            step: "a".into(),
            visits: 1
        }
        .is_retryable());
    }
}
