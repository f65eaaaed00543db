//! Secret redaction

use serde_json::Value;
use std::fmt::Debug;

/// Masks values flagged secret or hidden in previews
pub trait Redactor: Send + Sync + Debug {
    /// Replacement for `value`
    fn redact(&self, value: &Value) -> Value;
}

/// Replaces every redacted value with `***`
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskRedactor;

impl Redactor for MaskRedactor {
    fn redact(&self, _value: &Value) -> Value {
        Value::String("***".to_string())
    }
}
