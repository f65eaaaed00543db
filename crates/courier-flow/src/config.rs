//! Engine and sequence configuration

use courier_expr::Bindings;
use courier_schema::{ConfigurationSpace, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Encoding of bodies that declare none
    pub default_encoding: Encoding,
    /// Transitions one attempt may take before giving up
    pub max_transitions: usize,
    /// Redact secret values in previews
    pub redact_secrets: bool,
    /// Memoized computations kept per render pass
    pub render_cache_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_encoding: Encoding::Json,
            max_transitions: 1000,
            redact_secrets: true,
            render_cache_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default body encoding
    #[inline]
    #[must_use]
    pub fn with_default_encoding(mut self, encoding: Encoding) -> Self {
        self.default_encoding = encoding;
        self
    }

    /// With transition limit
    #[inline]
    #[must_use]
    pub fn with_max_transitions(mut self, max: usize) -> Self {
        self.max_transitions = max;
        self
    }

    /// With secret redaction on or off
    #[inline]
    #[must_use]
    pub fn with_redact_secrets(mut self, redact: bool) -> Self {
        self.redact_secrets = redact;
        self
    }

    /// With render cache capacity
    #[inline]
    #[must_use]
    pub fn with_render_cache_capacity(mut self, capacity: u64) -> Self {
        self.render_cache_capacity = capacity;
        self
    }
}

/// Dependent flow run before a sequence starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UseRepr")]
pub struct UseDeclaration {
    /// Registered flow name
    pub flow: String,
    /// Names the flow supplies; when all are already bound it is skipped
    pub provides: Vec<String>,
    /// Extra input values for the flow
    pub values: Bindings,
}

impl UseDeclaration {
    /// Use of `flow` with no declared outputs
    #[must_use]
    pub fn new(flow: impl Into<String>) -> Self {
        Self {
            flow: flow.into(),
            provides: Vec::new(),
            values: Bindings::new(),
        }
    }

    /// Declare the names the flow supplies
    #[must_use]
    pub fn providing(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.provides = names.into_iter().map(Into::into).collect();
        self
    }

    /// Check if `values` already holds everything the flow provides
    #[must_use]
    pub fn satisfied_by(&self, values: &Bindings) -> bool {
        !self.provides.is_empty() && self.provides.iter().all(|name| values.contains_key(name))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UseRepr {
    Name(String),
    Full {
        flow: String,
        #[serde(default)]
        provides: Vec<String>,
        #[serde(default)]
        values: Bindings,
    },
}

impl From<UseRepr> for UseDeclaration {
    fn from(repr: UseRepr) -> Self {
        match repr {
            UseRepr::Name(flow) => Self::new(flow),
            UseRepr::Full { flow, provides, values } => Self { flow, provides, values },
        }
    }
}

/// Leading configuration block of a flow document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfiguration {
    /// Times the whole sequence may run before its last error is raised
    pub attempts: u32,
    /// Dependent flows
    #[serde(rename = "use")]
    pub uses: Vec<UseDeclaration>,
    /// Values applied when absent from the input
    pub defaults: Bindings,
    /// Layered configuration dictionaries
    pub config: Value,
}

impl Default for SequenceConfiguration {
    fn default() -> Self {
        Self {
            attempts: 1,
            uses: Vec::new(),
            defaults: Bindings::new(),
            config: Value::Null,
        }
    }
}

impl SequenceConfiguration {
    /// Parse a YAML block; an empty block is the default
    ///
    /// # Errors
    /// Returns the YAML error message.
    pub fn from_yaml(text: &str) -> Result<Self, String> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    }

    /// Configuration space of the `config` layers
    #[must_use]
    pub fn space(&self) -> ConfigurationSpace {
        ConfigurationSpace::from_value(&self.config)
    }

    /// Sequence-level attempt budget, at least one
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_block() {
        let config = SequenceConfiguration::from_yaml(
            r"
attempts: 3
use:
  - login
  - flow: seed
    provides: [order_id]
defaults:
  page: 1
config:
  env:
    dev: { base: 'http://localhost' }
",
        )
        .unwrap();
        assert_eq!(config.attempts(), 3);
        assert_eq!(config.uses[0], UseDeclaration::new("login"));
        assert_eq!(config.uses[1].provides, vec!["order_id".to_string()]);
        assert_eq!(config.defaults.get("page"), Some(&json!(1)));
        assert_eq!(config.space().len(), 1);
    }

    #[test]
    fn empty_block() {
        assert_eq!(SequenceConfiguration::from_yaml("  \n").unwrap(), SequenceConfiguration::default());
    }

    #[test]
    fn engine_defaults() {
        let config: EngineConfig = serde_json::from_value(json!({"max_transitions": 5})).unwrap();
        assert_eq!(config, EngineConfig::new().with_max_transitions(5));
    }

    #[test]
    fn satisfied_uses() {
        let declared = UseDeclaration::new("seed").providing(["id"]);
        let mut values = Bindings::new();
        assert!(!declared.satisfied_by(&values));
        values.insert("id".into(), json!(1));
        assert!(declared.satisfied_by(&values));
        assert!(!UseDeclaration::new("login").satisfied_by(&values));
    }
}
