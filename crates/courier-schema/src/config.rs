//! Configuration space
//!
//! Layered configuration dictionaries expand into candidates: one per
//! combination of options across layers. Binding concrete values removes
//! the candidates that disagree. Candidates never come back.
//!
//! ```text
//! env:      { dev: { host: dev.local }, prod: { host: api.example.com } }
//! version:  { v1: { prefix: /v1 },      v2: { prefix: /v2 } }
//! ```
//!
//! expands to four candidates; `choose("host", "dev.local")` leaves two.

use crate::scope::Scope;
use courier_expr::{loosely_equal, to_text, Bindings};
use courier_pattern::{is_templated, Pattern};
use indexmap::IndexMap;
use serde_json::Value;

/// Options of one configuration layer: option name to bindings
pub type Layer = IndexMap<String, Bindings>;

#[derive(Debug, Clone, Default, PartialEq)]
struct Candidate {
    choices: IndexMap<String, String>,
    values: Bindings,
}

impl Candidate {
    fn admits(&self, name: &str, value: &Value) -> bool {
        if let Some(option) = self.choices.get(name) {
            return *option == to_text(value);
        }
        self.values
            .get(name)
            .map_or(true, |expected| compatible(expected, value))
    }
}

/// Set of still-viable configuration candidates
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSpace {
    candidates: Vec<Candidate>,
    defaults: Bindings,
}

impl Default for ConfigurationSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationSpace {
    /// Space with a single empty candidate
    #[must_use]
    pub fn new() -> Self {
        Self {
            candidates: vec![Candidate::default()],
            defaults: Bindings::new(),
        }
    }

    /// Cartesian expansion of named layers
    ///
    /// A layer with no options is skipped.
    #[must_use]
    pub fn from_layers(layers: &IndexMap<String, Layer>) -> Self {
        let mut candidates = vec![Candidate::default()];
        for (key, options) in layers {
            if options.is_empty() {
                continue;
            }
            let mut next = Vec::with_capacity(candidates.len() * options.len());
            for candidate in &candidates {
                for (option, bindings) in options {
                    let mut expanded = candidate.clone();
                    expanded.choices.insert(key.clone(), option.clone());
                    for (name, value) in bindings {
                        expanded.values.insert(name.clone(), value.clone());
                    }
                    next.push(expanded);
                }
            }
            candidates = next;
        }
        Self {
            candidates,
            defaults: Bindings::new(),
        }
    }

    /// Layers from a `{ key: { option: { name: value } } }` value
    ///
    /// Entries of any other shape are ignored.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let mut layers = IndexMap::new();
        if let Value::Object(keys) = value {
            for (key, options) in keys {
                let Value::Object(options) = options else {
                    continue;
                };
                let layer: Layer = options
                    .iter()
                    .filter_map(|(option, bindings)| match bindings {
                        Value::Object(map) => Some((
                            option.clone(),
                            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                        )),
                        _ => None,
                    })
                    .collect();
                layers.insert(key.clone(), layer);
            }
        }
        Self::from_layers(&layers)
    }

    /// Set values used when nothing else resolves a name
    #[must_use]
    pub fn with_defaults(mut self, defaults: Bindings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Remaining candidate count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Check if no candidate was ever configured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Check if every candidate has been eliminated
    #[inline]
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Remove candidates inconsistent with `name = value`
    ///
    /// Returns `false` once the space is exhausted.
    pub fn choose(&mut self, name: &str, value: &Value) -> bool {
        let before = self.candidates.len();
        self.candidates.retain(|c| c.admits(name, value));
        if self.candidates.len() != before {
            tracing::debug!(name, remaining = self.candidates.len(), "configuration narrowed");
        }
        !self.exhausted()
    }

    /// Check if any candidate admits `name = value` without narrowing
    #[must_use]
    pub fn match_value(&self, name: &str, value: &Value) -> bool {
        self.candidates.iter().any(|c| c.admits(name, value))
    }

    /// Narrow by every value bound in the root scope
    pub fn narrow(&mut self, scope: &Scope) -> bool {
        for (name, binding) in scope.values() {
            if !self.choose(name, &binding.value) {
                return false;
            }
        }
        !self.exhausted()
    }

    /// Placeholder patterns remaining candidates give for `name`
    #[must_use]
    pub fn patterns(&self, name: &str) -> Vec<Pattern> {
        let mut out: Vec<Pattern> = Vec::new();
        for candidate in &self.candidates {
            if let Some(Value::String(source)) = candidate.values.get(name) {
                if is_templated(source) && !out.iter().any(|p| p.source() == source) {
                    if let Ok(pattern) = Pattern::parse(source) {
                        out.push(pattern);
                    }
                }
            }
        }
        out
    }

    /// Value every remaining candidate agrees on for `name`
    #[must_use]
    pub fn resolved(&self, name: &str) -> Option<Value> {
        let mut agreed: Option<Value> = None;
        for candidate in &self.candidates {
            let value = match candidate.choices.get(name) {
                Some(option) => Value::String(option.clone()),
                None => candidate.values.get(name)?.clone(),
            };
            match &agreed {
                Some(existing) if !loosely_equal(existing, &value) => return None,
                Some(_) => {}
                None => agreed = Some(value),
            }
        }
        agreed
    }

    /// Default for `name`
    #[inline]
    #[must_use]
    pub fn default_value(&self, name: &str) -> Option<&Value> {
        self.defaults.get(name)
    }

    /// Options still selected for each layer key
    #[must_use]
    pub fn choices(&self, key: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for candidate in &self.candidates {
            if let Some(option) = candidate.choices.get(key) {
                if !out.contains(&option.as_str()) {
                    out.push(option);
                }
            }
        }
        out
    }
}

fn compatible(expected: &Value, actual: &Value) -> bool {
    if let Value::String(source) = expected {
        if is_templated(source) {
            return Pattern::parse(source)
                .ok()
                .and_then(|p| p.matches(&to_text(actual)))
                .is_some();
        }
    }
    loosely_equal(expected, actual) || to_text(expected) == to_text(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn space() -> ConfigurationSpace {
        ConfigurationSpace::from_value(&json!({
            "env": {
                "dev": { "host": "dev.local" },
                "prod": { "host": "api.example.com" }
            },
            "version": {
                "v1": { "prefix": "/v1" },
                "v2": { "prefix": "/v{{n}}" }
            }
        }))
    }

    #[test]
    fn cartesian_expansion() {
        assert_eq!(space().len(), 4);
        assert_eq!(ConfigurationSpace::new().len(), 1);
    }

    #[test]
    fn choose_narrows() {
        let mut config = space();
        assert!(config.choose("host", &json!("dev.local")));
        assert_eq!(config.len(), 2);
        assert_eq!(config.resolved("env"), Some(json!("dev")));
        assert_eq!(config.resolved("host"), Some(json!("dev.local")));
        assert_eq!(config.resolved("prefix"), None);
    }

    #[test]
    fn choose_by_option_name() {
        let mut config = space();
        assert!(config.choose("version", &json!("v1")));
        assert_eq!(config.choices("version"), vec!["v1"]);
        assert_eq!(config.resolved("prefix"), Some(json!("/v1")));
    }

    #[test]
    fn templated_candidates_match_by_pattern() {
        let mut config = space();
        assert_eq!(config.patterns("prefix").len(), 1);
        assert!(config.choose("prefix", &json!("/v7")));
        assert_eq!(config.choices("version"), vec!["v2"]);
    }

    #[test]
    fn exhaustion() {
        let mut config = space();
        assert!(!config.match_value("host", &json!("elsewhere")));
        assert!(!config.choose("host", &json!("elsewhere")));
        assert!(config.exhausted());
    }

    #[test]
    fn unrelated_names_keep_candidates() {
        let mut config = space();
        assert!(config.choose("token", &json!("abc")));
        assert_eq!(config.len(), 4);
    }

    #[test]
    fn defaults() {
        let mut defaults = Bindings::new();
        defaults.insert("page".into(), json!(1));
        let config = ConfigurationSpace::new().with_defaults(defaults);
        assert_eq!(config.default_value("page"), Some(&json!(1)));
    }
}
