//! Structural patterns
//!
//! A [`Pattern`] is either literal text or a regex-backed template whose
//! placeholders bind named captures.

use crate::parse::{parse_segments, PatternVar, Segment};
use crate::{PatternError, PatternRenderError};
use indexmap::IndexMap;
use regex::Regex;
use std::fmt::{self, Display, Formatter};

/// Captures bound by a successful match, in placeholder order
pub type Captures = IndexMap<String, String>;

/// Options controlling how placeholders become regexes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternOptions {
    /// Character a non-spread variable may not span inside composite patterns
    pub separator: Option<char>,
}

impl PatternOptions {
    /// Options for a field whose segments are split by `separator`
    #[inline]
    #[must_use]
    pub fn separated(separator: char) -> Self {
        Self {
            separator: Some(separator),
        }
    }
}

/// Parsed pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Literal,
    Template {
        regex: Regex,
        segments: Vec<Segment>,
        vars: Vec<PatternVar>,
        groups: Vec<usize>,
    },
}

/// Parse `source` into a pattern
///
/// # Errors
/// Returns [`PatternError`] for malformed placeholders or regex overrides.
pub fn patternize(source: &str, options: PatternOptions) -> Result<Pattern, PatternError> {
    Pattern::with_options(source, options)
}

/// Check if `source` contains any placeholder syntax
#[inline]
#[must_use]
pub fn is_templated(source: &str) -> bool {
    source.contains("{{")
}

impl Pattern {
    /// Parse with default options
    ///
    /// # Errors
    /// Returns [`PatternError`] for malformed placeholders.
    pub fn parse(source: &str) -> Result<Self, PatternError> {
        Self::with_options(source, PatternOptions::default())
    }

    /// Literal pattern; placeholder syntax is not interpreted
    #[inline]
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            source: text.into(),
            kind: PatternKind::Literal,
        }
    }

    /// Parse with explicit options
    ///
    /// # Errors
    /// Returns [`PatternError`] for malformed placeholders.
    pub fn with_options(source: &str, options: PatternOptions) -> Result<Self, PatternError> {
        let (segments, vars) = parse_segments(source)?;
        if vars.is_empty() {
            return Ok(Self::literal(source));
        }

        let simple = segments.len() == 1;
        let mut expr = String::from("^(?:");
        let mut groups = Vec::with_capacity(vars.len());
        let mut group = 1;

        for segment in &segments {
            match segment {
                Segment::Text(text) => expr.push_str(&regex::escape(text)),
                Segment::Var(index) => {
                    let var = &vars[*index];
                    let inner = var_regex(var, simple, options);
                    let nested = Regex::new(&inner)
                        .map_err(|e| PatternError::InvalidRegex {
                            param: var.param.clone(),
                            message: e.to_string(),
                        })?
                        .captures_len()
                        - 1;
                    groups.push(group);
                    group += 1 + nested;
                    expr.push('(');
                    expr.push_str(&inner);
                    expr.push(')');
                }
            }
        }
        expr.push_str(")$");

        let regex = Regex::new(&expr).map_err(|e| PatternError::InvalidRegex {
            param: String::new(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            kind: PatternKind::Template {
                regex,
                segments,
                vars,
                groups,
            },
        })
    }

    /// Original source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Pattern has no variables
    #[inline]
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        matches!(self.kind, PatternKind::Literal)
    }

    /// One placeholder spanning the whole source
    #[inline]
    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(&self.kind, PatternKind::Template { segments, .. } if segments.len() == 1)
    }

    /// Variables in placeholder order
    #[inline]
    #[must_use]
    pub fn vars(&self) -> &[PatternVar] {
        match &self.kind {
            PatternKind::Literal => &[],
            PatternKind::Template { vars, .. } => vars,
        }
    }

    /// The single variable of a simple pattern
    #[inline]
    #[must_use]
    pub fn simple_var(&self) -> Option<&PatternVar> {
        if self.is_simple() {
            self.vars().first()
        } else {
            None
        }
    }

    /// Match `literal`, binding captures
    #[inline]
    #[must_use]
    pub fn matches(&self, literal: &str) -> Option<Captures> {
        self.match_with(literal, |_| None)
    }

    /// Match `literal`, requiring captures to agree with `known` values
    ///
    /// A variable appearing twice must capture the same text both times.
    pub fn match_with<F>(&self, literal: &str, known: F) -> Option<Captures>
    where
        F: Fn(&str) -> Option<String>,
    {
        match &self.kind {
            PatternKind::Literal => (self.source == literal).then(Captures::new),
            PatternKind::Template {
                regex,
                vars,
                groups,
                ..
            } => {
                let caps = regex.captures(literal)?;
                let mut bound = Captures::new();
                for (var, group) in vars.iter().zip(groups) {
                    if var.is_anonymous() {
                        continue;
                    }
                    let text = caps.get(*group).map_or("", |m| m.as_str());
                    if let Some(previous) = bound.get(&var.param) {
                        if previous != text {
                            return None;
                        }
                        continue;
                    }
                    if let Some(expected) = known(&var.param) {
                        if expected != text {
                            return None;
                        }
                    }
                    bound.insert(var.param.clone(), text.to_string());
                }
                Some(bound)
            }
        }
    }

    /// Render with values from `lookup`
    ///
    /// # Errors
    /// - [`PatternRenderError::Unresolved`] when a non-optional variable has no value
    /// - [`PatternRenderError::Violation`] when a value does not satisfy its placeholder
    pub fn render<F>(&self, mut lookup: F) -> Result<String, PatternRenderError>
    where
        F: FnMut(&PatternVar) -> Option<String>,
    {
        let PatternKind::Template { segments, vars, .. } = &self.kind else {
            return Ok(self.source.clone());
        };

        let simple = segments.len() == 1;
        let mut out = String::new();
        let mut missing = Vec::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(index) => {
                    let var = &vars[*index];
                    match lookup(var) {
                        Some(value) => {
                            if var.regex.is_some() {
                                let check = format!("^(?:{})$", var_regex(var, simple, PatternOptions::default()));
                                let ok = Regex::new(&check).is_ok_and(|re| re.is_match(&value));
                                if !ok {
                                    return Err(PatternRenderError::Violation {
                                        param: var.param.clone(),
                                        value,
                                    });
                                }
                            }
                            out.push_str(&value);
                        }
                        None if var.hint.is_optional() => {}
                        None => missing.push(if var.is_anonymous() {
                            var.source.clone()
                        } else {
                            var.param.clone()
                        }),
                    }
                }
            }
        }

        if missing.is_empty() {
            Ok(out)
        } else {
            Err(PatternRenderError::Unresolved { names: missing })
        }
    }

    /// Render known values, keeping unresolved placeholders as source text
    pub fn prerender<F>(&self, mut lookup: F) -> String
    where
        F: FnMut(&PatternVar) -> Option<String>,
    {
        let PatternKind::Template { segments, vars, .. } = &self.kind else {
            return self.source.clone();
        };
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(index) => {
                    let var = &vars[*index];
                    match lookup(var) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&var.source),
                    }
                }
            }
        }
        out
    }
}

/// Check whether two patterns may constrain the same position
///
/// Patterns meld when either is trivial, both have identical source, or both
/// are simple patterns binding the same variable.
#[must_use]
pub fn meldable(a: &Pattern, b: &Pattern) -> bool {
    if a.is_trivial() || b.is_trivial() || a.source == b.source {
        return true;
    }
    match (a.simple_var(), b.simple_var()) {
        (Some(x), Some(y)) => x.param == y.param,
        _ => false,
    }
}

fn var_regex(var: &PatternVar, simple: bool, options: PatternOptions) -> String {
    if let Some(re) = &var.regex {
        return re.clone();
    }
    let optional = var.hint.is_optional();
    if simple || var.hint.is_spread() {
        return if optional { "(?s:.*)" } else { "(?s:.+)" }.to_string();
    }
    match options.separator {
        Some(sep) => {
            let class = regex::escape(&sep.to_string());
            format!("[^{class}]{}", if optional { "*" } else { "+" })
        }
        None => if optional { "(?s:.*?)" } else { "(?s:.+?)" }.to_string(),
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.is_trivial() == other.is_trivial()
    }
}

impl Eq for Pattern {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_matches_only_itself() {
        let p = Pattern::parse("hello").unwrap();
        assert!(p.is_trivial());
        assert!(p.matches("hello").is_some());
        assert!(p.matches("hello!").is_none());
    }

    #[test]
    fn simple_pattern() {
        let p = Pattern::parse("{{value}}").unwrap();
        assert!(p.is_simple());
        assert_eq!(p.matches("a/b.c").unwrap()["value"], "a/b.c");
    }

    #[test]
    fn repeated_variable_must_agree() {
        let p = Pattern::parse("{{a}}-{{a}}").unwrap();
        assert!(p.matches("x-x").is_some());
        assert!(p.matches("x-y").is_none());
    }

    #[test]
    fn known_values_constrain_match() {
        let p = Pattern::parse("{{a}}-{{b}}").unwrap();
        let known = |name: &str| (name == "a").then(|| "1".to_string());
        assert!(p.match_with("1-2", known).is_some());
        assert!(p.match_with("3-2", known).is_none());
    }

    #[test]
    fn separator_limits_composite_vars() {
        let p = patternize("/users/{{id}}", PatternOptions::separated('/')).unwrap();
        assert!(p.matches("/users/7").is_some());
        assert!(p.matches("/users/7/posts").is_none());

        let spread = patternize("/files/{{...path}}", PatternOptions::separated('/')).unwrap();
        assert_eq!(spread.matches("/files/a/b").unwrap()["path"], "a/b");
    }

    #[test]
    fn regex_override_groups_do_not_shift_captures() {
        let p = Pattern::parse("{{a % /(x|y)+/}}:{{b}}").unwrap();
        let caps = p.matches("xy:z").unwrap();
        assert_eq!(caps["a"], "xy");
        assert_eq!(caps["b"], "z");
    }

    #[test]
    fn render_reports_missing_required() {
        let p = Pattern::parse("{{a}}/{{?b}}/{{c}}").unwrap();
        let err = p
            .render(|v| (v.param == "a").then(|| "1".to_string()))
            .unwrap_err();
        assert!(matches!(err, PatternRenderError::Unresolved { names } if names == vec!["c".to_string()]));
    }

    #[test]
    fn render_checks_regex_override() {
        let p = Pattern::parse("{{id % /\\d+/}}").unwrap();
        assert!(p.render(|_| Some("12".to_string())).is_ok());
        assert!(matches!(
            p.render(|_| Some("ab".to_string())),
            Err(PatternRenderError::Violation { .. })
        ));
    }

    #[test]
    fn prerender_keeps_unknown_placeholders() {
        let p = Pattern::parse("{{a}}-{{b}}").unwrap();
        let out = p.prerender(|v| (v.param == "a").then(|| "1".to_string()));
        assert_eq!(out, "1-{{b}}");
    }

    #[test]
    fn meldability() {
        let a = Pattern::parse("{{x}}").unwrap();
        let b = Pattern::parse("{{?x}}").unwrap();
        let c = Pattern::parse("{{x}}-{{y}}").unwrap();
        let d = Pattern::parse("{{y}}").unwrap();
        assert!(meldable(&a, &b));
        assert!(meldable(&c, &c.clone()));
        assert!(!meldable(&a, &c));
        assert!(!meldable(&a, &d));
        assert!(meldable(&a, &Pattern::literal("lit")));
    }
}
