//! Outcomes and step names
//!
//! An outcome is written `name[+delay]`, a delay `<n>ms`, `<n>s` or `<n>m`
//! (a bare number is milliseconds). A step name may carry a retry budget
//! as `name/retries`.

use crate::error::FlowError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Name reserved for the failure target
pub const FAIL: &str = "fail";

/// Branch selected by a matched response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Target name; empty means continue with the next step
    pub name: String,
    /// Wait before moving on
    pub delay: Option<Duration>,
}

impl Outcome {
    /// Outcome without delay
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
        }
    }
}

fn parse_delay(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (digits, unit) = text
        .find(|c: char| !c.is_ascii_digit())
        .map_or((text, ""), |at| text.split_at(at));
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "" | "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        _ => None,
    }
}

impl FromStr for Outcome {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, delay) = match s.split_once('+') {
            Some((name, delay)) => {
                let parsed =
                    parse_delay(delay).ok_or_else(|| FlowError::Parse(format!("invalid delay in outcome `{s}`")))?;
                (name.trim(), Some(parsed))
            }
            None => (s, None),
        };
        if name.chars().any(char::is_whitespace) {
            return Err(FlowError::Parse(format!("invalid outcome `{s}`")));
        }
        Ok(Self {
            name: name.to_string(),
            delay,
        })
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(delay) = self.delay {
            write!(f, "+{}ms", delay.as_millis())?;
        }
        Ok(())
    }
}

/// Split `name/retries` into the name and its retry budget
///
/// # Errors
/// Returns [`FlowError::Parse`] for a malformed budget or the reserved name.
pub fn parse_step_name(text: &str) -> Result<(String, Option<u32>), FlowError> {
    let text = text.trim();
    let (name, retries) = match text.rsplit_once('/') {
        Some((name, retries)) => {
            let retries = retries
                .trim()
                .parse::<u32>()
                .map_err(|_| FlowError::Parse(format!("invalid retry count in step `{text}`")))?;
            (name.trim(), Some(retries))
        }
        None => (text, None),
    };
    if name == FAIL {
        return Err(FlowError::Parse(format!("`{FAIL}` is reserved and cannot name a step")));
    }
    Ok((name.to_string(), retries))
}
