//! Courier Pattern Engine
//!
//! Parses `{{name}}`-style placeholders into structural patterns, matches
//! patterns against literal text to bind captures, and renders patterns
//! from bound values.
//!
//! # Placeholder syntax
//!
//! ```text
//! {{ hints name [= expression] [% /regex/] }}
//! ```
//!
//! - hints: `?` optional, `!` required, `@` secret, `#` hidden,
//!   `+` export, `-` no-export, `~` distinct, `...` spread
//! - `= expression`: computed binding evaluated at render time
//! - `% /regex/`: overrides the regex the variable matches
//!
//! # Example
//!
//! ```rust
//! use courier_pattern::Pattern;
//!
//! let pattern = Pattern::parse("{{a}}-{{b}}").unwrap();
//! let captures = pattern.matches("1-2").unwrap();
//! assert_eq!(captures["a"], "1");
//! assert_eq!(captures["b"], "2");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod hints;
mod parse;
mod pattern;

pub use hints::Hints;
pub use parse::PatternVar;
pub use pattern::{is_templated, meldable, patternize, Captures, Pattern, PatternOptions};

/// Malformed pattern source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Placeholder syntax error at a byte offset
    #[error("pattern syntax error at {offset}: {message}")]
    Syntax {
        /// Byte offset into the pattern source
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// Regex override failed to compile
    #[error("invalid regex for `{param}`: {message}")]
    InvalidRegex {
        /// Variable carrying the override
        param: String,
        /// Regex compiler message
        message: String,
    },
}

/// Pattern could not be rendered from the available values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternRenderError {
    /// Required variables had no value
    #[error("unresolved: {}", names.join(", "))]
    Unresolved {
        /// Names of the missing variables
        names: Vec<String>,
    },

    /// A value does not satisfy its placeholder's regex
    #[error("value {value:?} does not satisfy `{param}`")]
    Violation {
        /// Variable name
        param: String,
        /// Offending value
        value: String,
    },
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
