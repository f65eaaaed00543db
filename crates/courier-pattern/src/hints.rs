//! Placeholder hints
//!
//! Hints are the punctuation prefix of a placeholder (`{{?name}}`,
//! `{{@token}}`, `{{...rest}}`) and change how the variable is matched,
//! rendered and exported.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::ops::BitOr;

/// Set of placeholder hints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hints(u16);

impl Hints {
    /// No hints
    pub const NONE: Self = Self(0);
    /// `?` - variable may be absent or empty
    pub const OPTIONAL: Self = Self(1);
    /// `!` - variable must be present
    pub const REQUIRED: Self = Self(1 << 1);
    /// `@` - value is a secret
    pub const SECRET: Self = Self(1 << 2);
    /// `#` - value is hidden from previews
    pub const HIDDEN: Self = Self(1 << 3);
    /// `+` - value is exported from nested scopes
    pub const EXPORT: Self = Self(1 << 4);
    /// `-` - value is never exported
    pub const NO_EXPORT: Self = Self(1 << 5);
    /// `~` - value only resolves from its own scope
    pub const DISTINCT: Self = Self(1 << 6);
    /// `...` - value may span separators
    pub const SPREAD: Self = Self(1 << 7);

    const TABLE: [(&'static str, Self); 8] = [
        ("...", Self::SPREAD),
        ("?", Self::OPTIONAL),
        ("!", Self::REQUIRED),
        ("@", Self::SECRET),
        ("#", Self::HIDDEN),
        ("+", Self::EXPORT),
        ("-", Self::NO_EXPORT),
        ("~", Self::DISTINCT),
    ];

    /// Check if all hints in `other` are set
    #[inline]
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if no hint is set
    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two hint sets
    #[inline]
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `?` is set
    #[inline]
    #[must_use]
    pub fn is_optional(self) -> bool {
        self.contains(Self::OPTIONAL)
    }

    /// `!` is set
    #[inline]
    #[must_use]
    pub fn is_required(self) -> bool {
        self.contains(Self::REQUIRED)
    }

    /// `@` or `#` is set
    #[inline]
    #[must_use]
    pub fn is_redacted(self) -> bool {
        self.contains(Self::SECRET) || self.contains(Self::HIDDEN)
    }

    /// `...` is set
    #[inline]
    #[must_use]
    pub fn is_spread(self) -> bool {
        self.contains(Self::SPREAD)
    }

    /// Split a leading hint prefix off `text`
    ///
    /// Returns the parsed hints and the remaining text. Parsing stops at the
    /// first character that is not a hint.
    #[must_use]
    pub fn split_prefix(text: &str) -> (Self, &str) {
        let mut hints = Self::NONE;
        let mut rest = text;
        'outer: loop {
            for (token, hint) in Self::TABLE {
                if let Some(stripped) = rest.strip_prefix(token) {
                    hints = hints | hint;
                    rest = stripped;
                    continue 'outer;
                }
            }
            break;
        }
        (hints, rest)
    }
}

impl BitOr for Hints {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Display for Hints {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (token, hint) in Self::TABLE {
            if self.contains(hint) {
                f.write_str(token)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_prefix_reads_all_hints() {
        let (hints, rest) = Hints::split_prefix("?@name");
        assert!(hints.is_optional());
        assert!(hints.contains(Hints::SECRET));
        assert_eq!(rest, "name");
    }

    #[test]
    fn split_prefix_spread() {
        let (hints, rest) = Hints::split_prefix("...path");
        assert!(hints.is_spread());
        assert_eq!(rest, "path");
    }

    #[test]
    fn no_hints() {
        let (hints, rest) = Hints::split_prefix("plain");
        assert!(hints.is_empty());
        assert_eq!(rest, "plain");
    }

    #[test]
    fn display_round_trips() {
        let hints = Hints::OPTIONAL | Hints::NO_EXPORT;
        assert_eq!(hints.to_string(), "?-");
        assert_eq!(Hints::split_prefix(&hints.to_string()).0, hints);
    }
}
