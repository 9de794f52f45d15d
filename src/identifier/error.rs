//! Error types for identifier parsing.

use std::fmt;

use thiserror::Error;

/// The identifier family an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// ISBN of unknown length (before the format is known).
    Isbn,
    /// 10-character ISBN.
    Isbn10,
    /// 13-digit ISBN.
    Isbn13,
    /// Digital Object Identifier.
    Doi,
    /// arXiv preprint identifier.
    Arxiv,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Isbn => "ISBN",
            Self::Isbn10 => "ISBN-10",
            Self::Isbn13 => "ISBN-13",
            Self::Doi => "DOI",
            Self::Arxiv => "arXiv ID",
        };
        f.write_str(label)
    }
}

/// Errors raised when a raw string is not a valid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The value does not have the shape of the identifier.
    #[error("invalid {kind} '{value}': {reason}\n  Suggestion: {suggestion}")]
    InvalidFormat {
        /// Identifier family that was expected
        kind: IdentifierKind,
        /// The rejected input
        value: String,
        /// Why it was rejected
        reason: String,
        /// How to fix the input
        suggestion: String,
    },

    /// The value has the right shape but its check digit does not match.
    #[error(
        "invalid {kind} checksum for '{value}'\n  Suggestion: Check for a mistyped digit; the last character is a check digit"
    )]
    InvalidChecksum {
        /// Identifier family that was expected
        kind: IdentifierKind,
        /// The rejected input
        value: String,
    },
}

impl IdentifierError {
    /// Creates an `InvalidFormat` error with a suggestion tailored to the identifier family.
    #[must_use]
    pub fn invalid_format(kind: IdentifierKind, value: &str, reason: impl Into<String>) -> Self {
        let suggestion = match kind {
            IdentifierKind::Isbn | IdentifierKind::Isbn10 | IdentifierKind::Isbn13 => {
                "Use 10 or 13 digits, optionally separated by hyphens (e.g. 978-0-13-409341-3)"
            }
            IdentifierKind::Doi => "Use the form 10.<registrant>/<suffix> (e.g. 10.1038/nature12373)",
            IdentifierKind::Arxiv => {
                "Use YYMM.NNNNN (e.g. 2301.00001) or archive/YYMMNNN (e.g. hep-th/9901001)"
            }
        };
        Self::InvalidFormat {
            kind,
            value: value.to_string(),
            reason: reason.into(),
            suggestion: suggestion.to_string(),
        }
    }

    /// Creates an `InvalidChecksum` error.
    #[must_use]
    pub fn invalid_checksum(kind: IdentifierKind, value: &str) -> Self {
        Self::InvalidChecksum {
            kind,
            value: value.to_string(),
        }
    }

    /// Returns the identifier family this error refers to.
    #[must_use]
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Self::InvalidFormat { kind, .. } | Self::InvalidChecksum { kind, .. } => *kind,
        }
    }
}
