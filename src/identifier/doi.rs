//! DOI value object.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::error::{IdentifierError, IdentifierKind};
use super::strip_prefix_ignore_ascii_case;

/// Validation pattern for a bare DOI: `10.<registrant>[.<sub>]*/<suffix>`.
#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^10\.\d{4,}(?:\.\d+)*/\S+$").expect("DOI regex is valid") // Static pattern, safe to panic
});

const DOI_URL_PREFIXES: [&str; 4] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

/// A validated Digital Object Identifier.
///
/// The stored value keeps the case it was given; equality and hashing ignore case.
#[derive(Debug, Clone, Serialize)]
pub struct Doi {
    value: String,
}

impl Doi {
    /// Parses a DOI, accepting `doi.org` URLs and `doi:` prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidFormat`] when the remaining string is not a DOI.
    ///
    /// # Examples
    ///
    /// ```
    /// use consearch_core::identifier::Doi;
    ///
    /// let doi = Doi::parse("https://doi.org/10.1038/NATURE12373").unwrap();
    /// assert_eq!(doi.value(), "10.1038/NATURE12373");
    /// assert_eq!(doi, Doi::parse("doi:10.1038/nature12373").unwrap());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let mut candidate = raw.trim();
        for prefix in DOI_URL_PREFIXES {
            if let Some(rest) = strip_prefix_ignore_ascii_case(candidate, prefix) {
                candidate = rest;
                break;
            }
        }
        if let Some(rest) = strip_prefix_ignore_ascii_case(candidate, "doi:") {
            candidate = rest.trim_start();
        }

        if !DOI_PATTERN.is_match(candidate) {
            return Err(IdentifierError::invalid_format(
                IdentifierKind::Doi,
                raw,
                "expected 10.<registrant>/<suffix>",
            ));
        }
        Ok(Self {
            value: candidate.to_string(),
        })
    }

    /// The DOI without any URL or `doi:` prefix.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Resolver URL at `doi.org`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("https://doi.org/{}", self.value)
    }

    /// Lowercased form used for comparisons and dedup keys.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.value.to_lowercase()
    }
}

impl PartialEq for Doi {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Doi {}

impl Hash for Doi {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for Doi {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_doi_parse_bare() {
        let doi = Doi::parse("10.1234/example").unwrap();
        assert_eq!(doi.value(), "10.1234/example");
    }

    #[test]
    fn test_doi_parse_strips_url_prefixes() {
        for raw in [
            "https://doi.org/10.1234/abc",
            "http://doi.org/10.1234/abc",
            "https://dx.doi.org/10.1234/abc",
            "http://dx.doi.org/10.1234/abc",
            "HTTPS://DOI.ORG/10.1234/abc",
        ] {
            assert_eq!(Doi::parse(raw).unwrap().value(), "10.1234/abc", "{raw}");
        }
    }

    #[test]
    fn test_doi_parse_strips_doi_prefix_case_insensitive() {
        assert_eq!(Doi::parse("doi:10.1234/abc").unwrap().value(), "10.1234/abc");
        assert_eq!(Doi::parse("DOI: 10.1234/abc").unwrap().value(), "10.1234/abc");
    }

    #[test]
    fn test_doi_parse_nested_registrant() {
        let doi = Doi::parse("10.1000.10/example").unwrap();
        assert_eq!(doi.value(), "10.1000.10/example");
    }

    #[test]
    fn test_doi_parse_rejects_invalid() {
        for raw in ["", "10.123/short", "11.1234/abc", "10.1234", "10.1234/has space"] {
            let err = Doi::parse(raw).unwrap_err();
            assert!(matches!(err, IdentifierError::InvalidFormat { .. }), "{raw}");
        }
    }

    #[test]
    fn test_doi_preserves_case_but_compares_case_insensitively() {
        let upper = Doi::parse("https://doi.org/10.1038/NATURE12373").unwrap();
        let lower = Doi::parse("10.1038/nature12373").unwrap();
        assert_ne!(upper.value(), "10.1038/nature12373");
        assert_eq!(upper, lower);

        let set: HashSet<Doi> = [upper, lower].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_doi_url() {
        let doi = Doi::parse("10.1234/abc").unwrap();
        assert_eq!(doi.url(), "https://doi.org/10.1234/abc");
    }
}
