//! arXiv identifier value object (legacy `archive/YYMMNNN` and modern `YYMM.NNNNN`).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::error::{IdentifierError, IdentifierKind};
use super::strip_prefix_ignore_ascii_case;

/// Archive names valid in pre-2007 arXiv identifiers.
pub const LEGACY_ARCHIVES: [&str; 35] = [
    "acc-phys", "adap-org", "alg-geom", "ao-sci", "astro-ph", "atom-ph", "bayes-an", "chao-dyn",
    "chem-ph", "cmp-lg", "comp-gas", "cond-mat", "cs", "dg-ga", "funct-an", "gr-qc", "hep-ex",
    "hep-lat", "hep-ph", "hep-th", "math", "math-ph", "mtrl-th", "nlin", "nucl-ex", "nucl-th",
    "patt-sol", "physics", "plasm-ph", "q-alg", "q-bio", "quant-ph", "solv-int", "stat",
    "supr-con",
];

#[allow(clippy::expect_used)]
static NEW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}\.\d{4,5}(?:v\d+)?$").expect("arXiv new-format regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static OLD_NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{7}(?:v\d+)?$").expect("arXiv old-format regex is valid") // Static pattern, safe to panic
});

const ARXIV_URL_PREFIXES: [&str; 4] = [
    "https://arxiv.org/abs/",
    "http://arxiv.org/abs/",
    "https://arxiv.org/pdf/",
    "http://arxiv.org/pdf/",
];

/// Which arXiv numbering scheme an identifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArxivFormat {
    /// `archive/YYMMNNN`, used before April 2007.
    Old,
    /// `YYMM.NNNN[N][vN]`.
    New,
}

/// A validated arXiv identifier.
#[derive(Debug, Clone, Serialize)]
pub struct ArxivId {
    value: String,
    format: ArxivFormat,
}

impl ArxivId {
    /// Parses an arXiv identifier from a bare id, an `arXiv:` reference or an arxiv.org URL.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidFormat`] when neither numbering scheme matches.
    ///
    /// # Examples
    ///
    /// ```
    /// use consearch_core::identifier::{ArxivFormat, ArxivId};
    ///
    /// let id = ArxivId::parse("https://arxiv.org/pdf/2301.00001v2.pdf").unwrap();
    /// assert_eq!(id.value(), "2301.00001v2");
    /// assert_eq!(id.format(), ArxivFormat::New);
    ///
    /// let old = ArxivId::parse("arXiv:HEP-TH/9901001").unwrap();
    /// assert_eq!(old.value(), "hep-th/9901001");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let mut candidate = raw.trim();
        for prefix in ARXIV_URL_PREFIXES {
            if let Some(rest) = strip_prefix_ignore_ascii_case(candidate, prefix) {
                candidate = rest;
                break;
            }
        }
        if let Some(rest) = strip_prefix_ignore_ascii_case(candidate, "arxiv:") {
            candidate = rest.trim_start();
        }
        let suffix_start = candidate.len().saturating_sub(4);
        if candidate
            .get(suffix_start..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(".pdf"))
        {
            candidate = &candidate[..suffix_start];
        }

        if let Some((archive, number)) = candidate.split_once('/') {
            let archive = archive.to_ascii_lowercase();
            if !LEGACY_ARCHIVES.contains(&archive.as_str()) {
                return Err(IdentifierError::invalid_format(
                    IdentifierKind::Arxiv,
                    raw,
                    format!("'{archive}' is not a known arXiv archive"),
                ));
            }
            if !OLD_NUMBER_PATTERN.is_match(number) {
                return Err(IdentifierError::invalid_format(
                    IdentifierKind::Arxiv,
                    raw,
                    "expected a 7-digit YYMMNNN number after the archive",
                ));
            }
            return Ok(Self {
                value: format!("{archive}/{}", number.to_ascii_lowercase()),
                format: ArxivFormat::Old,
            });
        }

        if NEW_PATTERN.is_match(candidate) {
            return Ok(Self {
                value: candidate.to_string(),
                format: ArxivFormat::New,
            });
        }

        Err(IdentifierError::invalid_format(
            IdentifierKind::Arxiv,
            raw,
            "expected YYMM.NNNNN or archive/YYMMNNN",
        ))
    }

    /// Canonical identifier (old-format archive names are lowercase).
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Numbering scheme of this identifier.
    #[must_use]
    pub fn format(&self) -> ArxivFormat {
        self.format
    }

    /// Abstract page URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.value)
    }

    /// PDF URL.
    #[must_use]
    pub fn pdf_url(&self) -> String {
        format!("https://arxiv.org/pdf/{}.pdf", self.value)
    }

    /// Lowercased form used for comparisons and dedup keys.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.value.to_ascii_lowercase()
    }
}

impl PartialEq for ArxivId {
    fn eq(&self, other: &Self) -> bool {
        self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl Eq for ArxivId {}

impl Hash for ArxivId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for ArxivId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for ArxivId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
