//! Input classification: guesses what kind of identifier or query a raw string is.
//!
//! Matchers run in a fixed order (DOI, arXiv, ISBN, PMID, URL, citation) and the
//! first hit wins. Anything else is treated as a title search.
//!
//! # Example
//!
//! ```
//! use consearch_core::detection::{Domain, IdentifierDetector, InputType};
//!
//! let detector = IdentifierDetector::new();
//! let result = detector.detect("ISBN: 978-0-13-409341-3");
//! assert_eq!(result.input_type, InputType::Isbn13);
//! assert_eq!(result.domain(), Domain::Book);
//! assert_eq!(result.normalized_value.as_deref(), Some("9780134093413"));
//! ```

mod input;

pub use input::{DetectionResult, Domain, InputType};

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};
use url::Url;

use crate::identifier::{ArxivId, Doi, Identifier, IdentifierError, Isbn, IsbnFormat, LEGACY_ARCHIVES};

/// Confidence for a validated identifier found in the text.
const IDENTIFIER_CONFIDENCE: f64 = 0.95;
/// Confidence for an identifier pulled out of a recognized host URL.
const URL_IDENTIFIER_CONFIDENCE: f64 = 0.98;
/// Confidence for text shaped like an identifier that failed validation.
const MALFORMED_CONFIDENCE: f64 = 0.5;
const PMID_CONFIDENCE: f64 = 0.9;
const PUBMED_URL_CONFIDENCE: f64 = 0.95;
const GENERIC_URL_CONFIDENCE: f64 = 0.6;
const CITATION_CONFIDENCE: f64 = 0.7;
const AUTHOR_YEAR_CONFIDENCE: f64 = 0.65;
/// Confidence of the title fallback returned by [`IdentifierDetector::detect`].
pub const TITLE_CONFIDENCE: f64 = 0.5;
/// Confidence of the title candidate appended by [`IdentifierDetector::detect_all`].
pub const TITLE_ALTERNATIVE_CONFIDENCE: f64 = 0.3;

/// Minimum character count for the marker-based citation heuristic.
const CITATION_MIN_CHARS: usize = 30;

const CITATION_MARKERS: [&str; 8] = [
    "et al",
    "pp.",
    "vol.",
    "journal",
    "proceedings",
    "conference",
    "published",
    "press",
];

#[allow(clippy::expect_used)]
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://(?:dx\.)?doi\.org/|doi:?\s*)?(10\.\d{4,}(?:\.\d+)*/\S+)")
        .expect("DOI detection regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ARXIV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let archives = LEGACY_ARCHIVES.join("|");
    Regex::new(&format!(
        r"(?i)(?:https?://arxiv\.org/(?:abs|pdf)/|arxiv:?\s*)?(\d{{4}}\.\d{{4,5}}(?:v\d+)?|(?:{archives})/\d{{7}})"
    ))
    .expect("arXiv detection regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ISBN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:ISBN(?:-?(?:10|13))?[:\s]*)?(97[89][-\s]?)?([\dX][-\s]?){9,12}[\dX]$")
        .expect("ISBN detection regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ISBN_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ISBN(?:-?(?:10|13))?[:\s]*").expect("ISBN prefix regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static PMID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:PMID[:\s]*)?(\d{7,8})$").expect("PMID regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://").expect("URL regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ARXIV_URL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:abs|pdf)/(.+?)(?:\.pdf)?$").expect("arXiv path regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static PUBMED_URL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\d{7,8})(?:/|$)").expect("PubMed path regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CITATION_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[,(]\s*(?:19|20)\d{2}\s*[),]?").expect("citation year regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static AUTHOR_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-z]+(?:\s+et\s+al\.?)?\s*,?\s*(?:19|20)\d{2}")
        .expect("author-year regex is valid") // Static pattern, safe to panic
});

/// Classifies raw queries into [`InputType`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierDetector;

impl IdentifierDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the most likely interpretation of `query`.
    ///
    /// Never fails: blank input yields UNKNOWN (0.0) and unrecognized text yields
    /// TITLE (0.5).
    #[tracing::instrument(skip(self, query), fields(query_len = query.len()))]
    #[must_use]
    pub fn detect(&self, query: &str) -> DetectionResult {
        let query = query.trim();
        if query.is_empty() {
            return DetectionResult::unknown();
        }

        let result = MATCHERS
            .iter()
            .find_map(|matcher| matcher(query))
            .unwrap_or_else(|| {
                DetectionResult::new(InputType::Title, TITLE_CONFIDENCE, Some(query.to_string()))
            });
        debug!(input_type = %result.input_type, confidence = result.confidence, "detected input type");
        result
    }

    /// Returns every interpretation of `query`, highest confidence first.
    ///
    /// A TITLE candidate at 0.3 is always included for non-blank input, so it ranks
    /// at or below every identifier match. Blank input yields an empty list.
    #[must_use]
    pub fn detect_all(&self, query: &str) -> Vec<DetectionResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<DetectionResult> =
            MATCHERS.iter().filter_map(|matcher| matcher(query)).collect();
        results.push(DetectionResult::new(
            InputType::Title,
            TITLE_ALTERNATIVE_CONFIDENCE,
            Some(query.to_string()),
        ));
        // Stable, so equal confidences keep matcher order.
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        trace!(candidates = results.len(), "detected all interpretations");
        results
    }
}

type Matcher = fn(&str) -> Option<DetectionResult>;

const MATCHERS: [Matcher; 6] = [try_doi, try_arxiv, try_isbn, try_pmid, try_url, try_citation];

/// Shape matched but the value object rejected it.
fn malformed(input_type: InputType, value: &str, err: &IdentifierError) -> DetectionResult {
    debug!(input_type = %input_type, error = %err, "identifier-shaped input failed validation");
    DetectionResult::new(input_type, MALFORMED_CONFIDENCE, Some(value.to_string()))
}

fn try_doi(query: &str) -> Option<DetectionResult> {
    let candidate = DOI_PATTERN.captures(query)?.get(1)?.as_str();
    Some(match Doi::parse(candidate) {
        Ok(doi) => DetectionResult::identified(InputType::Doi, IDENTIFIER_CONFIDENCE, doi.into()),
        Err(err) => malformed(InputType::Doi, candidate, &err),
    })
}

fn try_arxiv(query: &str) -> Option<DetectionResult> {
    let candidate = ARXIV_PATTERN.captures(query)?.get(1)?.as_str();
    Some(match ArxivId::parse(candidate) {
        Ok(id) => DetectionResult::identified(InputType::Arxiv, IDENTIFIER_CONFIDENCE, id.into()),
        Err(err) => malformed(InputType::Arxiv, candidate, &err),
    })
}

fn try_isbn(query: &str) -> Option<DetectionResult> {
    if !ISBN_PATTERN.is_match(query) {
        return None;
    }
    // Drop the prefix first so the "13" of "ISBN-13" is not read as digits.
    let body = ISBN_PREFIX.replace(query, "");
    let normalized: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || c.eq_ignore_ascii_case(&'x'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match Isbn::parse(&normalized) {
        Ok(isbn) => {
            let input_type = match isbn.format() {
                IsbnFormat::Isbn10 => InputType::Isbn10,
                IsbnFormat::Isbn13 => InputType::Isbn13,
            };
            Some(DetectionResult::identified(
                input_type,
                IDENTIFIER_CONFIDENCE,
                Identifier::Isbn(isbn),
            ))
        }
        Err(err) => match normalized.len() {
            10 => Some(malformed(InputType::Isbn10, &normalized, &err)),
            13 => Some(malformed(InputType::Isbn13, &normalized, &err)),
            _ => None,
        },
    }
}

fn try_pmid(query: &str) -> Option<DetectionResult> {
    let pmid = PMID_PATTERN.captures(query)?.get(1)?.as_str();
    Some(DetectionResult::new(
        InputType::Pmid,
        PMID_CONFIDENCE,
        Some(pmid.to_string()),
    ))
}

fn try_url(query: &str) -> Option<DetectionResult> {
    if !URL_PATTERN.is_match(query) {
        return None;
    }
    let generic = || {
        DetectionResult::new(
            InputType::Url,
            GENERIC_URL_CONFIDENCE,
            Some(query.to_string()),
        )
    };
    let Ok(url) = Url::parse(query) else {
        return Some(generic());
    };
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = url.path();

    if host.contains("doi.org")
        && let Ok(doi) = Doi::parse(path.trim_start_matches('/'))
    {
        return Some(DetectionResult::identified(
            InputType::Doi,
            URL_IDENTIFIER_CONFIDENCE,
            doi.into(),
        ));
    }

    if host.contains("arxiv.org")
        && let Some(captures) = ARXIV_URL_PATH.captures(path)
        && let Ok(id) = ArxivId::parse(&captures[1])
    {
        return Some(DetectionResult::identified(
            InputType::Arxiv,
            URL_IDENTIFIER_CONFIDENCE,
            id.into(),
        ));
    }

    if (host.contains("pubmed") || host.contains("ncbi.nlm.nih.gov"))
        && let Some(captures) = PUBMED_URL_PATH.captures(path)
    {
        return Some(DetectionResult::new(
            InputType::Pmid,
            PUBMED_URL_CONFIDENCE,
            Some(captures[1].to_string()),
        ));
    }

    Some(generic())
}

fn try_citation(query: &str) -> Option<DetectionResult> {
    let lower = query.to_lowercase();
    let markers = CITATION_MARKERS
        .iter()
        .filter(|marker| lower.contains(*marker))
        .count();
    let has_year = CITATION_YEAR.is_match(query);

    if (markers >= 2 || (markers >= 1 && has_year)) && query.chars().count() > CITATION_MIN_CHARS {
        return Some(DetectionResult::new(
            InputType::Citation,
            CITATION_CONFIDENCE,
            Some(query.to_string()),
        ));
    }

    if AUTHOR_YEAR.is_match(query) {
        return Some(DetectionResult::new(
            InputType::Citation,
            AUTHOR_YEAR_CONFIDENCE,
            Some(query.to_string()),
        ));
    }

    None
}
