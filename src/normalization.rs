//! Text normalization for title/author matching and deduplication.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[allow(clippy::expect_used)]
static YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex is valid") // Static pattern, safe to panic
});

const LEADING_ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// Folds text for comparison: strips accents from Latin letters, lowercases,
/// drops punctuation and collapses whitespace.
///
/// Marks on non-Latin bases are kept and recomposed, so Cyrillic `й` stays
/// distinct from `и`.
///
/// # Examples
///
/// ```
/// use consearch_core::normalization::normalize_text;
///
/// assert_eq!(normalize_text("  Café   Society: A Novel! "), "cafe society a novel");
/// ```
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let mut latin_base = false;
    let stripped: String = text
        .nfkd()
        .filter(|&c| {
            if is_combining_mark(c) {
                !latin_base
            } else {
                latin_base = c.is_ascii_alphabetic();
                true
            }
        })
        .collect();
    let folded: String = stripped
        .nfc()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalizes a title and drops a leading "the", "a" or "an".
#[must_use]
pub fn normalize_title(title: &str) -> String {
    let normalized = normalize_text(title);
    for article in LEADING_ARTICLES {
        if let Some(rest) = normalized.strip_prefix(article) {
            return rest.to_string();
        }
    }
    normalized
}

/// Normalizes an author name, turning "Last, First" into "first last".
#[must_use]
pub fn normalize_author_name(name: &str) -> String {
    match name.split_once(',') {
        Some((last, first)) => {
            let first = normalize_text(first);
            let last = normalize_text(last);
            [first, last]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        }
        None => normalize_text(name),
    }
}

/// Similarity of two titles in `[0, 1]`.
///
/// Identical normalized titles score 1.0. Otherwise the result is the larger of the
/// word-set Jaccard index and the normalized Levenshtein similarity, so both word
/// reordering and small typos are tolerated.
///
/// # Examples
///
/// ```
/// use consearch_core::normalization::title_similarity;
///
/// assert!((title_similarity("The Hobbit", "hobbit") - 1.0).abs() < f64::EPSILON);
/// assert!(title_similarity("Dune", "Neuromancer") < 0.5);
/// ```
#[must_use]
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let words_a: HashSet<&str> = a.split(' ').collect();
    let words_b: HashSet<&str> = b.split(' ').collect();
    let union = words_a.union(&words_b).count();
    #[allow(clippy::cast_precision_loss)] // word counts are tiny
    let jaccard = if union == 0 {
        0.0
    } else {
        words_a.intersection(&words_b).count() as f64 / union as f64
    };

    jaccard.max(strsim::normalized_levenshtein(&a, &b))
}

/// Returns the first plausible publication year (1900-2099) found in `text`.
#[must_use]
pub fn extract_year(text: &str) -> Option<i32> {
    YEAR_PATTERN
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}
