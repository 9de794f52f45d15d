//! Bibliographic record model shared by every resolver.
//!
//! One [`Record`] type covers both books and papers; fields that only make sense
//! for one kind stay `None` (or empty) for the other.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::identifier::isbn_10_to_13;

/// External metadata providers a record can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    /// ISBNdb
    Isbndb,
    /// Google Books
    GoogleBooks,
    /// Open Library
    OpenLibrary,
    /// Crossref
    Crossref,
    /// Semantic Scholar
    SemanticScholar,
    /// arXiv
    Arxiv,
    /// PubMed
    Pubmed,
}

impl SourceName {
    /// Stable snake_case name, matching the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isbndb => "isbndb",
            Self::GoogleBooks => "google_books",
            Self::OpenLibrary => "open_library",
            Self::Crossref => "crossref",
            Self::SemanticScholar => "semantic_scholar",
            Self::Arxiv => "arxiv",
            Self::Pubmed => "pubmed",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a record describes a book or a paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// Monograph identified by ISBN
    Book,
    /// Article, preprint or proceedings paper
    Paper,
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book => write!(f, "book"),
            Self::Paper => write!(f, "paper"),
        }
    }
}

/// A contributor to a work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// ORCID iD, without the `https://orcid.org/` prefix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
}

impl Author {
    /// Creates an author with only a display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Every identifier a work may carry.
///
/// Well-known identifiers have dedicated fields; provider-specific ids (Open Library
/// keys, Google Books volume ids, ...) live in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn_10: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn_13: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    /// Provider-specific ids keyed by `<source>_id`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Identifiers {
    /// Returns true when at least one identifier is present.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.doi.is_some()
            || self.isbn_10.is_some()
            || self.isbn_13.is_some()
            || self.arxiv_id.is_some()
            || self.pmid.is_some()
            || self.pmcid.is_some()
            || !self.extra.is_empty()
    }

    /// ISBN-13 when known, otherwise ISBN-10.
    #[must_use]
    pub fn primary_isbn(&self) -> Option<&str> {
        self.isbn_13.as_deref().or(self.isbn_10.as_deref())
    }

    /// Stores a provider-specific id under `key`.
    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }
}

/// Where and when a record was fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub source: SourceName,
    /// Id of the record inside the provider
    pub source_id: String,
    pub retrieved_at: SystemTime,
    /// Resolver reliability at fetch time, in `[0, 1]`
    pub reliability_score: f64,
    /// Provider payload, kept for debugging and never serialized
    #[serde(skip)]
    pub raw: Option<serde_json::Value>,
}

impl SourceMetadata {
    /// Creates metadata stamped with the current time.
    #[must_use]
    pub fn new(source: SourceName, source_id: impl Into<String>, reliability_score: f64) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            retrieved_at: SystemTime::now(),
            reliability_score: reliability_score.clamp(0.0, 1.0),
            raw: None,
        }
    }

    /// Attaches the raw provider payload.
    #[must_use]
    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

/// A bibliographic record for a book or a paper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: WorkKind,
    pub title: String,
    pub authors: Vec<Author>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// ISO-8601 date, as precise as the provider gives it (`2020`, `2020-05`, `2020-05-17`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// ISO 639-1 language code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub identifiers: Identifiers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<SourceMetadata>,
    /// Match confidence in `[0, 1]`; identifier lookups are 1.0, title searches lower
    pub confidence: f64,

    // Book fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,

    // Paper fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_count: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields_of_study: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl Record {
    /// Creates an empty record of the given kind.
    #[must_use]
    pub fn new(kind: WorkKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            authors: Vec::new(),
            year: None,
            publication_date: None,
            abstract_text: None,
            url: None,
            language: None,
            identifiers: Identifiers::default(),
            source_metadata: None,
            confidence: 1.0,
            publisher: None,
            edition: None,
            pages: None,
            subjects: Vec::new(),
            cover_image_url: None,
            journal: None,
            volume: None,
            issue: None,
            pages_range: None,
            citation_count: None,
            reference_count: None,
            fields_of_study: Vec::new(),
            pdf_url: None,
        }
    }

    /// Creates an empty book record.
    #[must_use]
    pub fn book(title: impl Into<String>) -> Self {
        Self::new(WorkKind::Book, title)
    }

    /// Creates an empty paper record.
    #[must_use]
    pub fn paper(title: impl Into<String>) -> Self {
        Self::new(WorkKind::Paper, title)
    }

    /// Provider that produced this record, if stamped.
    #[must_use]
    pub fn source(&self) -> Option<SourceName> {
        self.source_metadata.as_ref().map(|meta| meta.source)
    }

    /// Key under which two records are considered the same work.
    ///
    /// Precedence: DOI, ISBN-13, ISBN-10 (as ISBN-13 when convertible), arXiv id,
    /// then the lowercased title. Returns `None` when nothing usable is present.
    ///
    /// # Examples
    ///
    /// ```
    /// use consearch_core::record::Record;
    ///
    /// let mut a = Record::book("Clean Architecture");
    /// a.identifiers.isbn_10 = Some("0134494164".to_string());
    /// let mut b = Record::book("Clean Architecture (1st ed.)");
    /// b.identifiers.isbn_13 = Some("9780134494166".to_string());
    /// assert_eq!(a.dedup_key(), b.dedup_key());
    /// ```
    #[must_use]
    pub fn dedup_key(&self) -> Option<String> {
        let ids = &self.identifiers;
        if let Some(doi) = non_blank(ids.doi.as_deref()) {
            return Some(format!("doi:{}", doi.to_lowercase()));
        }
        if let Some(isbn13) = non_blank(ids.isbn_13.as_deref()) {
            return Some(format!("isbn:{}", compact_isbn(isbn13)));
        }
        if let Some(isbn10) = non_blank(ids.isbn_10.as_deref()) {
            let key = isbn_10_to_13(isbn10).unwrap_or_else(|_| compact_isbn(isbn10));
            return Some(format!("isbn:{key}"));
        }
        if let Some(arxiv) = non_blank(ids.arxiv_id.as_deref()) {
            return Some(format!("arxiv:{}", arxiv.to_lowercase()));
        }
        non_blank(Some(self.title.as_str())).map(|title| format!("title:{}", title.to_lowercase()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn compact_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
