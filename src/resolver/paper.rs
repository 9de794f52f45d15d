//! Input routing shared by the paper adapters.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::detection::InputType;
use crate::identifier::{ArxivId, Doi};
use crate::record::Record;

use super::{ResolutionResult, ResolveError, SourceClient};

/// DOI embedded anywhere in free text.
#[allow(clippy::expect_used)]
static EMBEDDED_DOI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"10\.\d{4,}/\S+").expect("embedded DOI regex is valid") // Static pattern, safe to panic
});

/// Search surface of a scholarly metadata index.
///
/// Only DOI and title search are mandatory. Sources without an arXiv or PubMed
/// lookup report those as not found.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Shared HTTP base of the adapter.
    fn client(&self) -> &SourceClient;

    /// Looks up one work by DOI.
    async fn search_by_doi(&self, doi: &Doi) -> Result<Vec<Record>, ResolveError>;

    /// Looks up one preprint by arXiv id.
    async fn search_by_arxiv(&self, _arxiv: &ArxivId) -> Result<Vec<Record>, ResolveError> {
        Ok(Vec::new())
    }

    /// Looks up one article by PubMed id.
    async fn search_by_pmid(&self, _pmid: &str) -> Result<Vec<Record>, ResolveError> {
        Ok(Vec::new())
    }

    /// Full-text title search.
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError>;

    /// Resolves a free-form citation.
    ///
    /// Uses an embedded DOI when one parses, otherwise searches the whole string
    /// as a title.
    async fn search_by_citation(&self, citation: &str) -> Result<Vec<Record>, ResolveError> {
        if let Some(found) = EMBEDDED_DOI.find(citation)
            && let Ok(doi) = Doi::parse(trim_citation_punctuation(found.as_str()))
        {
            debug!(doi = %doi.value(), "citation contains a DOI");
            return self.search_by_doi(&doi).await;
        }
        self.search_by_title(citation).await
    }
}

/// Drops sentence punctuation a citation leaves glued to the DOI.
fn trim_citation_punctuation(doi: &str) -> &str {
    doi.trim_end_matches(['.', ',', ';', ')', ']', '"', '\''])
}

/// Routes `query` to the matching `search_by_*` method of a paper source.
///
/// DOI and arXiv inputs are validated before any request is made.
#[instrument(skip(source), fields(source = %source.client().source()))]
pub async fn resolve_paper<S>(source: &S, query: &str, input_type: InputType) -> ResolutionResult
where
    S: PaperSource + ?Sized,
{
    let started = Instant::now();
    let name = source.client().source();
    let query = query.trim();

    let outcome = match input_type {
        InputType::Doi => match Doi::parse(query) {
            Ok(doi) => source.search_by_doi(&doi).await,
            Err(error) => Err(ResolveError::invalid_identifier(name, query, &error)),
        },
        InputType::Arxiv => match ArxivId::parse(query) {
            Ok(arxiv) => source.search_by_arxiv(&arxiv).await,
            Err(error) => Err(ResolveError::invalid_identifier(name, query, &error)),
        },
        InputType::Pmid => match parse_pmid(query) {
            Some(pmid) => source.search_by_pmid(pmid).await,
            None => Err(ResolveError::validation(name, query, "PMID must be 1 to 8 digits")),
        },
        InputType::Title => source.search_by_title(query).await,
        InputType::Citation => source.search_by_citation(query).await,
        other => Err(ResolveError::validation(
            name,
            query,
            format!("unsupported input type: {other}"),
        )),
    };

    ResolutionResult::from_outcome(name, outcome, started.elapsed())
}

/// Accepts `12345678` or `PMID: 12345678`.
fn parse_pmid(query: &str) -> Option<&str> {
    let digits = crate::identifier::strip_prefix_ignore_ascii_case(query, "pmid")
        .map_or(query, |rest| rest.trim_start_matches([':', ' ']));
    (!digits.is_empty() && digits.len() <= 8 && digits.bytes().all(|b| b.is_ascii_digit()))
        .then_some(digits)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::record::SourceName;
    use crate::resolver::{RateLimitConfig, ResolutionStatus, ResolverConfig, SourceProfile};

    const PROFILE: SourceProfile = SourceProfile {
        source: SourceName::Crossref,
        base_url: "http://127.0.0.1:9",
        rate_limit: RateLimitConfig::per_second(0.0),
        input_types: &[InputType::Doi, InputType::Title, InputType::Citation],
        priority: 10,
        base_reliability: 0.95,
    };

    struct FakeIndex {
        client: SourceClient,
        calls: Mutex<Vec<String>>,
    }

    impl FakeIndex {
        fn new() -> Self {
            Self {
                client: SourceClient::new(PROFILE, ResolverConfig::default(), String::new()).unwrap(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PaperSource for FakeIndex {
        fn client(&self) -> &SourceClient {
            &self.client
        }

        async fn search_by_doi(&self, doi: &Doi) -> Result<Vec<Record>, ResolveError> {
            self.calls.lock().unwrap().push(format!("doi:{}", doi.value()));
            Ok(vec![Record::paper("By DOI")])
        }

        async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError> {
            self.calls.lock().unwrap().push(format!("title:{title}"));
            Ok(vec![Record::paper(title)])
        }
    }

    #[tokio::test]
    async fn test_resolve_paper_doi_url_is_parsed() {
        let index = FakeIndex::new();
        let result = resolve_paper(&index, "https://doi.org/10.1038/nature12373", InputType::Doi).await;
        assert!(result.is_success());
        assert_eq!(index.calls(), vec!["doi:10.1038/nature12373"]);
    }

    #[tokio::test]
    async fn test_resolve_paper_invalid_doi_makes_no_call() {
        let index = FakeIndex::new();
        let result = resolve_paper(&index, "not a doi", InputType::Doi).await;
        assert_eq!(result.status, ResolutionStatus::Error);
        assert!(index.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_paper_arxiv_default_is_not_found() {
        let index = FakeIndex::new();
        let result = resolve_paper(&index, "arXiv:2301.12345", InputType::Arxiv).await;
        assert_eq!(result.status, ResolutionStatus::NotFound);
        assert!(index.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_paper_pmid_validation() {
        let index = FakeIndex::new();
        let ok = resolve_paper(&index, "PMID: 12345678", InputType::Pmid).await;
        assert_eq!(ok.status, ResolutionStatus::NotFound);

        let bad = resolve_paper(&index, "123456789", InputType::Pmid).await;
        assert_eq!(bad.status, ResolutionStatus::Error);
    }

    #[tokio::test]
    async fn test_resolve_paper_citation_prefers_embedded_doi() {
        let index = FakeIndex::new();
        let citation = "Smith, J. (2020). A study. Nature, 5, 1-2. https://doi.org/10.1038/nature12373.";
        let result = resolve_paper(&index, citation, InputType::Citation).await;
        assert!(result.is_success());
        assert_eq!(index.calls(), vec!["doi:10.1038/nature12373"]);
    }

    #[tokio::test]
    async fn test_resolve_paper_citation_without_doi_searches_title() {
        let index = FakeIndex::new();
        let citation = "Smith, J. (2020). A study of things. Nature, 5, 1-2.";
        resolve_paper(&index, citation, InputType::Citation).await;
        assert_eq!(index.calls(), vec![format!("title:{citation}")]);
    }

    #[tokio::test]
    async fn test_resolve_paper_unsupported_type_is_error() {
        let index = FakeIndex::new();
        let result = resolve_paper(&index, "9780134093413", InputType::Isbn13).await;
        assert_eq!(result.status, ResolutionStatus::Error);
        assert!(index.calls().is_empty());
    }

    #[test]
    fn test_trim_citation_punctuation() {
        assert_eq!(trim_citation_punctuation("10.1000/xyz)."), "10.1000/xyz");
        assert_eq!(trim_citation_punctuation("10.1000/xyz"), "10.1000/xyz");
    }
}
