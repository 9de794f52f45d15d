//! High-level resolution entry point.
//!
//! [`ResolutionService`] classifies a query, picks the book or paper chain from
//! the registry and reports the aggregated outcome together with the best
//! matching record.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::{DEFAULT_FUZZY_MATCH_THRESHOLD, Settings};
use crate::detection::{DetectionResult, Domain, IdentifierDetector, InputType};
use crate::record::{Record, WorkKind};
use crate::resolver::{AggregatedResult, FallbackConfig, ResolverRegistry};

/// Outcome of one [`ResolutionService`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveReport {
    /// Query as handed to the resolvers
    pub query: String,
    pub input_type: InputType,
    /// Highest-ranked record meeting the fuzzy match threshold
    pub best_match: Option<Record>,
    pub result: AggregatedResult,
    pub duration_ms: u64,
}

impl ResolveReport {
    /// Whether any resolver succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.result.success()
    }
}

/// Which chain(s) a call runs.
#[derive(Debug, Clone, Copy)]
enum Route {
    Only(WorkKind),
    ByDomain,
}

/// Detects input types and runs the matching fallback chain.
#[derive(Debug, Clone)]
pub struct ResolutionService {
    registry: Arc<ResolverRegistry>,
    fallback: FallbackConfig,
    fuzzy_match_threshold: f64,
    detector: IdentifierDetector,
}

impl ResolutionService {
    /// Creates a service over `registry` using the default fuzzy match threshold.
    #[must_use]
    pub fn new(registry: Arc<ResolverRegistry>, fallback: FallbackConfig) -> Self {
        Self {
            registry,
            fallback,
            fuzzy_match_threshold: DEFAULT_FUZZY_MATCH_THRESHOLD,
            detector: IdentifierDetector::new(),
        }
    }

    /// Creates a service taking its fallback policy and threshold from `settings`.
    #[must_use]
    pub fn from_settings(registry: Arc<ResolverRegistry>, settings: &Settings) -> Self {
        Self::new(registry, settings.fallback)
            .with_fuzzy_match_threshold(settings.fuzzy_match_threshold)
    }

    /// Sets the minimum record confidence reported as `best_match`.
    #[must_use]
    pub fn with_fuzzy_match_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_match_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn fallback(&self) -> &FallbackConfig {
        &self.fallback
    }

    /// Classifies `query`.
    #[must_use]
    pub fn detect(&self, query: &str) -> DetectionResult {
        self.detector.detect(query)
    }

    /// Every plausible classification of `query`, best first.
    #[must_use]
    pub fn detect_all(&self, query: &str) -> Vec<DetectionResult> {
        self.detector.detect_all(query)
    }

    /// Resolves `query` against the book resolvers.
    ///
    /// The input type is detected when `input_type` is `None`.
    pub async fn resolve_book(&self, query: &str, input_type: Option<InputType>) -> ResolveReport {
        self.run(query, input_type, Route::Only(WorkKind::Book)).await
    }

    /// Resolves `query` against the paper resolvers.
    ///
    /// The input type is detected when `input_type` is `None`.
    pub async fn resolve_paper(&self, query: &str, input_type: Option<InputType>) -> ResolveReport {
        self.run(query, input_type, Route::Only(WorkKind::Paper)).await
    }

    /// Resolves `query`, routing it by the domain of its input type.
    ///
    /// Ambiguous inputs (DOI, title, citation, URL) go to the paper chain first.
    /// When that finds nothing and a book resolver understands the input type,
    /// the book chain runs too and its attempts are appended.
    pub async fn resolve(&self, query: &str, input_type: Option<InputType>) -> ResolveReport {
        self.run(query, input_type, Route::ByDomain).await
    }

    #[instrument(skip(self, query), fields(query_len = query.len()))]
    async fn run(&self, query: &str, input_type: Option<InputType>, route: Route) -> ResolveReport {
        let started = Instant::now();
        let (query, input_type) = self.prepare(query, input_type);

        let result = match route {
            Route::Only(kind) => self.run_chain(kind, &query, input_type).await,
            Route::ByDomain => match input_type.domain() {
                Domain::Book => self.run_chain(WorkKind::Book, &query, input_type).await,
                Domain::Paper => self.run_chain(WorkKind::Paper, &query, input_type).await,
                Domain::Ambiguous => self.run_ambiguous(&query, input_type).await,
            },
        };

        let best_match = self.best_match(&result);
        let elapsed = started.elapsed();
        info!(
            input_type = %input_type,
            success = result.success(),
            records = result.all_records.len(),
            sources = result.sources_tried.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "resolution finished"
        );

        ResolveReport {
            query,
            input_type,
            best_match,
            result,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Trims the query and fills in a detected input type.
    ///
    /// A detected identifier is handed on in its normalized form.
    fn prepare(&self, query: &str, input_type: Option<InputType>) -> (String, InputType) {
        let query = query.trim();
        if let Some(input_type) = input_type {
            return (query.to_string(), input_type);
        }
        let detection = self.detect(query);
        debug!(detected = %detection, "using detected input type");
        let value = match detection.input_type {
            InputType::Title | InputType::Citation | InputType::Unknown => None,
            _ => detection.normalized_value,
        };
        (value.unwrap_or_else(|| query.to_string()), detection.input_type)
    }

    async fn run_chain(&self, kind: WorkKind, query: &str, input_type: InputType) -> AggregatedResult {
        debug!(kind = %kind, input_type = %input_type, "running chain");
        self.registry
            .chain(kind, self.fallback)
            .resolve(query, input_type)
            .await
    }

    async fn run_ambiguous(&self, query: &str, input_type: InputType) -> AggregatedResult {
        let papers = self.run_chain(WorkKind::Paper, query, input_type).await;
        if papers.success() {
            return papers;
        }
        let books_understand = self
            .registry
            .book_resolvers()
            .iter()
            .any(|resolver| resolver.supports(input_type));
        if !books_understand {
            return papers;
        }
        debug!(input_type = %input_type, "paper chain found nothing, trying book chain");
        let books = self.run_chain(WorkKind::Book, query, input_type).await;
        papers.merge(books)
    }

    /// First record (in chain order) whose confidence meets the threshold.
    fn best_match(&self, result: &AggregatedResult) -> Option<Record> {
        result
            .all_records
            .iter()
            .find(|record| record.confidence >= self.fuzzy_match_threshold)
            .cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::record::SourceName;
    use crate::resolver::{ResolutionResult, ResolveError, Resolver};

    /// Records every query and answers with a fixed set of records.
    struct Scripted {
        source: SourceName,
        inputs: &'static [InputType],
        records: Vec<Record>,
        seen: Mutex<Vec<(String, InputType)>>,
    }

    impl Scripted {
        fn new(source: SourceName, inputs: &'static [InputType], records: Vec<Record>) -> Arc<Self> {
            Arc::new(Self {
                source,
                inputs,
                records,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<(String, InputType)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Resolver for Scripted {
        fn source(&self) -> SourceName {
            self.source
        }

        fn priority(&self) -> u32 {
            10
        }

        fn supported_input_types(&self) -> &[InputType] {
            self.inputs
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn reliability_score(&self) -> f64 {
            0.9
        }

        async fn resolve(&self, query: &str, input_type: InputType) -> ResolutionResult {
            self.seen.lock().unwrap().push((query.to_string(), input_type));
            ResolutionResult::found(self.source, self.records.clone())
        }

        async fn fetch_by_id(&self, _id: &str) -> Result<Option<Record>, ResolveError> {
            Ok(None)
        }

        async fn close(&self) {}
    }

    const BOOK_INPUTS: &[InputType] = &[InputType::Isbn10, InputType::Isbn13, InputType::Title];
    const PAPER_INPUTS: &[InputType] = &[InputType::Doi, InputType::Title, InputType::Citation];

    fn service(books: &Arc<Scripted>, papers: &Arc<Scripted>) -> ResolutionService {
        let mut registry = ResolverRegistry::new();
        registry.register_book_resolver(Arc::clone(books) as Arc<dyn Resolver>);
        registry.register_paper_resolver(Arc::clone(papers) as Arc<dyn Resolver>);
        ResolutionService::new(Arc::new(registry), FallbackConfig::default())
    }

    fn scored(title: &str, confidence: f64) -> Record {
        let mut record = Record::book(title);
        record.confidence = confidence;
        record
    }

    #[tokio::test]
    async fn test_resolve_routes_isbn_to_book_chain_with_normalized_value() {
        let books = Scripted::new(SourceName::OpenLibrary, BOOK_INPUTS, vec![Record::book("Found")]);
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, Vec::new());

        let report = service(&books, &papers).resolve("978-0-13-409341-3", None).await;

        assert!(report.success());
        assert_eq!(report.input_type, InputType::Isbn13);
        assert_eq!(books.seen(), vec![("9780134093413".to_string(), InputType::Isbn13)]);
        assert!(papers.seen().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_tries_papers_then_books() {
        let books = Scripted::new(SourceName::OpenLibrary, BOOK_INPUTS, vec![Record::book("Dune")]);
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, Vec::new());

        let report = service(&books, &papers).resolve("Dune", Some(InputType::Title)).await;

        assert!(report.success());
        assert_eq!(
            report.result.sources_tried,
            vec![SourceName::Crossref, SourceName::OpenLibrary]
        );
        assert_eq!(report.best_match.unwrap().title, "Dune");
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_stops_after_paper_success() {
        let books = Scripted::new(SourceName::OpenLibrary, BOOK_INPUTS, vec![Record::book("Dune")]);
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, vec![Record::paper("Dune")]);

        let report = service(&books, &papers).resolve("Dune", Some(InputType::Title)).await;

        assert_eq!(report.result.sources_tried, vec![SourceName::Crossref]);
        assert!(books.seen().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_doi_skips_book_chain() {
        let books = Scripted::new(SourceName::OpenLibrary, BOOK_INPUTS, Vec::new());
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, Vec::new());

        let report = service(&books, &papers)
            .resolve("https://doi.org/10.1038/nature12373", None)
            .await;

        assert!(!report.success());
        assert_eq!(report.input_type, InputType::Doi);
        assert_eq!(papers.seen()[0].0, "10.1038/nature12373");
        assert!(books.seen().is_empty());
    }

    #[tokio::test]
    async fn test_best_match_respects_threshold() {
        let books = Scripted::new(
            SourceName::OpenLibrary,
            BOOK_INPUTS,
            vec![scored("Close", 0.6), scored("Exact", 0.95)],
        );
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, Vec::new());
        let service = service(&books, &papers);

        let report = service.resolve_book("exact", Some(InputType::Title)).await;
        assert_eq!(report.best_match.unwrap().title, "Exact");

        let strict = service.with_fuzzy_match_threshold(0.99);
        let report = strict.resolve_book("exact", Some(InputType::Title)).await;
        assert!(report.success());
        assert!(report.best_match.is_none());
    }

    #[tokio::test]
    async fn test_resolve_paper_keeps_explicit_type_and_raw_query() {
        let books = Scripted::new(SourceName::OpenLibrary, BOOK_INPUTS, Vec::new());
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, Vec::new());

        service(&books, &papers)
            .resolve_paper("  Smith 2020, A study  ", Some(InputType::Citation))
            .await;
        assert_eq!(
            papers.seen(),
            vec![("Smith 2020, A study".to_string(), InputType::Citation)]
        );
    }

    #[tokio::test]
    async fn test_resolve_blank_query_runs_nothing() {
        let books = Scripted::new(SourceName::OpenLibrary, BOOK_INPUTS, Vec::new());
        let papers = Scripted::new(SourceName::Crossref, PAPER_INPUTS, Vec::new());

        let report = service(&books, &papers).resolve("   ", None).await;
        assert_eq!(report.input_type, InputType::Unknown);
        assert!(report.result.sources_tried.is_empty());
    }
}
