//! Resolver contract, shared HTTP plumbing and the fallback chain.
//!
//! Every metadata provider is wrapped in a type implementing [`Resolver`]. The
//! [`ChainResolver`] composes many of them into one priority-ordered,
//! deduplicating, deadline-bounded lookup.
//!
//! # Architecture
//!
//! - [`Resolver`] - Async trait every provider adapter implements
//! - [`SourceClient`] - Shared HTTP client slot, [`RateLimiter`] and reliability counters
//! - [`BookSource`] / [`PaperSource`] - Route input types to `search_by_*` methods
//! - [`ChainResolver`] - Fallback orchestration and record deduplication
//! - [`ResolverRegistry`] - Explicitly owned set of book and paper resolvers
//! - [`CrossrefResolver`], [`SemanticScholarResolver`] - Paper adapters
//! - [`IsbndbResolver`], [`GoogleBooksResolver`], [`OpenLibraryResolver`] - Book adapters
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use consearch_core::detection::InputType;
//! use consearch_core::resolver::{
//!     ChainResolver, FallbackConfig, OpenLibraryResolver, Resolver, ResolverConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let openlibrary: Arc<dyn Resolver> = Arc::new(OpenLibraryResolver::new(ResolverConfig::default())?);
//! let chain = ChainResolver::new(vec![openlibrary], FallbackConfig::default());
//!
//! let result = chain.resolve("9780134093413", InputType::Isbn13).await;
//! if let Some(best) = result.best_result() {
//!     println!("{} answered with {:?}", best.source, best.status);
//! }
//! # Ok(())
//! # }
//! ```

mod book;
mod chain;
mod crossref;
mod error;
mod google_books;
mod http_client;
mod isbndb;
mod openlibrary;
mod paper;
mod rate_limiter;
mod registry;
mod reliability;
mod semantic_scholar;
mod source_client;

pub use book::{BookSource, resolve_book};
pub use chain::{AggregatedResult, ChainResolver, FallbackConfig, deduplicate_records};
pub use crossref::CrossrefResolver;
pub use error::ResolveError;
pub use google_books::GoogleBooksResolver;
pub use http_client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, build_source_http_client};
pub use isbndb::IsbndbResolver;
pub use openlibrary::OpenLibraryResolver;
pub use paper::{PaperSource, resolve_paper};
pub use rate_limiter::{Backoff, MAX_429_BACKOFF, RateLimitConfig, RateLimiter, parse_retry_after};
pub use registry::ResolverRegistry;
pub use reliability::{ReliabilityTracker, ReliabilityWeights};
pub use semantic_scholar::SemanticScholarResolver;
pub use source_client::SourceClient;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::detection::InputType;
use crate::normalization::title_similarity;
use crate::record::{Record, SourceName};

/// Outcome category of one resolver attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// At least one record was found
    Success,
    /// The provider answered but had no match
    NotFound,
    /// The provider kept throttling us
    RateLimited,
    /// Validation, transport or HTTP failure
    Error,
    /// The attempt did not finish before the deadline
    Timeout,
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// What one resolver produced for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResult {
    pub status: ResolutionStatus,
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub source: SourceName,
    pub duration_ms: u64,
}

impl ResolutionResult {
    /// A result carrying `records`; empty records are reported as `NotFound`.
    #[must_use]
    pub fn found(source: SourceName, records: Vec<Record>) -> Self {
        let status = if records.is_empty() {
            ResolutionStatus::NotFound
        } else {
            ResolutionStatus::Success
        };
        Self {
            status,
            records,
            error_message: None,
            source,
            duration_ms: 0,
        }
    }

    /// A `NotFound` result.
    #[must_use]
    pub fn not_found(source: SourceName) -> Self {
        Self::found(source, Vec::new())
    }

    /// A failure result with the given status and message.
    #[must_use]
    pub fn failed(source: SourceName, status: ResolutionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            records: Vec::new(),
            error_message: Some(message.into()),
            source,
            duration_ms: 0,
        }
    }

    /// An `Error` result.
    #[must_use]
    pub fn error(source: SourceName, message: impl Into<String>) -> Self {
        Self::failed(source, ResolutionStatus::Error, message)
    }

    /// Converts a resolver error into a status-tagged result.
    #[must_use]
    pub fn from_error(source: SourceName, error: &ResolveError) -> Self {
        Self::failed(source, error.status(), error.to_string())
    }

    /// Converts a search outcome into a result, stamping its duration.
    #[must_use]
    pub fn from_outcome(
        source: SourceName,
        outcome: Result<Vec<Record>, ResolveError>,
        elapsed: Duration,
    ) -> Self {
        let result = match outcome {
            Ok(records) => Self::found(source, records),
            Err(error) => Self::from_error(source, &error),
        };
        let result = result.with_duration(elapsed);
        debug!(
            source = %source,
            status = %result.status,
            records = result.records.len(),
            duration_ms = result.duration_ms,
            "resolver attempt finished"
        );
        result
    }

    /// Sets `duration_ms` from an elapsed time.
    #[must_use]
    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// True when the status is `Success` and at least one record came back.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResolutionStatus::Success && !self.records.is_empty()
    }
}

/// Caller-supplied settings for one resolver instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    pub api_key: Option<String>,
    /// Overrides the adapter's default endpoint (used by tests and mirrors)
    pub base_url: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Overrides the adapter's default rate-limit policy
    pub rate_limit: Option<RateLimitConfig>,
    pub enabled: bool,
    pub reliability_weights: ReliabilityWeights,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rate_limit: None,
            enabled: true,
            reliability_weights: ReliabilityWeights::default(),
        }
    }
}

impl ResolverConfig {
    /// Default config with an API key.
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Returns a copy pointing at `base_url`.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Static facts about a metadata provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceProfile {
    pub source: SourceName,
    pub base_url: &'static str,
    pub rate_limit: RateLimitConfig,
    pub input_types: &'static [InputType],
    /// Lower runs first
    pub priority: u32,
    /// Prior belief in the provider's data quality, in `[0, 1]`
    pub base_reliability: f64,
}

/// Trait for metadata provider adapters.
///
/// Uses `async_trait` for object safety so resolvers can be stored as
/// `Arc<dyn Resolver>` (native async fn in traits is not dyn-compatible).
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Provider this resolver talks to.
    fn source(&self) -> SourceName;

    /// Position in the fallback order; lower is tried first.
    fn priority(&self) -> u32;

    /// Input types this resolver understands.
    fn supported_input_types(&self) -> &[InputType];

    /// Whether the resolver should be used at all.
    fn is_enabled(&self) -> bool;

    /// Whether the resolver understands `input_type`.
    fn supports(&self, input_type: InputType) -> bool {
        self.supported_input_types().contains(&input_type)
    }

    /// Current reliability in `[0, 1]`, recomputed on every call.
    fn reliability_score(&self) -> f64;

    /// Looks up `query`, never failing: every problem becomes a result status.
    async fn resolve(&self, query: &str, input_type: InputType) -> ResolutionResult;

    /// Fetches a single record by the provider's own id.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] on transport, HTTP or validation failures.
    /// A missing record is `Ok(None)`.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>, ResolveError>;

    /// Releases the HTTP connection pool. A later call transparently reopens it.
    async fn close(&self);
}

/// Most subjects or categories kept per record.
pub(crate) const MAX_SUBJECTS: usize = 10;

/// Hits requested from title-search endpoints.
pub(crate) const TITLE_SEARCH_LIMIT: usize = 10;

/// Scores title-search hits against `query` and orders them best first.
///
/// Each record's confidence becomes its title similarity to the query. Ties keep
/// the provider's own order.
pub(crate) fn rank_title_matches(query: &str, records: &mut [Record]) {
    for record in records.iter_mut() {
        record.confidence = title_similarity(query, &record.title);
    }
    records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[async_trait]
impl crate::lifecycle::Close for dyn Resolver {
    async fn close(&self) {
        Resolver::close(self).await;
    }
}
