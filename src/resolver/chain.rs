//! Fallback orchestration across several resolvers.
//!
//! A [`ChainResolver`] tries eligible resolvers in priority order (or all of them,
//! optionally concurrently), bounds the whole run by one deadline and merges the
//! records they return.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::detection::InputType;
use crate::lifecycle::Close;
use crate::record::{Record, SourceName};

use super::{ResolutionResult, ResolutionStatus, Resolver};

/// How a [`ChainResolver`] runs its resolvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackConfig {
    /// Stop after the first successful resolver
    pub stop_on_first_success: bool,
    /// Resolvers scoring below this are skipped
    pub min_reliability_score: f64,
    /// Run every resolver concurrently (only when not stopping on first success)
    pub parallel_execution: bool,
    /// Deadline for the whole chain
    pub total_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            stop_on_first_success: true,
            min_reliability_score: 0.5,
            parallel_execution: false,
            total_timeout: Duration::from_secs(60),
        }
    }
}

impl FallbackConfig {
    /// Query every eligible resolver instead of stopping at the first hit.
    #[must_use]
    pub fn all_sources(mut self, parallel: bool) -> Self {
        self.stop_on_first_success = false;
        self.parallel_execution = parallel;
        self
    }
}

/// Everything a chain run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedResult {
    /// First attempted resolver's result
    pub primary_result: Option<ResolutionResult>,
    /// Results of the remaining attempts, in priority order
    pub fallback_results: Vec<ResolutionResult>,
    /// Records from every attempt, deduplicated
    pub all_records: Vec<Record>,
    /// Sources in the order they were attempted
    pub sources_tried: Vec<SourceName>,
    /// The deadline expired before the chain finished
    pub timed_out: bool,
}

impl AggregatedResult {
    fn from_results(mut results: Vec<ResolutionResult>, timed_out: bool) -> Self {
        let sources_tried = results.iter().map(|result| result.source).collect();
        let primary_result = if results.is_empty() {
            None
        } else {
            Some(results.remove(0))
        };
        let mut aggregated = Self {
            primary_result,
            fallback_results: results,
            all_records: Vec::new(),
            sources_tried,
            timed_out,
        };
        aggregated.all_records = deduplicate_records(
            aggregated
                .results()
                .flat_map(|result| result.records.iter().cloned()),
        );
        aggregated
    }

    /// Appends the attempts of a later run, keeping this run's primary result.
    #[must_use]
    pub fn merge(self, later: Self) -> Self {
        let timed_out = self.timed_out || later.timed_out;
        let results = self
            .primary_result
            .into_iter()
            .chain(self.fallback_results)
            .chain(later.primary_result)
            .chain(later.fallback_results)
            .collect();
        Self::from_results(results, timed_out)
    }

    /// Primary then fallback results, in attempt order.
    pub fn results(&self) -> impl Iterator<Item = &ResolutionResult> {
        self.primary_result.iter().chain(self.fallback_results.iter())
    }

    /// Whether any attempt succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.results().any(ResolutionResult::is_success)
    }

    /// First successful result, else the first result of any status.
    #[must_use]
    pub fn best_result(&self) -> Option<&ResolutionResult> {
        self.results()
            .find(|result| result.is_success())
            .or(self.primary_result.as_ref())
    }
}

/// Keeps the first record seen for each [`Record::dedup_key`].
///
/// Records without any key are kept as-is.
pub fn deduplicate_records(records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match record.dedup_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}

/// Priority-ordered fallback over a set of resolvers.
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn Resolver>>,
    config: FallbackConfig,
}

impl std::fmt::Debug for ChainResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sources: Vec<SourceName> = self.resolvers.iter().map(|r| r.source()).collect();
        f.debug_struct("ChainResolver")
            .field("resolvers", &sources)
            .field("config", &self.config)
            .finish()
    }
}

impl ChainResolver {
    /// Creates a chain; resolvers are ordered by priority (stable for ties).
    #[must_use]
    pub fn new(mut resolvers: Vec<Arc<dyn Resolver>>, config: FallbackConfig) -> Self {
        resolvers.sort_by_key(|resolver| resolver.priority());
        Self { resolvers, config }
    }

    #[must_use]
    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Resolvers in priority order.
    #[must_use]
    pub fn resolvers(&self) -> &[Arc<dyn Resolver>] {
        &self.resolvers
    }

    /// Resolvers that may take part in a run for `input_type`.
    fn eligible(&self, input_type: InputType) -> Vec<Arc<dyn Resolver>> {
        self.resolvers
            .iter()
            .filter(|resolver| {
                let keep = resolver.is_enabled()
                    && resolver.supports(input_type)
                    && resolver.reliability_score() >= self.config.min_reliability_score;
                if !keep {
                    debug!(source = %resolver.source(), %input_type, "resolver skipped");
                }
                keep
            })
            .cloned()
            .collect()
    }

    /// Resolves `query` through the chain.
    ///
    /// Never fails: resolver errors, panics and the deadline all end up in the
    /// returned [`AggregatedResult`].
    #[instrument(skip(self), fields(resolvers = self.resolvers.len()))]
    pub async fn resolve(&self, query: &str, input_type: InputType) -> AggregatedResult {
        let active = self.eligible(input_type);
        if active.is_empty() {
            warn!(%input_type, "no resolvers available for input type");
            return AggregatedResult::default();
        }

        let started = Instant::now();
        let (results, timed_out) =
            if self.config.parallel_execution && !self.config.stop_on_first_success {
                self.run_parallel(&active, query, input_type).await
            } else {
                self.run_sequential(&active, query, input_type).await
            };

        let aggregated = AggregatedResult::from_results(results, timed_out);
        info!(
            success = aggregated.success(),
            tried = aggregated.sources_tried.len(),
            records = aggregated.all_records.len(),
            timed_out,
            elapsed_ms = started.elapsed().as_millis(),
            "chain resolution finished"
        );
        aggregated
    }

    async fn run_sequential(
        &self,
        active: &[Arc<dyn Resolver>],
        query: &str,
        input_type: InputType,
    ) -> (Vec<ResolutionResult>, bool) {
        let mut results = Vec::with_capacity(active.len());
        let mut in_flight = None;

        let run = async {
            for resolver in active {
                in_flight = Some(resolver.source());
                let result = attempt(resolver.as_ref(), query, input_type).await;
                in_flight = None;
                let succeeded = result.is_success();
                results.push(result);
                if succeeded && self.config.stop_on_first_success {
                    break;
                }
            }
        };

        let timed_out = tokio::time::timeout(self.config.total_timeout, run)
            .await
            .is_err();
        if timed_out {
            warn!(
                timeout_secs = self.config.total_timeout.as_secs_f64(),
                completed = results.len(),
                "fallback chain timed out"
            );
            if let Some(source) = in_flight {
                results.push(self.deadline_result(source));
            }
        }
        (results, timed_out)
    }

    async fn run_parallel(
        &self,
        active: &[Arc<dyn Resolver>],
        query: &str,
        input_type: InputType,
    ) -> (Vec<ResolutionResult>, bool) {
        let mut handles: Vec<(SourceName, JoinHandle<ResolutionResult>)> = active
            .iter()
            .map(|resolver| {
                let resolver = Arc::clone(resolver);
                let query = query.to_string();
                let source = resolver.source();
                let handle =
                    tokio::spawn(async move { attempt(resolver.as_ref(), &query, input_type).await });
                (source, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let run = async {
            for (source, handle) in &mut handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(error) => {
                        warn!(source = %source, error = %error, "resolver task failed");
                        ResolutionResult::error(*source, format!("resolver task failed: {error}"))
                    }
                };
                results.push(result);
            }
        };

        let timed_out = tokio::time::timeout(self.config.total_timeout, run)
            .await
            .is_err();
        if timed_out {
            warn!(
                timeout_secs = self.config.total_timeout.as_secs_f64(),
                completed = results.len(),
                "fallback chain timed out"
            );
            // Tasks still running are detached; their results are dropped.
            let collected = results.len();
            for (source, handle) in handles.iter_mut().skip(collected) {
                let result = match handle.now_or_never() {
                    Some(Ok(result)) => result,
                    _ => self.deadline_result(*source),
                };
                results.push(result);
            }
        }
        (results, timed_out)
    }

    fn deadline_result(&self, source: SourceName) -> ResolutionResult {
        ResolutionResult::failed(
            source,
            ResolutionStatus::Timeout,
            format!(
                "fallback chain deadline of {}s expired",
                self.config.total_timeout.as_secs_f64()
            ),
        )
        .with_duration(self.config.total_timeout)
    }

    /// Closes every resolver in the chain.
    pub async fn close(&self) {
        for resolver in &self.resolvers {
            Resolver::close(resolver.as_ref()).await;
        }
    }
}

#[async_trait]
impl Close for ChainResolver {
    async fn close(&self) {
        ChainResolver::close(self).await;
    }
}

/// Runs one resolver, turning a panic into an `Error` result.
async fn attempt(resolver: &dyn Resolver, query: &str, input_type: InputType) -> ResolutionResult {
    let source = resolver.source();
    match AssertUnwindSafe(resolver.resolve(query, input_type))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(source = %source, panic = %message, "resolver panicked");
            ResolutionResult::error(source, format!("resolver panicked: {message}"))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
