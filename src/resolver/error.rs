//! Error types for resolver operations.
//!
//! Every variant maps onto a [`ResolutionStatus`], so a failed lookup can always be
//! reported as a status-tagged result instead of aborting the fallback chain.

use std::time::Duration;

use thiserror::Error;

use crate::identifier::IdentifierError;
use crate::record::SourceName;

use super::ResolutionStatus;

/// Errors that can occur while querying a metadata provider.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The query or resolver configuration is invalid; no request was sent
    #[error("{provider}: invalid input '{input}': {reason}\n  Suggestion: {suggestion}")]
    Validation {
        /// Provider that rejected the input
        provider: SourceName,
        /// The rejected query or setting
        input: String,
        /// Why it was rejected
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// The provider could not be reached or answered with an unusable response
    #[error("{provider} unavailable: {reason}\n  Suggestion: {suggestion}")]
    Unavailable {
        /// Provider that failed
        provider: SourceName,
        /// Transport or HTTP failure description
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// The provider kept answering 429 after every allowed retry
    #[error(
        "{provider} rate limit exceeded{}\n  Suggestion: Wait before retrying or lower the configured request rate",
        retry_hint(.retry_after)
    )]
    RateLimitExceeded {
        /// Provider that throttled the client
        provider: SourceName,
        /// Backoff the provider (or our policy) asked for
        retry_after: Option<Duration>,
    },

    /// The provider has no record for the query
    #[error("{provider}: no record found for '{query}'\n  Suggestion: Check the identifier or try another source")]
    NotFound {
        /// Provider that was asked
        provider: SourceName,
        /// The query that matched nothing
        query: String,
    },

    /// The request did not complete in time
    #[error(
        "{provider} timed out after {}ms\n  Suggestion: Increase the timeout or retry later",
        .after.as_millis()
    )]
    Timeout {
        /// Provider that timed out
        provider: SourceName,
        /// How long we waited
        after: Duration,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after.map_or_else(String::new, |wait| format!(" (retry after {}s)", wait.as_secs()))
}

impl ResolveError {
    /// Creates a `Validation` error.
    #[must_use]
    pub fn validation(provider: SourceName, input: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            provider,
            input: input.to_string(),
            reason: reason.into(),
            suggestion: "Check the query format for this input type".to_string(),
        }
    }

    /// Creates a `Validation` error for a missing required setting.
    #[must_use]
    pub fn missing_setting(provider: SourceName, setting: &str, env_var: &str) -> Self {
        Self::Validation {
            provider,
            input: setting.to_string(),
            reason: format!("{setting} is required"),
            suggestion: format!("Set {setting} in the config file or export {env_var}"),
        }
    }

    /// Wraps an identifier parsing failure as a `Validation` error.
    #[must_use]
    pub fn invalid_identifier(provider: SourceName, input: &str, error: &IdentifierError) -> Self {
        Self::Validation {
            provider,
            input: input.to_string(),
            reason: format!("not a valid {}", error.kind()),
            suggestion: "Check for typos or pass the query with a different --type".to_string(),
        }
    }

    /// Creates an `Unavailable` error.
    #[must_use]
    pub fn unavailable(provider: SourceName, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider,
            reason: reason.into(),
            suggestion: "Check network connectivity or try again later".to_string(),
        }
    }

    /// Creates a `RateLimitExceeded` error.
    #[must_use]
    pub fn rate_limited(provider: SourceName, retry_after: Option<Duration>) -> Self {
        Self::RateLimitExceeded {
            provider,
            retry_after,
        }
    }

    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(provider: SourceName, query: &str) -> Self {
        Self::NotFound {
            provider,
            query: query.to_string(),
        }
    }

    /// Creates a `Timeout` error.
    #[must_use]
    pub fn timeout(provider: SourceName, after: Duration) -> Self {
        Self::Timeout { provider, after }
    }

    /// Provider the error came from.
    #[must_use]
    pub fn provider(&self) -> SourceName {
        match self {
            Self::Validation { provider, .. }
            | Self::Unavailable { provider, .. }
            | Self::RateLimitExceeded { provider, .. }
            | Self::NotFound { provider, .. }
            | Self::Timeout { provider, .. } => *provider,
        }
    }

    /// Result status this error is reported as.
    ///
    /// A request timing out is a transport failure and reports as `Error`;
    /// `ResolutionStatus::Timeout` is reserved for the chain deadline.
    #[must_use]
    pub fn status(&self) -> ResolutionStatus {
        match self {
            Self::Validation { .. } | Self::Unavailable { .. } | Self::Timeout { .. } => {
                ResolutionStatus::Error
            }
            Self::RateLimitExceeded { .. } => ResolutionStatus::RateLimited,
            Self::NotFound { .. } => ResolutionStatus::NotFound,
        }
    }
}
