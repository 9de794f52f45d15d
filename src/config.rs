//! Library-level settings.
//!
//! [`Settings`] is a plain value built once by the caller (the binary fills it
//! from a config file and `CONSEARCH_*` variables) and handed to
//! [`ResolverRegistry::from_settings`](crate::resolver::ResolverRegistry::from_settings).

use std::time::Duration;

use crate::resolver::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, FallbackConfig, RateLimitConfig,
    ResolverConfig,
};

/// Default minimum title similarity for a title-search hit to count as a match.
pub const DEFAULT_FUZZY_MATCH_THRESHOLD: f64 = 0.85;

/// Credentials, HTTP policy and orchestration defaults for a resolution run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Required for the ISBNdb resolver to be registered
    pub isbndb_api_key: Option<String>,
    pub google_books_api_key: Option<String>,
    /// Registers the Semantic Scholar resolver when set
    pub semantic_scholar_api_key: Option<String>,
    /// Contact address for Crossref's polite pool
    pub crossref_email: Option<String>,
    pub connect_timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Overrides every resolver's own rate limit when set
    pub default_rate_limit_rps: Option<f64>,
    pub fallback: FallbackConfig,
    /// Title similarity in `[0, 1]` a record needs to be reported as the best match
    pub fuzzy_match_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            isbndb_api_key: None,
            google_books_api_key: None,
            semantic_scholar_api_key: None,
            crossref_email: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            default_rate_limit_rps: None,
            fallback: FallbackConfig::default(),
            fuzzy_match_threshold: DEFAULT_FUZZY_MATCH_THRESHOLD,
        }
    }
}

impl Settings {
    /// Builds the per-resolver config carrying these settings' HTTP policy.
    ///
    /// Blank keys are treated as absent.
    #[must_use]
    pub fn resolver_config(&self, api_key: Option<&str>) -> ResolverConfig {
        ResolverConfig {
            api_key: api_key
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            timeout: self.request_timeout,
            connect_timeout: self.connect_timeout,
            rate_limit: self
                .default_rate_limit_rps
                .filter(|rps| *rps > 0.0)
                .map(RateLimitConfig::per_second),
            ..ResolverConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert!((settings.fuzzy_match_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(settings.fallback, FallbackConfig::default());
        assert!(settings.isbndb_api_key.is_none());
    }

    #[test]
    fn test_resolver_config_carries_http_policy() {
        let settings = Settings {
            request_timeout: Duration::from_secs(5),
            default_rate_limit_rps: Some(2.0),
            ..Settings::default()
        };
        let config = settings.resolver_config(Some(" key "));
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.rate_limit, Some(RateLimitConfig::per_second(2.0)));
        assert!(config.enabled);
    }

    #[test]
    fn test_resolver_config_blank_key_and_zero_rps() {
        let settings = Settings {
            default_rate_limit_rps: Some(0.0),
            ..Settings::default()
        };
        let config = settings.resolver_config(Some("   "));
        assert!(config.api_key.is_none());
        assert!(config.rate_limit.is_none());
    }
}
