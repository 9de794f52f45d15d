//! Shared HTTP base every provider adapter is built on.
//!
//! A [`SourceClient`] owns one connection pool, one [`RateLimiter`] and one
//! [`ReliabilityTracker`]. All outbound requests go through [`SourceClient::send`],
//! which paces them, retries 429s according to the limiter policy and feeds the
//! reliability counters.

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::detection::InputType;
use crate::record::{SourceMetadata, SourceName};

use super::http_client::build_source_http_client;
use super::rate_limiter::{Backoff, RateLimiter, parse_retry_after};
use super::reliability::ReliabilityTracker;
use super::{ResolveError, ResolverConfig, SourceProfile};

/// HTTP client slot, rate limiter and reliability counters for one provider.
#[derive(Debug)]
pub struct SourceClient {
    profile: SourceProfile,
    config: ResolverConfig,
    base_url: String,
    user_agent: String,
    client: RwLock<Option<Client>>,
    limiter: RateLimiter,
    reliability: ReliabilityTracker,
}

impl SourceClient {
    /// Creates the shared base for a provider.
    ///
    /// The rate-limit policy and endpoint come from `config` when set, else from
    /// the profile defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        profile: SourceProfile,
        config: ResolverConfig,
        user_agent: String,
    ) -> Result<Self, ResolveError> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(profile.base_url)
            .trim_end_matches('/')
            .to_string();
        let client = build_source_http_client(
            profile.source,
            &user_agent,
            config.connect_timeout,
            config.timeout,
        )?;
        let limiter = RateLimiter::with_label(
            config.rate_limit.unwrap_or(profile.rate_limit),
            profile.source.as_str(),
        );
        let reliability = ReliabilityTracker::new(profile.base_reliability, config.reliability_weights);

        debug!(source = %profile.source, base_url = %base_url, "created source client");
        Ok(Self {
            profile,
            config,
            base_url,
            user_agent,
            client: RwLock::new(Some(client)),
            limiter,
            reliability,
        })
    }

    #[must_use]
    pub fn source(&self) -> SourceName {
        self.profile.source
    }

    #[must_use]
    pub fn priority(&self) -> u32 {
        self.profile.priority
    }

    #[must_use]
    pub fn input_types(&self) -> &'static [InputType] {
        self.profile.input_types
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// API key from the config, ignoring blank values.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    #[must_use]
    pub fn reliability_score(&self) -> f64 {
        self.reliability.score()
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Provenance stamp for a record fetched now from this provider.
    #[must_use]
    pub fn metadata(&self, source_id: impl Into<String>, raw: Option<serde_json::Value>) -> SourceMetadata {
        let metadata = SourceMetadata::new(self.source(), source_id, self.reliability_score());
        match raw {
            Some(raw) => metadata.with_raw(raw),
            None => metadata,
        }
    }

    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Returns the pooled client, rebuilding it if [`close`](Self::close) was called.
    async fn client(&self) -> Result<Client, ResolveError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }
        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        debug!(source = %self.source(), "reopening HTTP client");
        let client = build_source_http_client(
            self.source(),
            &self.user_agent,
            self.config.connect_timeout,
            self.config.timeout,
        )?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Sends a request built by `build`, honoring the rate limiter.
    ///
    /// `build` is called once per attempt, so a 429 can be retried. Any non-429
    /// response is returned as-is, whatever its status.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::RateLimitExceeded`] once 429 retries are exhausted
    /// - [`ResolveError::Timeout`] when the request timed out (reported as an `Error` result)
    /// - [`ResolveError::Unavailable`] for other transport failures
    #[instrument(skip(self, build), fields(source = %self.source()))]
    pub async fn send<F>(&self, build: F) -> Result<Response, ResolveError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let client = self.client().await?;
        let started = Instant::now();

        loop {
            self.limiter.acquire().await;
            let response = match build(&client).send().await {
                Ok(response) => response,
                Err(error) => {
                    self.reliability.record(false, started.elapsed());
                    return Err(if error.is_timeout() {
                        ResolveError::timeout(self.source(), self.config.timeout)
                    } else {
                        ResolveError::unavailable(self.source(), format!("request failed: {error}"))
                    });
                }
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_retry_after);
                match self.limiter.handle_429(retry_after).await {
                    Backoff::Retry(_) => continue,
                    Backoff::Exhausted(wait) => {
                        self.reliability.record(false, started.elapsed());
                        return Err(ResolveError::rate_limited(self.source(), Some(wait)));
                    }
                }
            }

            self.limiter.reset_429().await;
            self.reliability
                .record(response.status().is_success(), started.elapsed());
            debug!(status = %response.status(), "response received");
            return Ok(response);
        }
    }

    /// Sends a request and decodes a JSON body. `404 Not Found` becomes `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Everything [`send`](Self::send) returns, plus [`ResolveError::Unavailable`]
    /// for other non-2xx statuses and undecodable bodies.
    pub async fn get_json<T, F>(&self, build: F) -> Result<Option<T>, ResolveError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let response = self.send(build).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ResolveError::unavailable(
                self.source(),
                format!("HTTP {}", status.as_u16()),
            ));
        }
        response.json::<T>().await.map(Some).map_err(|error| {
            ResolveError::unavailable(self.source(), format!("invalid JSON response: {error}"))
        })
    }

    /// Decodes an already-fetched JSON value into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unavailable`] when the value has an unexpected shape.
    pub fn decode<T: DeserializeOwned>(&self, value: &serde_json::Value) -> Result<T, ResolveError> {
        T::deserialize(value).map_err(|error| {
            ResolveError::unavailable(self.source(), format!("unexpected response shape: {error}"))
        })
    }

    /// Drops the connection pool. The next request opens a new one.
    pub async fn close(&self) {
        if self.client.write().await.take().is_some() {
            debug!(source = %self.source(), "closed HTTP client");
        }
    }

    /// Whether the connection pool is currently closed.
    pub async fn is_closed(&self) -> bool {
        self.client.read().await.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::{RateLimitConfig, ResolutionResult, ResolutionStatus};
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    const PROFILE: SourceProfile = SourceProfile {
        source: SourceName::OpenLibrary,
        base_url: "https://openlibrary.org",
        rate_limit: RateLimitConfig::per_second(0.0),
        input_types: &[InputType::Title],
        priority: 100,
        base_reliability: 0.75,
    };

    fn client_for(base_url: &str) -> SourceClient {
        SourceClient::new(
            PROFILE,
            ResolverConfig::default().base_url(base_url),
            crate::user_agent::default_user_agent(),
        )
        .unwrap()
    }

    #[test]
    fn test_source_client_url_join() {
        let client = client_for("http://127.0.0.1:9/api/");
        assert_eq!(client.url("/works/x"), "http://127.0.0.1:9/api/works/x");
        assert_eq!(client.url("search.json"), "http://127.0.0.1:9/api/search.json");
    }

    #[test]
    fn test_source_client_blank_api_key_is_none() {
        let config = ResolverConfig::with_api_key("   ");
        let client = SourceClient::new(PROFILE, config, String::new()).unwrap();
        assert!(client.api_key().is_none());
    }

    #[tokio::test]
    async fn test_source_client_close_then_reopen() {
        let client = client_for("http://127.0.0.1:9");
        assert!(!client.is_closed().await);
        client.close().await;
        assert!(client.is_closed().await);
        client.client().await.unwrap();
        assert!(!client.is_closed().await);
    }

    #[tokio::test]
    async fn test_get_json_404_is_none_and_counts_failure() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        let url = client.url("/missing");
        let body: Option<serde_json::Value> = client.get_json(|http| http.get(&url)).await.unwrap();
        assert!(body.is_none());
        assert_eq!(client.reliability.counts(), (0, 1));
    }

    #[tokio::test]
    async fn test_send_retries_429_then_succeeds() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        let url = client.url("/flaky");
        let body: Option<serde_json::Value> = client.get_json(|http| http.get(&url)).await.unwrap();
        assert_eq!(body.unwrap()["ok"], true);
        assert_eq!(client.limiter().consecutive_429().await, 0);
        assert_eq!(client.reliability.counts(), (1, 0));
    }

    #[tokio::test]
    async fn test_send_exhausted_429_is_rate_limited() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        let url = client.url("/busy");
        let err = client.send(|http| http.get(&url)).await.unwrap_err();
        assert!(matches!(err, ResolveError::RateLimitExceeded { .. }), "{err}");
        assert_eq!(client.limiter().consecutive_429().await, 3);
    }

    #[tokio::test]
    async fn test_get_json_server_error_is_unavailable() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server.uri());
        let url = client.url("/anything");
        let err = client
            .get_json::<serde_json::Value, _>(|http| http.get(&url))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 503"), "{err}");
    }

    #[tokio::test]
    async fn test_slow_response_is_error_result() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true}))
                    .set_delay(std::time::Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let config = ResolverConfig {
            timeout: std::time::Duration::from_millis(200),
            ..ResolverConfig::default().base_url(mock_server.uri())
        };
        let client = SourceClient::new(PROFILE, config, crate::user_agent::default_user_agent()).unwrap();
        let url = client.url("/slow");
        let err = client
            .get_json::<serde_json::Value, _>(|http| http.get(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Timeout { .. }), "{err}");
        let result = ResolutionResult::from_error(client.source(), &err);
        assert_eq!(result.status, ResolutionStatus::Error);
        assert_eq!(client.reliability.counts(), (0, 1));
    }
}
