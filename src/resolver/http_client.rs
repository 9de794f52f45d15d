//! Shared HTTP client construction policy for resolvers.
//!
//! Keeps every adapter consistent on timeouts, user-agent, compression and proxy
//! handling.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::record::SourceName;

use super::ResolveError;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds an HTTP client for one provider using the shared project policy.
///
/// # Errors
///
/// Returns [`ResolveError::Unavailable`] when client construction fails.
pub fn build_source_http_client(
    source: SourceName,
    user_agent: &str,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, ResolveError> {
    let settings = ClientSettings {
        user_agent: user_agent.to_string(),
        connect_timeout,
        request_timeout,
    };

    match try_build_client(&settings, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; retry with env proxies only.
            warn!(
                source = %source,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            try_build_client(&settings, true).map_err(|failure| failure.into_error(source))
        }
        Err(failure) => Err(failure.into_error(source)),
    }
}

struct ClientSettings {
    user_agent: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

impl BuildClientFailure {
    fn into_error(self, source: SourceName) -> ResolveError {
        match self {
            Self::Panic => ResolveError::unavailable(
                source,
                "HTTP client construction panicked while initializing networking",
            ),
            Self::Build(error) => {
                ResolveError::unavailable(source, format!("HTTP client construction failed: {error}"))
            }
        }
    }
}

fn try_build_client(
    settings: &ClientSettings,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    catch_unwind(AssertUnwindSafe(|| {
        let mut builder = base_builder(settings);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(settings: &ClientSettings) -> ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .user_agent(settings.user_agent.clone())
        .default_headers(headers)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_env_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_env_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_env_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
