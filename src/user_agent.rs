//! Shared User-Agent strings for provider HTTP clients.

/// Project URL for User-Agent identification (RFC 9308 good citizenship).
const PROJECT_UA_URL: &str = "https://github.com/fierce/consearch";

/// Default User-Agent for provider requests (no per-provider name in the header).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("consearch/{version} (research-tool; +{PROJECT_UA_URL})")
}

/// User-Agent carrying a contact address, as Crossref's polite pool asks for.
#[must_use]
pub(crate) fn contact_user_agent(email: Option<&str>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    match email.map(str::trim).filter(|email| !email.is_empty()) {
        Some(email) => format!("consearch/{version} (research-tool; +{PROJECT_UA_URL}; mailto:{email})"),
        None => default_user_agent(),
    }
}
