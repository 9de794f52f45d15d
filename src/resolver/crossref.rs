//! Crossref paper resolver.
//!
//! Looks works up through the Crossref REST API, either directly by DOI or via
//! bibliographic title search. A contact email, when configured, is sent both in
//! the User-Agent and as a `mailto` parameter to get into Crossref's polite pool.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::detection::InputType;
use crate::identifier::Doi;
use crate::record::{Author, Record, SourceName};
use crate::user_agent::contact_user_agent;

use super::paper::{PaperSource, resolve_paper};
use super::{
    RateLimitConfig, ResolutionResult, ResolveError, Resolver, ResolverConfig, SourceClient,
    SourceProfile, TITLE_SEARCH_LIMIT, rank_title_matches,
};

const PROFILE: SourceProfile = SourceProfile {
    source: SourceName::Crossref,
    base_url: "https://api.crossref.org",
    rate_limit: RateLimitConfig::per_second(50.0).with_burst(5),
    input_types: &[InputType::Doi, InputType::Title, InputType::Citation],
    priority: 10,
    base_reliability: 0.95,
};

/// Fields requested from the title search endpoint.
const SEARCH_SELECT: &str = "DOI,title,author,published,published-print,published-online,\
container-title,abstract,reference-count,is-referenced-by-count,volume,issue,page,link,URL,language";

/// JATS markup Crossref embeds in abstracts.
#[allow(clippy::expect_used)]
static MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[^>]+>").expect("markup regex is valid") // Static pattern, safe to panic
});

// ==================== Crossref API Response Types ====================

/// Envelope shared by every Crossref response.
#[derive(Debug, Deserialize)]
struct CrossrefEnvelope<T> {
    message: T,
}

/// `message` of a search response; items stay raw so they can be kept as provenance.
#[derive(Debug, Deserialize)]
struct CrossrefItems {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

/// One work as returned by `/works`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CrossrefWork {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    title: Option<Vec<String>>,
    author: Option<Vec<CrossrefAuthor>>,
    published: Option<CrossrefDate>,
    published_print: Option<CrossrefDate>,
    published_online: Option<CrossrefDate>,
    container_title: Option<Vec<String>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    reference_count: Option<u64>,
    is_referenced_by_count: Option<u64>,
    volume: Option<String>,
    issue: Option<String>,
    page: Option<String>,
    link: Option<Vec<CrossrefLink>>,
    #[serde(rename = "URL")]
    url: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefAuthor {
    given: Option<String>,
    family: Option<String>,
    #[serde(rename = "ORCID")]
    orcid: Option<String>,
    #[serde(default)]
    affiliation: Vec<CrossrefAffiliation>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAffiliation {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CrossrefLink {
    #[serde(rename = "URL")]
    url: String,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CrossrefDate {
    date_parts: Option<Vec<Vec<Option<i32>>>>,
}

// ==================== CrossrefResolver ====================

/// Resolves DOIs, titles and citations through the Crossref REST API.
pub struct CrossrefResolver {
    client: SourceClient,
    mailto: Option<String>,
}

impl CrossrefResolver {
    /// Creates a resolver. `config.api_key` is read as the polite-pool contact email.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the email contains control characters or the
    /// HTTP client cannot be built.
    #[instrument(skip_all)]
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let mailto = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string);
        if let Some(email) = &mailto
            && email.chars().any(char::is_control)
        {
            return Err(ResolveError::validation(
                SourceName::Crossref,
                email,
                "contact email contains control characters",
            ));
        }

        let user_agent = contact_user_agent(mailto.as_deref());
        let client = SourceClient::new(PROFILE, config, user_agent)?;
        Ok(Self { client, mailto })
    }

    /// Appends the polite-pool parameter to a query string.
    fn with_mailto(&self, mut url: String) -> String {
        if let Some(email) = &self.mailto {
            let separator = if url.contains('?') { '&' } else { '?' };
            url.push(separator);
            url.push_str("mailto=");
            url.push_str(&urlencoding::encode(email));
        }
        url
    }

    fn to_record(&self, raw: serde_json::Value) -> Result<Record, ResolveError> {
        let work: CrossrefWork = self.client.decode(&raw)?;
        let mut record = work_to_record(work);
        let source_id = record.identifiers.doi.clone().unwrap_or_default();
        record.source_metadata = Some(self.client.metadata(source_id, Some(raw)));
        Ok(record)
    }
}

impl std::fmt::Debug for CrossrefResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefResolver")
            .field("client", &self.client)
            .field("mailto", &self.mailto)
            .finish()
    }
}

#[async_trait]
impl PaperSource for CrossrefResolver {
    fn client(&self) -> &SourceClient {
        &self.client
    }

    #[instrument(skip(self, doi), fields(doi = %doi.value()))]
    async fn search_by_doi(&self, doi: &Doi) -> Result<Vec<Record>, ResolveError> {
        let url = self.with_mailto(
            self.client
                .url(&format!("works/{}", urlencoding::encode(doi.value()))),
        );
        debug!(api_url = %url, "Calling Crossref API");

        let envelope: Option<CrossrefEnvelope<serde_json::Value>> =
            self.client.get_json(|http| http.get(&url)).await?;
        match envelope {
            Some(envelope) => Ok(vec![self.to_record(envelope.message)?]),
            None => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError> {
        let url = self.with_mailto(self.client.url(&format!(
            "works?query.title={}&rows={TITLE_SEARCH_LIMIT}&select={SEARCH_SELECT}",
            urlencoding::encode(title)
        )));
        debug!(api_url = %url, "Searching Crossref by title");

        let Some(envelope) = self
            .client
            .get_json::<CrossrefEnvelope<CrossrefItems>, _>(|http| http.get(&url))
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut records = envelope
            .message
            .items
            .into_iter()
            .map(|item| self.to_record(item))
            .collect::<Result<Vec<_>, _>>()?;
        rank_title_matches(title, &mut records);
        Ok(records)
    }
}

#[async_trait]
impl Resolver for CrossrefResolver {
    fn source(&self) -> SourceName {
        self.client.source()
    }

    fn priority(&self) -> u32 {
        self.client.priority()
    }

    fn supported_input_types(&self) -> &[InputType] {
        self.client.input_types()
    }

    fn is_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    fn reliability_score(&self) -> f64 {
        self.client.reliability_score()
    }

    async fn resolve(&self, query: &str, input_type: InputType) -> ResolutionResult {
        resolve_paper(self, query, input_type).await
    }

    /// Crossref ids are DOIs.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>, ResolveError> {
        let doi = Doi::parse(id)
            .map_err(|error| ResolveError::invalid_identifier(self.source(), id, &error))?;
        Ok(self.search_by_doi(&doi).await?.into_iter().next())
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

// ==================== Extraction Helpers ====================

fn work_to_record(work: CrossrefWork) -> Record {
    let title = work
        .title
        .and_then(|titles| titles.into_iter().find(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| "Unknown".to_string());
    let mut record = Record::paper(title);

    let date = [&work.published, &work.published_print, &work.published_online]
        .into_iter()
        .find_map(|date| date.as_ref().and_then(date_parts));
    if let Some((year, formatted)) = date {
        record.year = Some(year);
        record.publication_date = Some(formatted);
    }

    record.authors = work
        .author
        .unwrap_or_default()
        .into_iter()
        .map(to_author)
        .collect();

    let doi = work
        .doi
        .map(|raw| Doi::parse(&raw).map_or(raw, |doi| doi.value().to_string()));
    record.url = doi
        .as_deref()
        .map(|doi| format!("https://doi.org/{doi}"))
        .or(work.url);
    record.identifiers.doi = doi;

    record.journal = work
        .container_title
        .and_then(|titles| titles.into_iter().next());
    record.abstract_text = work.abstract_text.as_deref().map(strip_markup);
    record.reference_count = work.reference_count;
    record.citation_count = work.is_referenced_by_count;
    record.volume = work.volume;
    record.issue = work.issue;
    record.pages_range = work.page;
    record.language = work.language;
    record.pdf_url = work.link.as_deref().and_then(extract_pdf_url);
    record
}

fn to_author(author: CrossrefAuthor) -> Author {
    let given = author.given.filter(|s| !s.trim().is_empty());
    let family = author.family.filter(|s| !s.trim().is_empty());
    let joined = [given.as_deref(), family.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    Author {
        name: if joined.is_empty() {
            "Unknown".to_string()
        } else {
            joined
        },
        given_name: given,
        family_name: family,
        orcid: author.orcid.map(|orcid| {
            orcid
                .trim_start_matches("https://orcid.org/")
                .trim_start_matches("http://orcid.org/")
                .to_string()
        }),
        affiliations: author
            .affiliation
            .into_iter()
            .filter_map(|affiliation| affiliation.name)
            .collect(),
    }
}

/// Year plus an ISO date as precise as the date-parts allow.
fn date_parts(date: &CrossrefDate) -> Option<(i32, String)> {
    let parts = date.date_parts.as_ref()?.first()?;
    let year = (*parts.first()?)?;
    let formatted = match (parts.get(1).copied().flatten(), parts.get(2).copied().flatten()) {
        (Some(month), Some(day)) => format!("{year:04}-{month:02}-{day:02}"),
        (Some(month), None) => format!("{year:04}-{month:02}"),
        _ => format!("{year:04}"),
    };
    Some((year, formatted))
}

/// First link advertised as a PDF.
fn extract_pdf_url(links: &[CrossrefLink]) -> Option<String> {
    links
        .iter()
        .find(|link| {
            link.content_type
                .as_deref()
                .and_then(|ct| ct.split(';').next())
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"))
        })
        .map(|link| link.url.clone())
}

fn strip_markup(text: &str) -> String {
    MARKUP
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
