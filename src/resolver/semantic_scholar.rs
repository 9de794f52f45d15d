//! Semantic Scholar paper resolver.
//!
//! The Graph API takes prefixed paper ids (`DOI:`, `arXiv:`, `PMID:`), which
//! makes it the one paper source covering every identifier type. Works without a
//! key on the shared pool; an `x-api-key` header buys a dedicated quota.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::detection::InputType;
use crate::identifier::{ArxivId, Doi};
use crate::record::{Author, Record, SourceName};
use crate::user_agent::default_user_agent;

use super::paper::{PaperSource, resolve_paper};
use super::{
    RateLimitConfig, ResolutionResult, ResolveError, Resolver, ResolverConfig, SourceClient,
    SourceProfile, TITLE_SEARCH_LIMIT, rank_title_matches,
};

const PROFILE: SourceProfile = SourceProfile {
    source: SourceName::SemanticScholar,
    base_url: "https://api.semanticscholar.org/graph/v1",
    rate_limit: RateLimitConfig::per_second(1.0),
    input_types: &[
        InputType::Doi,
        InputType::Arxiv,
        InputType::Pmid,
        InputType::Title,
    ],
    priority: 50,
    base_reliability: 0.85,
};

/// Fields requested for every paper.
const PAPER_FIELDS: &str = "paperId,title,authors,year,abstract,venue,publicationDate,\
citationCount,referenceCount,externalIds,openAccessPdf,url,fieldsOfStudy";

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<S2Author>,
    year: Option<i32>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    venue: Option<String>,
    publication_date: Option<String>,
    citation_count: Option<u64>,
    reference_count: Option<u64>,
    external_ids: Option<S2ExternalIds>,
    open_access_pdf: Option<S2OpenAccessPdf>,
    url: Option<String>,
    fields_of_study: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

/// `externalIds` values are mostly strings, but a few (CorpusId) are numbers.
#[derive(Debug, Default, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
    #[serde(rename = "PubMed")]
    pubmed: Option<String>,
    #[serde(rename = "PubMedCentral")]
    pubmed_central: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}

/// Resolves DOIs, arXiv ids, PubMed ids and titles through Semantic Scholar.
pub struct SemanticScholarResolver {
    client: SourceClient,
}

impl SemanticScholarResolver {
    /// Creates a resolver. `config.api_key` is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the HTTP client cannot be built.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let client = SourceClient::new(PROFILE, config, default_user_agent())?;
        Ok(Self { client })
    }

    /// GET with the API key header when one is configured.
    fn get(&self, http: &Client, url: &str) -> reqwest::RequestBuilder {
        let request = http.get(url);
        match self.client.api_key() {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Looks one paper up by a prefixed Semantic Scholar id.
    async fn paper(&self, paper_id: &str) -> Result<Vec<Record>, ResolveError> {
        let url = self.client.url(&format!(
            "paper/{}?fields={PAPER_FIELDS}",
            urlencoding::encode(paper_id)
        ));
        debug!(api_url = %url, "Calling Semantic Scholar API");

        match self
            .client
            .get_json::<serde_json::Value, _>(|http| self.get(http, &url))
            .await?
        {
            Some(raw) if !raw.is_null() => Ok(vec![self.to_record(raw)?]),
            _ => Ok(Vec::new()),
        }
    }

    fn to_record(&self, raw: serde_json::Value) -> Result<Record, ResolveError> {
        let paper: S2Paper = self.client.decode(&raw)?;
        let mut record = paper_to_record(paper);
        let source_id = record
            .identifiers
            .extra
            .get("semantic_scholar_id")
            .cloned()
            .unwrap_or_default();
        record.source_metadata = Some(self.client.metadata(source_id, Some(raw)));
        Ok(record)
    }
}

impl std::fmt::Debug for SemanticScholarResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticScholarResolver")
            .field("client", &self.client)
            .finish()
    }
}

#[async_trait]
impl PaperSource for SemanticScholarResolver {
    fn client(&self) -> &SourceClient {
        &self.client
    }

    async fn search_by_doi(&self, doi: &Doi) -> Result<Vec<Record>, ResolveError> {
        self.paper(&format!("DOI:{}", doi.value())).await
    }

    async fn search_by_arxiv(&self, arxiv: &ArxivId) -> Result<Vec<Record>, ResolveError> {
        self.paper(&format!("arXiv:{}", arxiv.value())).await
    }

    async fn search_by_pmid(&self, pmid: &str) -> Result<Vec<Record>, ResolveError> {
        self.paper(&format!("PMID:{pmid}")).await
    }

    #[instrument(skip(self))]
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError> {
        let url = self.client.url(&format!(
            "paper/search?query={}&limit={TITLE_SEARCH_LIMIT}&fields={PAPER_FIELDS}",
            urlencoding::encode(title)
        ));
        debug!(api_url = %url, "Searching Semantic Scholar by title");

        let Some(response) = self
            .client
            .get_json::<SearchResponse, _>(|http| self.get(http, &url))
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut records = response
            .data
            .into_iter()
            .map(|paper| self.to_record(paper))
            .collect::<Result<Vec<_>, _>>()?;
        rank_title_matches(title, &mut records);
        Ok(records)
    }
}

#[async_trait]
impl Resolver for SemanticScholarResolver {
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

    /// Accepts a bare Semantic Scholar paper id or any prefixed id the API knows.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>, ResolveError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ResolveError::validation(self.source(), id, "paper id is empty"));
        }
        Ok(self.paper(id).await?.into_iter().next())
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

fn paper_to_record(paper: S2Paper) -> Record {
    let mut record = Record::paper(
        paper
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
    );

    record.authors = paper
        .authors
        .into_iter()
        .map(|author| Author::new(author.name.unwrap_or_else(|| "Unknown".to_string())))
        .collect();
    record.publication_date = paper.publication_date;
    record.year = paper.year.or_else(|| {
        record
            .publication_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())
    });
    record.abstract_text = paper.abstract_text;
    record.journal = paper.venue.filter(|venue| !venue.trim().is_empty());
    record.citation_count = paper.citation_count;
    record.reference_count = paper.reference_count;
    record.url = paper.url;
    record.pdf_url = paper.open_access_pdf.and_then(|pdf| pdf.url);
    record.fields_of_study = paper.fields_of_study.unwrap_or_default();

    let ids = paper.external_ids.unwrap_or_default();
    record.identifiers.doi = ids.doi;
    record.identifiers.arxiv_id = ids.arxiv;
    record.identifiers.pmid = ids.pubmed;
    record.identifiers.pmcid = ids.pubmed_central;
    if let Some(paper_id) = paper.paper_id {
        record.identifiers.insert_extra("semantic_scholar_id", paper_id);
    }
    record
}
