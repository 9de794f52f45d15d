//! Google Books resolver.
//!
//! Free to use without a key on a shared quota; a `key` query parameter raises
//! it. Volume search doubles as the ISBN lookup through the `isbn:` keyword.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::detection::InputType;
use crate::identifier::Isbn;
use crate::normalization::extract_year;
use crate::record::{Author, Record, SourceName};
use crate::user_agent::default_user_agent;

use super::book::{BookSource, assign_isbn, resolve_book};
use super::{
    MAX_SUBJECTS, RateLimitConfig, ResolutionResult, ResolveError, Resolver, ResolverConfig,
    SourceClient, SourceProfile, TITLE_SEARCH_LIMIT, rank_title_matches,
};

const PROFILE: SourceProfile = SourceProfile {
    source: SourceName::GoogleBooks,
    base_url: "https://www.googleapis.com/books/v1",
    rate_limit: RateLimitConfig::per_second(1.0).with_burst(2),
    input_types: &[InputType::Isbn10, InputType::Isbn13, InputType::Title],
    priority: 50,
    base_reliability: 0.85,
};

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Volume {
    id: Option<String>,
    #[serde(rename = "volumeInfo", default)]
    info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    published_date: Option<String>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
    #[serde(default)]
    categories: Vec<String>,
    publisher: Option<String>,
    page_count: Option<u32>,
    description: Option<String>,
    language: Option<String>,
    canonical_volume_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct ImageLinks {
    large: Option<String>,
    medium: Option<String>,
    thumbnail: Option<String>,
}

/// Resolves ISBNs and titles through the Google Books volumes API.
pub struct GoogleBooksResolver {
    client: SourceClient,
}

impl GoogleBooksResolver {
    /// Creates a resolver. `config.api_key` is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the HTTP client cannot be built.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let client = SourceClient::new(PROFILE, config, default_user_agent())?;
        Ok(Self { client })
    }

    /// Builds a URL, appending `key` when configured.
    fn url(&self, path_and_query: &str) -> String {
        let mut url = self.client.url(path_and_query);
        if let Some(key) = self.client.api_key() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str("key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    async fn volumes(&self, url: &str) -> Result<Vec<Record>, ResolveError> {
        let Some(response) = self
            .client
            .get_json::<VolumesResponse, _>(|http| http.get(url))
            .await?
        else {
            return Ok(Vec::new());
        };
        response
            .items
            .into_iter()
            .map(|item| self.to_record(item))
            .collect()
    }

    fn to_record(&self, raw: serde_json::Value) -> Result<Record, ResolveError> {
        let volume: Volume = self.client.decode(&raw)?;
        let source_id = volume.id.clone().unwrap_or_default();
        let mut record = volume_to_record(volume);
        record.source_metadata = Some(self.client.metadata(source_id, Some(raw)));
        Ok(record)
    }
}

impl std::fmt::Debug for GoogleBooksResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleBooksResolver")
            .field("client", &self.client)
            .finish()
    }
}

#[async_trait]
impl BookSource for GoogleBooksResolver {
    fn client(&self) -> &SourceClient {
        &self.client
    }

    #[instrument(skip(self, isbn), fields(isbn = %isbn.value()))]
    async fn search_by_isbn(&self, isbn: &Isbn) -> Result<Vec<Record>, ResolveError> {
        let url = self.url(&format!(
            "volumes?q=isbn:{}&maxResults=1",
            isbn.to_isbn13().value()
        ));
        debug!("Calling Google Books API");
        self.volumes(&url).await
    }

    #[instrument(skip(self))]
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError> {
        let url = self.url(&format!(
            "volumes?q=intitle:{}&maxResults={TITLE_SEARCH_LIMIT}&printType=books",
            urlencoding::encode(title)
        ));
        debug!("Searching Google Books by title");
        let mut records = self.volumes(&url).await?;
        rank_title_matches(title, &mut records);
        Ok(records)
    }
}

#[async_trait]
impl Resolver for GoogleBooksResolver {
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
        resolve_book(self, query, input_type).await
    }

    /// Google Books ids are volume ids such as `zyTCAlFPjgYC`.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>, ResolveError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ResolveError::validation(self.source(), id, "volume id is empty"));
        }
        let url = self.url(&format!("volumes/{}", urlencoding::encode(id)));
        match self
            .client
            .get_json::<serde_json::Value, _>(|http| http.get(&url))
            .await?
        {
            Some(raw) => self.to_record(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

fn volume_to_record(volume: Volume) -> Record {
    let info = volume.info;
    let mut record = Record::book(
        info.title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
    );

    record.authors = info.authors.into_iter().map(Author::new).collect();
    record.year = info.published_date.as_deref().and_then(extract_year);
    record.publication_date = info.published_date;
    for id in &info.industry_identifiers {
        if matches!(id.kind.as_str(), "ISBN_10" | "ISBN_13") {
            assign_isbn(&mut record.identifiers, &id.identifier);
        }
    }
    if let Some(id) = volume.id {
        record.identifiers.insert_extra("google_books_id", id);
    }

    record.cover_image_url = info
        .image_links
        .and_then(|links| links.large.or(links.medium).or(links.thumbnail));
    record.subjects = info.categories.into_iter().take(MAX_SUBJECTS).collect();
    record.publisher = info.publisher;
    record.pages = info.page_count.filter(|pages| *pages > 0);
    record.abstract_text = info.description;
    record.language = info.language;
    record.url = info.canonical_volume_link;
    record
}
