//! Open Library book resolver.
//!
//! Keyless and community maintained, so it is the last book source tried.
//! Edition records are often thin; the parent work record is fetched to fill in
//! a missing description or subject list.

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
    source: SourceName::OpenLibrary,
    base_url: "https://openlibrary.org",
    rate_limit: RateLimitConfig::per_second(1.0),
    input_types: &[InputType::Isbn10, InputType::Isbn13, InputType::Title],
    priority: 100,
    base_reliability: 0.75,
};

const COVERS_URL: &str = "https://covers.openlibrary.org/b/id";

#[derive(Debug, Default, Deserialize)]
struct Edition {
    key: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<KeyRef>,
    #[serde(default)]
    works: Vec<KeyRef>,
    publish_date: Option<String>,
    #[serde(default)]
    isbn_10: Vec<String>,
    #[serde(default)]
    isbn_13: Vec<String>,
    #[serde(default)]
    covers: Vec<i64>,
    #[serde(default)]
    publishers: Vec<String>,
    number_of_pages: Option<u32>,
    #[serde(default)]
    subjects: Vec<String>,
    description: Option<Text>,
    #[serde(default)]
    languages: Vec<KeyRef>,
}

/// The parts of a work record merged into a thin edition.
#[derive(Debug, Default, Deserialize)]
struct Work {
    description: Option<Text>,
    #[serde(default)]
    subjects: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KeyRef {
    key: Option<String>,
}

/// Descriptions are either plain strings or `{"type": "/type/text", "value": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Text {
    Plain(String),
    Typed { value: String },
}

impl Text {
    fn into_string(self) -> String {
        match self {
            Self::Plain(text) | Self::Typed { value: text } => text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    key: Option<String>,
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    publisher: Vec<String>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    language: Vec<String>,
}

/// Resolves ISBNs and titles through the Open Library JSON API.
pub struct OpenLibraryResolver {
    client: SourceClient,
}

impl OpenLibraryResolver {
    /// Creates a resolver. No API key is needed.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the HTTP client cannot be built.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let client = SourceClient::new(PROFILE, config, default_user_agent())?;
        Ok(Self { client })
    }

    /// Fetches an edition (or any keyed record) as raw JSON.
    async fn fetch_key(&self, key: &str) -> Result<Option<serde_json::Value>, ResolveError> {
        let url = self.client.url(&format!("{key}.json"));
        debug!(api_url = %url, "Calling Open Library API");
        self.client.get_json(|http| http.get(&url)).await
    }

    /// Fetches the parent work. Failures only cost the enrichment.
    async fn fetch_work(&self, key: &str) -> Option<Work> {
        if !key.starts_with("/works/") {
            return None;
        }
        match self.fetch_key(key).await {
            Ok(Some(raw)) => self.client.decode(&raw).ok(),
            Ok(None) => None,
            Err(error) => {
                debug!(work = key, error = %error, "work lookup failed, keeping edition data");
                None
            }
        }
    }

    async fn edition_record(&self, raw: serde_json::Value) -> Result<Record, ResolveError> {
        let mut edition: Edition = self.client.decode(&raw)?;
        let work_key = edition.works.first().and_then(|work| work.key.clone());
        if let Some(key) = work_key
            && (edition.description.is_none() || edition.subjects.is_empty())
            && let Some(work) = self.fetch_work(&key).await
        {
            merge_work(&mut edition, work);
        }

        let source_id = edition.key.clone().unwrap_or_default();
        let mut record = edition_to_record(edition);
        record.source_metadata = Some(self.client.metadata(source_id, Some(raw)));
        Ok(record)
    }

    fn search_record(&self, raw: serde_json::Value) -> Result<Record, ResolveError> {
        let doc: SearchDoc = self.client.decode(&raw)?;
        let source_id = doc.key.clone().unwrap_or_default();
        let mut record = doc_to_record(doc);
        record.source_metadata = Some(self.client.metadata(source_id, Some(raw)));
        Ok(record)
    }
}

impl std::fmt::Debug for OpenLibraryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenLibraryResolver")
            .field("client", &self.client)
            .finish()
    }
}

#[async_trait]
impl BookSource for OpenLibraryResolver {
    fn client(&self) -> &SourceClient {
        &self.client
    }

    #[instrument(skip(self, isbn), fields(isbn = %isbn.value()))]
    async fn search_by_isbn(&self, isbn: &Isbn) -> Result<Vec<Record>, ResolveError> {
        let isbn13 = isbn.to_isbn13();
        let Some(raw) = self.fetch_key(&format!("/isbn/{}", isbn13.value())).await? else {
            return Ok(Vec::new());
        };

        let mut record = self.edition_record(raw).await?;
        let (isbn10, isbn13) = isbn.both_forms();
        record.identifiers.isbn_13.get_or_insert(isbn13);
        if let Some(isbn10) = isbn10 {
            record.identifiers.isbn_10.get_or_insert(isbn10);
        }
        Ok(vec![record])
    }

    #[instrument(skip(self))]
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError> {
        let url = self.client.url(&format!(
            "search.json?title={}&limit={TITLE_SEARCH_LIMIT}",
            urlencoding::encode(title)
        ));
        debug!(api_url = %url, "Searching Open Library by title");

        let Some(response) = self
            .client
            .get_json::<SearchResponse, _>(|http| http.get(&url))
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut records = response
            .docs
            .into_iter()
            .take(TITLE_SEARCH_LIMIT)
            .map(|doc| self.search_record(doc))
            .collect::<Result<Vec<_>, _>>()?;
        rank_title_matches(title, &mut records);
        Ok(records)
    }
}

#[async_trait]
impl Resolver for OpenLibraryResolver {
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

    /// Accepts full keys (`/books/OL7353617M`) or bare edition and work ids.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>, ResolveError> {
        let key = record_key(id.trim())
            .ok_or_else(|| ResolveError::validation(self.source(), id, "not an Open Library key"))?;
        match self.fetch_key(&key).await? {
            Some(raw) => self.edition_record(raw).await.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

/// Expands bare `OL..M` / `OL..W` ids into request keys.
fn record_key(id: &str) -> Option<String> {
    if id.starts_with("/books/") || id.starts_with("/works/") {
        return Some(id.to_string());
    }
    let body = id.strip_prefix("OL")?;
    let is_id = |digits: &str| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
    if let Some(digits) = body.strip_suffix('M')
        && is_id(digits)
    {
        return Some(format!("/books/{id}"));
    }
    body.strip_suffix('W')
        .filter(|digits| is_id(digits))
        .map(|_| format!("/works/{id}"))
}

fn merge_work(edition: &mut Edition, work: Work) {
    if edition.description.is_none() {
        edition.description = work.description;
    }
    if edition.subjects.is_empty() {
        edition.subjects = work.subjects;
    }
}

fn edition_to_record(edition: Edition) -> Record {
    let mut record = Record::book(
        edition
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
    );

    record.authors = edition
        .authors
        .into_iter()
        .filter_map(|author| author.key)
        .map(|key| Author::new(key.trim_start_matches("/authors/")))
        .collect();
    record.year = edition.publish_date.as_deref().and_then(extract_year);
    record.publication_date = edition.publish_date;
    for isbn in edition.isbn_13.iter().chain(&edition.isbn_10) {
        assign_isbn(&mut record.identifiers, isbn);
    }
    if let Some(key) = edition.key {
        let id = key.rsplit('/').next().unwrap_or(&key).to_string();
        record.identifiers.insert_extra("openlibrary_id", id);
        record.url = Some(format!("https://openlibrary.org{key}"));
    }

    record.cover_image_url = edition
        .covers
        .into_iter()
        .find(|id| *id > 0)
        .map(|id| format!("{COVERS_URL}/{id}-L.jpg"));
    record.publisher = edition.publishers.into_iter().next();
    record.pages = edition.number_of_pages.filter(|pages| *pages > 0);
    record.subjects = edition.subjects.into_iter().take(MAX_SUBJECTS).collect();
    record.abstract_text = edition.description.map(Text::into_string);
    record.language = edition
        .languages
        .into_iter()
        .find_map(|language| language.key)
        .map(|key| key.trim_start_matches("/languages/").to_string());
    record
}

fn doc_to_record(doc: SearchDoc) -> Record {
    let mut record = Record::book(
        doc.title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
    );

    record.authors = doc.author_name.into_iter().map(Author::new).collect();
    record.year = doc.first_publish_year;
    for isbn in &doc.isbn {
        assign_isbn(&mut record.identifiers, isbn);
        if record.identifiers.isbn_10.is_some() && record.identifiers.isbn_13.is_some() {
            break;
        }
    }
    if let Some(key) = doc.key {
        let id = key.trim_start_matches("/works/").to_string();
        record.identifiers.insert_extra("openlibrary_id", id);
        record.url = Some(format!("https://openlibrary.org{key}"));
    }
    record.publisher = doc.publisher.into_iter().next();
    record.subjects = doc.subject.into_iter().take(MAX_SUBJECTS).collect();
    record.language = doc.language.into_iter().next();
    record
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::ResolutionStatus;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn edition_json() -> serde_json::Value {
        serde_json::json!({
            "key": "/books/OL7353617M",
            "title": "Fantastic Mr. Fox",
            "authors": [{"key": "/authors/OL34184A"}],
            "works": [{"key": "/works/OL45804W"}],
            "publish_date": "October 1, 1988",
            "isbn_10": ["0140328726"],
            "isbn_13": ["9780140328721"],
            "covers": [8739161],
            "publishers": ["Puffin"],
            "number_of_pages": 96,
            "languages": [{"key": "/languages/eng"}]
        })
    }

    fn work_json() -> serde_json::Value {
        serde_json::json!({
            "key": "/works/OL45804W",
            "description": {"type": "/type/text", "value": "Mr. Fox outwits three farmers."},
            "subjects": ["Foxes", "Farmers"]
        })
    }

    fn resolver_for(base_url: &str) -> OpenLibraryResolver {
        OpenLibraryResolver::new(ResolverConfig::default().base_url(base_url)).unwrap()
    }

    #[test]
    fn test_edition_to_record_full() {
        let edition: Edition = serde_json::from_value(edition_json()).unwrap();
        let record = edition_to_record(edition);

        assert_eq!(record.title, "Fantastic Mr. Fox");
        assert_eq!(record.authors[0].name, "OL34184A");
        assert_eq!(record.year, Some(1988));
        assert_eq!(record.identifiers.isbn_13.as_deref(), Some("9780140328721"));
        assert_eq!(record.identifiers.isbn_10.as_deref(), Some("0140328726"));
        assert_eq!(
            record.identifiers.extra.get("openlibrary_id").map(String::as_str),
            Some("OL7353617M")
        );
        assert_eq!(
            record.cover_image_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/8739161-L.jpg")
        );
        assert_eq!(record.publisher.as_deref(), Some("Puffin"));
        assert_eq!(record.language.as_deref(), Some("eng"));
    }

    #[test]
    fn test_description_plain_or_typed() {
        let plain: Edition = serde_json::from_value(serde_json::json!({"description": "Plain"})).unwrap();
        assert_eq!(edition_to_record(plain).abstract_text.as_deref(), Some("Plain"));

        let typed: Edition = serde_json::from_value(serde_json::json!({
            "description": {"type": "/type/text", "value": "Typed"}
        }))
        .unwrap();
        assert_eq!(edition_to_record(typed).abstract_text.as_deref(), Some("Typed"));
    }

    #[test]
    fn test_merge_work_only_fills_gaps() {
        let mut edition: Edition = serde_json::from_value(serde_json::json!({
            "subjects": ["Own subject"]
        }))
        .unwrap();
        let work: Work = serde_json::from_value(work_json()).unwrap();
        merge_work(&mut edition, work);
        let record = edition_to_record(edition);
        assert_eq!(record.subjects, vec!["Own subject"]);
        assert_eq!(record.abstract_text.as_deref(), Some("Mr. Fox outwits three farmers."));
    }

    #[test]
    fn test_doc_to_record_splits_isbns() {
        let doc: SearchDoc = serde_json::from_value(serde_json::json!({
            "key": "/works/OL45804W",
            "title": "Fantastic Mr Fox",
            "author_name": ["Roald Dahl"],
            "isbn": ["9780140328721", "0140328726", "9780141311357"],
            "first_publish_year": 1970,
            "publisher": ["Puffin", "Knopf"]
        }))
        .unwrap();
        let record = doc_to_record(doc);
        assert_eq!(record.identifiers.isbn_13.as_deref(), Some("9780140328721"));
        assert_eq!(record.identifiers.isbn_10.as_deref(), Some("0140328726"));
        assert_eq!(record.year, Some(1970));
        assert_eq!(record.publisher.as_deref(), Some("Puffin"));
        assert_eq!(record.url.as_deref(), Some("https://openlibrary.org/works/OL45804W"));
    }

    #[test]
    fn test_record_key_expansion() {
        assert_eq!(record_key("OL7353617M").as_deref(), Some("/books/OL7353617M"));
        assert_eq!(record_key("OL45804W").as_deref(), Some("/works/OL45804W"));
        assert_eq!(record_key("/books/OL1M").as_deref(), Some("/books/OL1M"));
        assert!(record_key("OLxM").is_none());
        assert!(record_key("12345").is_none());
        assert!(record_key("").is_none());
    }

    #[tokio::test]
    async fn test_openlibrary_isbn_lookup_merges_work() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/isbn/9780140328721.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(edition_json()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/OL45804W.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(work_json()))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("0140328726", InputType::Isbn10).await;

        assert_eq!(result.status, ResolutionStatus::Success, "{:?}", result.error_message);
        let record = &result.records[0];
        assert_eq!(record.subjects, vec!["Foxes", "Farmers"]);
        assert_eq!(record.abstract_text.as_deref(), Some("Mr. Fox outwits three farmers."));
        assert_eq!(record.source_metadata.as_ref().unwrap().source_id, "/books/OL7353617M");
    }

    #[tokio::test]
    async fn test_openlibrary_work_failure_keeps_edition() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/isbn/9780140328721.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(edition_json()))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works/OL45804W.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("9780140328721", InputType::Isbn13).await;
        assert!(result.is_success());
        assert!(result.records[0].abstract_text.is_none());
    }

    #[tokio::test]
    async fn test_openlibrary_missing_isbn_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("9780140328721", InputType::Isbn13).await;
        assert_eq!(result.status, ResolutionStatus::NotFound);
    }

    #[tokio::test]
    async fn test_openlibrary_title_search() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("title", "Fantastic Mr Fox"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "numFound": 2,
                "docs": [
                    {"key": "/works/OL1W", "title": "The Fox Book"},
                    {"key": "/works/OL45804W", "title": "Fantastic Mr Fox", "isbn": ["0140328726"]}
                ]
            })))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("Fantastic Mr Fox", InputType::Title).await;
        assert!(result.is_success());
        assert_eq!(result.records[0].title, "Fantastic Mr Fox");
        assert_eq!(result.records[0].source_metadata.as_ref().unwrap().source_id, "/works/OL45804W");
    }
}
