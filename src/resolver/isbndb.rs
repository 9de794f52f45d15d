//! ISBNdb book resolver.
//!
//! ISBNdb is the most complete commercial ISBN catalog and the first book
//! source tried. It requires an API key, sent verbatim in `Authorization`.
//! Higher subscription tiers live on other hosts (`api.premium.isbndb.com`,
//! ...); point `base_url` and `rate_limit` at them to use the larger quota.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
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
    source: SourceName::Isbndb,
    base_url: "https://api2.isbndb.com",
    rate_limit: RateLimitConfig::per_second(1.0),
    input_types: &[InputType::Isbn10, InputType::Isbn13, InputType::Title],
    priority: 10,
    base_reliability: 0.90,
};

#[derive(Debug, Deserialize)]
struct BookResponse {
    book: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BooksResponse {
    #[serde(default)]
    books: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct IsbndbBook {
    title: Option<String>,
    title_long: Option<String>,
    #[serde(default)]
    authors: Vec<Option<String>>,
    publish_date: Option<Scalar>,
    isbn: Option<String>,
    isbn13: Option<String>,
    publisher: Option<String>,
    pages: Option<Scalar>,
    subjects: Option<Subjects>,
    image: Option<String>,
    synopsis: Option<String>,
    edition: Option<Scalar>,
    language: Option<String>,
}

/// A field ISBNdb sends either as a number or as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(u64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(text) => text,
        }
    }

    fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Number(n) => u32::try_from(*n).ok(),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Subjects come as a list or as one comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Subjects {
    List(Vec<String>),
    Joined(String),
}

impl Subjects {
    fn into_vec(self) -> Vec<String> {
        let all = match self {
            Self::List(list) => list,
            Self::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        all.into_iter()
            .map(|subject| subject.trim().to_string())
            .filter(|subject| !subject.is_empty())
            .take(MAX_SUBJECTS)
            .collect()
    }
}

/// Resolves ISBNs and titles through the ISBNdb v2 API.
pub struct IsbndbResolver {
    client: SourceClient,
}

impl IsbndbResolver {
    /// Creates a resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Validation`] when `config.api_key` is missing or
    /// blank, and [`ResolveError`] if the HTTP client cannot be built.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        if config.api_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
            return Err(ResolveError::missing_setting(
                SourceName::Isbndb,
                "isbndb_api_key",
                "CONSEARCH_ISBNDB_API_KEY",
            ));
        }
        let client = SourceClient::new(PROFILE, config, default_user_agent())?;
        Ok(Self { client })
    }

    fn authorized(&self, http: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
        http.get(url)
            .header(AUTHORIZATION, self.client.api_key().unwrap_or_default())
    }

    fn to_record(&self, raw: serde_json::Value) -> Result<Record, ResolveError> {
        let book: IsbndbBook = self.client.decode(&raw)?;
        let mut record = book_to_record(book);
        let source_id = record
            .identifiers
            .primary_isbn()
            .unwrap_or_default()
            .to_string();
        record.source_metadata = Some(self.client.metadata(source_id, Some(raw)));
        Ok(record)
    }
}

impl std::fmt::Debug for IsbndbResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsbndbResolver")
            .field("client", &self.client)
            .finish()
    }
}

#[async_trait]
impl BookSource for IsbndbResolver {
    fn client(&self) -> &SourceClient {
        &self.client
    }

    #[instrument(skip(self, isbn), fields(isbn = %isbn.value()))]
    async fn search_by_isbn(&self, isbn: &Isbn) -> Result<Vec<Record>, ResolveError> {
        let url = self
            .client
            .url(&format!("book/{}", isbn.to_isbn13().value()));
        debug!(api_url = %url, "Calling ISBNdb API");

        let response: Option<BookResponse> = self
            .client
            .get_json(|http| self.authorized(http, &url))
            .await?;
        match response.and_then(|response| response.book) {
            Some(book) if book.is_object() => Ok(vec![self.to_record(book)?]),
            _ => Ok(Vec::new()),
        }
    }

    #[instrument(skip(self))]
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError> {
        let url = self.client.url(&format!(
            "books/{}?page=1&pageSize={TITLE_SEARCH_LIMIT}",
            urlencoding::encode(title)
        ));
        debug!(api_url = %url, "Searching ISBNdb by title");

        let Some(response) = self
            .client
            .get_json::<BooksResponse, _>(|http| self.authorized(http, &url))
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut records = response
            .books
            .into_iter()
            .map(|book| self.to_record(book))
            .collect::<Result<Vec<_>, _>>()?;
        rank_title_matches(title, &mut records);
        Ok(records)
    }
}

#[async_trait]
impl Resolver for IsbndbResolver {
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

    /// ISBNdb ids are ISBNs.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<Record>, ResolveError> {
        let isbn = Isbn::parse(id)
            .map_err(|error| ResolveError::invalid_identifier(self.source(), id, &error))?;
        Ok(self.search_by_isbn(&isbn).await?.into_iter().next())
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

fn book_to_record(book: IsbndbBook) -> Record {
    let title = book
        .title
        .or(book.title_long)
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let mut record = Record::book(title);

    record.authors = book
        .authors
        .into_iter()
        .flatten()
        .filter(|name| !name.trim().is_empty())
        .map(Author::new)
        .collect();
    if let Some(date) = book.publish_date.map(Scalar::into_text) {
        record.year = extract_year(&date);
        record.publication_date = Some(date).filter(|date| !date.trim().is_empty());
    }
    if let Some(isbn13) = book.isbn13.as_deref() {
        assign_isbn(&mut record.identifiers, isbn13);
    }
    if let Some(isbn) = book.isbn.as_deref() {
        assign_isbn(&mut record.identifiers, isbn);
    }

    record.publisher = book.publisher;
    record.pages = book.pages.as_ref().and_then(Scalar::as_u32).filter(|pages| *pages > 0);
    record.subjects = book.subjects.map(Subjects::into_vec).unwrap_or_default();
    record.cover_image_url = book.image;
    record.abstract_text = book.synopsis;
    record.edition = book.edition.map(Scalar::into_text);
    record.language = book.language;
    record
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::ResolutionStatus;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn book_json() -> serde_json::Value {
        serde_json::json!({
            "title": "Refactoring",
            "title_long": "Refactoring: Improving the Design of Existing Code",
            "authors": ["Martin Fowler", ""],
            "publish_date": "2018-11-20",
            "isbn": "0134757599",
            "isbn13": "9780134757599",
            "publisher": "Addison-Wesley",
            "pages": 448,
            "subjects": "Computers, Software Development, ",
            "image": "https://images.isbndb.com/covers/75/99/9780134757599.jpg",
            "synopsis": "Improving existing code.",
            "edition": 2,
            "language": "en"
        })
    }

    fn resolver_for(base_url: &str) -> IsbndbResolver {
        IsbndbResolver::new(ResolverConfig::with_api_key("isbndb-key").base_url(base_url)).unwrap()
    }

    #[test]
    fn test_isbndb_requires_api_key() {
        let err = IsbndbResolver::new(ResolverConfig::default()).unwrap_err();
        assert!(err.to_string().contains("isbndb_api_key"), "{err}");
        assert!(IsbndbResolver::new(ResolverConfig::with_api_key("  ")).is_err());
    }

    #[test]
    fn test_book_to_record_full() {
        let book: IsbndbBook = serde_json::from_value(book_json()).unwrap();
        let record = book_to_record(book);

        assert_eq!(record.title, "Refactoring");
        assert_eq!(record.authors.len(), 1);
        assert_eq!(record.year, Some(2018));
        assert_eq!(record.identifiers.isbn_13.as_deref(), Some("9780134757599"));
        assert_eq!(record.identifiers.isbn_10.as_deref(), Some("0134757599"));
        assert_eq!(record.pages, Some(448));
        assert_eq!(record.subjects, vec!["Computers", "Software Development"]);
        assert_eq!(record.edition.as_deref(), Some("2"));
        assert_eq!(record.abstract_text.as_deref(), Some("Improving existing code."));
    }

    #[test]
    fn test_book_to_record_subject_list_is_capped() {
        let subjects: Vec<String> = (0..15).map(|i| format!("Subject {i}")).collect();
        let book: IsbndbBook = serde_json::from_value(serde_json::json!({
            "subjects": subjects,
            "pages": "0"
        }))
        .unwrap();
        let record = book_to_record(book);
        assert_eq!(record.title, "Unknown");
        assert_eq!(record.subjects.len(), MAX_SUBJECTS);
        assert!(record.pages.is_none());
    }

    #[tokio::test]
    async fn test_isbndb_isbn10_lookup_uses_isbn13_and_key() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/book/9780134757599"))
            .and(header("Authorization", "isbndb-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"book": book_json()})))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("0-13-475759-9", InputType::Isbn10).await;

        assert_eq!(result.status, ResolutionStatus::Success, "{:?}", result.error_message);
        let meta = result.records[0].source_metadata.as_ref().unwrap();
        assert_eq!(meta.source, SourceName::Isbndb);
        assert_eq!(meta.source_id, "9780134757599");
    }

    #[tokio::test]
    async fn test_isbndb_unknown_isbn_is_not_found() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("9780134757599", InputType::Isbn13).await;
        assert_eq!(result.status, ResolutionStatus::NotFound);
    }

    #[tokio::test]
    async fn test_isbndb_title_search() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/books/Refactoring"))
            .and(query_param("pageSize", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "total": 2,
                "books": [
                    {"title": "Refactoring Databases", "isbn13": "9780321293534"},
                    book_json()
                ]
            })))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("Refactoring", InputType::Title).await;

        assert!(result.is_success());
        assert_eq!(result.records[0].title, "Refactoring");
        assert_eq!(result.records.len(), 2);
    }

    #[tokio::test]
    async fn test_isbndb_unauthorized_is_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let resolver = resolver_for(&mock_server.uri());
        let result = resolver.resolve("9780134757599", InputType::Isbn13).await;
        assert_eq!(result.status, ResolutionStatus::Error);
        assert!(resolver.reliability_score() < 0.90);
    }
}
