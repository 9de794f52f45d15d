//! Input routing shared by the book adapters.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::instrument;

use crate::detection::InputType;
use crate::identifier::{Isbn, IsbnFormat};
use crate::record::{Identifiers, Record};

use super::{ResolutionResult, ResolveError, SourceClient};

/// Search surface of a book catalog.
///
/// Implementors only talk to their API; [`resolve_book`] owns validation and
/// turns outcomes into [`ResolutionResult`]s.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Shared HTTP base of the adapter.
    fn client(&self) -> &SourceClient;

    /// Looks up one edition by ISBN.
    async fn search_by_isbn(&self, isbn: &Isbn) -> Result<Vec<Record>, ResolveError>;

    /// Full-text title search.
    async fn search_by_title(&self, title: &str) -> Result<Vec<Record>, ResolveError>;
}

/// Routes `query` to the matching `search_by_*` method of a book source.
///
/// ISBN inputs are validated before any request is made.
#[instrument(skip(source), fields(source = %source.client().source()))]
pub async fn resolve_book<S>(source: &S, query: &str, input_type: InputType) -> ResolutionResult
where
    S: BookSource + ?Sized,
{
    let started = Instant::now();
    let name = source.client().source();
    let query = query.trim();

    let outcome = match input_type {
        InputType::Isbn10 | InputType::Isbn13 => match Isbn::parse(query) {
            Ok(isbn) => source.search_by_isbn(&isbn).await,
            Err(error) => Err(ResolveError::invalid_identifier(name, query, &error)),
        },
        InputType::Title => source.search_by_title(query).await,
        other => Err(ResolveError::validation(
            name,
            query,
            format!("unsupported input type: {other}"),
        )),
    };

    ResolutionResult::from_outcome(name, outcome, started.elapsed())
}

/// Files a provider-supplied ISBN under `isbn_10` or `isbn_13`.
///
/// Valid values are stored normalized. Values failing the checksum are kept
/// as given when their length still tells the layout. Fields already set win.
pub(crate) fn assign_isbn(identifiers: &mut Identifiers, raw: &str) {
    let (format, value) = match Isbn::parse(raw) {
        Ok(isbn) => (isbn.format(), isbn.value().to_string()),
        Err(_) => {
            let compact: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
            match compact.len() {
                10 => (IsbnFormat::Isbn10, compact),
                13 => (IsbnFormat::Isbn13, compact),
                _ => return,
            }
        }
    };
    let slot = match format {
        IsbnFormat::Isbn10 => &mut identifiers.isbn_10,
        IsbnFormat::Isbn13 => &mut identifiers.isbn_13,
    };
    slot.get_or_insert(value);
}
