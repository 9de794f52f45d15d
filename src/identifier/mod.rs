//! Identifier value objects for ISBNs, DOIs and arXiv IDs.
//!
//! Each type can only be built through `parse`, so a value in hand has always
//! passed format (and, for ISBNs, checksum) validation.
//!
//! # Example
//!
//! ```
//! use consearch_core::identifier::{Doi, Identifier, IdentifierKind, Isbn};
//!
//! let isbn = Isbn::parse("0-13-409341-0").unwrap();
//! assert_eq!(isbn.to_isbn13().value(), "9780134093413");
//!
//! let id = Identifier::from(Doi::parse("doi:10.1038/nature12373").unwrap());
//! assert_eq!(id.kind(), IdentifierKind::Doi);
//! assert_eq!(id.value(), "10.1038/nature12373");
//! ```

mod arxiv;
mod doi;
mod error;
mod isbn;

pub use arxiv::{ArxivFormat, ArxivId, LEGACY_ARCHIVES};
pub use doi::Doi;
pub use error::{IdentifierError, IdentifierKind};
pub use isbn::{Isbn, IsbnFormat, isbn_10_to_13, isbn_13_to_10};

use serde::Serialize;

/// Any of the supported identifier value objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identifier {
    /// ISBN-10 or ISBN-13.
    Isbn(Isbn),
    /// Digital Object Identifier.
    Doi(Doi),
    /// arXiv preprint identifier.
    Arxiv(ArxivId),
}

impl Identifier {
    /// Canonical string value of the wrapped identifier.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Isbn(isbn) => isbn.value(),
            Self::Doi(doi) => doi.value(),
            Self::Arxiv(arxiv) => arxiv.value(),
        }
    }

    /// Identifier family, with ISBNs reported by their concrete layout.
    #[must_use]
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Self::Isbn(isbn) => match isbn.format() {
                IsbnFormat::Isbn10 => IdentifierKind::Isbn10,
                IsbnFormat::Isbn13 => IdentifierKind::Isbn13,
            },
            Self::Doi(_) => IdentifierKind::Doi,
            Self::Arxiv(_) => IdentifierKind::Arxiv,
        }
    }
}

impl From<Isbn> for Identifier {
    fn from(value: Isbn) -> Self {
        Self::Isbn(value)
    }
}

impl From<Doi> for Identifier {
    fn from(value: Doi) -> Self {
        Self::Doi(value)
    }
}

impl From<ArxivId> for Identifier {
    fn from(value: ArxivId) -> Self {
        Self::Arxiv(value)
    }
}

/// Strips an ASCII prefix without regard to case.
pub(crate) fn strip_prefix_ignore_ascii_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}
