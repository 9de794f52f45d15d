//! Consearch Core Library
//!
//! Resolves book and paper identifiers (ISBN, DOI, arXiv, PubMed) and free-text
//! titles or citations against external metadata providers, falling back from
//! one provider to the next until a record is found.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`identifier`] - ISBN, DOI and arXiv value objects with validation
//! - [`detection`] - Classification of raw queries into input types
//! - [`record`] - Normalized bibliographic records returned by every provider
//! - [`normalization`] - Text normalization and title similarity
//! - [`resolver`] - Provider adapters, rate limiting, reliability and fallback chains
//! - [`service`] - Detection plus routing to the book or paper chain
//! - [`config`] - Credentials and HTTP policy for building the registry
//! - [`lifecycle`] - Scoped cleanup of pooled resources

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod detection;
pub mod identifier;
pub mod lifecycle;
pub mod normalization;
pub mod record;
pub mod resolver;
pub mod service;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{DEFAULT_FUZZY_MATCH_THRESHOLD, Settings};
pub use detection::{DetectionResult, Domain, IdentifierDetector, InputType};
pub use identifier::{
    ArxivFormat, ArxivId, Doi, Identifier, IdentifierError, IdentifierKind, Isbn, IsbnFormat,
    isbn_10_to_13, isbn_13_to_10,
};
pub use lifecycle::{Close, with_resource};
pub use normalization::{extract_year, normalize_author_name, normalize_title, title_similarity};
pub use record::{Author, Identifiers, Record, SourceMetadata, SourceName, WorkKind};
pub use resolver::{
    AggregatedResult, ChainResolver, CrossrefResolver, FallbackConfig, GoogleBooksResolver,
    IsbndbResolver, OpenLibraryResolver, RateLimitConfig, RateLimiter, ReliabilityTracker,
    ReliabilityWeights, ResolutionResult, ResolutionStatus, ResolveError, Resolver,
    ResolverConfig, ResolverRegistry, SemanticScholarResolver,
};
pub use service::{ResolutionService, ResolveReport};
