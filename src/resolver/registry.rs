//! Explicitly owned set of book and paper resolvers.
//!
//! The [`ResolverRegistry`] is built once (usually via
//! [`ResolverRegistry::from_settings`]) and hands out [`ChainResolver`]s over its
//! book or paper resolvers. There is no global registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::lifecycle::Close;
use crate::record::WorkKind;

use super::{
    ChainResolver, CrossrefResolver, FallbackConfig, GoogleBooksResolver, IsbndbResolver,
    OpenLibraryResolver, ResolveError, Resolver, SemanticScholarResolver,
};

/// Book and paper resolvers, each list in registration order.
#[derive(Default)]
pub struct ResolverRegistry {
    book_resolvers: Vec<Arc<dyn Resolver>>,
    paper_resolvers: Vec<Arc<dyn Resolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |list: &[Arc<dyn Resolver>]| list.iter().map(|r| r.source()).collect::<Vec<_>>();
        f.debug_struct("ResolverRegistry")
            .field("book_resolvers", &names(&self.book_resolvers))
            .field("paper_resolvers", &names(&self.paper_resolvers))
            .finish()
    }
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every resolver the settings allow.
    ///
    /// ISBNdb and Semantic Scholar are registered only when their API keys are
    /// set. Google Books, Open Library and Crossref are always registered. A
    /// resolver that fails to construct is logged and skipped.
    #[must_use]
    #[tracing::instrument(skip_all)]
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();

        if settings.isbndb_api_key.is_some() {
            registry.register_built(
                WorkKind::Book,
                "isbndb",
                IsbndbResolver::new(settings.resolver_config(settings.isbndb_api_key.as_deref())),
            );
        } else {
            debug!(resolver = "isbndb", "no API key configured, not registering");
        }
        registry.register_built(
            WorkKind::Book,
            "google_books",
            GoogleBooksResolver::new(
                settings.resolver_config(settings.google_books_api_key.as_deref()),
            ),
        );
        registry.register_built(
            WorkKind::Book,
            "open_library",
            OpenLibraryResolver::new(settings.resolver_config(None)),
        );

        registry.register_built(
            WorkKind::Paper,
            "crossref",
            CrossrefResolver::new(settings.resolver_config(settings.crossref_email.as_deref())),
        );
        if settings.semantic_scholar_api_key.is_some() {
            registry.register_built(
                WorkKind::Paper,
                "semantic_scholar",
                SemanticScholarResolver::new(
                    settings.resolver_config(settings.semantic_scholar_api_key.as_deref()),
                ),
            );
        } else {
            debug!(resolver = "semantic_scholar", "no API key configured, not registering");
        }

        info!(
            books = registry.book_resolvers.len(),
            papers = registry.paper_resolvers.len(),
            "resolver registry ready"
        );
        registry
    }

    fn register_built<R>(&mut self, kind: WorkKind, name: &str, built: Result<R, ResolveError>)
    where
        R: Resolver + 'static,
    {
        match built {
            Ok(resolver) => self.register(kind, Arc::new(resolver)),
            Err(error) => warn!(resolver = name, error = %error, "skipping resolver"),
        }
    }

    /// Registers a resolver under `kind`.
    pub fn register(&mut self, kind: WorkKind, resolver: Arc<dyn Resolver>) {
        info!(
            source = %resolver.source(),
            kind = %kind,
            priority = resolver.priority(),
            "registering resolver"
        );
        match kind {
            WorkKind::Book => self.book_resolvers.push(resolver),
            WorkKind::Paper => self.paper_resolvers.push(resolver),
        }
    }

    /// Registers a book resolver.
    pub fn register_book_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.register(WorkKind::Book, resolver);
    }

    /// Registers a paper resolver.
    pub fn register_paper_resolver(&mut self, resolver: Arc<dyn Resolver>) {
        self.register(WorkKind::Paper, resolver);
    }

    #[must_use]
    pub fn book_resolvers(&self) -> &[Arc<dyn Resolver>] {
        &self.book_resolvers
    }

    #[must_use]
    pub fn paper_resolvers(&self) -> &[Arc<dyn Resolver>] {
        &self.paper_resolvers
    }

    /// Resolvers registered under `kind`.
    #[must_use]
    pub fn resolvers(&self, kind: WorkKind) -> &[Arc<dyn Resolver>] {
        match kind {
            WorkKind::Book => &self.book_resolvers,
            WorkKind::Paper => &self.paper_resolvers,
        }
    }

    /// Returns true if no resolvers are registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.book_resolvers.is_empty() && self.paper_resolvers.is_empty()
    }

    /// A chain over the resolvers registered under `kind`.
    #[must_use]
    pub fn chain(&self, kind: WorkKind, config: FallbackConfig) -> ChainResolver {
        ChainResolver::new(self.resolvers(kind).to_vec(), config)
    }

    /// A chain over the book resolvers.
    #[must_use]
    pub fn book_chain(&self, config: FallbackConfig) -> ChainResolver {
        self.chain(WorkKind::Book, config)
    }

    /// A chain over the paper resolvers.
    #[must_use]
    pub fn paper_chain(&self, config: FallbackConfig) -> ChainResolver {
        self.chain(WorkKind::Paper, config)
    }

    /// Closes every registered resolver's connection pool.
    pub async fn close_all(&self) {
        for resolver in self.book_resolvers.iter().chain(&self.paper_resolvers) {
            Resolver::close(resolver.as_ref()).await;
        }
        debug!("closed all resolvers");
    }
}

#[async_trait]
impl Close for ResolverRegistry {
    async fn close(&self) {
        self.close_all().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::SourceName;

    fn sources(list: &[Arc<dyn Resolver>]) -> Vec<SourceName> {
        list.iter().map(|r| r.source()).collect()
    }

    #[test]
    fn test_registry_from_default_settings() {
        let registry = ResolverRegistry::from_settings(&Settings::default());
        assert_eq!(
            sources(registry.book_resolvers()),
            vec![SourceName::GoogleBooks, SourceName::OpenLibrary]
        );
        assert_eq!(sources(registry.paper_resolvers()), vec![SourceName::Crossref]);
    }

    #[test]
    fn test_registry_from_settings_with_keys() {
        let settings = Settings {
            isbndb_api_key: Some("isbndb".to_string()),
            semantic_scholar_api_key: Some("s2".to_string()),
            crossref_email: Some("me@example.org".to_string()),
            ..Settings::default()
        };
        let registry = ResolverRegistry::from_settings(&settings);
        assert_eq!(
            sources(registry.book_resolvers()),
            vec![SourceName::Isbndb, SourceName::GoogleBooks, SourceName::OpenLibrary]
        );
        assert_eq!(
            sources(registry.paper_resolvers()),
            vec![SourceName::Crossref, SourceName::SemanticScholar]
        );
    }

    #[test]
    fn test_registry_skips_resolver_that_fails_to_build() {
        let settings = Settings {
            isbndb_api_key: Some("   ".to_string()),
            crossref_email: Some("bad\nemail".to_string()),
            ..Settings::default()
        };
        let registry = ResolverRegistry::from_settings(&settings);
        assert!(!sources(registry.book_resolvers()).contains(&SourceName::Isbndb));
        assert!(registry.paper_resolvers().is_empty());
    }

    #[test]
    fn test_registry_chain_orders_by_priority() {
        let settings = Settings {
            isbndb_api_key: Some("key".to_string()),
            ..Settings::default()
        };
        let registry = ResolverRegistry::from_settings(&settings);
        let chain = registry.book_chain(FallbackConfig::default());
        let order: Vec<u32> = chain.resolvers().iter().map(|r| r.priority()).collect();
        assert_eq!(order, vec![10, 50, 100]);
    }

    #[tokio::test]
    async fn test_registry_close_all_is_idempotent() {
        let registry = ResolverRegistry::from_settings(&Settings::default());
        registry.close_all().await;
        Close::close(&registry).await;
        assert!(!registry.is_empty());
    }
}
