//! Explicit release of pooled network resources.
//!
//! Resolvers keep an HTTP connection pool open between calls. [`Close`] releases
//! it, and [`with_resource`] guarantees the release on every exit path.

use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::debug;

/// A value holding resources that should be released explicitly.
#[async_trait]
pub trait Close: Send + Sync {
    /// Releases held resources. Must be safe to call more than once.
    async fn close(&self);
}

/// Runs `f` with `resource`, then closes the resource.
///
/// The close runs whether `f` returns normally, returns an error value or
/// panics. A panic is resumed after closing.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use consearch_core::lifecycle::with_resource;
/// use consearch_core::resolver::ResolverRegistry;
///
/// # async fn example() {
/// let registry = Arc::new(ResolverRegistry::new());
/// let count = with_resource(registry, |registry| async move {
///     registry.book_resolvers().len()
/// })
/// .await;
/// assert_eq!(count, 0);
/// # }
/// ```
pub async fn with_resource<R, F, Fut, T>(resource: Arc<R>, f: F) -> T
where
    R: Close + ?Sized,
    F: FnOnce(Arc<R>) -> Fut,
    Fut: Future<Output = T>,
{
    let outcome = AssertUnwindSafe(f(Arc::clone(&resource)))
        .catch_unwind()
        .await;
    resource.close().await;
    match outcome {
        Ok(value) => value,
        Err(panic) => {
            debug!("resource closed after panic, resuming unwind");
            resume_unwind(panic)
        }
    }
}
