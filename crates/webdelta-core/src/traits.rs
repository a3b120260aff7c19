use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::CacheMap;

/// Fetches the raw text of a resource.
///
/// Implementations must not retry on their own: retrying is the
/// executor's job, and only for extractions that come back empty.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Pulls the value a task cares about out of fetched text.
///
/// Must be a pure function of its input. Returning `None` means the
/// response looked incomplete and the fetch should be retried.
pub trait Extractor: Send + Sync {
    /// Stable, caller-chosen identity; half of the cache key.
    fn id(&self) -> &str;

    fn extract(&self, text: &str) -> Option<serde_json::Value>;
}

/// An [`Extractor`] built from a closure and an explicit id.
pub struct FnExtractor<Func> {
    id: String,
    func: Func,
}

impl<Func> FnExtractor<Func>
where
    Func: Fn(&str) -> Option<serde_json::Value> + Send + Sync,
{
    pub fn new(id: impl Into<String>, func: Func) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

impl<Func> Extractor for FnExtractor<Func>
where
    Func: Fn(&str) -> Option<serde_json::Value> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn extract(&self, text: &str) -> Option<serde_json::Value> {
        (self.func)(text)
    }
}

impl<Func> fmt::Debug for FnExtractor<Func> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExtractor").field("id", &self.id).finish()
    }
}

/// Shorthand for `Arc::new(FnExtractor::new(id, func))`.
pub fn extractor_fn<Func>(id: impl Into<String>, func: Func) -> Arc<dyn Extractor>
where
    Func: Fn(&str) -> Option<serde_json::Value> + Send + Sync + 'static,
{
    Arc::new(FnExtractor::new(id, func))
}

/// Durable backing for the cache store.
///
/// The whole mapping is loaded and saved at once; there is no
/// per-entry persistence.
pub trait CacheStorage: Send + Sync + 'static {
    /// Returns `None` when nothing has been stored yet.
    fn load(&self) -> impl Future<Output = Result<Option<CacheMap>, AppError>> + Send;

    fn save(&self, entries: &CacheMap) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Removing storage that does not exist is not an error.
    fn remove(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A no-op CacheStorage for memory-only engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

impl CacheStorage for NullStorage {
    async fn load(&self) -> Result<Option<CacheMap>, AppError> {
        Ok(None)
    }

    async fn save(&self, _entries: &CacheMap) -> Result<(), AppError> {
        Ok(())
    }

    async fn remove(&self) -> Result<(), AppError> {
        Ok(())
    }
}
