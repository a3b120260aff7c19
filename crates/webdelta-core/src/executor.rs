use crate::cache::CacheStore;
use crate::config::RetryPolicy;
use crate::error::AppError;
use crate::models::{ScrapeResult, Task};
use crate::traits::{CacheStorage, Fetcher};

/// Runs one task: fetch → extract → retry on absence → compare → cache.
///
/// Generic over the transport so tests can drive it without real HTTP.
#[derive(Clone)]
pub struct Executor<F: Fetcher> {
    fetcher: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> Executor<F> {
    pub fn new(fetcher: F, policy: RetryPolicy) -> Self {
        Self { fetcher, policy }
    }

    /// Produce this cycle's result for `task`.
    ///
    /// Returns `Ok(Some(..))` for a change, `Ok(None)` when the value is
    /// unchanged or every attempt came back empty. A failed fetch is
    /// returned as `Err` straight away; only empty extractions are retried.
    pub async fn execute<S: CacheStorage>(
        &self,
        task: &Task,
        cache: &CacheStore<S>,
    ) -> Result<Option<ScrapeResult>, AppError> {
        let url = task.url.as_str();
        let extractor_id = task.extractor_id();

        let text = self.fetch(url).await?;
        tracing::debug!(%url, bytes = text.len(), "Fetched");
        let mut live = task.extractor.extract(&text);

        let cached = cache.get(url, extractor_id);

        let mut remaining = self.policy.retry_limit;
        while live.is_none() && remaining > 0 {
            if self.policy.wait_between_retries {
                let delay = self.policy.retry_delay(remaining);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            tracing::debug!(
                %url,
                extractor = %extractor_id,
                attempt = self.policy.retry_limit - remaining + 1,
                "Extraction empty, retrying"
            );
            let text = self.fetch(url).await?;
            live = task.extractor.extract(&text);
            remaining -= 1;
        }

        match live {
            Some(value) if cached.as_ref() != Some(&value) => {
                if cached.is_some() {
                    tracing::info!(%url, extractor = %extractor_id, "Value CHANGED");
                } else {
                    tracing::info!(%url, extractor = %extractor_id, "First extraction");
                }
                cache.put(url, extractor_id, value.clone());
                Ok(Some(ScrapeResult {
                    url: url.to_string(),
                    extractor: extractor_id.to_string(),
                    value,
                }))
            }
            Some(_) => {
                tracing::debug!(%url, extractor = %extractor_id, "Value unchanged");
                Ok(None)
            }
            None => {
                tracing::warn!(
                    %url,
                    extractor = %extractor_id,
                    retries = self.policy.retry_limit,
                    "Extraction still empty after retries"
                );
                Ok(None)
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        match self.policy.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(url))
                .await
                .map_err(|_| AppError::Timeout(limit))?,
            None => self.fetcher.fetch(url).await,
        }
    }
}
