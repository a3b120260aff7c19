use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::traits::Extractor;

/// A registered (url, extractor) pair: one monitored resource.
#[derive(Clone)]
pub struct Task {
    pub url: String,
    pub extractor: Arc<dyn Extractor>,
}

impl Task {
    pub fn new(url: impl Into<String>, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            url: url.into(),
            extractor,
        }
    }

    pub fn extractor_id(&self) -> &str {
        self.extractor.id()
    }

    /// Tasks with the same url and extractor id share one cache slot.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.url, self.extractor.id())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("url", &self.url)
            .field("extractor", &self.extractor.id())
            .finish()
    }
}

/// Cache slot identity: (url, extractor id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub url: String,
    pub extractor: String,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, extractor: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extractor: extractor.into(),
        }
    }
}

/// The full cache contents, ordered by key.
pub type CacheMap = BTreeMap<CacheKey, serde_json::Value>;

/// One row of the persisted cache.
///
/// Keys are compound, so the mapping is stored as a list of rows rather
/// than a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub extractor: String,
    pub value: serde_json::Value,
}

impl CacheEntry {
    pub fn from_map(entries: &CacheMap) -> Vec<CacheEntry> {
        entries
            .iter()
            .map(|(key, value)| CacheEntry {
                url: key.url.clone(),
                extractor: key.extractor.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Later rows win when the same key appears twice.
    pub fn into_map(rows: Vec<CacheEntry>) -> CacheMap {
        rows.into_iter()
            .map(|row| (CacheKey::new(row.url, row.extractor), row.value))
            .collect()
    }
}

/// A (url, value) result: a detected change, or a snapshot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub url: String,
    pub extractor: String,
    pub value: serde_json::Value,
}

impl ScrapeResult {
    pub fn into_pair(self) -> (String, serde_json::Value) {
        (self.url, self.value)
    }
}

/// A task whose unit of work failed this cycle.
#[derive(Debug)]
pub struct TaskFailure {
    pub url: String,
    pub extractor: String,
    pub error: AppError,
}

/// Everything one cycle produced: results plus isolated per-task failures.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub results: Vec<ScrapeResult>,
    pub failures: Vec<TaskFailure>,
}

impl CycleReport {
    /// True when there are no results and no failures.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(String, serde_json::Value)> {
        self.results
            .into_iter()
            .map(ScrapeResult::into_pair)
            .collect()
    }

    /// Collapse into a plain result, surfacing the first task failure.
    pub fn into_result(self) -> Result<Vec<ScrapeResult>, AppError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.results),
        }
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
