//! In-memory change-detection cache with optional durable backing.
//!
//! Maps `(url, extractor id)` to the last value a task successfully
//! extracted. Absent extractions never reach the cache, and entries are
//! only ever removed all at once by [`CacheStore::clear`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::AppError;
use crate::models::{CacheKey, CacheMap};
use crate::traits::CacheStorage;

pub struct CacheStore<S> {
    entries: Mutex<CacheMap>,
    storage: Option<S>,
}

impl<S: CacheStorage> CacheStore<S> {
    /// Create an empty, memory-only cache.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(CacheMap::new()),
            storage: None,
        }
    }

    /// Create an empty cache backed by `storage`. Call [`load`](Self::load)
    /// to pull in what was persisted by a previous run.
    pub fn with_storage(storage: S) -> Self {
        Self {
            entries: Mutex::new(CacheMap::new()),
            storage: Some(storage),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, CacheMap> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the in-memory mapping with the stored one, if any.
    pub async fn load(&self) -> Result<(), AppError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        match storage.load().await? {
            Some(loaded) => {
                tracing::debug!(entries = loaded.len(), "Loaded cache from storage");
                *self.lock() = loaded;
            }
            None => {
                tracing::debug!("No stored cache found, starting empty");
            }
        }
        Ok(())
    }

    pub fn get(&self, url: &str, extractor_id: &str) -> Option<serde_json::Value> {
        self.lock().get(&CacheKey::new(url, extractor_id)).cloned()
    }

    /// Unconditional overwrite.
    pub fn put(&self, url: &str, extractor_id: &str, value: serde_json::Value) {
        self.lock().insert(CacheKey::new(url, extractor_id), value);
    }

    /// Write the whole mapping to storage. No-op when memory-only.
    pub async fn flush(&self) -> Result<(), AppError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        // Clone out so the lock is not held across the write.
        let entries = self.lock().clone();
        storage.save(&entries).await?;
        tracing::debug!(entries = entries.len(), "Flushed cache to storage");
        Ok(())
    }

    /// Empty the mapping and delete durable storage.
    pub async fn clear(&self) -> Result<(), AppError> {
        self.lock().clear();
        if let Some(storage) = &self.storage {
            storage.remove().await?;
        }
        Ok(())
    }

    /// All entries in key order.
    pub fn snapshot(&self) -> Vec<(CacheKey, serde_json::Value)> {
        self.lock()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
