//! Cache persistence as a single JSON file.
//!
//! ## File format
//!
//! ```text
//! [
//!   { "url": "https://example.com", "extractor": "body", "value": "..." },
//!   ...
//! ]
//! ```
//!
//! The file is rewritten wholesale on every save: written to a sibling
//! `.tmp` file first, then renamed over the target.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use webdelta_core::config::EngineConfig;
use webdelta_core::error::AppError;
use webdelta_core::models::{CacheEntry, CacheMap};
use webdelta_core::traits::CacheStorage;

/// File-backed [`CacheStorage`].
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the configured `cache_file`, if one is set.
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        config.cache_file.as_ref().map(|path| Self::new(path.clone()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CacheStorage for JsonFileStorage {
    async fn load(&self) -> Result<Option<CacheMap>, AppError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::StorageError(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let rows: Vec<CacheEntry> = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::StorageError(format!("Corrupt cache file {}: {e}", self.path.display()))
        })?;
        tracing::debug!(path = %self.path.display(), entries = rows.len(), "Read cache file");

        Ok(Some(CacheEntry::into_map(rows)))
    }

    async fn save(&self, entries: &CacheMap) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::StorageError(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let bytes = serde_json::to_vec_pretty(&CacheEntry::from_map(entries))?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await.map_err(|e| {
            AppError::StorageError(format!("Failed to write {}: {e}", temp.display()))
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            AppError::StorageError(format!(
                "Failed to replace {}: {e}",
                self.path.display()
            ))
        })?;

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "Wrote cache file");
        Ok(())
    }

    async fn remove(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::StorageError(format!(
                "Failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
