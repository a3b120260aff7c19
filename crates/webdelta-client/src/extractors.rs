//! Ready-made extractors for common monitoring targets.
//!
//! None of these parse HTML; point a custom [`Extractor`] at a page when
//! you need a specific element.

use std::sync::Arc;

use serde_json::Value;
use webdelta_core::error::AppError;
use webdelta_core::models::compute_hash;
use webdelta_core::traits::Extractor;

/// The whole response body. Blank bodies count as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyExtractor;

impl Extractor for BodyExtractor {
    fn id(&self) -> &str {
        "body"
    }

    fn extract(&self, text: &str) -> Option<Value> {
        (!text.trim().is_empty()).then(|| Value::String(text.to_string()))
    }
}

/// SHA-256 of the body as 64-char hex; cheap to cache for large pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestExtractor;

impl Extractor for DigestExtractor {
    fn id(&self) -> &str {
        "sha256"
    }

    fn extract(&self, text: &str) -> Option<Value> {
        (!text.trim().is_empty()).then(|| Value::String(compute_hash(text)))
    }
}

/// The value at an RFC 6901 pointer inside a JSON body.
///
/// Absent when the body is not JSON or the pointer does not resolve, so
/// a truncated API response is retried.
#[derive(Debug, Clone)]
pub struct JsonPointerExtractor {
    id: String,
    pointer: String,
}

impl JsonPointerExtractor {
    pub fn new(pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        Self {
            id: format!("json:{pointer}"),
            pointer,
        }
    }
}

impl Extractor for JsonPointerExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract(&self, text: &str) -> Option<Value> {
        let document: Value = serde_json::from_str(text).ok()?;
        document.pointer(&self.pointer).cloned()
    }
}

/// Build a bundled extractor from its name: `body`, `sha256` or `json:<pointer>`.
pub fn parse_extractor(name: &str) -> Result<Arc<dyn Extractor>, AppError> {
    match name {
        "body" => Ok(Arc::new(BodyExtractor)),
        "sha256" => Ok(Arc::new(DigestExtractor)),
        other => match other.strip_prefix("json:") {
            Some(pointer) if pointer.is_empty() || pointer.starts_with('/') => {
                Ok(Arc::new(JsonPointerExtractor::new(pointer)))
            }
            Some(pointer) => Err(AppError::ConfigError(format!(
                "JSON pointer '{pointer}' must be empty or start with '/'"
            ))),
            None => Err(AppError::ConfigError(format!(
                "Unknown extractor '{other}' (expected body, sha256 or json:<pointer>)"
            ))),
        },
    }
}
