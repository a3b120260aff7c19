pub mod cache;
pub mod config;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod poller;
pub mod registry;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{EngineConfig, RateLimit, RetryPolicy};
pub use engine::Engine;
pub use error::AppError;
pub use models::{CacheKey, CycleReport, ScrapeResult, Task, TaskFailure, compute_hash};
pub use poller::{PollMode, PollerHandle};
pub use traits::{CacheStorage, Extractor, Fetcher, FnExtractor, NullStorage, extractor_fn};
