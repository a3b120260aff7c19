//! The engine handle: owns the task registry and cache, runs cycles and
//! the background poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::cycle::{CycleOutcome, run_cycle};
use crate::error::AppError;
use crate::executor::Executor;
use crate::models::{CycleReport, ScrapeResult, Task};
use crate::poller::{self, PollMode, PollerHandle, PollerReporter, TracingPollerReporter};
use crate::registry::TaskRegistry;
use crate::traits::{CacheStorage, Extractor, Fetcher, NullStorage, extractor_fn};

/// Batch change-detection engine.
///
/// Cheap to clone; clones share the same registry, cache and poller
/// slot. Separate `Engine::new` calls share nothing.
pub struct Engine<F: Fetcher, S: CacheStorage = NullStorage> {
    inner: Arc<EngineInner<F, S>>,
}

struct EngineInner<F: Fetcher, S: CacheStorage> {
    executor: Executor<F>,
    rate_limit: Duration,
    registry: RwLock<TaskRegistry>,
    cache: Arc<CacheStore<S>>,
    /// Serializes cycles against each other and against `clear`.
    cycle_lock: tokio::sync::Mutex<()>,
    polling: AtomicBool,
    poller_cancel: Mutex<Option<CancellationToken>>,
}

impl<F: Fetcher, S: CacheStorage> Clone for Engine<F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher> Engine<F, NullStorage> {
    /// Create a memory-only engine. Nothing survives the process.
    ///
    /// `config.cache_file` is not read here; to persist the cache, build
    /// a storage from it (e.g. `JsonFileStorage::from_config`) and use
    /// [`Engine::with_storage`].
    pub fn new(fetcher: F, config: EngineConfig) -> Self {
        if let Some(path) = &config.cache_file {
            tracing::warn!(
                path = %path.display(),
                "cache_file is set but the engine has no storage; cache stays in memory"
            );
        }
        Self::build(fetcher, CacheStore::in_memory(), &config)
    }
}

impl<F: Fetcher, S: CacheStorage> Engine<F, S> {
    /// Create an engine whose cache is persisted to `storage`.
    ///
    /// Call [`load`](Self::load) before the first cycle to pick up a
    /// previous run's values.
    pub fn with_storage(fetcher: F, storage: S, config: EngineConfig) -> Self {
        Self::build(fetcher, CacheStore::with_storage(storage), &config)
    }

    fn build(fetcher: F, cache: CacheStore<S>, config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                executor: Executor::new(fetcher, config.retry_policy()),
                rate_limit: config.rate_limit,
                registry: RwLock::new(TaskRegistry::new()),
                cache: Arc::new(cache),
                cycle_lock: tokio::sync::Mutex::new(()),
                polling: AtomicBool::new(false),
                poller_cancel: Mutex::new(None),
            }),
        }
    }

    /// Populate the cache from storage. A missing store means an empty cache.
    pub async fn load(&self) -> Result<(), AppError> {
        self.inner.cache.load().await
    }

    /// Add a task. Takes effect from the next cycle that starts.
    pub fn register(&self, url: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(url, extractor);
    }

    /// Register a closure as the extractor, under an explicit id.
    pub fn register_fn<Func>(&self, url: impl Into<String>, id: impl Into<String>, func: Func)
    where
        Func: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        self.register(url, extractor_fn(id, func));
    }

    /// Registered tasks, in registration order.
    pub fn tasks(&self) -> Vec<Task> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .all()
            .to_vec()
    }

    pub fn task_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn rate_limit(&self) -> Duration {
        self.inner.rate_limit
    }

    /// Run one cycle and return only what changed.
    ///
    /// Per-task fetch failures come back in [`CycleReport::failures`];
    /// a cache flush failure fails the call.
    pub async fn get_changes(&self) -> Result<CycleReport, AppError> {
        let _cycle = self.inner.cycle_lock.lock().await;
        self.cycle().await.into_result()
    }

    /// One changes-cycle for the poller: the report is kept even when the
    /// flush fails, so detected changes can still be delivered.
    pub(crate) async fn poll_cycle(&self) -> CycleOutcome {
        let _cycle = self.inner.cycle_lock.lock().await;
        self.cycle().await
    }

    /// Run one cycle, then return every cached value.
    ///
    /// `failures` holds the refresh cycle's task failures.
    pub async fn get_all(&self) -> Result<CycleReport, AppError> {
        let _cycle = self.inner.cycle_lock.lock().await;
        let refreshed = self.cycle().await.into_result()?;
        Ok(CycleReport {
            results: self.snapshot(),
            failures: refreshed.failures,
        })
    }

    async fn cycle(&self) -> CycleOutcome {
        let tasks = self.tasks();
        run_cycle(&self.inner.executor, tasks, &self.inner.cache).await
    }

    /// The current cache contents, in key order.
    pub fn snapshot(&self) -> Vec<ScrapeResult> {
        self.inner
            .cache
            .snapshot()
            .into_iter()
            .map(|(key, value)| ScrapeResult {
                url: key.url,
                extractor: key.extractor,
                value,
            })
            .collect()
    }

    /// The last value seen for one (url, extractor id) slot.
    pub fn cached(&self, url: &str, extractor_id: &str) -> Option<Value> {
        self.inner.cache.get(url, extractor_id)
    }

    /// Drop every task, empty the cache and delete its storage.
    ///
    /// Waits for an in-flight cycle to finish first.
    pub async fn clear(&self) -> Result<(), AppError> {
        let _cycle = self.inner.cycle_lock.lock().await;
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner.cache.clear().await?;
        tracing::info!("Cleared tasks and cache");
        Ok(())
    }

    /// Start the background poller, logging through `tracing`.
    pub fn start(
        &self,
        mode: PollMode,
        sender: UnboundedSender<(String, Value)>,
    ) -> Result<PollerHandle, AppError> {
        self.start_with_reporter(mode, sender, TracingPollerReporter)
    }

    /// Start the background poller. Fails if one is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with_reporter<R>(
        &self,
        mode: PollMode,
        sender: UnboundedSender<(String, Value)>,
        reporter: R,
    ) -> Result<PollerHandle, AppError>
    where
        R: PollerReporter + 'static,
    {
        if self
            .inner
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::PollerAlreadyRunning);
        }

        let cancel = CancellationToken::new();
        *self
            .inner
            .poller_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(cancel.clone());

        let engine = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let _running = PollingFlag(Arc::clone(&engine.inner));
            poller::run(engine, mode, sender, token, reporter).await;
        });

        Ok(PollerHandle::new(cancel, join))
    }

    /// Ask the active poller, if any, to stop at its next check point.
    pub fn stop(&self) {
        let token = self
            .inner
            .poller_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// True from `start` until the poller loop has actually exited.
    pub fn is_polling(&self) -> bool {
        self.inner.polling.load(Ordering::Acquire)
    }
}

/// Clears the polling flag when the loop exits, including by panic.
struct PollingFlag<F: Fetcher, S: CacheStorage>(Arc<EngineInner<F, S>>);

impl<F: Fetcher, S: CacheStorage> Drop for PollingFlag<F, S> {
    fn drop(&mut self) {
        self.0.polling.store(false, Ordering::Release);
    }
}
