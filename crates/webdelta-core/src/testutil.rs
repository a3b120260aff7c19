//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::models::CacheMap;
use crate::poller::{PollerEvent, PollerReporter};
use crate::traits::{CacheStorage, Extractor, Fetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// One scripted fetch outcome.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Text(String),
    /// Fails with `AppError::NetworkError(message)`.
    Fail(String),
}

impl MockResponse {
    fn into_result(self) -> Result<String, AppError> {
        match self {
            MockResponse::Text(text) => Ok(text),
            MockResponse::Fail(message) => Err(AppError::NetworkError(message)),
        }
    }
}

/// Mock fetcher with per-URL scripted responses.
///
/// Each routed URL pops its responses in order; the last one repeats
/// forever. Unrouted URLs get the default response.
#[derive(Clone)]
pub struct MockFetcher {
    default: MockResponse,
    routes: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    delay: Duration,
    /// Every URL fetched, in call order.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Every URL returns `text`.
    pub fn new(text: &str) -> Self {
        Self::with_default(MockResponse::Text(text.to_string()))
    }

    /// Every URL fails with a network error.
    pub fn failing(message: &str) -> Self {
        Self::with_default(MockResponse::Fail(message.to_string()))
    }

    fn with_default(default: MockResponse) -> Self {
        Self {
            default,
            routes: Arc::new(Mutex::new(HashMap::new())),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script successive bodies for one URL.
    pub fn route(self, url: &str, bodies: &[&str]) -> Self {
        let responses = bodies
            .iter()
            .map(|b| MockResponse::Text(b.to_string()))
            .collect();
        self.route_results(url, responses)
    }

    pub fn route_error(self, url: &str, message: &str) -> Self {
        self.route_results(url, vec![MockResponse::Fail(message.to_string())])
    }

    pub fn route_results(self, url: &str, responses: Vec<MockResponse>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_response(&self, url: &str) -> MockResponse {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => self.default.clone(),
        }
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let response = self.next_response(url);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response.into_result()
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

type ExtractFn = dyn Fn(&str) -> Option<serde_json::Value> + Send + Sync;

/// Mock extractor that counts calls and delegates to a closure.
#[derive(Clone)]
pub struct MockExtractor {
    id: String,
    func: Arc<ExtractFn>,
    calls: Arc<AtomicUsize>,
}

impl MockExtractor {
    pub fn from_fn<Func>(id: &str, func: Func) -> Self
    where
        Func: Fn(&str) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            func: Arc::new(func),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the fetched text unchanged.
    pub fn passthrough(id: &str) -> Self {
        Self::from_fn(id, |text| Some(text.into()))
    }

    pub fn always_absent(id: &str) -> Self {
        Self::from_fn(id, |_| None)
    }

    /// Returns scripted values in order, ignoring the input; the last repeats.
    pub fn sequence(id: &str, values: Vec<Option<serde_json::Value>>) -> Self {
        let values = Mutex::new(values);
        Self::from_fn(id, move |_| {
            let mut values = values.lock().unwrap();
            if values.len() > 1 {
                values.remove(0)
            } else {
                values.first().cloned().flatten()
            }
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extractor for MockExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    fn extract(&self, text: &str) -> Option<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.func)(text)
    }
}

// ---------------------------------------------------------------------------
// MockStorage
// ---------------------------------------------------------------------------

/// Mock storage that records saves and removals.
#[derive(Clone)]
pub struct MockStorage {
    stored: Arc<Mutex<Option<CacheMap>>>,
    load_error: Arc<Mutex<Option<AppError>>>,
    save_error: Arc<Mutex<Option<AppError>>>,
    /// Every mapping passed to `save`, in order.
    pub saved: Arc<Mutex<Vec<CacheMap>>>,
    pub removed: Arc<Mutex<usize>>,
}

impl MockStorage {
    /// Nothing stored yet.
    pub fn empty() -> Self {
        Self {
            stored: Arc::new(Mutex::new(None)),
            load_error: Arc::new(Mutex::new(None)),
            save_error: Arc::new(Mutex::new(None)),
            saved: Arc::new(Mutex::new(Vec::new())),
            removed: Arc::new(Mutex::new(0)),
        }
    }

    /// Storage holding a previous run's cache.
    pub fn with_entries(entries: CacheMap) -> Self {
        let storage = Self::empty();
        *storage.stored.lock().unwrap() = Some(entries);
        storage
    }

    /// Storage whose next `load` fails.
    pub fn with_load_error(error: AppError) -> Self {
        let storage = Self::empty();
        *storage.load_error.lock().unwrap() = Some(error);
        storage
    }

    /// Storage whose next `save` fails.
    pub fn with_save_error(error: AppError) -> Self {
        let storage = Self::empty();
        *storage.save_error.lock().unwrap() = Some(error);
        storage
    }

    /// Make the next `save` fail.
    pub fn fail_next_save(&self, error: AppError) {
        *self.save_error.lock().unwrap() = Some(error);
    }

    pub fn stored(&self) -> Option<CacheMap> {
        self.stored.lock().unwrap().clone()
    }
}

impl CacheStorage for MockStorage {
    async fn load(&self) -> Result<Option<CacheMap>, AppError> {
        if let Some(e) = self.load_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn save(&self, entries: &CacheMap) -> Result<(), AppError> {
        if let Some(e) = self.save_error.lock().unwrap().take() {
            return Err(e);
        }
        self.saved.lock().unwrap().push(entries.clone());
        *self.stored.lock().unwrap() = Some(entries.clone());
        Ok(())
    }

    async fn remove(&self) -> Result<(), AppError> {
        *self.removed.lock().unwrap() += 1;
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock poller reporter that records event labels.
#[derive(Default, Clone)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, label: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == label)
            .count()
    }
}

impl PollerReporter for MockReporter {
    fn report(&self, event: PollerEvent<'_>) {
        let label = match &event {
            PollerEvent::Started { .. } => "Started",
            PollerEvent::SnapshotSent { .. } => "SnapshotSent",
            PollerEvent::CycleStarted { .. } => "CycleStarted",
            PollerEvent::ChangeDetected { .. } => "ChangeDetected",
            PollerEvent::TaskFailed { .. } => "TaskFailed",
            PollerEvent::CycleCompleted { .. } => "CycleCompleted",
            PollerEvent::CycleFailed { .. } => "CycleFailed",
            PollerEvent::ConsumerGone => "ConsumerGone",
            PollerEvent::Stopped => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
