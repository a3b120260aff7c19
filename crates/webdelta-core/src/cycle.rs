//! One scrape cycle: fan every task out to the executor, join, flush once.

use std::sync::Arc;

use futures::future::join_all;

use crate::cache::CacheStore;
use crate::error::AppError;
use crate::executor::Executor;
use crate::models::{CycleReport, Task, TaskFailure};
use crate::traits::{CacheStorage, Fetcher};

/// What one cycle produced, plus the outcome of its cache flush.
///
/// The report survives a failed flush: its changes are already in the
/// in-memory cache, so a later cycle will not report them again.
#[derive(Debug)]
pub struct CycleOutcome {
    pub report: CycleReport,
    pub flush: Result<(), AppError>,
}

impl CycleOutcome {
    /// The report, or the flush error if the cache could not be saved.
    pub fn into_result(self) -> Result<CycleReport, AppError> {
        self.flush.map(|()| self.report)
    }
}

/// Run `tasks` concurrently and collect the changes.
///
/// Every task gets its own spawned unit, so a failing or panicking task
/// only shows up as a [`TaskFailure`] in the report. The cache is flushed
/// once after all units have finished.
pub async fn run_cycle<F, S>(
    executor: &Executor<F>,
    tasks: Vec<Task>,
    cache: &Arc<CacheStore<S>>,
) -> CycleOutcome
where
    F: Fetcher,
    S: CacheStorage,
{
    let task_count = tasks.len();
    tracing::debug!(tasks = task_count, "Starting cycle");

    let handles: Vec<_> = tasks
        .iter()
        .cloned()
        .map(|task| {
            let executor = executor.clone();
            let cache = Arc::clone(cache);
            tokio::spawn(async move { executor.execute(&task, &cache).await })
        })
        .collect();

    let mut report = CycleReport::default();
    for (task, joined) in tasks.into_iter().zip(join_all(handles).await) {
        let outcome = joined.unwrap_or_else(|e| Err(AppError::TaskPanicked(e.to_string())));
        match outcome {
            Ok(Some(result)) => report.results.push(result),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(url = %task.url, extractor = %task.extractor_id(), %error, "Task failed");
                report.failures.push(TaskFailure {
                    extractor: task.extractor_id().to_string(),
                    url: task.url,
                    error,
                });
            }
        }
    }

    let flush = cache.flush().await;
    if let Err(error) = &flush {
        tracing::error!(%error, changes = report.results.len(), "Cache flush failed");
    }

    tracing::info!(
        tasks = task_count,
        changes = report.results.len(),
        failures = report.failures.len(),
        "Cycle complete"
    );
    CycleOutcome { report, flush }
}
