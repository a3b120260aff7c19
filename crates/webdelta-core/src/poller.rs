//! Continuous polling: run changes-cycles forever, feed a consumer queue.
//!
//! The loop checks its cancellation token at the cycle boundary and
//! during the rate-limit pause. An in-flight cycle is never interrupted,
//! so at most one more cycle's changes can land after `stop()`.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cycle::CycleOutcome;
use crate::engine::Engine;
use crate::error::AppError;
use crate::traits::{CacheStorage, Fetcher};

/// What the poller pushes onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Only values that changed since the previous cycle.
    ChangesOnly,
    /// The current cache contents once, then changes.
    All,
}

/// Events emitted by the poller for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PollerEvent<'a> {
    Started {
        mode: PollMode,
    },
    SnapshotSent {
        entries: usize,
    },
    CycleStarted {
        cycle: u64,
    },
    ChangeDetected {
        url: &'a str,
        extractor: &'a str,
    },
    TaskFailed {
        url: &'a str,
        error: &'a AppError,
    },
    CycleCompleted {
        cycle: u64,
        changes: usize,
        failures: usize,
    },
    /// The cache could not be flushed. The cycle's changes were still sent.
    CycleFailed {
        cycle: u64,
        error: &'a AppError,
    },
    /// The receiving end of the queue was dropped.
    ConsumerGone,
    Stopped,
}

/// Trait for receiving poller events (decoupled logging).
pub trait PollerReporter: Send + Sync {
    fn report(&self, event: PollerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPollerReporter;

impl PollerReporter for TracingPollerReporter {
    fn report(&self, event: PollerEvent<'_>) {
        match event {
            PollerEvent::Started { mode } => {
                tracing::info!(?mode, "Poller started");
            }
            PollerEvent::SnapshotSent { entries } => {
                tracing::info!(%entries, "Sent cached snapshot");
            }
            PollerEvent::CycleStarted { cycle } => {
                tracing::debug!(%cycle, "Cycle started");
            }
            PollerEvent::ChangeDetected { url, extractor } => {
                tracing::info!(%url, %extractor, "Change queued");
            }
            PollerEvent::TaskFailed { url, error } => {
                tracing::warn!(%url, %error, "Task failed, skipping this cycle");
            }
            PollerEvent::CycleCompleted {
                cycle,
                changes,
                failures,
            } => {
                tracing::info!(%cycle, %changes, %failures, "Cycle completed");
            }
            PollerEvent::CycleFailed { cycle, error } => {
                tracing::error!(%cycle, %error, "Cycle failed");
            }
            PollerEvent::ConsumerGone => {
                tracing::info!("Queue receiver dropped, stopping");
            }
            PollerEvent::Stopped => {
                tracing::info!("Poller stopped");
            }
        }
    }
}

/// Handle to a running poller.
#[derive(Debug)]
pub struct PollerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl PollerHandle {
    pub(crate) fn new(cancel: CancellationToken, join: JoinHandle<()>) -> Self {
        Self { cancel, join }
    }

    /// Ask the loop to stop at its next check point.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn join(self) -> Result<(), AppError> {
        self.join
            .await
            .map_err(|e| AppError::TaskPanicked(e.to_string()))
    }
}

enum Exit {
    Cancelled,
    ConsumerGone,
}

/// Drive the loop until cancelled or the consumer goes away.
pub(crate) async fn run<F, S, R>(
    engine: Engine<F, S>,
    mode: PollMode,
    sender: UnboundedSender<(String, Value)>,
    cancel: CancellationToken,
    reporter: R,
) where
    F: Fetcher,
    S: CacheStorage,
    R: PollerReporter,
{
    reporter.report(PollerEvent::Started { mode });

    if let Exit::ConsumerGone = poll(&engine, mode, &sender, &cancel, &reporter).await {
        reporter.report(PollerEvent::ConsumerGone);
    }

    reporter.report(PollerEvent::Stopped);
}

async fn poll<F, S, R>(
    engine: &Engine<F, S>,
    mode: PollMode,
    sender: &UnboundedSender<(String, Value)>,
    cancel: &CancellationToken,
    reporter: &R,
) -> Exit
where
    F: Fetcher,
    S: CacheStorage,
    R: PollerReporter,
{
    let pause = engine.rate_limit();

    if mode == PollMode::All {
        let snapshot = engine.snapshot();
        let entries = snapshot.len();
        for result in snapshot {
            if sender.send(result.into_pair()).is_err() {
                return Exit::ConsumerGone;
            }
        }
        reporter.report(PollerEvent::SnapshotSent { entries });

        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            () = cancel.cancelled() => return Exit::Cancelled,
        }
    }

    let mut cycle = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Exit::Cancelled;
        }
        if sender.is_closed() {
            return Exit::ConsumerGone;
        }

        cycle += 1;
        reporter.report(PollerEvent::CycleStarted { cycle });

        let CycleOutcome { report, flush } = engine.poll_cycle().await;

        for failure in &report.failures {
            reporter.report(PollerEvent::TaskFailed {
                url: &failure.url,
                error: &failure.error,
            });
        }
        let changes = report.results.len();
        let failures = report.failures.len();
        // Changes are already cached, so they go out even if the flush failed.
        for result in report.results {
            reporter.report(PollerEvent::ChangeDetected {
                url: &result.url,
                extractor: &result.extractor,
            });
            if sender.send(result.into_pair()).is_err() {
                return Exit::ConsumerGone;
            }
        }

        match flush {
            Ok(()) => reporter.report(PollerEvent::CycleCompleted {
                cycle,
                changes,
                failures,
            }),
            Err(error) => reporter.report(PollerEvent::CycleFailed {
                cycle,
                error: &error,
            }),
        }

        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            () = cancel.cancelled() => return Exit::Cancelled,
        }
    }
}
