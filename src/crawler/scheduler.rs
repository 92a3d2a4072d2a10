//! Scheduler for fanning crawl passes out over sources
//!
//! This module handles:
//! - A bounded worker pool (semaphore permits) independent of source count
//! - At most one in-flight pass per source
//! - Isolation of failing or panicking passes from their siblings
//! - A plain periodic tick driving the pool
//!
//! The engine itself knows nothing about wall-clock scheduling.

use crate::crawler::engine::CrawlEngine;
use crate::source::SourceRegistry;
use crate::state::ModeHint;
use crate::SweepError;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Counters of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Passes spawned this tick
    pub started: usize,

    /// Passes that ran to completion
    pub completed: usize,

    /// Passes that ended early (fetch failure, sink failure)
    pub aborted: usize,

    /// Passes that could not run or panicked
    pub failed: usize,

    /// Sources skipped because a pass from an earlier tick still runs
    pub skipped_in_flight: usize,

    /// Records accepted across all passes
    pub accepted: u32,
}

/// Source ids with a pass currently running
type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks a source as in flight until dropped
struct InFlightGuard {
    source_id: String,
    in_flight: InFlight,
}

impl InFlightGuard {
    /// Returns `None` if the source already has a pass running
    fn acquire(in_flight: &InFlight, source_id: &str) -> Option<Self> {
        let mut running = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(source_id.to_string()) {
            return None;
        }
        Some(Self {
            source_id: source_id.to_string(),
            in_flight: Arc::clone(in_flight),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut running = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.source_id);
    }
}

/// Runs one engine pass per source on a bounded pool
///
/// The scheduler coordinates:
/// - Global concurrency (at most `pool_size` passes at once)
/// - Per-source exclusivity (never two passes on one cursor)
/// - The polling cadence
pub struct Scheduler {
    engine: Arc<CrawlEngine>,
    registry: Arc<SourceRegistry>,

    /// Global semaphore bounding concurrent passes
    permits: Arc<Semaphore>,

    in_flight: InFlight,
}

impl Scheduler {
    /// Creates a scheduler with `pool_size` workers (at least one)
    pub fn new(engine: Arc<CrawlEngine>, registry: Arc<SourceRegistry>, pool_size: usize) -> Self {
        Self {
            engine,
            registry,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns true if a pass is currently running for the source
    pub fn is_in_flight(&self, source_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(source_id)
    }

    /// Runs one pass for every source (or just `only`) and waits for all
    ///
    /// # Returns
    ///
    /// * `Ok(TickSummary)` - Every spawned pass finished, whatever its outcome
    /// * `Err(SweepError)` - `only` names an unknown source
    pub async fn run_tick(&self, only: Option<&str>) -> Result<TickSummary, SweepError> {
        let sources = match only {
            Some(id) => vec![self
                .registry
                .get(id)
                .ok_or_else(|| SweepError::UnknownSource(id.to_string()))?],
            None => self.registry.iter().cloned().collect(),
        };

        let mut summary = TickSummary::default();
        let mut tasks = JoinSet::new();

        for source in sources {
            // Claimed before spawning so a concurrent tick cannot slip in
            let guard = match InFlightGuard::acquire(&self.in_flight, &source.id) {
                Some(guard) => guard,
                None => {
                    tracing::info!(source = %source.id, "Previous pass still running; skipping");
                    summary.skipped_in_flight += 1;
                    continue;
                }
            };

            let engine = Arc::clone(&self.engine);
            let permits = Arc::clone(&self.permits);
            summary.started += 1;

            tasks.spawn(async move {
                let _guard = guard;
                let _permit = permits.acquire_owned().await;
                let result = engine.run_pass(&source, ModeHint::Auto, None, None).await;
                (source.id.clone(), result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.accepted += report.items_accepted;
                    if report.is_complete() {
                        summary.completed += 1;
                    } else {
                        summary.aborted += 1;
                    }
                }
                Ok((source_id, Err(e))) => {
                    tracing::error!(source = %source_id, "Pass failed: {}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Pass task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Tick done: {} started, {} completed, {} aborted, {} failed, {} still running, {} new records",
            summary.started,
            summary.completed,
            summary.aborted,
            summary.failed,
            summary.skipped_in_flight,
            summary.accepted
        );

        Ok(summary)
    }

    /// Ticks every `interval` until `shutdown` resolves
    ///
    /// The first tick runs immediately. A tick that overruns the interval
    /// delays the next one instead of bunching them up.
    ///
    /// Shutdown is honored mid-tick as well: the running passes are dropped
    /// at their next await point. Cursors only ever hold persisted items, so
    /// an interrupted pass is simply redone on the next start.
    pub async fn run_until<F>(&self, interval: Duration, shutdown: F) -> Result<(), SweepError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested; scheduler stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested during a tick; abandoning running passes");
                    return Ok(());
                }
                result = self.run_tick(None) => {
                    result?;
                }
            }
        }
    }

    /// Ticks every `interval` until Ctrl-C
    pub async fn run_forever(&self, interval: Duration) -> Result<(), SweepError> {
        self.run_until(interval, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));

        let guard = InFlightGuard::acquire(&in_flight, "physics").unwrap();
        assert!(InFlightGuard::acquire(&in_flight, "physics").is_none());
        assert!(InFlightGuard::acquire(&in_flight, "math").is_some());

        drop(guard);
        assert!(InFlightGuard::acquire(&in_flight, "physics").is_some());
    }

    #[test]
    fn test_guard_release_on_drop() {
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        {
            let _guard = InFlightGuard::acquire(&in_flight, "physics").unwrap();
            assert!(in_flight.lock().unwrap().contains("physics"));
        }
        assert!(in_flight.lock().unwrap().is_empty());
    }
}
