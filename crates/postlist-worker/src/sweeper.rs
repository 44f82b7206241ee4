//! Background service for expiring cached results.
//!
//! Runs periodically to:
//! - Delete request directories idle for longer than the result TTL
//! - Drop cache index entries pointing at deleted directories
//! - Forget terminal request statuses past their retention

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use postlist_storage::{ResultCache, SweepReport};

use crate::metrics;
use crate::progress::ProgressHub;

/// Periodic cache sweeper.
pub struct CacheSweeper {
    cache: Arc<ResultCache>,
    progress: Arc<ProgressHub>,
    interval: Duration,
    status_retention: Duration,
}

impl CacheSweeper {
    pub fn new(
        cache: Arc<ResultCache>,
        progress: Arc<ProgressHub>,
        interval: Duration,
        status_retention: Duration,
    ) -> Self {
        Self {
            cache,
            progress,
            interval,
            status_retention,
        }
    }

    /// Sweep every `interval` until `shutdown` flips to `true`.
    ///
    /// The first sweep runs immediately, clearing leftovers of a previous
    /// process.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting cache sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Cache sweeper stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Run a single sweep. Errors are logged, never propagated.
    pub async fn sweep_once(&self) -> Option<SweepReport> {
        let report = match self.cache.sweep().await {
            Ok(report) => report,
            Err(e) => {
                error!("Cache sweep error: {}", e);
                return None;
            }
        };

        if !report.deleted.is_empty() {
            metrics::record_sweep_deletions(report.deleted.len());
            info!(
                deleted = report.deleted.len(),
                kept = report.kept.len(),
                "Deleted expired request directories"
            );
        }

        let pruned = self.progress.prune_terminal(self.status_retention).await;
        if pruned > 0 {
            debug!(pruned, "Pruned finished request statuses");
        }

        Some(report)
    }
}
