//! Background expiry of stale announcements.
//!
//! The scheduler owns one tokio task that calls
//! [`ExpertiseRegistry::sweep_expired`] on a fixed interval, independent of
//! request handling. It stops when [`ExpirySchedulerHandle::shutdown`] is
//! called or the handle is dropped.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::ExpertiseRegistry;
use crate::telemetry as m;

/// Scheduler lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerStatus {
    /// Not started or finished
    #[default]
    Stopped,
    /// Sweeping on every tick
    Running,
    /// Shutdown requested, task still finishing
    Stopping,
}

/// Periodic sweep over a registry.
pub struct ExpiryScheduler {
    registry: Arc<ExpertiseRegistry>,
    interval: Duration,
    retention_secs: u64,
}

impl ExpiryScheduler {
    /// Sweep `registry` every `interval` using its own retention window.
    pub fn new(registry: Arc<ExpertiseRegistry>, interval: Duration) -> Self {
        let retention_secs = registry.retention_secs();
        Self {
            registry,
            interval,
            retention_secs,
        }
    }

    /// Override the retention window used by sweeps.
    pub fn with_retention(mut self, retention_secs: u64) -> Self {
        self.retention_secs = retention_secs;
        self
    }

    /// Run a single sweep at the registry clock's current time.
    pub async fn run_once(&self) -> usize {
        let now = self.registry.clock().now();
        self.registry.sweep_expired(now, self.retention_secs).await
    }

    /// Start the background task. The first sweep runs one interval from now.
    pub fn spawn(self) -> ExpirySchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(SchedulerStatus::Running);
        let sweeps = Arc::new(AtomicU64::new(0));
        let removed_total = Arc::new(AtomicU64::new(0));

        let task_sweeps = sweeps.clone();
        let task_removed = removed_total.clone();
        let join = tokio::spawn(async move {
            info!(
                interval_ms = self.interval.as_millis() as u64,
                retention_secs = self.retention_secs,
                "Expiry scheduler started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.run_once().await;
                        task_sweeps.fetch_add(1, Ordering::SeqCst);
                        task_removed.fetch_add(removed as u64, Ordering::SeqCst);
                        metrics::counter!(m::SWEEPS_COMPLETED).increment(1);
                        debug!(removed, "Expiry sweep complete");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            let _ = status_tx.send(SchedulerStatus::Stopped);
            info!("Expiry scheduler stopped");
        });

        ExpirySchedulerHandle {
            shutdown_tx,
            status_rx,
            join,
            sweeps,
            removed_total,
        }
    }
}

/// Control handle for a running [`ExpiryScheduler`].
pub struct ExpirySchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<SchedulerStatus>,
    join: JoinHandle<()>,
    sweeps: Arc<AtomicU64>,
    removed_total: Arc<AtomicU64>,
}

impl ExpirySchedulerHandle {
    pub fn status(&self) -> SchedulerStatus {
        let status = *self.status_rx.borrow();
        if status == SchedulerStatus::Running && *self.shutdown_tx.borrow() {
            SchedulerStatus::Stopping
        } else {
            status
        }
    }

    /// Sweeps completed so far.
    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps.load(Ordering::SeqCst)
    }

    /// Entries removed across all sweeps.
    pub fn removed_total(&self) -> u64 {
        self.removed_total.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for the task to finish.
    ///
    /// A sweep already in progress completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Expiry scheduler task ended abnormally");
        }
    }
}
