//! Background sweeper: lease expiry, queue timeout and file reclamation.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use intake_core::{defaults, Error, Result};
use intake_db::Database;

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between passes.
    pub interval: Duration,
    /// Unclaimed runs older than this are failed.
    pub queue_timeout: Duration,
    /// Soft-deleted files reclaimed per pass.
    pub reclaim_batch: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(defaults::SWEEP_INTERVAL_SECS),
            queue_timeout: Duration::from_secs(defaults::JOB_QUEUE_TIMEOUT_SECS),
            reclaim_batch: defaults::SWEEP_RECLAIM_BATCH,
        }
    }
}

impl SweeperConfig {
    /// Create config from `SWEEP_INTERVAL_SECS` and `JOB_QUEUE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let interval = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults::SWEEP_INTERVAL_SECS);
        let queue_timeout = std::env::var("JOB_QUEUE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults::JOB_QUEUE_TIMEOUT_SECS);
        Self {
            interval: Duration::from_secs(interval),
            queue_timeout: Duration::from_secs(queue_timeout),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }
}

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_leases: usize,
    pub queue_timeouts: usize,
    pub reclaimed_files: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_leases == 0 && self.queue_timeouts == 0 && self.reclaimed_files == 0
    }
}

/// Handle for stopping a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the current pass to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        if let Err(e) = self.task.await {
            error!(error = ?e, "Sweeper task panicked");
        }
        Ok(())
    }
}

/// Periodic maintenance over the run queue and the file registry.
pub struct Sweeper {
    db: Database,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(db: Database, config: SweeperConfig) -> Self {
        Self { db, config }
    }

    /// One pass. A failing step is logged and does not stop the others.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.db.runs.expire_leases().await {
            Ok(ids) => {
                for run_id in &ids {
                    warn!(%run_id, "Run lease expired, marked failed");
                }
                report.expired_leases = ids.len();
            }
            Err(e) => error!(error = %e, "Failed to expire run leases"),
        }

        match self.db.runs.expire_unclaimed(self.config.queue_timeout).await {
            Ok(ids) => {
                for run_id in &ids {
                    warn!(%run_id, "Run waited too long in queue, marked failed");
                }
                report.queue_timeouts = ids.len();
            }
            Err(e) => error!(error = %e, "Failed to expire queued runs"),
        }

        match self.db.files.reclaim_deleted(self.config.reclaim_batch).await {
            Ok(n) => report.reclaimed_files = n,
            Err(e) => error!(error = %e, "Failed to reclaim deleted files"),
        }

        if report.is_empty() {
            debug!("Sweep pass found nothing to do");
        } else {
            info!(
                expired_leases = report.expired_leases,
                queue_timeouts = report.queue_timeouts,
                reclaimed_files = report.reclaimed_files,
                "Sweep pass finished"
            );
        }
        report
    }

    /// Run passes every `interval` until shut down. The first pass runs
    /// immediately, which fails runs orphaned by a previous process.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            info!(
                subsystem = "jobs",
                component = "sweeper",
                interval_secs = self.config.interval.as_secs(),
                queue_timeout_secs = self.config.queue_timeout.as_secs(),
                "Sweeper started"
            );
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
            info!(subsystem = "jobs", component = "sweeper", "Sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }
}
