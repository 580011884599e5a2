//! Run worker: claims queued extraction runs and executes them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use intake_core::{defaults, Error, ExtractionRun, Result};
use intake_db::Database;

use crate::handler::{RunContext, RunHandler, RunOutcome};

/// Configuration for the run worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when no wake-up arrives.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrently executing runs.
    pub max_concurrent_runs: usize,
    /// Whether to process runs at all.
    pub enabled: bool,
    /// End-to-end limit for one run.
    pub run_timeout: Duration,
    /// Lease granted on claim and on each renewal.
    pub lease: Duration,
    /// Interval between lease renewals.
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_runs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            run_timeout: Duration::from_secs(defaults::JOB_RUN_TIMEOUT_SECS),
            lease: Duration::from_secs(defaults::JOB_LEASE_SECS),
            heartbeat_interval: Duration::from_secs(defaults::JOB_HEARTBEAT_SECS),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable run processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent runs |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` | Polling interval when idle |
    /// | `JOB_RUN_TIMEOUT_SECS` | `300` | End-to-end limit per run |
    /// | `JOB_LEASE_SECS` | `60` | Lease length; heartbeat is a third of it |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_runs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let run_timeout_secs = std::env::var("JOB_RUN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults::JOB_RUN_TIMEOUT_SECS);

        let config = Self {
            poll_interval_ms,
            max_concurrent_runs,
            enabled,
            run_timeout: Duration::from_secs(run_timeout_secs),
            ..Self::default()
        };

        match std::env::var("JOB_LEASE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
        {
            Some(secs) => config.with_lease(Duration::from_secs(secs)),
            None => config,
        }
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent runs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max.max(1);
        self
    }

    /// Enable or disable run processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the lease; the heartbeat becomes a third of it.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self.heartbeat_interval = (lease / 3).max(Duration::from_millis(100));
        self
    }
}

/// Event emitted by the run worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A run was claimed and started.
    RunStarted { run_id: Uuid, file_id: Uuid },
    /// Run progress was updated.
    RunProgress {
        run_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    /// A run completed and its fields were stored.
    RunCompleted { run_id: Uuid, field_count: usize },
    /// A run failed.
    RunFailed { run_id: Uuid, error: String },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully. Runs already executing are
    /// finished first.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Wait for the worker loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = ?e, "Worker task panicked");
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that executes queued extraction runs.
pub struct JobWorker {
    db: Database,
    config: WorkerConfig,
    handler: Arc<dyn RunHandler>,
    event_tx: broadcast::Sender<WorkerEvent>,
    wake: Arc<Notify>,
}

impl JobWorker {
    /// Create a new worker.
    pub fn new(db: Database, config: WorkerConfig, handler: Arc<dyn RunHandler>) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            db,
            config,
            handler,
            event_tx,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Share a wake-up signal with whoever queues runs.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = wake;
        self
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Worker loop. Keeps up to `max_concurrent_runs` runs in flight and
    /// claims a new one as soon as a slot frees up; only waits when every slot
    /// is busy or the queue is empty.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Run worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_runs,
            run_timeout_secs = self.config.run_timeout.as_secs(),
            lease_secs = self.config.lease.as_secs(),
            "Run worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut tasks = tokio::task::JoinSet::new();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Run worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            while tasks.len() < self.config.max_concurrent_runs {
                match self.claim_run().await {
                    Some(run) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_run(run).await;
                        });
                    }
                    None => break,
                }
            }
            if claimed > 0 {
                debug!(claimed, in_flight = tasks.len(), "Claimed runs");
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Run worker received shutdown signal");
                    break;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(result);
                }
                _ = self.wake.notified() => {
                    debug!("Run worker woken by new run");
                }
                _ = sleep(poll_interval) => {}
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight runs");
        }
        while let Some(result) = tasks.join_next().await {
            log_task_result(result);
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Run worker stopped");
    }

    /// Claim the next queued run without executing it.
    async fn claim_run(&self) -> Option<ExtractionRun> {
        match self.db.runs.claim_next(self.config.lease).await {
            Ok(run) => run,
            Err(e) => {
                error!(error = ?e, "Failed to claim run");
                None
            }
        }
    }

    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            db: self.db.clone(),
            handler: self.handler.clone(),
            event_tx: self.event_tx.clone(),
            run_timeout: self.config.run_timeout,
            lease: self.config.lease,
            heartbeat_interval: self.config.heartbeat_interval,
        }
    }
}

fn log_task_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = ?e, "Run task panicked");
    }
}

/// Everything a spawned task needs to execute one claimed run.
struct JobWorkerRef {
    db: Database,
    handler: Arc<dyn RunHandler>,
    event_tx: broadcast::Sender<WorkerEvent>,
    run_timeout: Duration,
    lease: Duration,
    heartbeat_interval: Duration,
}

impl JobWorkerRef {
    /// Execute a claimed run, renewing its lease until the handler returns,
    /// then persist the outcome.
    async fn execute_run(self, run: ExtractionRun) {
        let start = Instant::now();
        let run_id = run.id;
        let file_id = run.file_id;

        info!(%run_id, %file_id, "Processing extraction run");
        let _ = self
            .event_tx
            .send(WorkerEvent::RunStarted { run_id, file_id });

        let event_tx = self.event_tx.clone();
        let ctx = RunContext::new(run).with_progress_callback(move |percent, message| {
            let _ = event_tx.send(WorkerEvent::RunProgress {
                run_id,
                percent,
                message: message.map(String::from),
            });
        });

        let execution = tokio::time::timeout(self.run_timeout, self.handler.execute(ctx));
        tokio::pin!(execution);
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the claim already set a lease.
        heartbeat.tick().await;

        let outcome = loop {
            tokio::select! {
                result = &mut execution => {
                    break match result {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(
                                %run_id,
                                "Run exceeded timeout of {}s",
                                self.run_timeout.as_secs()
                            );
                            RunOutcome::Failed(format!(
                                "Run exceeded timeout of {}s",
                                self.run_timeout.as_secs()
                            ))
                        }
                    };
                }
                _ = heartbeat.tick() => {
                    match self.db.runs.renew_lease(run_id, self.lease).await {
                        Ok(true) => debug!(%run_id, "Lease renewed"),
                        Ok(false) => warn!(%run_id, "Lease lost, run no longer running"),
                        Err(e) => warn!(%run_id, error = %e, "Failed to renew lease"),
                    }
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            RunOutcome::Completed(fields) => match self.db.runs.complete(run_id, &fields).await {
                Ok(_) => {
                    info!(
                        %run_id,
                        field_count = fields.len(),
                        duration_ms,
                        "Extraction run completed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::RunCompleted {
                        run_id,
                        field_count: fields.len(),
                    });
                }
                Err(e) => {
                    error!(error = %e, %run_id, "Failed to mark run as completed");
                    self.record_failure(run_id, format!("Failed to store fields: {}", e))
                        .await;
                }
            },
            RunOutcome::Failed(error) => {
                warn!(%run_id, %error, duration_ms, "Extraction run failed");
                self.record_failure(run_id, error).await;
            }
        }
    }

    async fn record_failure(&self, run_id: Uuid, error: String) {
        match self.db.runs.fail(run_id, &error).await {
            Ok(_) => {
                let _ = self
                    .event_tx
                    .send(WorkerEvent::RunFailed { run_id, error });
            }
            // Already terminal, e.g. swept after its lease lapsed.
            Err(Error::InvalidState(msg)) => warn!(%run_id, %msg, "Run already terminal"),
            Err(e) => error!(error = %e, %run_id, "Failed to mark run as failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, defaults::JOB_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent_runs, 4);
        assert!(config.enabled);
        assert_eq!(config.run_timeout, Duration::from_secs(300));
        assert_eq!(config.lease, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(1000)
            .with_max_concurrent(8)
            .with_enabled(false)
            .with_run_timeout(Duration::from_secs(5));

        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.max_concurrent_runs, 8);
        assert!(!config.enabled);
        assert_eq!(config.run_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_with_max_concurrent_at_least_one() {
        assert_eq!(
            WorkerConfig::default()
                .with_max_concurrent(0)
                .max_concurrent_runs,
            1
        );
    }

    #[test]
    fn test_with_lease_derives_heartbeat() {
        let config = WorkerConfig::default().with_lease(Duration::from_secs(30));
        assert_eq!(config.lease, Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_with_lease_heartbeat_floor() {
        let config = WorkerConfig::default().with_lease(Duration::from_millis(90));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_worker_event_clone_and_debug() {
        let run_id = Uuid::now_v7();
        let event = WorkerEvent::RunFailed {
            run_id,
            error: "lease expired".to_string(),
        };
        let copy = event.clone();
        match copy {
            WorkerEvent::RunFailed { run_id: id, error } => {
                assert_eq!(id, run_id);
                assert_eq!(error, "lease expired");
            }
            _ => panic!("Wrong event variant"),
        }
        assert!(format!("{:?}", event).contains("RunFailed"));
    }
}
