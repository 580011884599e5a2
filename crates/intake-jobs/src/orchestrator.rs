//! Extraction orchestrator: admission and lookup of extraction runs.
//!
//! Starting an extraction only queues a run and wakes the worker; the caller
//! polls the run for its outcome.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use intake_core::{defaults, Error, ExtractionDetail, ExtractionRun, Result};
use intake_db::Database;

/// Queues extraction runs and reads them back.
#[derive(Clone)]
pub struct ExtractionOrchestrator {
    db: Database,
    wake: Arc<Notify>,
    max_pending_runs: i64,
}

impl ExtractionOrchestrator {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            wake: Arc::new(Notify::new()),
            max_pending_runs: defaults::JOB_MAX_PENDING,
        }
    }

    /// Create with the admission limit from `JOB_MAX_PENDING`.
    pub fn from_env(db: Database) -> Self {
        let max_pending = std::env::var("JOB_MAX_PENDING")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(defaults::JOB_MAX_PENDING);
        Self::new(db).with_max_pending(max_pending)
    }

    /// Set the number of unclaimed runs at which new starts are rejected.
    pub fn with_max_pending(mut self, max: i64) -> Self {
        self.max_pending_runs = max.max(1);
        self
    }

    pub fn max_pending_runs(&self) -> i64 {
        self.max_pending_runs
    }

    /// Signal notified whenever a run is queued. Pass it to the worker.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Queue a run for a live file and wake the worker.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or deleted files, `Overloaded` when the queue
    /// already holds `max_pending_runs` unclaimed runs. No run is created in
    /// either case.
    pub async fn start_extraction(&self, file_id: Uuid) -> Result<ExtractionRun> {
        let run = match self
            .db
            .runs
            .create_within_limit(file_id, self.max_pending_runs)
            .await
        {
            Ok(run) => run,
            Err(Error::Overloaded(msg)) => {
                warn!(
                    subsystem = "jobs",
                    component = "orchestrator",
                    op = "start_extraction",
                    file_id = %file_id,
                    max_pending = self.max_pending_runs,
                    "Extraction queue full, rejecting run"
                );
                return Err(Error::Overloaded(msg));
            }
            Err(e) => return Err(e),
        };
        self.wake.notify_one();

        info!(
            subsystem = "jobs",
            component = "orchestrator",
            op = "start_extraction",
            run_id = %run.id,
            file_id = %file_id,
            "Extraction started"
        );
        Ok(run)
    }

    /// A run with its fields.
    pub async fn get_extraction(&self, run_id: Uuid) -> Result<ExtractionDetail> {
        self.db.runs.get_detail(run_id).await
    }

    /// All runs of a live file, newest first.
    pub async fn list_extractions(&self, file_id: Uuid) -> Result<Vec<ExtractionRun>> {
        self.db.files.get(file_id).await?;
        self.db.runs.list_for_file(file_id).await
    }
}
