//! Run handler trait and execution context.

use async_trait::async_trait;
use uuid::Uuid;

use intake_core::{ExtractionRun, NewExtractedField};

/// Progress callback type for run handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to run handlers.
pub struct RunContext {
    /// The claimed run being executed.
    pub run: ExtractionRun,
    progress_callback: Option<ProgressCallback>,
}

impl RunContext {
    /// Create a new run context.
    pub fn new(run: ExtractionRun) -> Self {
        Self {
            run,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id
    }

    pub fn file_id(&self) -> Uuid {
        self.run.file_id
    }
}

/// Result of executing a run.
#[derive(Debug)]
pub enum RunOutcome {
    /// Validated fields to persist, in service order.
    Completed(Vec<NewExtractedField>),
    /// The run failed with an error message.
    Failed(String),
}

/// Executes a claimed extraction run.
#[async_trait]
pub trait RunHandler: Send + Sync {
    /// Execute the run. Persisting the outcome is the worker's job.
    async fn execute(&self, ctx: RunContext) -> RunOutcome;
}
