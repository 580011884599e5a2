//! Integration tests for the extraction worker, orchestrator and sweeper.
//!
//! Each test gets its own SQLite database in a temporary directory. The
//! parser and the AI service are replaced by in-process stubs so runs are
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intake_core::{
    CandidateField, DocumentParser, Error, ExtractionRequest, ExtractionRun, FieldExtractor,
    Result, RunStatus,
};
use intake_db::test_fixtures::TestDatabase;
use intake_db::{Database, LEASE_EXPIRED_ERROR, QUEUE_TIMEOUT_ERROR};
use intake_inference::PromptLibrary;
use intake_jobs::{
    ExtractionHandler, ExtractionOrchestrator, JobWorker, Sweeper, SweeperConfig, WorkerConfig,
    WorkerEvent, WorkerHandle,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

const AD_PROMPTS: &str = r#"
domains:
  - class: airworthiness_directive
    keywords: ["airworthiness directive", "ad-"]
    prompt: "Extract doc_number."
"#;

// ============================================================================
// STUB COLLABORATORS
// ============================================================================

struct StubParser {
    result: std::result::Result<String, String>,
}

impl StubParser {
    fn text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
        })
    }

    fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(msg.to_string()),
        })
    }
}

#[async_trait]
impl DocumentParser for StubParser {
    async fn parse(&self, _data: &[u8], _filename: &str, _mime_type: &str) -> Result<String> {
        self.result.clone().map_err(Error::ExternalService)
    }
}

struct StubExtractor {
    fields: serde_json::Value,
    delay: Duration,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl StubExtractor {
    fn returning(fields: serde_json::Value) -> Arc<Self> {
        Self::slow(fields, Duration::ZERO)
    }

    fn slow(fields: serde_json::Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fields,
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FieldExtractor for StubExtractor {
    async fn extract_fields(&self, request: &ExtractionRequest) -> Result<Vec<CandidateField>> {
        self.requests.lock().await.push(request.clone());
        sleep(self.delay).await;
        Ok(serde_json::from_value(self.fields.clone())?)
    }

    fn model_name(&self) -> &str {
        "stub"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Uses the filename as the document text.
struct FilenameParser;

#[async_trait]
impl DocumentParser for FilenameParser {
    async fn parse(&self, _data: &[u8], filename: &str, _mime_type: &str) -> Result<String> {
        Ok(filename.to_string())
    }
}

/// Holds documents whose text mentions "slow" for `delay`, answers the rest
/// immediately.
struct SelectiveExtractor {
    fields: serde_json::Value,
    delay: Duration,
}

#[async_trait]
impl FieldExtractor for SelectiveExtractor {
    async fn extract_fields(&self, request: &ExtractionRequest) -> Result<Vec<CandidateField>> {
        if request.document_text.contains("slow") {
            sleep(self.delay).await;
        }
        Ok(serde_json::from_value(self.fields.clone())?)
    }

    fn model_name(&self) -> &str {
        "stub"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

fn doc_number_field() -> serde_json::Value {
    serde_json::json!([{
        "fieldCode": "doc_number",
        "value": "DOC-2026-001",
        "valueType": "string",
        "confidence": 0.95,
        "provenance": "page 1, header"
    }])
}

// ============================================================================
// HELPERS
// ============================================================================

fn start_worker(
    db: &Database,
    orchestrator: &ExtractionOrchestrator,
    parser: Arc<dyn DocumentParser>,
    extractor: Arc<dyn FieldExtractor>,
    config: WorkerConfig,
) -> WorkerHandle {
    let prompts = Arc::new(PromptLibrary::from_yaml_str(AD_PROMPTS).unwrap());
    let handler = ExtractionHandler::new(db.clone(), parser, extractor, prompts);
    JobWorker::new(db.clone(), config, Arc::new(handler))
        .with_wake(orchestrator.wake_handle())
        .start()
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default().with_poll_interval(50)
}

/// Poll until the run leaves `running`.
async fn wait_for_terminal(db: &Database, run_id: Uuid, timeout_secs: u64) -> ExtractionRun {
    let start = std::time::Instant::now();
    loop {
        let run = db.runs.get(run_id).await.expect("run should exist");
        if run.status.is_terminal() {
            return run;
        }
        assert!(
            start.elapsed().as_secs() < timeout_secs,
            "run {} still running after {}s",
            run_id,
            timeout_secs
        );
        sleep(Duration::from_millis(50)).await;
    }
}

async fn run_count(db: &Database) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM extraction_run")
        .fetch_one(db.pool())
        .await
        .unwrap()
}

// ============================================================================
// WORKER
// ============================================================================

#[tokio::test]
async fn test_airworthiness_directive_end_to_end() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());

    let file = test_db.upload_pdf("AD-2026-114.pdf").await;
    let run = orchestrator.start_extraction(file.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());

    let extractor = StubExtractor::returning(doc_number_field());
    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("AIRWORTHINESS DIRECTIVE\nDOC-2026-001"),
        extractor.clone(),
        fast_config(),
    );

    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.error.is_none());

    let detail = orchestrator.get_extraction(run.id).await.unwrap();
    assert_eq!(detail.fields.len(), 1);
    let field = &detail.fields[0];
    assert_eq!(field.field_code, "doc_number");
    assert_eq!(field.value, "DOC-2026-001");
    assert_eq!(field.confidence, 0.95);
    assert_eq!(field.provenance, "page 1, header");

    let requests = extractor.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].domain_prompt.as_deref(),
        Some("Extract doc_number.")
    );
    assert!(requests[0].document_text.contains("DOC-2026-001"));
    drop(requests);

    let draft = db.drafts.materialize(file.id).await.unwrap();
    assert_eq!(draft.payload.source_file_name, "AD-2026-114.pdf");
    assert_eq!(draft.payload.extraction_run_id, run.id);
    assert_eq!(draft.payload.fields.len(), 1);
    assert_eq!(draft.payload.fields[0].value, "DOC-2026-001");

    handle.shutdown().await.unwrap();
    handle.join().await;
}

#[tokio::test]
async fn test_malformed_field_fails_run() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    let fields = serde_json::json!([
        {"fieldCode": "doc_number", "value": "DOC-2026-001", "confidence": 0.95},
        {"fieldCode": "effective_date", "value": "sometime in May", "valueType": "date", "confidence": 0.7}
    ]);
    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::returning(fields),
        fast_config(),
    );

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Failed);
    assert!(done.completed_at.is_some());
    let error = done.error.unwrap();
    assert!(error.contains("effective_date"), "{}", error);

    // A failed run stores no fields.
    assert!(db.fields.list_for_run(run.id).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_parser_failure_fails_run() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("scan.pdf").await;

    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::failing("pdftotext exploded"),
        StubExtractor::returning(doc_number_field()),
        fast_config(),
    );

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Failed);
    assert!(done.error.unwrap().contains("pdftotext exploded"));

    // Apply still refuses: the only run failed.
    let err = db.drafts.materialize(file.id).await.unwrap_err();
    assert!(matches!(err, Error::NoCompletedExtraction(_)));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_document_text_fails_run() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("blank.pdf").await;

    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("  \n "),
        StubExtractor::returning(doc_number_field()),
        fast_config(),
    );

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Failed);
    assert!(done.error.unwrap().contains("no extractable text"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_timeout_fails_run() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::slow(doc_number_field(), Duration::from_secs(30)),
        fast_config().with_run_timeout(Duration::from_millis(300)),
    );

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Failed);
    assert!(done.error.unwrap().contains("timeout"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_heartbeat_keeps_slow_run_alive() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    // The run takes several lease lengths; renewals must keep it alive while
    // the sweeper keeps looking for expired leases.
    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::slow(doc_number_field(), Duration::from_millis(1500)),
        fast_config().with_lease(Duration::from_millis(600)),
    );
    let sweeper = Sweeper::new(db.clone(), SweeperConfig::default());

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    for _ in 0..15 {
        let report = sweeper.sweep_once().await;
        assert_eq!(report.expired_leases, 0);
        sleep(Duration::from_millis(100)).await;
    }

    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Completed);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_worker_broadcasts_events() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::returning(doc_number_field()),
        fast_config(),
    );
    let mut events = handle.events();

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    wait_for_terminal(&db, run.id, 10).await;

    let mut started = false;
    let mut progressed = false;
    let mut completed = None;
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
        match event {
            WorkerEvent::RunStarted { run_id, file_id } => {
                assert_eq!(run_id, run.id);
                assert_eq!(file_id, file.id);
                started = true;
            }
            WorkerEvent::RunProgress { run_id, .. } => {
                assert_eq!(run_id, run.id);
                progressed = true;
            }
            WorkerEvent::RunCompleted {
                run_id,
                field_count,
            } => {
                assert_eq!(run_id, run.id);
                completed = Some(field_count);
                break;
            }
            _ => {}
        }
    }
    assert!(started, "RunStarted should be broadcast");
    assert!(progressed, "RunProgress should be broadcast");
    assert_eq!(completed, Some(1));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_worker_leaves_run_queued() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::returning(doc_number_field()),
        fast_config().with_enabled(false),
    );

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(db.runs.get(run.id).await.unwrap().status, RunStatus::Running);
    assert_eq!(db.runs.pending_count().await.unwrap(), 1);

    // A disabled worker has no loop listening for shutdown.
    let _ = handle.shutdown().await;
}

#[tokio::test]
async fn test_queued_run_survives_restart() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    // First worker is stopped before the run is queued.
    let first = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::returning(doc_number_field()),
        fast_config(),
    );
    first.shutdown().await.unwrap();
    first.join().await;

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(db.runs.get(run.id).await.unwrap().status, RunStatus::Running);

    let second = start_worker(
        &db,
        &ExtractionOrchestrator::new(db.clone()),
        StubParser::text("text"),
        StubExtractor::returning(doc_number_field()),
        fast_config(),
    );
    let done = wait_for_terminal(&db, run.id, 10).await;
    assert_eq!(done.status, RunStatus::Completed);

    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_new_run_wakes_idle_worker() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    // With a one-minute poll only the wake-up can start the run in time.
    let handle = start_worker(
        &db,
        &orchestrator,
        StubParser::text("text"),
        StubExtractor::returning(doc_number_field()),
        WorkerConfig::default().with_poll_interval(60_000),
    );
    sleep(Duration::from_millis(200)).await;

    let run = orchestrator.start_extraction(file.id).await.unwrap();
    let done = wait_for_terminal(&db, run.id, 5).await;
    assert_eq!(done.status, RunStatus::Completed);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_free_slot_is_refilled_while_slow_run_continues() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let orchestrator = ExtractionOrchestrator::new(db.clone());

    let slow_file = test_db.upload_pdf("slow.pdf").await;
    let slow_run = orchestrator.start_extraction(slow_file.id).await.unwrap();
    let mut quick_runs = Vec::new();
    for name in ["first.pdf", "second.pdf", "third.pdf"] {
        let file = test_db.upload_pdf(name).await;
        quick_runs.push(orchestrator.start_extraction(file.id).await.unwrap().id);
    }

    let handle = start_worker(
        &db,
        &orchestrator,
        Arc::new(FilenameParser),
        Arc::new(SelectiveExtractor {
            fields: doc_number_field(),
            delay: Duration::from_secs(5),
        }),
        fast_config().with_max_concurrent(2),
    );

    // Two slots: the slow run holds one, the quick runs take turns in the other.
    for run_id in quick_runs {
        let done = wait_for_terminal(&db, run_id, 3).await;
        assert_eq!(done.status, RunStatus::Completed);
    }
    let slow = db.runs.get(slow_run.id).await.unwrap();
    assert_eq!(slow.status, RunStatus::Running);

    let done = wait_for_terminal(&db, slow_run.id, 10).await;
    assert_eq!(done.status, RunStatus::Completed);
    handle.shutdown().await.unwrap();
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

#[tokio::test]
async fn test_start_extraction_unknown_file_creates_no_run() {
    let test_db = TestDatabase::new().await;
    let orchestrator = ExtractionOrchestrator::new(test_db.db.clone());

    let err = orchestrator
        .start_extraction(Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(run_count(&test_db.db).await, 0);
}

#[tokio::test]
async fn test_start_extraction_deleted_file_creates_no_run() {
    let test_db = TestDatabase::new().await;
    let orchestrator = ExtractionOrchestrator::new(test_db.db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;
    test_db.db.files.delete(file.id).await.unwrap();

    let err = orchestrator.start_extraction(file.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(run_count(&test_db.db).await, 0);
}

#[tokio::test]
async fn test_admission_limit_rejects_new_runs() {
    let test_db = TestDatabase::new().await;
    let orchestrator = ExtractionOrchestrator::new(test_db.db.clone()).with_max_pending(2);
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    orchestrator.start_extraction(file.id).await.unwrap();
    orchestrator.start_extraction(file.id).await.unwrap();
    let err = orchestrator.start_extraction(file.id).await.unwrap_err();
    assert!(matches!(err, Error::Overloaded(_)));
    assert_eq!(run_count(&test_db.db).await, 2);

    // A claimed run no longer counts against the limit.
    test_db
        .db
        .runs
        .claim_next(Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    orchestrator.start_extraction(file.id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_respect_admission_limit() {
    let test_db = TestDatabase::new().await;
    let orchestrator = ExtractionOrchestrator::new(test_db.db.clone()).with_max_pending(3);
    let file_id = test_db.upload_pdf("AD-2026-114.pdf").await.id;

    let mut starts = tokio::task::JoinSet::new();
    for _ in 0..12 {
        let orchestrator = orchestrator.clone();
        starts.spawn(async move { orchestrator.start_extraction(file_id).await });
    }

    let mut admitted = 0;
    let mut rejected = 0;
    while let Some(result) = starts.join_next().await {
        match result.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::Overloaded(_)) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(admitted, 3);
    assert_eq!(rejected, 9);
    assert_eq!(run_count(&test_db.db).await, 3);
}

#[tokio::test]
async fn test_list_extractions_newest_first() {
    let test_db = TestDatabase::new().await;
    let orchestrator = ExtractionOrchestrator::new(test_db.db.clone());
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    let first = orchestrator.start_extraction(file.id).await.unwrap();
    let second = orchestrator.start_extraction(file.id).await.unwrap();

    let runs = orchestrator.list_extractions(file.id).await.unwrap();
    let ids: Vec<Uuid> = runs.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let err = orchestrator
        .list_extractions(Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_get_extraction_unknown_run_is_not_found() {
    let test_db = TestDatabase::new().await;
    let orchestrator = ExtractionOrchestrator::new(test_db.db.clone());
    let err = orchestrator
        .get_extraction(Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ============================================================================
// SWEEPER
// ============================================================================

#[tokio::test]
async fn test_sweeper_fails_expired_lease() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;
    let run = db.runs.create(file.id).await.unwrap();

    // Claimed by a worker that then vanished.
    db.runs
        .claim_next(Duration::from_millis(1))
        .await
        .unwrap()
        .unwrap();
    sleep(Duration::from_millis(20)).await;

    let sweeper = Sweeper::new(db.clone(), SweeperConfig::default());
    let report = sweeper.sweep_once().await;
    assert_eq!(report.expired_leases, 1);

    let failed = db.runs.get(run.id).await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(LEASE_EXPIRED_ERROR));
    assert!(failed.completed_at.is_some());

    // A late completion from the vanished worker is rejected.
    let err = db.runs.complete(run.id, &[]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn test_sweeper_fails_stale_queued_run() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;
    let run = db.runs.create(file.id).await.unwrap();
    sleep(Duration::from_millis(20)).await;

    let sweeper = Sweeper::new(
        db.clone(),
        SweeperConfig::default().with_queue_timeout(Duration::from_millis(10)),
    );
    let report = sweeper.sweep_once().await;
    assert_eq!(report.queue_timeouts, 1);

    let failed = db.runs.get(run.id).await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some(QUEUE_TIMEOUT_ERROR));
}

#[tokio::test]
async fn test_sweeper_reclaims_soft_deleted_files() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;

    sqlx::query("UPDATE stored_file SET status = 'deleted', deleted_at = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(file.id)
        .execute(db.pool())
        .await
        .unwrap();
    assert_eq!(test_db.stored_object_count(), 1);

    let sweeper = Sweeper::new(db.clone(), SweeperConfig::default());
    let report = sweeper.sweep_once().await;
    assert_eq!(report.reclaimed_files, 1);
    assert_eq!(test_db.stored_object_count(), 0);

    assert!(sweeper.sweep_once().await.is_empty());
}

#[tokio::test]
async fn test_sweeper_leaves_healthy_runs_alone() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;
    let queued = db.runs.create(file.id).await.unwrap();
    let claimed = db.runs.create(file.id).await.unwrap();
    db.runs
        .claim_next(Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    let report = Sweeper::new(db.clone(), SweeperConfig::default())
        .sweep_once()
        .await;
    assert!(report.is_empty());
    assert_eq!(db.runs.get(queued.id).await.unwrap().status, RunStatus::Running);
    assert_eq!(db.runs.get(claimed.id).await.unwrap().status, RunStatus::Running);
}

#[tokio::test]
async fn test_sweeper_start_and_shutdown() {
    let test_db = TestDatabase::new().await;
    let db = test_db.db.clone();
    let file = test_db.upload_pdf("AD-2026-114.pdf").await;
    let run = db.runs.create(file.id).await.unwrap();
    db.runs
        .claim_next(Duration::from_millis(1))
        .await
        .unwrap()
        .unwrap();
    sleep(Duration::from_millis(20)).await;

    let handle = Sweeper::new(
        db.clone(),
        SweeperConfig::default().with_interval(Duration::from_millis(50)),
    )
    .start();

    let done = wait_for_terminal(&db, run.id, 5).await;
    assert_eq!(done.error.as_deref(), Some(LEASE_EXPIRED_ERROR));

    handle.shutdown().await.unwrap();
}
