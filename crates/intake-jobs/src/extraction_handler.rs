//! ExtractionHandler: load file → parse → classify → AI extraction → validate.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use intake_core::{
    CandidateField, DocumentParser, FieldExtractor, NewExtractedField, Result,
};
use intake_db::Database;
use intake_inference::PromptLibrary;

use crate::handler::{RunContext, RunHandler, RunOutcome};

/// Runs the extraction pipeline for one stored file.
pub struct ExtractionHandler {
    db: Database,
    parser: Arc<dyn DocumentParser>,
    extractor: Arc<dyn FieldExtractor>,
    prompts: Arc<PromptLibrary>,
}

impl ExtractionHandler {
    pub fn new(
        db: Database,
        parser: Arc<dyn DocumentParser>,
        extractor: Arc<dyn FieldExtractor>,
        prompts: Arc<PromptLibrary>,
    ) -> Self {
        Self {
            db,
            parser,
            extractor,
            prompts,
        }
    }
}

/// Validate every candidate. One malformed field rejects the whole batch.
pub fn validate_candidates(candidates: Vec<CandidateField>) -> Result<Vec<NewExtractedField>> {
    candidates.into_iter().map(CandidateField::validate).collect()
}

#[async_trait]
impl RunHandler for ExtractionHandler {
    async fn execute(&self, ctx: RunContext) -> RunOutcome {
        let start = Instant::now();
        let run_id = ctx.run_id();
        let file_id = ctx.file_id();

        ctx.report_progress(10, Some("Loading file"));
        let (data, file) = match self.db.files.download_file(file_id).await {
            Ok(loaded) => loaded,
            Err(e) => return RunOutcome::Failed(format!("Failed to load file: {}", e)),
        };

        ctx.report_progress(25, Some("Parsing document"));
        let text = match self
            .parser
            .parse(&data, &file.original_name, &file.mime)
            .await
        {
            Ok(text) => text,
            Err(e) => return RunOutcome::Failed(format!("Failed to parse document: {}", e)),
        };
        if text.trim().is_empty() {
            return RunOutcome::Failed("Document contains no extractable text".to_string());
        }

        ctx.report_progress(40, Some("Classifying document"));
        let request = self.prompts.build_request(&file.original_name, &text);

        ctx.report_progress(50, Some("Extracting fields"));
        let candidates = match self.extractor.extract_fields(&request).await {
            Ok(candidates) => candidates,
            Err(e) => return RunOutcome::Failed(format!("AI extraction failed: {}", e)),
        };

        ctx.report_progress(90, Some("Validating fields"));
        let fields = match validate_candidates(candidates) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "extraction_handler",
                    run_id = %run_id,
                    error = %e,
                    "AI service returned a malformed field"
                );
                return RunOutcome::Failed(format!("Invalid field from AI service: {}", e));
            }
        };

        info!(
            subsystem = "jobs",
            component = "extraction_handler",
            op = "execute",
            run_id = %run_id,
            file_id = %file_id,
            model = self.extractor.model_name(),
            domain_prompt = request.domain_prompt.is_some(),
            field_count = fields.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction pipeline finished"
        );
        ctx.report_progress(100, Some("Done"));
        RunOutcome::Completed(fields)
    }
}
