//! PdfText parser adapter: text layer extraction with `pdftotext` (poppler-utils).

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use intake_core::defaults::{EXTRACTION_CMD_TIMEOUT_SECS, PDF_BATCH_PAGES, PDF_LARGE_PAGE_THRESHOLD};
use intake_core::{Error, ParserAdapter, Result};

use super::run_cmd_with_timeout;

/// Adapter for extracting text from PDF files using `pdftotext`.
///
/// For large PDFs extraction is batched in page ranges to bound memory
/// usage. Each `pdftotext` invocation is guarded by a per-command timeout.
pub struct PdfTextAdapter;

/// Page count from `pdfinfo` output, 0 when absent.
fn parse_page_count(pdfinfo_output: &str) -> usize {
    pdfinfo_output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("pages"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Write bytes to a named temporary file. The file is removed on drop.
async fn write_temp(data: &[u8], suffix: &str) -> Result<NamedTempFile> {
    let tmpfile = tempfile::Builder::new()
        .prefix("intake-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| Error::Internal(format!("Failed to create temp file: {}", e)))?;
    tokio::fs::write(tmpfile.path(), data)
        .await
        .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;
    Ok(tmpfile)
}

/// Run `pdftotext` over a PDF on disk, batching large documents.
pub(crate) async fn pdf_to_text(path: &str, filename: &str) -> Result<String> {
    let pages = match run_cmd_with_timeout(
        Command::new("pdfinfo").arg(path),
        EXTRACTION_CMD_TIMEOUT_SECS,
    )
    .await
    {
        Ok(output) => parse_page_count(&output),
        Err(e) => {
            warn!(filename, error = %e, "pdfinfo failed, extracting without page count");
            0
        }
    };

    if pages > PDF_LARGE_PAGE_THRESHOLD {
        debug!(filename, pages, "Large PDF detected, extracting in batches");
        let mut chunks = Vec::new();
        let mut start = 1usize;
        while start <= pages {
            let end = (start + PDF_BATCH_PAGES - 1).min(pages);
            let chunk = run_cmd_with_timeout(
                Command::new("pdftotext")
                    .arg("-layout")
                    .arg("-f")
                    .arg(start.to_string())
                    .arg("-l")
                    .arg(end.to_string())
                    .arg(path)
                    .arg("-"),
                EXTRACTION_CMD_TIMEOUT_SECS,
            )
            .await?;
            chunks.push(chunk);
            start = end + 1;
        }
        Ok(chunks.join(""))
    } else {
        run_cmd_with_timeout(
            Command::new("pdftotext").arg("-layout").arg(path).arg("-"),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await
    }
}

#[async_trait]
impl ParserAdapter for PdfTextAdapter {
    fn handles(&self, mime_type: &str) -> bool {
        mime_type == "application/pdf"
    }

    async fn extract_text(&self, data: &[u8], filename: &str, _mime_type: &str) -> Result<String> {
        if data.is_empty() {
            return Err(Error::ExternalService(
                "Cannot extract text from empty PDF data".to_string(),
            ));
        }

        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::ExternalService(format!(
                "File '{}' is not a valid PDF (missing %PDF header)",
                filename
            )));
        }

        // pdftotext reads from a file path
        let tmpfile = write_temp(data, ".pdf").await?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        pdf_to_text(&tmp_path, filename).await
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            Ok(output) => {
                // pdftotext -v exits with 0 or 99 depending on the version.
                Ok(output.status.success() || output.status.code() == Some(99))
            }
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}
