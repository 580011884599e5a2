//! OfficeConvertAdapter: converts office documents to text with LibreOffice
//! in headless mode.
//!
//! Text documents are converted straight to `txt`, spreadsheets to `csv`.
//! Presentations have no text export, so they go through PDF and `pdftotext`.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use intake_core::defaults::{ENV_LIBREOFFICE_PATH, EXTRACTION_CMD_TIMEOUT_SECS, LIBREOFFICE_BIN};
use intake_core::{Error, ParserAdapter, Result};

use super::pdf_text::pdf_to_text;
use super::run_cmd_with_timeout;

/// LibreOffice export target for a document family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Text,
    Csv,
    Pdf,
}

impl Target {
    fn filter(self) -> &'static str {
        match self {
            Target::Text => "txt:Text (encoded):UTF8",
            Target::Csv => "csv:Text - txt - csv (StarCalc):44,34,76",
            Target::Pdf => "pdf",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Target::Text => "txt",
            Target::Csv => "csv",
            Target::Pdf => "pdf",
        }
    }
}

/// Input extension and export target for a MIME type.
fn conversion_for(mime_type: &str) -> Option<(&'static str, Target)> {
    match mime_type {
        "application/msword" => Some(("doc", Target::Text)),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(("docx", Target::Text))
        }
        "application/vnd.oasis.opendocument.text" => Some(("odt", Target::Text)),
        "application/vnd.ms-excel" => Some(("xls", Target::Csv)),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            Some(("xlsx", Target::Csv))
        }
        "application/vnd.oasis.opendocument.spreadsheet" => Some(("ods", Target::Csv)),
        "application/vnd.ms-powerpoint" => Some(("ppt", Target::Pdf)),
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Some(("pptx", Target::Pdf))
        }
        _ => None,
    }
}

/// Adapter running `soffice --headless --convert-to`.
pub struct OfficeConvertAdapter {
    binary: String,
}

impl OfficeConvertAdapter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Binary from `LIBREOFFICE_PATH`, falling back to `soffice` on `PATH`.
    pub fn from_env() -> Self {
        let binary = std::env::var(ENV_LIBREOFFICE_PATH)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| LIBREOFFICE_BIN.to_string());
        Self::new(binary)
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn convert(&self, workdir: &Path, input: &Path, target: Target) -> Result<()> {
        // A private profile per conversion lets several conversions run at once.
        let profile = format!("file://{}", workdir.join("profile").display());
        run_cmd_with_timeout(
            Command::new(&self.binary)
                .arg(format!("-env:UserInstallation={}", profile))
                .arg("--headless")
                .arg("--norestore")
                .arg("--convert-to")
                .arg(target.filter())
                .arg("--outdir")
                .arg(workdir.join("out"))
                .arg(input),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await?;
        Ok(())
    }
}

impl Default for OfficeConvertAdapter {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl ParserAdapter for OfficeConvertAdapter {
    fn handles(&self, mime_type: &str) -> bool {
        conversion_for(mime_type).is_some()
    }

    async fn extract_text(&self, data: &[u8], filename: &str, mime_type: &str) -> Result<String> {
        if data.is_empty() {
            return Err(Error::ExternalService(
                "Cannot convert empty document".to_string(),
            ));
        }

        let (extension, target) = conversion_for(mime_type).ok_or_else(|| {
            Error::ExternalService(format!("Unsupported office format: {}", mime_type))
        })?;

        let workdir = tempfile::Builder::new()
            .prefix("intake-convert-")
            .tempdir()
            .map_err(|e| Error::Internal(format!("Failed to create temp dir: {}", e)))?;
        let input = workdir.path().join(format!("input.{}", extension));
        tokio::fs::write(&input, data)
            .await
            .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;

        debug!(filename, mime_type, target = ?target, "Converting with LibreOffice");
        self.convert(workdir.path(), &input, target).await?;

        let output = workdir
            .path()
            .join("out")
            .join(format!("input.{}", target.extension()));
        if !output.exists() {
            return Err(Error::ExternalService(format!(
                "LibreOffice produced no output for '{}'",
                filename
            )));
        }

        match target {
            Target::Pdf => pdf_to_text(&output.to_string_lossy(), filename).await,
            Target::Text | Target::Csv => {
                let bytes = tokio::fs::read(&output).await.map_err(|e| {
                    Error::Internal(format!("Failed to read converted file: {}", e))
                })?;
                Ok(String::from_utf8_lossy(&bytes)
                    .trim_start_matches('\u{feff}')
                    .to_string())
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => Ok(output.status.success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "office_convert"
    }
}
