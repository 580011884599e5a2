//! Data model for the document intake pipeline.
//!
//! All JSON representations use camelCase keys. Status enums serialize as
//! lowercase strings and round-trip through `Display`/`FromStr`, which is
//! also how they are stored in the database.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// FILE REGISTRY
// =============================================================================

/// Lifecycle status of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Registered and available.
    Pending,
    /// Soft-deleted; invisible to every read path, awaiting reclaim.
    Deleted,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid file status: {}", s)),
        }
    }
}

/// A registered upload.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: Uuid,
    pub original_name: String,
    /// Storage key inside the content directory (`{id}_{sanitizedName}`).
    pub stored_path: String,
    pub mime: String,
    pub size_bytes: i64,
    /// Lowercase hex SHA-256 of the full content.
    pub sha256: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// EXTRACTION RUNS
// =============================================================================

/// Status of an extraction run.
///
/// `Running` is the only non-terminal state; a run leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

/// One asynchronous extraction attempt against a stored file.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRun {
    pub id: Uuid,
    pub file_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// A run together with the fields it produced.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDetail {
    pub run: ExtractionRun,
    pub fields: Vec<ExtractedField>,
}

// =============================================================================
// FIELD STORE
// =============================================================================

/// Declared type of an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Date,
    Enum,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Enum => write!(f, "enum"),
        }
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" | "text" => Ok(Self::String),
            "number" | "numeric" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "enum" | "choice" => Ok(Self::Enum),
            _ => Err(format!("Invalid value type: {}", s)),
        }
    }
}

/// A persisted field value produced by a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub id: Uuid,
    pub run_id: Uuid,
    pub field_code: String,
    pub value: String,
    pub value_type: ValueType,
    pub confidence: f64,
    pub provenance: String,
}

/// A validated value, typed at the AI service boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Enum(String),
}

impl FieldValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Text(_) => ValueType::String,
            Self::Number(_) => ValueType::Number,
            Self::Date(_) => ValueType::Date,
            Self::Enum(_) => ValueType::Enum,
        }
    }

    /// Canonical text form stored in the field store.
    pub fn to_stored(&self) -> String {
        match self {
            Self::Text(s) | Self::Enum(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// A field accepted for persistence, not yet assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExtractedField {
    pub field_code: String,
    pub value: FieldValue,
    pub confidence: f64,
    pub provenance: String,
}

/// A field exactly as the AI extraction service returned it.
///
/// Nothing here is trusted; [`CandidateField::validate`] turns it into a
/// [`NewExtractedField`] or rejects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateField {
    #[serde(alias = "field_code", alias = "code")]
    pub field_code: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, alias = "value_type", alias = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub provenance: Option<String>,
    /// Allowed values when `value_type` is `enum`.
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

impl CandidateField {
    /// Validate a candidate into a typed field.
    ///
    /// Rejects empty codes, confidence outside `[0, 1]`, non-finite numbers,
    /// non-ISO dates and enum values outside the declared options.
    pub fn validate(self) -> Result<NewExtractedField> {
        let field_code = self.field_code.trim().to_string();
        if field_code.is_empty() || field_code.chars().any(char::is_whitespace) {
            return Err(Error::Validation(format!(
                "invalid field code: {:?}",
                self.field_code
            )));
        }

        let confidence = self.confidence.ok_or_else(|| {
            Error::Validation(format!("field {}: missing confidence", field_code))
        })?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(Error::Validation(format!(
                "field {}: confidence {} outside [0, 1]",
                field_code, confidence
            )));
        }

        let declared = match self.value_type.as_deref() {
            Some(t) => Some(
                t.parse::<ValueType>()
                    .map_err(|e| Error::Validation(format!("field {}: {}", field_code, e)))?,
            ),
            None => None,
        };

        let value = typed_value(&field_code, declared, self.value, self.options.as_deref())?;

        Ok(NewExtractedField {
            field_code,
            value,
            confidence,
            provenance: self.provenance.unwrap_or_default().trim().to_string(),
        })
    }
}

fn typed_value(
    code: &str,
    declared: Option<ValueType>,
    raw: serde_json::Value,
    options: Option<&[String]>,
) -> Result<FieldValue> {
    use serde_json::Value;

    let invalid = |msg: String| Error::Validation(format!("field {}: {}", code, msg));

    match (declared, raw) {
        (_, Value::Null) => Err(invalid("missing value".to_string())),
        (Some(ValueType::Number) | None, Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(FieldValue::Number)
            .ok_or_else(|| invalid(format!("non-finite number {}", n))),
        (Some(ValueType::Number), Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(FieldValue::Number)
            .ok_or_else(|| invalid(format!("not a number: {:?}", s))),
        (Some(ValueType::Date), Value::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(FieldValue::Date)
            .map_err(|_| invalid(format!("not an ISO date: {:?}", s))),
        (Some(ValueType::Enum), Value::String(s)) => {
            let s = s.trim().to_string();
            if s.is_empty() {
                return Err(invalid("empty enum value".to_string()));
            }
            if let Some(opts) = options {
                if !opts.iter().any(|o| o == &s) {
                    return Err(invalid(format!("{:?} is not one of {:?}", s, opts)));
                }
            }
            Ok(FieldValue::Enum(s))
        }
        (Some(ValueType::String) | None, Value::String(s)) => Ok(FieldValue::Text(s)),
        (Some(ValueType::String), Value::Number(n)) => Ok(FieldValue::Text(n.to_string())),
        (declared, other) => Err(invalid(format!(
            "value {} does not match type {}",
            other,
            declared.map(|t| t.to_string()).unwrap_or_else(|| "any".to_string())
        ))),
    }
}

// =============================================================================
// DRAFTS
// =============================================================================

/// Status of a staged draft record.
///
/// Only `Draft` is produced; the other states are recognized when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Draft,
    Confirmed,
    Discarded,
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

impl std::str::FromStr for DraftStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "confirmed" => Ok(Self::Confirmed),
            "discarded" => Ok(Self::Discarded),
            _ => Err(format!("Invalid draft status: {}", s)),
        }
    }
}

/// One field copied into a draft payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DraftField {
    pub field_code: String,
    pub value: String,
    pub confidence: f64,
    pub provenance: String,
}

impl From<&ExtractedField> for DraftField {
    fn from(f: &ExtractedField) -> Self {
        Self {
            field_code: f.field_code.clone(),
            value: f.value.clone(),
            confidence: f.confidence,
            provenance: f.provenance.clone(),
        }
    }
}

/// Immutable snapshot stored with a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DraftPayload {
    pub source_file_name: String,
    pub extraction_run_id: Uuid,
    pub fields: Vec<DraftField>,
}

/// A staged business record materialized from a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DraftRecord {
    pub id: Uuid,
    pub file_id: Uuid,
    pub extraction_run_id: Uuid,
    pub status: DraftStatus,
    pub payload: DraftPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
