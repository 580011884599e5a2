//! Parsing of raw model output into candidate fields.
//!
//! Even with `format: "json"` some models wrap their answer in a code fence
//! or emit a `<think>` block first. The raw text is cleaned before parsing,
//! and both `{"fields": [...]}` and a bare array are accepted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use intake_core::{CandidateField, Error, Result};

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<think(?:ing)?>.*?</think(?:ing)?>").expect("static regex")
});

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").expect("static regex")
});

#[derive(Deserialize)]
struct FieldsEnvelope {
    fields: Vec<CandidateField>,
}

/// Strip reasoning blocks and a surrounding code fence.
pub fn clean_model_output(raw: &str) -> String {
    let without_think = THINK_BLOCK.replace_all(raw, "");
    let trimmed = without_think.trim();
    match CODE_FENCE.captures(trimmed) {
        Some(caps) => caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        None => trimmed.to_string(),
    }
}

/// Parse model output into candidate fields.
///
/// Accepts `{"fields": [...]}`, a bare array, or an object wrapping a single
/// array under another key. Anything else is an `ExternalService` error,
/// which fails the run.
pub fn parse_candidate_fields(raw: &str) -> Result<Vec<CandidateField>> {
    let cleaned = clean_model_output(raw);
    if cleaned.is_empty() {
        return Err(Error::ExternalService(
            "AI service returned an empty response".to_string(),
        ));
    }

    let direct_err = match serde_json::from_str::<FieldsEnvelope>(&cleaned) {
        Ok(envelope) => return Ok(envelope.fields),
        Err(e) => e,
    };

    if let Ok(fields) = serde_json::from_str::<Vec<CandidateField>>(&cleaned) {
        return Ok(fields);
    }

    if let Ok(obj) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&cleaned) {
        let arrays: Vec<&serde_json::Value> = obj.values().filter(|v| v.is_array()).collect();
        if let [only] = arrays.as_slice() {
            if let Ok(fields) = serde_json::from_value::<Vec<CandidateField>>((*only).clone()) {
                return Ok(fields);
            }
        }
    }

    Err(Error::ExternalService(format!(
        "AI response is not a field list: {}",
        direct_err
    )))
}
