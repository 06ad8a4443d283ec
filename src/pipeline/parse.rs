//! Defensive parsing of the backend's raw text into an [`InvoiceRecord`].
//!
//! ## Why is fence-stripping the only repair?
//!
//! Even well-prompted models occasionally wrap their output in
//! ` ```json … ``` ` fences despite the prompt saying "only the JSON".
//! That one quirk is deterministic and safe to undo. Anything beyond it —
//! prose around the object, half-finished JSON, invented field names — is
//! surfaced as `MalformedResponse` with the raw text retained, rather than
//! guessed at. A wrong amount written to an accounting record is far more
//! expensive than a failed file.

use crate::error::ExtractError;
use crate::record::InvoiceRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*\n?(.*?)\n?```\s*$").unwrap());

/// Strip one optional outer code fence (with optional `json` tag) and trim.
fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(caps) = RE_CODE_FENCE.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    // Lone leading or trailing fence, e.g. from a truncated response.
    let s = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

/// Parse raw backend text into a validated [`InvoiceRecord`].
///
/// # Errors
/// `MalformedResponse` when the text is not a single JSON object carrying
/// every extraction field. The offending raw text rides along in the error.
pub fn parse_response(raw: &str) -> Result<InvoiceRecord, ExtractError> {
    let cleaned = strip_code_fence(raw);

    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| ExtractError::MalformedResponse {
            detail: format!("JSON parse failed: {e}"),
            raw: raw.to_string(),
        })?;

    InvoiceRecord::from_value(value).map_err(|detail| ExtractError::MalformedResponse {
        detail,
        raw: raw.to_string(),
    })
}
