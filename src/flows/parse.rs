//! Model output parsing
//!
//! Models often wrap JSON in markdown code fences:
//! ```text
//! ```json
//! {"caption": "..."}
//! ```
//! ```
//! The fences are stripped before decoding; clean JSON passes through unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::error::CaptionError;
use crate::core::model::StructuredCaption;

/// Opening fence with an optional language tag
static OPEN_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^```[A-Za-z0-9_+.-]*[ \t]*\r?\n?").expect("Invalid OPEN_FENCE_RE regex")
});

/// Closing fence at the very end of the text
static CLOSE_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?```\s*$").expect("Invalid CLOSE_FENCE_RE regex"));

/// Remove surrounding whitespace and code fences
pub fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let start = OPEN_FENCE_RE.find(text).map(|m| m.end()).unwrap_or(0);
    let text = &text[start..];
    let end = CLOSE_FENCE_RE
        .find(text)
        .map(|m| m.start())
        .unwrap_or(text.len());
    text[..end].trim()
}

/// Decode model text into a structured caption
pub fn parse_caption(raw: &str) -> Result<StructuredCaption, CaptionError> {
    let body = strip_fences(raw);
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| CaptionError::Parse {
            message: e.to_string(),
            raw: raw.to_string(),
        })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(CaptionError::Parse {
            message: format!("expected a JSON object, found {}", json_kind(&other)),
            raw: raw.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
