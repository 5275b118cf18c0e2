//! Structured payload extraction from free-form model output.
//!
//! Models asked for JSON frequently wrap it in a markdown fence or surround it
//! with prose. [`extract_payload`] isolates the candidate payload: the body of
//! the first fenced block if there is one, otherwise the whole trimmed text.
//! [`parse_payload`] then decodes it with `serde_json`.
//!
//! Callers decide what a failure means; every stage has its own deterministic
//! fallback and none of them propagate [`JsonExtractionError`].
//!
//! ```
//! use sonar_gatekeeper::utils::json_extraction::extract_payload;
//!
//! let text = "Here you go:\n```json\n{\"ok\": true}\n```";
//! assert_eq!(extract_payload(text), "{\"ok\": true}");
//! assert_eq!(extract_payload("  [1, 2]  "), "[1, 2]");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Error type for payload extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("Model output is empty")]
    Empty,
    #[error("Model output is not valid JSON: {reason}. Content starts with: '{content_preview}'")]
    Invalid {
        reason: String,
        content_preview: String,
    },
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

/// Extract the candidate payload from `text`.
///
/// Returns the trimmed body of the first fenced code block (optionally tagged
/// `json`), or the trimmed text when no complete fence exists.
pub fn extract_payload(text: &str) -> &str {
    let body = fence_regex()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1));
    match body {
        Some(body) => body.as_str().trim(),
        None => text.trim(),
    }
}

/// Extract and decode a payload of type `T` from `text`.
///
/// # Errors
///
/// - [`JsonExtractionError::Empty`] when nothing remains after extraction
/// - [`JsonExtractionError::Invalid`] when the payload does not decode as `T`
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, JsonExtractionError> {
    let payload = extract_payload(text);
    if payload.is_empty() {
        return Err(JsonExtractionError::Empty);
    }

    serde_json::from_str(payload).map_err(|e| JsonExtractionError::Invalid {
        reason: e.to_string(),
        content_preview: preview(payload, 80),
    })
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
