//! Shared utility functions.

pub mod json_extraction;

pub use json_extraction::{extract_payload, parse_payload, JsonExtractionError};
