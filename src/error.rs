//! Error types for sonar-gatekeeper operations.
//!
//! Defines the error types shared across subsystems:
//! - Quality-gate service requests
//! - Token resolution and generation
//! - Reasoning service (LLM) interactions

use thiserror::Error;

/// Errors returned by the quality-gate service client.
#[derive(Debug, Error)]
pub enum SonarError {
    /// The service answered with a non-2xx status.
    #[error("{message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },

    /// The request never produced a response (DNS, connect, timeout).
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// The response body did not match the expected shape.
    #[error("Failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
}

impl SonarError {
    /// HTTP status for API errors, `None` for transport or decode failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            SonarError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Endpoint path the failing request targeted, when known.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            SonarError::Api { endpoint, .. }
            | SonarError::Request { endpoint, .. }
            | SonarError::Decode { endpoint, .. } => Some(endpoint),
            SonarError::InvalidUrl(_) => None,
        }
    }
}

/// Errors that can occur while resolving an access token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to generate SonarQube token (HTTP {status}): {body}")]
    GenerationFailed { status: u16, body: String },

    #[error("SonarQube API did not return a token")]
    MissingToken,

    #[error("Token request failed: {0}")]
    RequestFailed(String),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,
}
