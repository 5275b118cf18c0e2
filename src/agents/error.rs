//! Error types for the remediation pipeline stages.

use thiserror::Error;

use crate::error::{LlmError, SonarError};

/// Errors that abort a pipeline stage.
///
/// Only load-bearing failures surface here. Model output that cannot be
/// parsed and failing verification checks are recorded in the stage results
/// instead.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The quality-gate service rejected or failed a collector request.
    #[error("Collector failed: {0}")]
    Collector(#[from] SonarError),

    /// The reasoning service failed where no fallback exists.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Stage inputs are unusable (e.g. the project root is not a directory).
    #[error("Agent configuration error: {0}")]
    Config(String),

    /// A stage could not prepare its input.
    #[error("Pipeline stage '{stage}' failed: {reason}")]
    Stage { stage: String, reason: String },
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl AgentError {
    pub fn stage(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        AgentError::Stage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
