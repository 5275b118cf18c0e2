//! sonar-gatekeeper: quality-gate remediation pipeline.
//!
//! Reads a project's quality gate and open issues from SonarQube, has a
//! language model triage them and propose patches, runs the project's own
//! checks against the result, and renders a pull request style report.

pub mod agents;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod sonar;
pub mod telemetry;
pub mod utils;

// Re-export commonly used error types
pub use config::ConfigError;
pub use error::{LlmError, SonarError, TokenError};
