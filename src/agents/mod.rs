//! Pipeline stages and the orchestrator that sequences them.
//!
//! - [`collector`]: quality gate, open issues and rule details
//! - [`triage`]: model-driven grouping and prioritization
//! - [`fix`]: per-file patch proposals
//! - [`verifier`]: external check commands
//! - [`reporter`]: pull request narrative
//! - [`orchestrator`]: the state machine tying them together
//! - [`report`]: final markdown rendering

pub mod collector;
pub mod error;
pub mod fix;
pub mod orchestrator;
pub mod patch;
pub mod report;
pub mod reporter;
pub mod triage;
pub mod types;
pub mod verifier;

pub use collector::run_collector;
pub use error::{AgentError, AgentResult};
pub use fix::run_fix;
pub use orchestrator::{needs_retry, Pipeline, MAX_FIX_RETRIES, NO_ISSUES_REPORT};
pub use patch::{render_patch_diff, unified_diff, PatchError};
pub use report::{build_failure_report, build_full_report};
pub use reporter::run_reporter;
pub use triage::{fallback_triage, run_triage};
pub use types::{
    CollectorIssue, CollectorResult, Effort, FixPatch, FixResult, FixStrategy, PipelineContext,
    PipelineStep, Priority, ReporterResult, StepEvent, StepStatus, TriageGroup, TriageResult,
    Unfixable, VerifierCheck, VerifierResult,
};
pub use verifier::{default_checks, run_verifier, CheckDef, VerifierConfig};
