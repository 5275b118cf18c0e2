//! Shared types for the remediation pipeline.
//!
//! Each stage produces one owned result type. [`PipelineContext`] threads them
//! through the orchestrator; a field is `Some` exactly when its stage has run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sonar::{Issue, QualityGateProjectStatus, Rule};

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// An issue enriched with its file path and, when available, its rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorIssue {
    #[serde(flatten)]
    pub issue: Issue,
    /// Component key with the `"<project>:"` prefix stripped.
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_detail: Option<Rule>,
}

impl CollectorIssue {
    /// Wrap a raw issue, deriving `file_path` from its component key.
    pub fn from_issue(issue: Issue) -> Self {
        let file_path = file_path_from_component(&issue.component).to_string();
        Self {
            issue,
            file_path,
            rule_detail: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.issue.key
    }

    pub fn rule(&self) -> &str {
        &self.issue.rule
    }

    pub fn line(&self) -> Option<u32> {
        self.issue.line
    }

    pub fn message(&self) -> &str {
        &self.issue.message
    }
}

/// Substring after the first `:` of a component key, or the whole key.
pub fn file_path_from_component(component: &str) -> &str {
    match component.split_once(':') {
        Some((_, path)) => path,
        None => component,
    }
}

/// Aggregated output of the issue collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorResult {
    pub quality_gate: QualityGateProjectStatus,
    pub issues: Vec<CollectorIssue>,
    /// Rule metadata keyed by rule key; only rules whose lookup succeeded.
    pub rules: BTreeMap<String, Rule>,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Triage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Case-insensitive parse; anything unrecognized is `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Priority::Critical,
            "high" | "major" => Priority::High,
            "low" | "minor" | "info" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixStrategy {
    Auto,
    Manual,
}

impl FixStrategy {
    /// Only an explicit `auto` opts a group into automated fixing.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("auto") {
            FixStrategy::Auto
        } else {
            FixStrategy::Manual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FixStrategy::Auto => "auto",
            FixStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for FixStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Trivial,
    Simple,
    Moderate,
    Complex,
}

impl Effort {
    /// Case-insensitive parse; anything unrecognized is `Moderate`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "trivial" => Effort::Trivial,
            "simple" | "easy" => Effort::Simple,
            "complex" | "hard" => Effort::Complex,
            _ => Effort::Moderate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Effort::Trivial => "trivial",
            Effort::Simple => "simple",
            Effort::Moderate => "moderate",
            Effort::Complex => "complex",
        }
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageGroup {
    pub priority: Priority,
    pub category: String,
    pub issue_keys: Vec<String>,
    pub fix_strategy: FixStrategy,
    pub estimated_effort: Effort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub groups: Vec<TriageGroup>,
    pub summary: String,
}

impl TriageResult {
    /// Keys of every issue in an `auto` group.
    pub fn auto_fix_keys(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .filter(|g| g.fix_strategy == FixStrategy::Auto)
            .flat_map(|g| g.issue_keys.iter().map(String::as_str))
    }
}

// ---------------------------------------------------------------------------
// Fix
// ---------------------------------------------------------------------------

/// An exact-text-span replacement proposed for one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPatch {
    pub issue_key: String,
    pub file_path: String,
    pub original: String,
    pub replacement: String,
    pub description: String,
    pub fixable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unfixable {
    pub issue_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    pub patches: Vec<FixPatch>,
    pub unfixable: Vec<Unfixable>,
    pub summary: String,
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierCheck {
    pub name: String,
    pub passed: bool,
    /// Process exit code, `-1` when the check never produced one.
    pub exit_code: i32,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierResult {
    pub passed: bool,
    pub checks: Vec<VerifierCheck>,
    pub feedback: String,
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterResult {
    pub markdown: String,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// State accumulated over one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineContext {
    pub project_key: String,
    pub project_root: PathBuf,
    pub collector: Option<CollectorResult>,
    pub triage: Option<TriageResult>,
    pub fix: Option<FixResult>,
    pub verifier: Option<VerifierResult>,
    pub reporter: Option<ReporterResult>,
}

impl PipelineContext {
    pub fn new(project_key: impl Into<String>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_key: project_key.into(),
            project_root: project_root.into(),
            collector: None,
            triage: None,
            fix: None,
            verifier: None,
            reporter: None,
        }
    }
}

/// Named pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    Collect,
    Triage,
    Fix,
    Verify,
    Report,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Collect => "collect",
            PipelineStep::Triage => "triage",
            PipelineStep::Fix => "fix",
            PipelineStep::Verify => "verify",
            PipelineStep::Report => "report",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Start,
    Done,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Start => "start",
            StepStatus::Done => "done",
            StepStatus::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage transition reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub step: PipelineStep,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepEvent {
    pub fn new(step: PipelineStep, status: StepStatus, detail: Option<String>) -> Self {
        Self { step, status, detail }
    }
}

/// Renders as `[step] status` or `[step] status: detail`.
impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail.as_deref() {
            Some(detail) if !detail.is_empty() => {
                write!(f, "[{}] {}: {}", self.step, self.status, detail)
            }
            _ => write!(f, "[{}] {}", self.step, self.status),
        }
    }
}
