//! Verification runner.
//!
//! Runs the project's own checks (tests, lint, format) in the project root and
//! aggregates their outcome. Verification never fails: a check that cannot be
//! spawned or that times out is a failing check with the error as its output.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use super::types::{VerifierCheck, VerifierResult};

/// Feedback when every check passes.
pub const ALL_CHECKS_PASSED: &str = "All checks passed.";

/// A named external check command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDef {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl CheckDef {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Build a check from a whitespace-separated command line.
    ///
    /// Returns `None` when `command` has no program.
    pub fn from_command_line(name: impl Into<String>, command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            name: name.into(),
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    /// The command line as it would be typed.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Checks run by default: `bun test`, `bunx oxlint .` and `bunx oxfmt --check .`.
pub fn default_checks() -> Vec<CheckDef> {
    vec![
        CheckDef::new("test", "bun", &["test"]),
        CheckDef::new("lint", "bunx", &["oxlint", "."]),
        CheckDef::new("format", "bunx", &["oxfmt", "--check", "."]),
    ]
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub checks: Vec<CheckDef>,
    /// Captured output is cut to this many lines per check.
    pub max_output_lines: usize,
    /// Per-check wall-clock limit.
    pub timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            checks: default_checks(),
            max_output_lines: 50,
            timeout: Duration::from_secs(300),
        }
    }
}

impl VerifierConfig {
    pub fn with_checks(mut self, checks: Vec<CheckDef>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Run every configured check in order against `project_root`.
pub async fn run_verifier(project_root: &Path, config: &VerifierConfig) -> VerifierResult {
    let mut checks = Vec::with_capacity(config.checks.len());
    let mut failures = Vec::new();

    for check in &config.checks {
        let (exit_code, stdout, stderr) = run_check(check, project_root, config.timeout).await;
        let passed = exit_code == 0;

        let combined = [stdout.trim(), stderr.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let output = truncate_output(&combined, config.max_output_lines);

        info!(check = %check.name, passed, exit_code, "Verification check finished");

        if !passed {
            failures.push(format!("{} failed (exit {}):\n{}", check.name, exit_code, output));
        }

        checks.push(VerifierCheck {
            name: check.name.clone(),
            passed,
            exit_code,
            output,
        });
    }

    let passed = checks.iter().all(|c| c.passed);
    let feedback = if passed {
        ALL_CHECKS_PASSED.to_string()
    } else {
        failures.join("\n\n")
    };

    VerifierResult {
        passed,
        checks,
        feedback,
    }
}

async fn run_check(check: &CheckDef, cwd: &Path, timeout: Duration) -> (i32, String, String) {
    debug!(check = %check.name, command = %check.command_line(), "Running check");

    let result = tokio::time::timeout(
        timeout,
        Command::new(&check.program)
            .args(&check.args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) => (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ),
        Ok(Err(e)) => (
            -1,
            String::new(),
            format!("failed to run `{}`: {}", check.command_line(), e),
        ),
        Err(_) => (
            -1,
            String::new(),
            format!("`{}` timed out after {}s", check.command_line(), timeout.as_secs()),
        ),
    }
}

/// Keep the first `max_lines` lines, noting how many were dropped.
pub fn truncate_output(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }
    format!(
        "{}\n... ({} more lines)",
        lines[..max_lines].join("\n"),
        lines.len() - max_lines
    )
}
