//! Fix stage.
//!
//! Issues triaged as `auto` are batched per source file; each batch is one
//! model call, and batches run concurrently. Results are merged by issue key
//! and emitted in collector order, so every issue ends up with exactly one
//! patch or one unfixable entry regardless of completion order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::error::{AgentError, AgentResult};
use super::patch::{locate_snippet, resolve_in_project, source_window, SOURCE_CONTEXT_LINES, UNREADABLE_FILE};
use super::types::{CollectorIssue, FixPatch, FixResult, TriageResult, Unfixable};
use crate::llm::{generate_text, LlmProvider};
use crate::prompts::{FIX_ISSUE_TEMPLATE, FIX_RETRY_TEMPLATE, FIX_SYSTEM_PROMPT, FIX_USER_TEMPLATE};
use crate::utils::parse_payload;

/// Output token budget for one file batch.
pub const FIX_MAX_TOKENS: u32 = 4096;

pub const REASON_MANUAL: &str = "flagged for manual review by triage";
pub const REASON_MODEL_FAILED: &str = "model could not produce a fix";
pub const REASON_NO_ANSWER: &str = "model returned no fix for this issue";
const REASON_UNSAFE: &str = "model could not produce a safe fix";
const DEFAULT_DESCRIPTION: &str = "Automated fix";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixItem {
    issue_key: String,
    #[serde(default)]
    original: Option<String>,
    #[serde(default)]
    replacement: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fixable: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug)]
enum Outcome {
    Patch(FixPatch),
    Unfixable(String),
}

/// Propose patches for every issue in an `auto` triage group.
///
/// `feedback` carries the verifier's failure report on a retry; it is
/// appended to every batch prompt.
///
/// # Errors
///
/// Fails only when `project_root` is not a readable directory. Model errors
/// and unusable answers turn the affected issues into unfixable entries.
pub async fn run_fix(
    provider: &dyn LlmProvider,
    issues: &[CollectorIssue],
    triage: &TriageResult,
    project_root: &Path,
    feedback: Option<&str>,
) -> AgentResult<FixResult> {
    let is_dir = tokio::fs::metadata(project_root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(AgentError::Config(format!(
            "project root is not a directory: {}",
            project_root.display()
        )));
    }

    let auto_keys: HashSet<&str> = triage.auto_fix_keys().collect();

    let mut by_file: BTreeMap<&str, Vec<&CollectorIssue>> = BTreeMap::new();
    for issue in issues.iter().filter(|i| auto_keys.contains(i.key())) {
        by_file.entry(issue.file_path.as_str()).or_default().push(issue);
    }

    if by_file.is_empty() {
        let unfixable: Vec<Unfixable> = issues
            .iter()
            .map(|i| Unfixable {
                issue_key: i.key().to_string(),
                reason: REASON_MANUAL.to_string(),
            })
            .collect();
        return Ok(FixResult {
            patches: Vec::new(),
            unfixable,
            summary: "No auto-fixable issues found.".to_string(),
        });
    }

    info!(files = by_file.len(), "Generating fixes");

    let batches = by_file
        .iter()
        .map(|(file_path, batch)| fix_file(provider, project_root, file_path, batch, feedback));

    let mut outcomes: HashMap<String, Outcome> = HashMap::new();
    for answers in join_all(batches).await {
        for (key, outcome) in answers {
            outcomes.entry(key).or_insert(outcome);
        }
    }

    let mut patches = Vec::new();
    let mut unfixable = Vec::new();
    for issue in issues {
        let key = issue.key().to_string();
        let outcome = if auto_keys.contains(issue.key()) {
            outcomes
                .remove(&key)
                .unwrap_or_else(|| Outcome::Unfixable(REASON_NO_ANSWER.to_string()))
        } else {
            Outcome::Unfixable(REASON_MANUAL.to_string())
        };

        match outcome {
            Outcome::Patch(patch) => patches.push(patch),
            Outcome::Unfixable(reason) => unfixable.push(Unfixable { issue_key: key, reason }),
        }
    }

    let summary = format!(
        "Generated {} patches. {} issues need manual review.",
        patches.len(),
        unfixable.len()
    );
    info!(patches = patches.len(), unfixable = unfixable.len(), "Fix stage complete");

    Ok(FixResult {
        patches,
        unfixable,
        summary,
    })
}

/// One model call for all issues of one file.
///
/// Returns at most one outcome per batch issue; answers for keys outside the
/// batch are discarded.
async fn fix_file(
    provider: &dyn LlmProvider,
    project_root: &Path,
    file_path: &str,
    batch: &[&CollectorIssue],
    feedback: Option<&str>,
) -> Vec<(String, Outcome)> {
    let content = match resolve_in_project(project_root, file_path) {
        Some(path) => match tokio::fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(file_path, error = %e, "Source file not readable");
                None
            }
        },
        None => {
            warn!(file_path, "Source path leaves the project root, not reading it");
            None
        }
    };

    let mut prompt = build_prompt(file_path, batch, content.as_deref());
    if let Some(feedback) = feedback {
        prompt.push_str(&FIX_RETRY_TEMPLATE.replace("{feedback}", feedback));
    }

    let items = match generate_text(provider, FIX_SYSTEM_PROMPT, &prompt, FIX_MAX_TOKENS).await {
        Ok(text) => parse_payload::<Vec<FixItem>>(&text).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let items = match items {
        Ok(items) => items,
        Err(reason) => {
            warn!(file_path, error = %reason, "Fix output unusable, marking batch unfixable");
            return batch
                .iter()
                .map(|i| (i.key().to_string(), Outcome::Unfixable(REASON_MODEL_FAILED.to_string())))
                .collect();
        }
    };

    let batch_keys: HashSet<&str> = batch.iter().map(|i| i.key()).collect();
    let mut answered: HashSet<String> = HashSet::new();
    let mut outcomes = Vec::new();

    for item in items {
        if !batch_keys.contains(item.issue_key.as_str()) {
            debug!(file_path, issue_key = %item.issue_key, "Ignoring fix for issue outside batch");
            continue;
        }
        if !answered.insert(item.issue_key.clone()) {
            continue;
        }
        let key = item.issue_key.clone();
        outcomes.push((key, classify(item, file_path, content.as_deref())));
    }

    outcomes
}

fn classify(item: FixItem, file_path: &str, content: Option<&str>) -> Outcome {
    let original = item.original.unwrap_or_default();
    let replacement = item.replacement.unwrap_or_default();

    if !item.fixable || original.is_empty() || replacement.is_empty() {
        return Outcome::Unfixable(
            item.reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| REASON_UNSAFE.to_string()),
        );
    }

    let Some(content) = content else {
        return Outcome::Unfixable(format!("source file {} is not readable", file_path));
    };

    if locate_snippet(content, &original).is_none() {
        return Outcome::Unfixable(format!("proposed original text was not found in {}", file_path));
    }

    Outcome::Patch(FixPatch {
        issue_key: item.issue_key,
        file_path: file_path.to_string(),
        original,
        replacement,
        description: item
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        fixable: true,
    })
}

fn build_prompt(file_path: &str, batch: &[&CollectorIssue], content: Option<&str>) -> String {
    let blocks: Vec<String> = batch
        .iter()
        .map(|issue| {
            let source = match content {
                Some(content) => source_window(content, issue.line(), SOURCE_CONTEXT_LINES),
                None => UNREADABLE_FILE.to_string(),
            };
            let rule_name = issue
                .rule_detail
                .as_ref()
                .map(|r| r.name.as_str())
                .unwrap_or_else(|| issue.message());
            let line = issue
                .line()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            FIX_ISSUE_TEMPLATE
                .replace("{key}", issue.key())
                .replace("{rule}", issue.rule())
                .replace("{rule_name}", rule_name)
                .replace("{line}", &line)
                .replace("{message}", issue.message())
                .replace("{source}", &source)
        })
        .collect();

    FIX_USER_TEMPLATE
        .replace("{count}", &batch.len().to_string())
        .replace("{file_path}", file_path)
        .replace("{issues}", &blocks.join("\n\n---\n\n"))
}
