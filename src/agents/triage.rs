//! Triage stage.
//!
//! Asks the model to group and prioritize the collected issues. When the
//! model fails or answers with something unparseable, every issue lands in a
//! single catch-all group marked for automatic fixing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{AgentError, AgentResult};
use super::types::{CollectorResult, Effort, FixStrategy, Priority, TriageGroup, TriageResult};
use crate::llm::{generate_text, LlmProvider};
use crate::prompts::{TRIAGE_SYSTEM_PROMPT, TRIAGE_USER_TEMPLATE};
use crate::sonar::Impact;
use crate::utils::parse_payload;

/// Output token budget for the triage call.
pub const TRIAGE_MAX_TOKENS: u32 = 4096;

/// Category of the catch-all group used when model output is unusable.
pub const FALLBACK_CATEGORY: &str = "All issues (model output could not be parsed)";

/// Compact issue view sent to the model.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueDigest<'a> {
    key: &'a str,
    rule: &'a str,
    message: &'a str,
    file_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    impacts: &'a [Impact],
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    issue_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TriagePayload {
    #[serde(default)]
    groups: Vec<GroupPayload>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupPayload {
    #[serde(default)]
    priority: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    issue_keys: Option<Vec<String>>,
    /// Some models name the key list `issues`.
    #[serde(default)]
    issues: Option<Vec<String>>,
    #[serde(default)]
    fix_strategy: String,
    #[serde(default)]
    estimated_effort: String,
}

/// Group and prioritize the collector's issues.
///
/// # Errors
///
/// Only fails if the prompt cannot be built. Model failures fall back to a
/// single catch-all group.
pub async fn run_triage(provider: &dyn LlmProvider, collector: &CollectorResult) -> AgentResult<TriageResult> {
    if collector.issues.is_empty() {
        return Ok(TriageResult {
            groups: Vec::new(),
            summary: "No issues to triage.".to_string(),
        });
    }

    let prompt = build_prompt(collector)?;

    let payload = match generate_text(provider, TRIAGE_SYSTEM_PROMPT, &prompt, TRIAGE_MAX_TOKENS).await {
        Ok(text) => parse_payload::<TriagePayload>(&text).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let result = match payload {
        Ok(payload) => normalize(payload, collector),
        Err(reason) => {
            warn!(error = %reason, "Triage output unusable, using fallback grouping");
            fallback_triage(collector)
        }
    };

    info!(groups = result.groups.len(), "Triage complete");
    Ok(result)
}

fn build_prompt(collector: &CollectorResult) -> AgentResult<String> {
    let digests: Vec<IssueDigest<'_>> = collector
        .issues
        .iter()
        .map(|i| IssueDigest {
            key: i.key(),
            rule: i.rule(),
            message: i.message(),
            file_path: &i.file_path,
            line: i.line(),
            impacts: &i.issue.impacts,
            severity: i.issue.severity.as_deref(),
            issue_type: i.issue.issue_type.as_deref(),
            rule_name: i.rule_detail.as_ref().map(|r| r.name.as_str()),
        })
        .collect();

    let issues_json =
        serde_json::to_string_pretty(&digests).map_err(|e| AgentError::stage("triage", e.to_string()))?;

    Ok(TRIAGE_USER_TEMPLATE
        .replace("{count}", &digests.len().to_string())
        .replace("{gate_status}", &collector.quality_gate.status.to_string())
        .replace("{issues}", &issues_json))
}

/// Map model output onto the closed enums and the known issue keys.
///
/// Unknown keys and repeats of an already grouped key are dropped; groups
/// left without keys are removed.
fn normalize(payload: TriagePayload, collector: &CollectorResult) -> TriageResult {
    let known: HashSet<&str> = collector.issues.iter().map(|i| i.key()).collect();
    let mut grouped: HashSet<String> = HashSet::new();

    let groups: Vec<TriageGroup> = payload
        .groups
        .into_iter()
        .filter_map(|group| {
            let keys = group.issue_keys.or(group.issues).unwrap_or_default();
            let issue_keys: Vec<String> = keys
                .into_iter()
                .filter(|k| known.contains(k.as_str()) && grouped.insert(k.clone()))
                .collect();

            if issue_keys.is_empty() {
                return None;
            }

            Some(TriageGroup {
                priority: Priority::from_label(&group.priority),
                category: if group.category.trim().is_empty() {
                    "Uncategorized".to_string()
                } else {
                    group.category
                },
                issue_keys,
                fix_strategy: FixStrategy::from_label(&group.fix_strategy),
                estimated_effort: Effort::from_label(&group.estimated_effort),
            })
        })
        .collect();

    let summary = if payload.summary.trim().is_empty() {
        format!("Triaged {} issues into {} groups.", grouped.len(), groups.len())
    } else {
        payload.summary.trim().to_string()
    };

    TriageResult { groups, summary }
}

/// One catch-all `medium`/`auto`/`simple` group holding every issue.
pub fn fallback_triage(collector: &CollectorResult) -> TriageResult {
    TriageResult {
        groups: vec![TriageGroup {
            priority: Priority::Medium,
            category: FALLBACK_CATEGORY.to_string(),
            issue_keys: collector.issues.iter().map(|i| i.key().to_string()).collect(),
            fix_strategy: FixStrategy::Auto,
            estimated_effort: Effort::Simple,
        }],
        summary: format!(
            "Fallback triage: {} issues grouped. Model output could not be parsed.",
            collector.issues.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::CollectorIssue;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, Message, Usage};
    use crate::sonar::{Issue, QualityGateProjectStatus, QualityGateStatus};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockLlmProvider {
        response: Option<String>,
        last_prompt: Mutex<String>,
        call_count: AtomicUsize,
    }

    impl MockLlmProvider {
        fn new(response: impl Into<String>) -> Self {
            Self {
                response: Some(response.into()),
                last_prompt: Mutex::new(String::new()),
                call_count: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                last_prompt: Mutex::new(String::new()),
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(user) = request.messages.last() {
                *self.last_prompt.lock().expect("lock not poisoned") = user.content.clone();
            }
            let content = self
                .response
                .clone()
                .ok_or_else(|| LlmError::RequestFailed("connection refused".to_string()))?;
            Ok(GenerationResponse {
                id: "mock-id".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                },
            })
        }
    }

    fn collector(keys: &[&str]) -> CollectorResult {
        let issues = keys
            .iter()
            .map(|key| {
                let issue: Issue = serde_json::from_value(serde_json::json!({
                    "key": key,
                    "rule": "typescript:S1481",
                    "component": format!("demo:src/{}.ts", key),
                    "message": "Remove this unused variable",
                    "line": 3,
                }))
                .expect("valid issue");
                CollectorIssue::from_issue(issue)
            })
            .collect();
        CollectorResult {
            quality_gate: QualityGateProjectStatus {
                status: QualityGateStatus::Error,
                conditions: Vec::new(),
                ignored_conditions: false,
                cayc_status: None,
            },
            issues,
            rules: BTreeMap::new(),
            summary: String::new(),
        }
    }

    #[tokio::test]
    async fn test_no_issues_skips_model() {
        let provider = MockLlmProvider::new("{}");
        let result = run_triage(&provider, &collector(&[])).await.expect("triage");

        assert!(result.groups.is_empty());
        assert_eq!(result.summary, "No issues to triage.");
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parses_fenced_response() {
        let response = r#"```json
{
  "groups": [
    {"priority": "high", "category": "Unused code", "issueKeys": ["a", "b"], "fixStrategy": "auto", "estimatedEffort": "trivial"},
    {"priority": "low", "category": "Naming", "issueKeys": ["c"], "fixStrategy": "manual", "estimatedEffort": "moderate"}
  ],
  "summary": "Two groups."
}
```"#;
        let provider = MockLlmProvider::new(response);
        let result = run_triage(&provider, &collector(&["a", "b", "c"])).await.expect("triage");

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].priority, Priority::High);
        assert_eq!(result.groups[0].issue_keys, vec!["a", "b"]);
        assert_eq!(result.groups[1].fix_strategy, FixStrategy::Manual);
        assert_eq!(result.summary, "Two groups.");

        let prompt = provider.last_prompt.lock().expect("lock").clone();
        assert!(prompt.contains("Quality gate status: ERROR"));
        assert!(prompt.contains("\"filePath\": \"src/a.ts\""));
    }

    #[tokio::test]
    async fn test_accepts_issues_alias() {
        let response = r#"{"groups": [{"priority": "medium", "category": "x", "issues": ["a"], "fixStrategy": "auto", "estimatedEffort": "simple"}], "summary": "s"}"#;
        let provider = MockLlmProvider::new(response);
        let result = run_triage(&provider, &collector(&["a"])).await.expect("triage");

        assert_eq!(result.groups[0].issue_keys, vec!["a"]);
    }

    #[tokio::test]
    async fn test_drops_unknown_and_repeated_keys() {
        let response = r#"{"groups": [
            {"priority": "high", "category": "g1", "issueKeys": ["a", "ghost"], "fixStrategy": "auto", "estimatedEffort": "simple"},
            {"priority": "low", "category": "g2", "issueKeys": ["a"], "fixStrategy": "manual", "estimatedEffort": "simple"},
            {"priority": "SEVERE", "category": "g3", "issueKeys": ["b"], "fixStrategy": "AUTO", "estimatedEffort": "???"}
        ], "summary": ""}"#;
        let provider = MockLlmProvider::new(response);
        let result = run_triage(&provider, &collector(&["a", "b"])).await.expect("triage");

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].issue_keys, vec!["a"]);
        assert_eq!(result.groups[1].category, "g3");
        assert_eq!(result.groups[1].priority, Priority::Medium);
        assert_eq!(result.groups[1].fix_strategy, FixStrategy::Auto);
        assert_eq!(result.groups[1].estimated_effort, Effort::Moderate);
        assert_eq!(result.summary, "Triaged 2 issues into 2 groups.");
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back() {
        let provider = MockLlmProvider::new("I am unable to help with that.");
        let result = run_triage(&provider, &collector(&["a", "b"])).await.expect("triage");

        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.category, FALLBACK_CATEGORY);
        assert_eq!(group.priority, Priority::Medium);
        assert_eq!(group.fix_strategy, FixStrategy::Auto);
        assert_eq!(group.estimated_effort, Effort::Simple);
        assert_eq!(group.issue_keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_model_error_falls_back() {
        let provider = MockLlmProvider::failing();
        let result = run_triage(&provider, &collector(&["a"])).await.expect("triage");

        assert_eq!(result.groups[0].category, FALLBACK_CATEGORY);
        assert!(result.summary.starts_with("Fallback triage: 1 issues"));
    }
}
