//! Response shapes of the SonarQube Web API.
//!
//! Only the fields the pipeline reads are required; everything else is
//! defaulted so that minor server-version differences do not break decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

/// Verdict of a quality gate or of one of its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityGateStatus {
    Ok,
    Warn,
    Error,
    #[serde(other)]
    None,
}

impl fmt::Display for QualityGateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityGateStatus::Ok => write!(f, "OK"),
            QualityGateStatus::Warn => write!(f, "WARN"),
            QualityGateStatus::Error => write!(f, "ERROR"),
            QualityGateStatus::None => write!(f, "NONE"),
        }
    }
}

/// A single threshold condition evaluated by the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateCondition {
    pub status: QualityGateStatus,
    pub metric_key: String,
    #[serde(default)]
    pub comparator: String,
    #[serde(default)]
    pub error_threshold: String,
    #[serde(default)]
    pub actual_value: String,
}

/// Quality gate verdict for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateProjectStatus {
    pub status: QualityGateStatus,
    #[serde(default)]
    pub conditions: Vec<QualityGateCondition>,
    #[serde(default)]
    pub ignored_conditions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cayc_status: Option<String>,
}

/// `GET /api/qualitygates/project_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityGateResponse {
    pub project_status: QualityGateProjectStatus,
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    pub page_index: u32,
    pub page_size: u32,
    pub total: u64,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// One entry of the clean-code impact taxonomy attached to an issue or rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impact {
    /// MAINTAINABILITY, RELIABILITY or SECURITY.
    pub software_quality: String,
    /// BLOCKER, HIGH, MEDIUM, LOW or INFO.
    pub severity: String,
}

impl Impact {
    pub fn new(software_quality: impl Into<String>, severity: impl Into<String>) -> Self {
        Self {
            software_quality: software_quality.into(),
            severity: severity.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub start_offset: u32,
    #[serde(default)]
    pub end_offset: u32,
}

/// A finding reported by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub key: String,
    pub rule: String,
    /// Component key, conventionally `"<projectKey>:<path>"`.
    pub component: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_range: Option<TextRange>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_code_attribute: Option<String>,
    #[serde(default)]
    pub impacts: Vec<Impact>,
    /// Legacy severity (BLOCKER .. INFO).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Legacy type (CODE_SMELL, BUG, VULNERABILITY).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
}

/// `GET /api/issues/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuesSearchResponse {
    pub total: u64,
    #[serde(default)]
    pub p: u32,
    #[serde(default)]
    pub ps: u32,
    #[serde(default)]
    pub paging: Paging,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDescriptionSection {
    pub key: String,
    #[serde(default)]
    pub content: String,
}

/// Rule metadata used to enrich issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub key: String,
    #[serde(default)]
    pub repo: String,
    pub name: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sys_tags: Vec<String>,
    #[serde(default)]
    pub impacts: Vec<Impact>,
    #[serde(default)]
    pub description_sections: Vec<RuleDescriptionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
}

/// `GET /api/rules/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesSearchResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_gate_response_deserialize() {
        let json = r#"{
            "projectStatus": {
                "status": "ERROR",
                "conditions": [
                    {"status": "ERROR", "metricKey": "new_bugs", "comparator": "GT", "errorThreshold": "0", "actualValue": "3"}
                ],
                "ignoredConditions": false,
                "caycStatus": "non-compliant"
            }
        }"#;

        let parsed: QualityGateResponse = serde_json::from_str(json).expect("valid json");
        assert_eq!(parsed.project_status.status, QualityGateStatus::Error);
        assert_eq!(parsed.project_status.conditions.len(), 1);
        assert_eq!(parsed.project_status.conditions[0].metric_key, "new_bugs");
    }

    #[test]
    fn test_unknown_gate_status_maps_to_none() {
        let parsed: QualityGateStatus =
            serde_json::from_str("\"SOMETHING_NEW\"").expect("valid json");
        assert_eq!(parsed, QualityGateStatus::None);
        assert_eq!(QualityGateStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_issue_deserialize_minimal() {
        let json = r#"{
            "key": "AX-1",
            "rule": "typescript:S1481",
            "component": "demo:src/utils.ts",
            "line": 2,
            "message": "Remove this unused variable",
            "impacts": [{"softwareQuality": "MAINTAINABILITY", "severity": "LOW"}],
            "type": "CODE_SMELL"
        }"#;

        let issue: Issue = serde_json::from_str(json).expect("valid json");
        assert_eq!(issue.line, Some(2));
        assert_eq!(issue.impacts[0], Impact::new("MAINTAINABILITY", "LOW"));
        assert_eq!(issue.issue_type.as_deref(), Some("CODE_SMELL"));
        assert!(issue.tags.is_empty());
    }
}
