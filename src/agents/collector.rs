//! Issue collector.
//!
//! Reads the quality gate verdict, every unresolved issue (paginated, with a
//! hard page ceiling) and the rule metadata the issues reference, then derives
//! a three-line summary.

use std::collections::{BTreeMap, HashSet};

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::error::AgentResult;
use super::types::{CollectorIssue, CollectorResult};
use crate::sonar::{QualityGateApi, QualityGateStatus, Rule};

/// Issues requested per search page.
pub const ISSUE_PAGE_SIZE: u32 = 100;

/// Pagination stops after this page even if the server reports more issues.
pub const MAX_ISSUE_PAGES: u32 = 10;

/// Collect quality gate status, open issues and rule details for a project.
///
/// # Errors
///
/// Fails when the quality gate or any issue page cannot be fetched. Rule
/// lookups are best-effort: a failed lookup leaves the issue without
/// `rule_detail`.
pub async fn run_collector(api: &dyn QualityGateApi, project_key: &str) -> AgentResult<CollectorResult> {
    let quality_gate = api.project_status(project_key).await?;
    debug!(project_key, status = %quality_gate.status, "Quality gate fetched");

    let (mut issues, total) = fetch_open_issues(api, project_key).await?;
    info!(project_key, total, collected = issues.len(), "Open issues collected");

    let rules = fetch_rules(api, &issues).await;
    for issue in &mut issues {
        issue.rule_detail = rules.get(issue.rule()).cloned();
    }

    let summary = build_summary(quality_gate.status, total, &issues);

    Ok(CollectorResult {
        quality_gate,
        issues,
        rules,
        summary,
    })
}

async fn fetch_open_issues(api: &dyn QualityGateApi, project_key: &str) -> AgentResult<(Vec<CollectorIssue>, u64)> {
    let mut issues: Vec<CollectorIssue> = Vec::new();
    let mut page = 1;
    let mut total;

    loop {
        let response = api.search_issues(project_key, page, ISSUE_PAGE_SIZE).await?;
        total = response.total;
        let received = response.issues.len();
        debug!(project_key, page, received, total, "Issue page fetched");

        issues.extend(response.issues.into_iter().map(CollectorIssue::from_issue));
        page += 1;

        if received == 0 || (issues.len() as u64) >= total || page > MAX_ISSUE_PAGES {
            break;
        }
    }

    if (issues.len() as u64) < total {
        warn!(
            project_key,
            total,
            collected = issues.len(),
            "Issue pagination stopped before reaching the reported total"
        );
    }

    Ok((issues, total))
}

/// Look up each distinct rule once, concurrently. Failed lookups are skipped.
async fn fetch_rules(api: &dyn QualityGateApi, issues: &[CollectorIssue]) -> BTreeMap<String, Rule> {
    let mut seen = HashSet::new();
    let rule_keys: Vec<&str> = issues
        .iter()
        .map(CollectorIssue::rule)
        .filter(|key| seen.insert(*key))
        .collect();

    let lookups = rule_keys.iter().map(|rule_key| async move {
        let result = api.find_rule(rule_key).await;
        (*rule_key, result)
    });

    let mut rules = BTreeMap::new();
    for (rule_key, result) in join_all(lookups).await {
        match result {
            Ok(Some(rule)) => {
                rules.insert(rule_key.to_string(), rule);
            }
            Ok(None) => debug!(rule_key, "Rule not found"),
            Err(e) => debug!(rule_key, error = %e, "Rule lookup failed"),
        }
    }
    rules
}

/// Render the gate status, the reported issue total and the impact breakdown.
///
/// Every impact of every issue counts once toward its
/// `softwareQuality:severity` bucket; buckets appear in first-seen order.
pub fn build_summary(status: QualityGateStatus, total: u64, issues: &[CollectorIssue]) -> String {
    let mut buckets: Vec<(String, usize)> = Vec::new();
    for impact in issues.iter().flat_map(|i| i.issue.impacts.iter()) {
        let key = format!("{}:{}", impact.software_quality, impact.severity);
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => buckets.push((key, 1)),
        }
    }

    let breakdown = if buckets.is_empty() {
        "No issues found".to_string()
    } else {
        let parts: Vec<String> = buckets.iter().map(|(k, c)| format!("{}: {}", k, c)).collect();
        format!("Impact breakdown: {}", parts.join(", "))
    };

    format!("Quality Gate: {}\nTotal open issues: {}\n{}", status, total, breakdown)
}
