//! Prompts for the model-backed pipeline stages.
//!
//! Each stage has a system prompt and a user template. Templates use
//! `{placeholder}` markers filled with `str::replace` by the stage that owns
//! them.

/// System prompt for grouping and prioritizing issues.
pub const TRIAGE_SYSTEM_PROMPT: &str = r#"You are a senior engineer triaging static-analysis findings reported by SonarQube.

Your job is to group related issues, prioritize the groups, and decide for each group whether the fix can be made automatically with a small, local, exact-text edit.

Priorities:
- critical: security vulnerabilities, data loss, crashes
- high: bugs with user-visible effect, reliability problems
- medium: maintainability problems that make the code harder to change
- low: style and naming

Fix strategy:
- auto: the fix is a mechanical edit confined to a few lines (unused variable, `var` to `const`, missing `===`, redundant code)
- manual: the fix needs design decisions, touches many places, or could change behavior

Estimated effort is one of: trivial, simple, moderate, complex.

Every issue key you receive must appear in exactly one group. Never invent issue keys.

Respond with JSON only. No prose, no explanations outside the JSON."#;

/// User template for triage. Placeholders: `{count}`, `{gate_status}`, `{issues}`.
pub const TRIAGE_USER_TEMPLATE: &str = r#"Here are {count} SonarQube issues for the project. Quality gate status: {gate_status}.

Issues:
{issues}

Analyze and group these issues. Return ONLY a valid JSON object matching this structure:
{
  "groups": [{ "priority": "critical|high|medium|low", "category": "description", "issueKeys": ["key1"], "fixStrategy": "auto|manual", "estimatedEffort": "trivial|simple|moderate|complex" }],
  "summary": "text summary"
}"#;

/// System prompt for proposing patches.
pub const FIX_SYSTEM_PROMPT: &str = r#"You are a careful engineer fixing static-analysis issues in TypeScript and JavaScript code.

Rules:
1. Each fix replaces an exact span of the original source. The "original" field must be copied character for character from the source context, including indentation.
2. Keep the span as small as possible while still unique in the file; one to three lines is typical.
3. Never change behavior beyond what the rule requires.
4. If the fix is unsafe, ambiguous, or needs changes outside the shown context, mark the issue as not fixable and say why.

Respond with a JSON array only."#;

/// User template for one file's batch of issues.
/// Placeholders: `{count}`, `{file_path}`, `{issues}`.
pub const FIX_USER_TEMPLATE: &str = r#"Fix the following {count} issue(s) in file `{file_path}`:

{issues}

For each issue, return a JSON array of fix objects:
[{
  "issueKey": "the issue key",
  "filePath": "{file_path}",
  "original": "exact original code to replace",
  "replacement": "the fixed code",
  "description": "one-line description",
  "fixable": true
}]

If an issue cannot be safely auto-fixed, use:
{ "issueKey": "key", "fixable": false, "reason": "why" }

Return ONLY the JSON array."#;

/// Per-issue block inside [`FIX_USER_TEMPLATE`].
/// Placeholders: `{key}`, `{rule}`, `{rule_name}`, `{line}`, `{message}`, `{source}`.
pub const FIX_ISSUE_TEMPLATE: &str = r#"Issue key: {key}
Rule: {rule} - {rule_name}
Line: {line}
Message: {message}

Source context:
{source}"#;

/// Appended to a fix prompt on the retry after failed verification.
/// Placeholder: `{feedback}`.
pub const FIX_RETRY_TEMPLATE: &str = r#"

A previous round of fixes for this project failed verification:
{feedback}

Avoid proposing changes that would cause these failures again."#;

/// System prompt for the pull request description.
pub const REPORTER_SYSTEM_PROMPT: &str = r#"You write pull request descriptions for automated code-quality fixes.

Structure the description with these markdown sections:
## Summary
## Changes
## Needs manual review
## Verification

Be factual and brief. Mention every applied fix and every issue left for manual review. Do not claim checks passed unless the verification results say so."#;

/// User template for the reporter.
/// Placeholders: `{project_key}`, `{gate_status}`, `{issue_count}`, `{triage_summary}`,
/// `{patch_count}`, `{patches}`, `{manual_count}`, `{manual}`, `{checks}`, `{verdict}`.
pub const REPORTER_USER_TEMPLATE: &str = r#"Generate a pull request description for the following SonarQube quality gate fixes.

Project: {project_key}
Quality Gate: {gate_status}
Total issues found: {issue_count}

Triage summary: {triage_summary}

Applied fixes ({patch_count}):
{patches}

Issues requiring manual review ({manual_count}):
{manual}

Verification results:
{checks}
Overall: {verdict}

Output ONLY the markdown PR description. Do not wrap it in a code block."#;
