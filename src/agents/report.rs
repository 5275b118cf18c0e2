//! Report assembly.
//!
//! Renders the final pipeline state and the step log into one markdown
//! document. Pure: no I/O, and identical input gives byte-identical output.

use super::types::{PipelineContext, StepEvent};

/// Render the full report for a finished pipeline run.
pub fn build_full_report(context: &PipelineContext, steps: &[StepEvent]) -> String {
    let mut lines: Vec<String> = vec!["# Pipeline complete".to_string(), String::new(), "## Steps".to_string()];
    lines.extend(steps.iter().map(|s| format!("- {}", s)));

    let gate_status = context
        .collector
        .as_ref()
        .map(|c| c.quality_gate.status.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let verification = match &context.verifier {
        Some(v) if v.passed => "PASSED",
        Some(_) => "FAILED",
        None => "NOT RUN",
    };

    lines.extend([
        String::new(),
        "## Summary".to_string(),
        format!("- Quality Gate: {}", gate_status),
        format!("- Issues found: {}", context.collector.as_ref().map_or(0, |c| c.issues.len())),
        format!("- Patches generated: {}", context.fix.as_ref().map_or(0, |f| f.patches.len())),
        format!("- Unfixed: {}", context.fix.as_ref().map_or(0, |f| f.unfixable.len())),
        format!("- Verification: {}", verification),
    ]);

    if let Some(triage) = context.triage.as_ref().filter(|t| !t.groups.is_empty()) {
        lines.extend([String::new(), "## Triage groups".to_string(), String::new()]);
        for group in &triage.groups {
            lines.push(format!(
                "### {}: {}",
                group.priority.as_str().to_uppercase(),
                group.category
            ));
            lines.push(format!(
                "- Strategy: **{}** | Effort: **{}**",
                group.fix_strategy, group.estimated_effort
            ));
            lines.push(format!("- Issues: {}", group.issue_keys.join(", ")));
            lines.push(String::new());
        }
    }

    if let Some(fix) = &context.fix {
        if !fix.patches.is_empty() {
            lines.extend(["## Patches".to_string(), String::new()]);
            for patch in &fix.patches {
                lines.push(format!("### `{}` - {}", patch.file_path, patch.issue_key));
                lines.push(patch.description.clone());
                lines.push(String::new());
                lines.push("```diff".to_string());
                lines.extend(patch.original.split('\n').map(|l| format!("- {}", l)));
                lines.extend(patch.replacement.split('\n').map(|l| format!("+ {}", l)));
                lines.push("```".to_string());
                lines.push(String::new());
            }
        }

        if !fix.unfixable.is_empty() {
            lines.extend(["## Unresolved issues (manual review required)".to_string(), String::new()]);
            lines.extend(fix.unfixable.iter().map(|u| format!("- **{}**: {}", u.issue_key, u.reason)));
            lines.push(String::new());
        }
    }

    lines.extend([
        "## PR description".to_string(),
        String::new(),
        context
            .reporter
            .as_ref()
            .map(|r| r.markdown.clone())
            .unwrap_or_else(|| "(report was not generated)".to_string()),
        String::new(),
        "---".to_string(),
        "*Report generated by the SonarGatekeeper pipeline*".to_string(),
    ]);

    lines.join("\n")
}

/// Render the message shown when a fatal error aborts the pipeline.
pub fn build_failure_report(error: &str, steps: &[StepEvent]) -> String {
    let step_list = steps.iter().map(|s| format!("- {}", s)).collect::<Vec<_>>().join("\n");
    format!("Pipeline failed: {}\n\nCompleted steps:\n{}", error, step_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{
        CollectorResult, Effort, FixPatch, FixResult, FixStrategy, PipelineStep, Priority, ReporterResult,
        StepStatus, TriageGroup, TriageResult, Unfixable, VerifierResult,
    };
    use crate::sonar::{QualityGateProjectStatus, QualityGateStatus};
    use std::collections::BTreeMap;

    fn full_context() -> PipelineContext {
        let mut context = PipelineContext::new("demo", "/tmp/demo");
        context.collector = Some(CollectorResult {
            quality_gate: QualityGateProjectStatus {
                status: QualityGateStatus::Error,
                conditions: Vec::new(),
                ignored_conditions: false,
                cayc_status: None,
            },
            issues: Vec::new(),
            rules: BTreeMap::new(),
            summary: String::new(),
        });
        context.triage = Some(TriageResult {
            groups: vec![TriageGroup {
                priority: Priority::High,
                category: "Unused code".to_string(),
                issue_keys: vec!["k1".to_string(), "k2".to_string()],
                fix_strategy: FixStrategy::Auto,
                estimated_effort: Effort::Trivial,
            }],
            summary: "one group".to_string(),
        });
        context.fix = Some(FixResult {
            patches: vec![FixPatch {
                issue_key: "k1".to_string(),
                file_path: "src/a.ts".to_string(),
                original: "var a = 1;\nvar b = 2;".to_string(),
                replacement: "const a = 1;".to_string(),
                description: "Use const".to_string(),
                fixable: true,
            }],
            unfixable: vec![Unfixable {
                issue_key: "k2".to_string(),
                reason: "needs design".to_string(),
            }],
            summary: String::new(),
        });
        context.verifier = Some(VerifierResult {
            passed: true,
            checks: Vec::new(),
            feedback: String::new(),
        });
        context.reporter = Some(ReporterResult {
            markdown: "## Summary\nFixed.".to_string(),
        });
        context
    }

    fn steps() -> Vec<StepEvent> {
        vec![
            StepEvent::new(PipelineStep::Collect, StepStatus::Start, None),
            StepEvent::new(PipelineStep::Collect, StepStatus::Done, Some("ok".to_string())),
        ]
    }

    #[test]
    fn test_full_report_sections_in_order() {
        let report = build_full_report(&full_context(), &steps());

        let order = [
            "## Steps",
            "- [collect] start",
            "- [collect] done: ok",
            "## Summary",
            "- Quality Gate: ERROR",
            "- Patches generated: 1",
            "- Unfixed: 1",
            "- Verification: PASSED",
            "## Triage groups",
            "### HIGH: Unused code",
            "- Strategy: **auto** | Effort: **trivial**",
            "- Issues: k1, k2",
            "## Patches",
            "### `src/a.ts` - k1",
            "```diff\n- var a = 1;\n- var b = 2;\n+ const a = 1;\n```",
            "## Unresolved issues (manual review required)",
            "- **k2**: needs design",
            "## PR description",
            "## Summary\nFixed.",
            "*Report generated by the SonarGatekeeper pipeline*",
        ];
        let mut cursor = 0;
        for needle in order {
            let found = report[cursor..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {}", needle));
            cursor += found + needle.len();
        }
    }

    #[test]
    fn test_report_is_deterministic() {
        let context = full_context();
        let steps = steps();
        assert_eq!(build_full_report(&context, &steps), build_full_report(&context, &steps));
    }

    #[test]
    fn test_minimal_report_omits_optional_sections() {
        let mut context = PipelineContext::new("demo", "/tmp");
        context.reporter = Some(ReporterResult {
            markdown: "## Summary\nQuality gate passed. No issues found. No changes needed.".to_string(),
        });

        let report = build_full_report(&context, &[]);

        assert!(report.contains("- Quality Gate: unknown"));
        assert!(report.contains("- Verification: NOT RUN"));
        assert!(!report.contains("## Triage groups"));
        assert!(!report.contains("## Patches"));
        assert!(!report.contains("## Unresolved issues"));
        assert!(report.contains("No changes needed."));
    }

    #[test]
    fn test_missing_reporter_placeholder() {
        let report = build_full_report(&PipelineContext::new("demo", "/tmp"), &[]);
        assert!(report.contains("(report was not generated)"));
    }

    #[test]
    fn test_failure_report() {
        let text = build_failure_report("Collector failed: boom", &steps());
        assert_eq!(
            text,
            "Pipeline failed: Collector failed: boom\n\nCompleted steps:\n- [collect] start\n- [collect] done: ok"
        );
    }
}
