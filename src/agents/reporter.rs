//! Reporter stage: asks the model for a pull request description.

use tracing::info;

use super::error::AgentResult;
use super::types::{PipelineContext, ReporterResult};
use crate::llm::{generate_text, LlmProvider};
use crate::prompts::{REPORTER_SYSTEM_PROMPT, REPORTER_USER_TEMPLATE};

/// Output token budget for the description.
pub const REPORTER_MAX_TOKENS: u32 = 2048;

/// Generate the narrative description for the accumulated pipeline state.
///
/// # Errors
///
/// Model failures are returned; the reporter has no fallback text.
pub async fn run_reporter(provider: &dyn LlmProvider, context: &PipelineContext) -> AgentResult<ReporterResult> {
    let prompt = build_prompt(context);
    let text = generate_text(provider, REPORTER_SYSTEM_PROMPT, &prompt, REPORTER_MAX_TOKENS).await?;

    info!(chars = text.len(), "PR description generated");
    Ok(ReporterResult {
        markdown: text.trim().to_string(),
    })
}

fn build_prompt(context: &PipelineContext) -> String {
    let patches: Vec<String> = context
        .fix
        .iter()
        .flat_map(|f| f.patches.iter())
        .map(|p| format!("- [{}] {}: {}", p.issue_key, p.file_path, p.description))
        .collect();

    let manual: Vec<String> = context
        .fix
        .iter()
        .flat_map(|f| f.unfixable.iter())
        .map(|u| format!("- [{}]: {}", u.issue_key, u.reason))
        .collect();

    let checks: Vec<String> = context
        .verifier
        .iter()
        .flat_map(|v| v.checks.iter())
        .map(|c| format!("- {}: {}", c.name, if c.passed { "PASS" } else { "FAIL" }))
        .collect();

    let gate_status = context
        .collector
        .as_ref()
        .map(|c| c.quality_gate.status.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let issue_count = context.collector.as_ref().map(|c| c.issues.len()).unwrap_or(0);
    let triage_summary = context.triage.as_ref().map(|t| t.summary.as_str()).unwrap_or("N/A");
    let verdict = if context.verifier.as_ref().is_some_and(|v| v.passed) {
        "ALL PASSED"
    } else {
        "FAILURES PRESENT"
    };

    REPORTER_USER_TEMPLATE
        .replace("{project_key}", &context.project_key)
        .replace("{gate_status}", &gate_status)
        .replace("{issue_count}", &issue_count.to_string())
        .replace("{triage_summary}", triage_summary)
        .replace("{patch_count}", &patches.len().to_string())
        .replace("{patches}", &or_none(&patches, "None"))
        .replace("{manual_count}", &manual.len().to_string())
        .replace("{manual}", &or_none(&manual, "None"))
        .replace("{checks}", &or_none(&checks, "Not run"))
        .replace("{verdict}", verdict)
}

fn or_none(lines: &[String], empty: &str) -> String {
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{FixPatch, FixResult, Unfixable, VerifierCheck, VerifierResult};
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationRequest, GenerationResponse, Message, Usage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockLlmProvider {
        response: Result<String, ()>,
        last_prompt: Mutex<String>,
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            *self.last_prompt.lock().expect("lock not poisoned") =
                request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let content = self
                .response
                .clone()
                .map_err(|_| LlmError::RateLimited("slow down".to_string()))?;
            Ok(GenerationResponse {
                id: "mock-id".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    fn context() -> PipelineContext {
        let mut context = PipelineContext::new("demo", "/tmp/demo");
        context.fix = Some(FixResult {
            patches: vec![FixPatch {
                issue_key: "k1".to_string(),
                file_path: "src/a.ts".to_string(),
                original: "var a".to_string(),
                replacement: "const a".to_string(),
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
            passed: false,
            checks: vec![VerifierCheck {
                name: "lint".to_string(),
                passed: false,
                exit_code: 1,
                output: String::new(),
            }],
            feedback: String::new(),
        });
        context
    }

    #[tokio::test]
    async fn test_reporter_prompt_and_trim() {
        let provider = MockLlmProvider {
            response: Ok("\n## Summary\nFixed one issue.\n\n".to_string()),
            last_prompt: Mutex::new(String::new()),
        };

        let result = run_reporter(&provider, &context()).await.expect("reporter");
        assert_eq!(result.markdown, "## Summary\nFixed one issue.");

        let prompt = provider.last_prompt.lock().expect("lock").clone();
        assert!(prompt.contains("Project: demo"));
        assert!(prompt.contains("Quality Gate: unknown"));
        assert!(prompt.contains("- [k1] src/a.ts: Use const"));
        assert!(prompt.contains("- [k2]: needs design"));
        assert!(prompt.contains("- lint: FAIL"));
        assert!(prompt.contains("Overall: FAILURES PRESENT"));
    }

    #[tokio::test]
    async fn test_reporter_empty_sections() {
        let provider = MockLlmProvider {
            response: Ok("ok".to_string()),
            last_prompt: Mutex::new(String::new()),
        };

        run_reporter(&provider, &PipelineContext::new("demo", "/tmp"))
            .await
            .expect("reporter");

        let prompt = provider.last_prompt.lock().expect("lock").clone();
        assert!(prompt.contains("Applied fixes (0):\nNone"));
        assert!(prompt.contains("Verification results:\nNot run"));
    }

    #[tokio::test]
    async fn test_reporter_model_error_propagates() {
        let provider = MockLlmProvider {
            response: Err(()),
            last_prompt: Mutex::new(String::new()),
        };

        let result = run_reporter(&provider, &context()).await;
        assert!(result.is_err());
    }
}
