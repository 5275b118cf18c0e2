//! Pipeline orchestrator.
//!
//! Runs the stages strictly in sequence:
//!
//! ```text
//! Collect -> [no issues: fixed report] -> Triage -> Fix -> Verify
//!         -> [verify failed and patches produced: Fix -> Verify, once] -> Report
//! ```
//!
//! Every transition is reported through the caller's step callback and the
//! telemetry trace. Failures of the first-pass stages and of the reporter are
//! fatal; failures during the retry are recorded and the run continues with
//! the first-pass results.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use super::collector::run_collector;
use super::error::{AgentError, AgentResult};
use super::fix::run_fix;
use super::reporter::run_reporter;
use super::triage::run_triage;
use super::types::{
    FixResult, PipelineContext, PipelineStep, ReporterResult, StepEvent, StepStatus, VerifierResult,
};
use super::verifier::{run_verifier, VerifierConfig};
use crate::llm::LlmProvider;
use crate::sonar::QualityGateApi;
use crate::telemetry::{PipelineTrace, Telemetry};

/// Fix+Verify is repeated at most this many times after a failed verification.
pub const MAX_FIX_RETRIES: usize = 1;

/// Trace name used for every pipeline run.
pub const PIPELINE_TRACE_NAME: &str = "sonar-gatekeeper-pipeline";

/// Report used when the project has no open issues.
pub const NO_ISSUES_REPORT: &str = "## Summary\nQuality gate passed. No issues found. No changes needed.";

/// Forwards stage transitions to the caller and to telemetry.
struct StepNotifier<'a, F> {
    on_step: &'a mut F,
    trace: &'a PipelineTrace,
}

impl<F: FnMut(&StepEvent)> StepNotifier<'_, F> {
    fn notify(&mut self, step: PipelineStep, status: StepStatus, detail: Option<String>) {
        let event = StepEvent::new(step, status, detail);
        self.trace.event(step.as_str(), status.as_str(), event.detail.as_deref());
        (self.on_step)(&event);
    }

    fn start(&mut self, step: PipelineStep) {
        self.notify(step, StepStatus::Start, None);
    }

    fn done(&mut self, step: PipelineStep, detail: impl Into<String>) {
        self.notify(step, StepStatus::Done, Some(detail.into()));
    }

    fn error(&mut self, step: PipelineStep, err: &AgentError) {
        self.notify(step, StepStatus::Error, Some(err.to_string()));
    }
}

/// The remediation pipeline and its collaborators.
pub struct Pipeline {
    sonar: Arc<dyn QualityGateApi>,
    llm: Arc<dyn LlmProvider>,
    verifier: VerifierConfig,
    telemetry: Telemetry,
}

impl Pipeline {
    pub fn new(sonar: Arc<dyn QualityGateApi>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            sonar,
            llm,
            verifier: VerifierConfig::default(),
            telemetry: Telemetry::disabled(),
        }
    }

    pub fn with_verifier_config(mut self, config: VerifierConfig) -> Self {
        self.verifier = config;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Run every stage for `project_key` against the sources in `project_root`.
    ///
    /// `on_step` sees each transition as it happens.
    ///
    /// # Errors
    ///
    /// The first fatal stage error, after its `error` notification.
    pub async fn run<F>(&self, project_key: &str, project_root: &Path, mut on_step: F) -> AgentResult<PipelineContext>
    where
        F: FnMut(&StepEvent),
    {
        let trace = self
            .telemetry
            .trace(PIPELINE_TRACE_NAME, json!({ "projectKey": project_key }));
        let mut notifier = StepNotifier {
            on_step: &mut on_step,
            trace: &trace,
        };

        info!(project_key, project_root = %project_root.display(), trace_id = trace.id(), "Pipeline started");
        let result = self.run_stages(project_key, project_root, &mut notifier).await;

        match &result {
            Ok(context) => {
                let output = context.reporter.as_ref().map(|r| r.markdown.as_str()).unwrap_or_default();
                trace.finish(output, false);
                info!(project_key, "Pipeline finished");
            }
            Err(e) => {
                trace.finish(&e.to_string(), true);
                warn!(project_key, error = %e, "Pipeline aborted");
            }
        }
        result
    }

    async fn run_stages<F: FnMut(&StepEvent)>(
        &self,
        project_key: &str,
        project_root: &Path,
        notifier: &mut StepNotifier<'_, F>,
    ) -> AgentResult<PipelineContext> {
        let mut context = PipelineContext::new(project_key, project_root);

        notifier.start(PipelineStep::Collect);
        let collector = match run_collector(self.sonar.as_ref(), project_key).await {
            Ok(collector) => collector,
            Err(e) => {
                notifier.error(PipelineStep::Collect, &e);
                return Err(e);
            }
        };
        notifier.done(PipelineStep::Collect, collector.summary.clone());

        if collector.issues.is_empty() {
            notifier.done(PipelineStep::Triage, "No issues to triage");
            context.collector = Some(collector);
            context.reporter = Some(ReporterResult {
                markdown: NO_ISSUES_REPORT.to_string(),
            });
            notifier.notify(PipelineStep::Report, StepStatus::Done, None);
            return Ok(context);
        }

        notifier.start(PipelineStep::Triage);
        let triage = match run_triage(self.llm.as_ref(), &collector).await {
            Ok(triage) => triage,
            Err(e) => {
                notifier.error(PipelineStep::Triage, &e);
                return Err(e);
            }
        };
        notifier.done(PipelineStep::Triage, triage.summary.clone());

        notifier.start(PipelineStep::Fix);
        let mut fix = match run_fix(self.llm.as_ref(), &collector.issues, &triage, project_root, None).await {
            Ok(fix) => fix,
            Err(e) => {
                notifier.error(PipelineStep::Fix, &e);
                return Err(e);
            }
        };
        notifier.done(PipelineStep::Fix, fix.summary.clone());

        notifier.start(PipelineStep::Verify);
        let mut verifier = run_verifier(project_root, &self.verifier).await;
        notifier.done(
            PipelineStep::Verify,
            if verifier.passed { "All checks passed" } else { "Some checks failed" },
        );

        let mut retries = 0;
        while retries < MAX_FIX_RETRIES && needs_retry(&fix, &verifier) {
            retries += 1;
            info!(attempt = retries, "Verification failed, retrying fix stage");

            notifier.notify(
                PipelineStep::Fix,
                StepStatus::Start,
                Some("Retrying after verification failure".to_string()),
            );
            let retried = run_fix(
                self.llm.as_ref(),
                &collector.issues,
                &triage,
                project_root,
                Some(&verifier.feedback),
            )
            .await;

            match retried {
                Ok(retry_fix) => {
                    notifier.done(PipelineStep::Fix, format!("Retry: {}", retry_fix.summary));
                    fix = retry_fix;
                }
                Err(e) => {
                    warn!(error = %e, "Fix retry failed, keeping first-pass results");
                    notifier.notify(PipelineStep::Fix, StepStatus::Error, Some(format!("Retry failed: {}", e)));
                    break;
                }
            }

            notifier.notify(PipelineStep::Verify, StepStatus::Start, Some("Re-verifying".to_string()));
            verifier = run_verifier(project_root, &self.verifier).await;
            notifier.done(
                PipelineStep::Verify,
                if verifier.passed {
                    "Re-verification passed"
                } else {
                    "Re-verification failed"
                },
            );
        }

        context.collector = Some(collector);
        context.triage = Some(triage);
        context.fix = Some(fix);
        context.verifier = Some(verifier);

        notifier.start(PipelineStep::Report);
        match run_reporter(self.llm.as_ref(), &context).await {
            Ok(reporter) => context.reporter = Some(reporter),
            Err(e) => {
                notifier.error(PipelineStep::Report, &e);
                return Err(e);
            }
        }
        notifier.notify(PipelineStep::Report, StepStatus::Done, None);

        Ok(context)
    }
}

/// A retry only helps when verification failed and there were patches to redo.
pub fn needs_retry(fix: &FixResult, verifier: &VerifierResult) -> bool {
    !verifier.passed && !fix.patches.is_empty()
}
