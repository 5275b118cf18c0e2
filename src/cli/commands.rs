//! CLI command definitions for sonar-gatekeeper.
//!
//! `check` runs the full remediation pipeline for one project and writes the
//! report next to the sources; `ping` checks that the quality-gate service is
//! reachable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::agents::{
    build_failure_report, build_full_report, render_patch_diff, FixPatch, Pipeline,
    PipelineContext, StepEvent,
};
use crate::config::GatekeeperConfig;
use crate::llm::ChatClient;
use crate::sonar::{resolve_token, SonarClient};

/// Report written to the project root after each run.
pub const REPORT_FILE: &str = "pipeline-report.md";

/// Unified diffs for every renderable patch.
pub const PATCHES_FILE: &str = "pipeline-patches.diff";

/// Quality-gate remediation pipeline.
#[derive(Parser)]
#[command(name = "sonar-gatekeeper")]
#[command(about = "Collect, triage, fix, verify and report SonarQube quality-gate issues")]
#[command(version)]
#[command(
    long_about = "sonar-gatekeeper reads a project's quality gate and open issues from SonarQube,\nasks a language model to triage them and propose patches, runs the project's\nchecks, and writes a pull request style report.\n\nExample usage:\n  sonar-gatekeeper check my-project --project-root ./my-project"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the pipeline for a project.
    Check(CheckArgs),

    /// Check that the quality-gate service answers.
    Ping,
}

/// Arguments for `sonar-gatekeeper check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Project key; defaults to SONAR_PROJECT_KEY.
    pub project_key: Option<String>,

    /// Directory holding the project's sources.
    #[arg(long, env = "PROJECT_ROOT")]
    pub project_root: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = match GatekeeperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Check(args) => run_check_command(args, config).await,
        Commands::Ping => run_ping_command(config).await,
    }
}

async fn run_ping_command(config: GatekeeperConfig) -> anyhow::Result<()> {
    // The status endpoint is public; without SONAR_TOKEN no Authorization header is sent.
    let token = config.sonar_token.clone().unwrap_or_default();
    let client = SonarClient::new(&config.sonar_url, token);
    if client.ping().await {
        println!("SonarQube at {} is reachable", client.base_url());
        Ok(())
    } else {
        eprintln!("SonarQube at {} is not reachable", client.base_url());
        std::process::exit(1);
    }
}

async fn run_check_command(args: CheckArgs, config: GatekeeperConfig) -> anyhow::Result<()> {
    let project_key = args.project_key.unwrap_or_else(|| config.project_key.clone());
    let project_root = match args.project_root {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    println!("SonarGatekeeper pipeline");
    println!("Project: {}", project_key);
    println!("Root: {}", project_root.display());
    println!();

    let telemetry = config.telemetry();

    let token = match resolve_token(&config.sonar_url, config.token_sources(), config.credentials()).await {
        Ok(token) => token,
        Err(e) => {
            eprintln!("Could not obtain a SonarQube token: {}", e);
            telemetry.shutdown().await;
            std::process::exit(1);
        }
    };

    let pipeline = Pipeline::new(
        Arc::new(SonarClient::new(&config.sonar_url, token)),
        Arc::new(ChatClient::ollama(&config.ollama_host, config.ollama_model.clone())),
    )
    .with_verifier_config(config.verifier_config())
    .with_telemetry(telemetry.clone());

    let mut steps: Vec<StepEvent> = Vec::new();
    let outcome = {
        let run = pipeline.run(&project_key, &project_root, |event| {
            println!("{}", event);
            steps.push(event.clone());
        });
        tokio::select! {
            result = run => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    match outcome {
        Some(Ok(context)) => {
            let report = build_full_report(&context, &steps);
            println!();
            println!("{}", report);
            persist_artifacts(&project_root, &context, &report).await;
            telemetry.shutdown().await;
            Ok(())
        }
        Some(Err(e)) => {
            eprintln!();
            eprintln!("{}", build_failure_report(&e.to_string(), &steps));
            telemetry.shutdown().await;
            std::process::exit(1);
        }
        None => {
            warn!("Interrupted, shutting down");
            telemetry.shutdown().await;
            eprintln!("Interrupted");
            std::process::exit(130);
        }
    }
}

/// Write the report and patch diffs. Failures are warnings only.
async fn persist_artifacts(project_root: &Path, context: &PipelineContext, report: &str) {
    let report_path = project_root.join(REPORT_FILE);
    match tokio::fs::write(&report_path, report).await {
        Ok(()) => info!(path = %report_path.display(), "Report written"),
        Err(e) => warn!(path = %report_path.display(), error = %e, "Could not write report"),
    }

    let Some(fix) = context.fix.as_ref().filter(|f| !f.patches.is_empty()) else {
        return;
    };
    let diffs = collect_diffs(project_root, &fix.patches).await;
    if diffs.is_empty() {
        return;
    }

    let diff_path = project_root.join(PATCHES_FILE);
    match tokio::fs::write(&diff_path, diffs.join("\n")).await {
        Ok(()) => info!(path = %diff_path.display(), patches = diffs.len(), "Patch diffs written"),
        Err(e) => warn!(path = %diff_path.display(), error = %e, "Could not write patch diffs"),
    }
}

async fn collect_diffs(project_root: &Path, patches: &[FixPatch]) -> Vec<String> {
    let mut diffs = Vec::with_capacity(patches.len());
    for patch in patches {
        match render_patch_diff(project_root, patch).await {
            Ok(diff) => diffs.push(diff),
            Err(e) => warn!(issue = %patch.issue_key, error = %e, "Skipping patch diff"),
        }
    }
    diffs
}
