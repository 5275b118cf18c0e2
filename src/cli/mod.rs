//! Command-line interface for sonar-gatekeeper.
//!
//! Provides the `check` command that runs the pipeline and the `ping`
//! reachability check.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands, PATCHES_FILE, REPORT_FILE};
