//! Replay recorded host event streams into a results directory

use allure_bridge_common::{ReporterConfig, RunResults, Status};
use allure_bridge_reporter::replay::replay;
use allure_bridge_reporter::{JsonDirSink, ReporterContext};
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{event_files, read_events};
use crate::output::{print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Event stream file, or a directory of `.ndjson` / `.jsonl` streams
    pub events: PathBuf,

    /// Output directory for results
    #[arg(short, long, env = "ALLURE_RESULTS_PATH")]
    pub results_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, default_value = "allure-bridge.toml")]
    pub config: PathBuf,

    /// Do not create steps for framework commands
    #[arg(long)]
    pub no_log_commands: bool,

    /// Create steps for BDD steps
    #[arg(long)]
    pub log_gherkin: bool,

    /// Attach request and response details
    #[arg(long)]
    pub attach_requests: bool,

    /// Add framework and language labels
    #[arg(long)]
    pub analytic_labels: bool,

    /// Omit skipped tests from the written results
    #[arg(long)]
    pub clear_skipped: bool,
}

impl ReplayArgs {
    /// Config file, then `ALLURE_*` environment, then flags
    pub fn resolve_config(&self) -> Result<ReporterConfig> {
        let mut config = ReporterConfig::load(&self.config)
            .with_context(|| format!("Failed to load {}", self.config.display()))?;
        config
            .apply_env(std::env::vars())
            .context("Invalid ALLURE_* environment")?;

        if let Some(dir) = &self.results_dir {
            config.results_path = dir.clone();
        }
        if self.no_log_commands {
            config.log_commands = false;
        }
        config.log_gherkin_steps |= self.log_gherkin;
        config.attach_requests |= self.attach_requests;
        config.add_analytic_labels |= self.analytic_labels;
        config.clear_skipped_tests |= self.clear_skipped;
        Ok(config)
    }
}

/// Outcome of one replayed stream
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub file: String,
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub broken: usize,
    pub skipped: usize,
    pub rejected_events: usize,
}

impl RunSummary {
    pub fn new(file: &Path, results: &RunResults, rejected_events: usize) -> Self {
        let count = |status: Status| {
            results
                .tests
                .iter()
                .filter(|t| t.status == Some(status))
                .count()
        };
        Self {
            file: file.display().to_string(),
            tests: results.tests.len(),
            passed: count(Status::Passed),
            failed: count(Status::Failed),
            broken: count(Status::Broken),
            skipped: count(Status::Skipped),
            rejected_events,
        }
    }
}

impl TableDisplay for RunSummary {
    fn headers() -> Vec<&'static str> {
        vec!["File", "Tests", "Passed", "Failed", "Broken", "Skipped", "Rejected"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.file.clone(),
            self.tests.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.broken.to_string(),
            self.skipped.to_string(),
            self.rejected_events.to_string(),
        ]
    }
}

pub async fn execute(args: ReplayArgs, format: OutputFormat) -> Result<()> {
    let config = args.resolve_config()?;
    let files = event_files(&args.events)?;
    if files.is_empty() {
        print_warning(&format!("No event streams found in {}", args.events.display()));
        return Ok(());
    }

    let mut summaries = Vec::new();
    for file in &files {
        let events = read_events(file).await?;
        info!("Replaying {} event(s) from {}", events.len(), file.display());

        // one context per stream, like one reporter per spec file
        let sink = JsonDirSink::new(&config.results_path);
        let mut context = ReporterContext::create(config.clone(), Box::new(sink));
        let rejected = replay(&mut context, events);
        let results = context.dispose();
        summaries.push(RunSummary::new(file, &results, rejected));
    }

    print_list(&summaries, format);
    print_success(&format!(
        "Results written to {}",
        config.results_path.display()
    ));
    Ok(())
}
