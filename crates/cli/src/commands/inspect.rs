//! Inspect the report a recorded event stream produces, without writing it

use allure_bridge_common::{ReporterConfig, Status, StepResult, TestResult};
use allure_bridge_reporter::replay::replay;
use allure_bridge_reporter::{MemorySink, ReporterContext};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::{event_files, read_events};
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Event stream file, or a directory of streams
    pub events: PathBuf,

    /// Create steps for BDD steps
    #[arg(long)]
    pub log_gherkin: bool,
}

#[derive(Debug, Serialize)]
pub struct TestDisplay {
    pub name: String,
    pub status: String,
    pub steps: usize,
    pub labels: Vec<String>,
    pub links: Vec<String>,
    pub message: Option<String>,
}

fn count_steps(steps: &[StepResult]) -> usize {
    steps.iter().map(|s| 1 + count_steps(&s.steps)).sum()
}

impl From<&TestResult> for TestDisplay {
    fn from(test: &TestResult) -> Self {
        Self {
            name: test.name.clone(),
            status: test
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            steps: count_steps(&test.steps),
            labels: test
                .labels
                .iter()
                .map(|l| format!("{}={}", l.name, l.value))
                .collect(),
            links: test
                .links
                .iter()
                .map(|l| match &l.link_type {
                    Some(kind) => format!("{}:{}", kind, l.url),
                    None => l.url.clone(),
                })
                .collect(),
            message: test.status_details.as_ref().and_then(|d| d.message.clone()),
        }
    }
}

impl TableDisplay for TestDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Status", "Steps", "Labels", "Links", "Message"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.status.clone(),
            self.steps.to_string(),
            self.labels.join("\n"),
            self.links.join("\n"),
            self.message.clone().unwrap_or_default(),
        ]
    }
}

pub async fn execute(args: InspectArgs, format: OutputFormat) -> Result<()> {
    let config = ReporterConfig {
        log_gherkin_steps: args.log_gherkin,
        ..Default::default()
    };

    let mut tests: Vec<TestDisplay> = Vec::new();
    let mut statuses: Vec<Option<Status>> = Vec::new();
    for file in event_files(&args.events)? {
        let events = read_events(&file).await?;
        let mut context = ReporterContext::create(config.clone(), Box::new(MemorySink::new()));
        replay(&mut context, events);
        let results = context.dispose();
        statuses.extend(results.tests.iter().map(|t| t.status));
        tests.extend(results.tests.iter().map(TestDisplay::from));
    }

    print_list(&tests, format);
    if matches!(format, OutputFormat::Table) {
        let count = |status| statuses.iter().filter(|s| **s == Some(status)).count();
        println!(
            "{} passed, {} failed, {} broken, {} skipped",
            count(Status::Passed).to_string().green(),
            count(Status::Failed).to_string().red(),
            count(Status::Broken).to_string().yellow(),
            count(Status::Skipped).to_string().dimmed()
        );
    }
    Ok(())
}
