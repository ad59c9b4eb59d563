//! Result sinks
//!
//! A sink receives the flat handoff of a finished run. The JSON directory
//! sink lays results out the way report generators read them: one
//! `<uuid>-result.json` per test, one `<uuid>-container.json` per suite,
//! attachment files side by side, plus run metadata files.

use allure_bridge_common::{
    extension_for, Attachment, ReporterConfig, RunResults, Status, TestResult,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ReporterResult;

pub trait ResultSink: Send {
    fn write(&mut self, results: &RunResults, config: &ReporterConfig) -> ReporterResult<()>;
}

/// Keeps every handed-off run in memory; clones share the same store
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    runs: Arc<Mutex<Vec<RunResults>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> Vec<RunResults> {
        self.runs.lock().clone()
    }

    pub fn last(&self) -> Option<RunResults> {
        self.runs.lock().last().cloned()
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, results: &RunResults, _config: &ReporterConfig) -> ReporterResult<()> {
        self.runs.lock().push(results.clone());
        Ok(())
    }
}

/// Writes results into a directory
#[derive(Debug, Clone)]
pub struct JsonDirSink {
    dir: PathBuf,
}

impl JsonDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> ReporterResult<()> {
        let content = serde_json::to_vec_pretty(value)?;
        std::fs::write(self.dir.join(file_name), content)?;
        Ok(())
    }

    /// Copy pending files next to the results and attach them to every test
    /// with a matching name. Missing files are skipped.
    fn copy_files(&self, results: &RunResults, tests: &mut [TestResult]) {
        for file in &results.files {
            let source = Path::new(&file.path);
            let ext = source
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_else(|| extension_for(&file.content_type));
            let target = format!("{}-attachment.{}", Uuid::new_v4(), ext);

            if let Err(e) = std::fs::copy(source, self.dir.join(&target)) {
                warn!("Could not copy attachment {}: {}", file.path, e);
                continue;
            }
            for test in tests
                .iter_mut()
                .filter(|t| file.test_name.as_deref() == Some(t.name.as_str()))
            {
                test.attachments.push(Attachment {
                    name: file.name.clone(),
                    content_type: file.content_type.clone(),
                    source: target.clone(),
                });
            }
        }
    }
}

impl ResultSink for JsonDirSink {
    fn write(&mut self, results: &RunResults, config: &ReporterConfig) -> ReporterResult<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut tests: Vec<TestResult> = results
            .tests
            .iter()
            .filter(|t| !(config.clear_skipped_tests && t.status == Some(Status::Skipped)))
            .cloned()
            .collect();
        let written: HashSet<String> = tests.iter().map(|t| t.uuid.clone()).collect();

        self.copy_files(results, &mut tests);

        for test in &tests {
            self.write_json(&format!("{}-result.json", test.uuid), test)?;
        }

        let suite_uuids: HashSet<&str> =
            results.containers.iter().map(|c| c.uuid.as_str()).collect();
        for container in &results.containers {
            let mut container = container.clone();
            if config.clear_skipped_tests {
                container
                    .children
                    .retain(|c| written.contains(c) || suite_uuids.contains(c.as_str()));
                if container.children.is_empty() {
                    debug!("Omitting empty suite '{}'", container.name);
                    continue;
                }
            }
            self.write_json(&format!("{}-container.json", container.uuid), &container)?;
        }

        for (source, bytes) in &results.attachments {
            std::fs::write(self.dir.join(source), bytes)?;
        }

        if let Some(environment) = &results.environment {
            let content: String = environment
                .iter()
                .map(|(key, value)| format!("{} = {}\n", key, value))
                .collect();
            std::fs::write(self.dir.join("environment.properties"), content)?;
        }
        if let Some(executor) = &results.executor {
            self.write_json("executor.json", executor)?;
        }
        if let Some(categories) = &results.categories {
            self.write_json("categories.json", categories)?;
        }

        info!(
            "Wrote {} test(s) and {} suite(s) to {}",
            tests.len(),
            results.containers.len(),
            self.dir.display()
        );
        Ok(())
    }
}
