//! Reporter context: one per spec-file run
//!
//! Created when the run starts and disposed when it ends. Disposing closes
//! whatever is still open and hands the results to the sink. A failing sink
//! is logged and never fails the run.

use allure_bridge_common::{ReporterConfig, RunResults};
use tracing::{error, info};

use crate::reporter::Reporter;
use crate::sink::ResultSink;

pub struct ReporterContext {
    reporter: Reporter,
    sink: Box<dyn ResultSink>,
}

impl std::fmt::Debug for ReporterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterContext")
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl ReporterContext {
    pub fn create(config: ReporterConfig, sink: Box<dyn ResultSink>) -> Self {
        if !config.enabled {
            info!("Reporting is disabled");
        }
        Self {
            reporter: Reporter::new(config),
            sink,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.reporter.config().enabled
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// The reporter, or `None` while reporting is disabled
    pub fn handle(&mut self) -> Option<&mut Reporter> {
        if self.is_enabled() {
            Some(&mut self.reporter)
        } else {
            None
        }
    }

    pub fn dispose(mut self) -> RunResults {
        if !self.is_enabled() {
            return RunResults::default();
        }
        self.reporter.end_run();
        let results = self.reporter.results();
        if let Err(e) = self.sink.write(&results, self.reporter.config()) {
            error!("Failed to write results: {}", e);
        }
        results
    }
}
