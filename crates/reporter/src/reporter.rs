//! The reporter: one per spec-file run
//!
//! Owns the run state, the command tracker and the scenario snapshot. The
//! lifecycle controller, reporting interface and tag enrichment are
//! implemented on it in their own modules.

use allure_bridge_common::{
    history_id, NodeId, NodeKind, ReportTree, ReporterConfig, RunResults, Status,
};
use tracing::debug;

use crate::event::CommandAttrs;
use crate::gherkin::ScenarioSnapshot;
use crate::ledger::ChainLedger;
use crate::state::RunState;
use crate::tracker::CommandTracker;

/// Parameter through which a test asks to be renamed in the written results
pub const OVERWRITE_TEST_NAME: &str = "OverwriteTestName";

#[derive(Debug)]
pub struct Reporter {
    pub(crate) state: RunState,
    pub(crate) tracker: CommandTracker,
    pub(crate) scenario: Option<ScenarioSnapshot>,
}

impl Reporter {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            state: RunState::new(config),
            tracker: CommandTracker::new(),
            scenario: None,
        }
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.state.config
    }

    pub fn tree(&self) -> &ReportTree {
        &self.state.tree
    }

    pub fn ledger(&self) -> &ChainLedger {
        self.tracker.ledger()
    }

    pub fn current_test(&self) -> Option<NodeId> {
        self.state.current_test()
    }

    pub fn current_suite(&self) -> Option<NodeId> {
        self.state.current_suite()
    }

    /// Logical steps still on the stack
    pub fn open_logical_steps(&self) -> usize {
        self.state.steps.len() + usize::from(self.state.parent_step.is_some())
    }

    /// Steps of any kind not closed yet
    pub fn open_steps(&self) -> usize {
        self.state
            .tree
            .open_nodes()
            .into_iter()
            .filter(|id| self.state.tree.node(*id).kind == NodeKind::Step)
            .count()
    }

    // ========================================================================
    // Host signals that are not lifecycle events
    // ========================================================================

    pub fn command_enqueued(&mut self, attrs: &CommandAttrs) {
        self.tracker.on_enqueue(attrs);
    }

    pub fn command_started(&mut self, attrs: &CommandAttrs) {
        self.tracker.on_start(&mut self.state, attrs);
    }

    pub fn command_ended(&mut self, attrs: &CommandAttrs) {
        self.tracker.on_end(&mut self.state, attrs, false);
    }

    /// The host reported the command as failed outside its normal lifecycle
    pub fn command_failed(&mut self, attrs: &CommandAttrs) {
        self.tracker.on_end(&mut self.state, attrs, true);
    }

    /// Force-finish every open command; a no-op when nothing is open
    pub fn flush_commands(&mut self, terminal: Status) {
        self.tracker.flush_all(&mut self.state, terminal);
    }

    /// Snapshot of the executing BDD scenario
    pub fn set_scenario(&mut self, snapshot: Option<ScenarioSnapshot>) {
        self.scenario = snapshot;
    }

    /// Title of the test the host is executing
    pub fn set_host_test(&mut self, title: Option<String>) {
        self.state.host_test_title = title;
    }

    // ========================================================================
    // Handoff
    // ========================================================================

    /// Flat results of everything closed so far
    pub fn results(&self) -> RunResults {
        let mut results = self.state.tree.collect();
        results.files = self.state.files.clone();
        results.test_ids = self.state.test_ids.clone();

        for test in &mut results.tests {
            let Some(index) = test
                .parameters
                .iter()
                .position(|p| p.name == OVERWRITE_TEST_NAME)
            else {
                continue;
            };
            let name = test.parameters.remove(index).value;
            debug!("Renaming test '{}' to '{}'", test.name, name);
            test.history_id = Some(history_id(&name));
            test.full_name = Some(name.clone());
            test.name = name;
        }
        results
    }
}
