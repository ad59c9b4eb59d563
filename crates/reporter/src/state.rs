//! Per-run reporter state
//!
//! Everything the lifecycle controller, command tracker and step finisher
//! share: the report tree, the suite stack, the logical step stack and the
//! markers for the currently running hook and test.

use allure_bridge_common::{
    Label, NodeId, NodeKind, PendingFile, ReportTree, ReporterConfig, Status,
};
use std::collections::BTreeMap;

/// Name given to the host's anonymous per-file wrapper suite
pub const GLOBAL_SUITE: &str = "Global";

#[derive(Debug)]
pub struct RunState {
    pub config: ReporterConfig,
    pub tree: ReportTree,
    pub suites: Vec<NodeId>,
    /// Logical (user or BDD declared) steps, innermost last
    pub steps: Vec<NodeId>,
    /// Open BDD step that later steps nest under
    pub parent_step: Option<NodeId>,
    pub current_hook: Option<NodeId>,
    current_test: Option<NodeId>,
    previous_test_name: Option<String>,
    /// Title of the test the host is executing, when it differs from ours
    pub host_test_title: Option<String>,
    /// Labels declared while no test was running
    pub label_storage: Vec<Label>,
    pub files: Vec<PendingFile>,
    pub test_ids: BTreeMap<String, Vec<String>>,
}

impl RunState {
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            tree: ReportTree::new(),
            suites: Vec::new(),
            steps: Vec::new(),
            parent_step: None,
            current_hook: None,
            current_test: None,
            previous_test_name: None,
            host_test_title: None,
            label_storage: Vec::new(),
            files: Vec::new(),
            test_ids: BTreeMap::new(),
        }
    }

    pub fn current_suite(&self) -> Option<NodeId> {
        self.suites.last().copied()
    }

    pub fn current_suite_is_global(&self) -> bool {
        self.current_suite()
            .is_some_and(|suite| self.tree.node(suite).name == GLOBAL_SUITE)
    }

    /// Innermost logical step
    pub fn current_step(&self) -> Option<NodeId> {
        self.steps.last().copied()
    }

    /// Most recent test, even if already finalized
    pub fn current_test(&self) -> Option<NodeId> {
        self.current_test
    }

    /// Most recent test while it is still open
    pub fn running_test(&self) -> Option<NodeId> {
        self.current_test
            .filter(|test| !self.tree.node(*test).is_closed())
    }

    pub fn set_current_test(&mut self, test: Option<NodeId>) {
        if let Some(previous) = self.current_test {
            self.previous_test_name = Some(self.tree.node(previous).name.clone());
        }
        self.current_test = test;
    }

    /// Where a new step goes when nothing more specific applies
    pub fn current_executable(&self) -> Option<NodeId> {
        self.current_step()
            .or(self.parent_step)
            .or(self.current_hook)
            .or(self.running_test())
            .or(self.current_suite())
    }

    /// Test that file attachments recorded now belong to
    pub fn test_name_for_attachment(&self) -> Option<String> {
        self.host_test_title
            .clone()
            .or_else(|| self.current_test.map(|t| self.tree.node(t).name.clone()))
            .or_else(|| self.previous_test_name.clone())
    }

    /// Status of the running test for steps closed by the user
    pub fn status_for_user_step(&self) -> Status {
        if self.current_hook.is_some() {
            return Status::Passed;
        }
        self.running_test()
            .and_then(|t| self.tree.node(t).status)
            .unwrap_or(Status::Passed)
    }

    /// Tests created below a suite, including nested suites
    pub fn tests_under(&self, suite: NodeId) -> Vec<NodeId> {
        let mut tests = Vec::new();
        let mut pending = vec![suite];
        while let Some(id) = pending.pop() {
            for child in &self.tree.node(id).children {
                match self.tree.node(*child).kind {
                    NodeKind::Test => tests.push(*child),
                    _ => pending.push(*child),
                }
            }
        }
        tests
    }
}
