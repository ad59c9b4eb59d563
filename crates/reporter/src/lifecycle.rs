//! Suite, test and hook lifecycle
//!
//! Drives suite/test/hook creation from the host's runner events and calls
//! the step finisher and the command flush at every boundary.

use allure_bridge_common::{history_id, HookPlacement, Label, NodeKind, Status, StatusDetails};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ReporterError, ReporterResult};
use crate::event::{ErrorInfo, HookInfo, RunnableKind, SuiteInfo, TestInfo};
use crate::gherkin;
use crate::reporter::Reporter;
use crate::state::GLOBAL_SUITE;

static EACH_HOOK_DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(before|after) each" hook:? *"#).expect("hook decoration regex")
});

/// Suite labels for a test from the titles of its enclosing suites
pub fn suite_labels(title_path: &[String]) -> Vec<Label> {
    if let [only] = title_path {
        return vec![Label::new("suite", only.clone())];
    }
    let mut labels = Vec::new();
    let mut titles = title_path.iter();
    if let Some(parent) = titles.next() {
        labels.push(Label::new("parentSuite", parent.clone()));
    }
    if let Some(suite) = titles.next() {
        labels.push(Label::new("suite", suite.clone()));
    }
    let rest: Vec<&str> = titles.map(String::as_str).collect();
    if !rest.is_empty() {
        labels.push(Label::new("subSuite", rest.join(" > ")));
    }
    labels
}

/// Language label from a spec file name
pub fn language_label(file: &str) -> Option<String> {
    let ext = Path::new(file).extension()?.to_str()?;
    Some(
        match ext {
            "js" => "javascript",
            "ts" => "typescript",
            "feature" => "gherkin",
            other => other,
        }
        .to_string(),
    )
}

impl Reporter {
    // ========================================================================
    // Suites
    // ========================================================================

    pub fn start_suite(&mut self, suite: &SuiteInfo) {
        let name = if suite.full_title.is_empty() {
            suite.title.clone()
        } else {
            suite.full_title.clone()
        };

        if let Some(current) = self.state.current_suite() {
            let nested = suite
                .parent_title
                .as_deref()
                .is_some_and(|p| !p.is_empty() && p == self.state.tree.node(current).name);
            if self.state.current_suite_is_global() || nested {
                // reuse the wrapper suite instead of adding a level
                if !name.is_empty() {
                    self.state.tree.rename(current, name);
                }
                return;
            }
            debug!("Closing previous suite '{}'", self.state.tree.node(current).name);
            self.end_suite(true);
        }

        let parent = self.state.current_suite();
        let name = if name.is_empty() { GLOBAL_SUITE.to_string() } else { name };
        let id = self.state.tree.start_suite(parent, name);
        debug!("Started suite '{}'", self.state.tree.node(id).name);
        self.state.suites.push(id);
    }

    /// Only closing the wrapper suite closes anything; every suite end
    /// re-applies stored labels to tests that lack them
    pub fn end_suite(&mut self, is_global: bool) {
        let scope = self.state.current_suite();
        if let (true, Some(suite)) = (is_global, scope) {
            self.flush_commands(Status::Passed);
            self.state.finish_open_steps(Status::Passed);
            if let Some(test) = self.state.running_test() {
                self.state.tree.end(test);
            }
            self.state.tree.end(suite);
            self.state.suites.pop();
            self.state.set_current_test(None);
            info!("Finished suite '{}'", self.state.tree.node(suite).name);
        }

        if let Some(scope) = scope {
            let labels = self.state.label_storage.clone();
            for test in self.state.tests_under(scope) {
                for label in &labels {
                    self.state.tree.label_if_missing(test, &label.name, label.value.clone());
                }
            }
        }
        self.state.label_storage.clear();
    }

    /// Close every suite still open
    pub fn end_run(&mut self) {
        while self.state.current_suite().is_some() {
            self.end_suite(true);
        }
    }

    // ========================================================================
    // Tests
    // ========================================================================

    pub fn start_case(&mut self, test: &TestInfo) -> ReporterResult<()> {
        let suite = self
            .state
            .current_suite()
            .ok_or(ReporterError::NoActiveSuite)?;

        // a skipped test may be announced as pending before it starts
        if let Some(current) = self.state.current_test() {
            let node = self.state.tree.node(current);
            if node.status == Some(Status::Skipped) && node.name == test.title {
                debug!("Skipped test '{}' already exists", test.title);
                return Ok(());
            }
        }

        self.tracker.reset();
        let id = self.state.tree.start_test(suite, test.title.clone());
        self.state.set_current_test(Some(id));
        self.assign_identity(test);

        let config = &self.state.config;
        if config.omit_previous_attempt_files && test.current_retry > 0 {
            debug!("Dropping files of previous attempts of '{}'", test.title);
            self.state
                .files
                .retain(|f| f.test_name.as_deref() != Some(test.title.as_str()));
        }

        if config.add_analytic_labels {
            let framework = config.framework_name.clone();
            self.state.tree.add_label(id, "framework", framework);
            if let Some(language) = test.file.as_deref().and_then(language_label) {
                self.state.tree.add_label(id, "language", language);
            }
        }

        for label in suite_labels(&test.title_path) {
            self.state.tree.add_label(id, label.name, label.value);
        }
        debug!("Started test '{}' (retry {})", test.title, test.current_retry);
        Ok(())
    }

    /// Name, history id and host id mapping of the running test
    fn assign_identity(&mut self, test: &TestInfo) {
        let Some(id) = self.state.running_test() else {
            return;
        };
        let full_title = if test.full_title.is_empty() {
            &test.title
        } else {
            &test.full_title
        };
        self.state.tree.rename(id, test.title.clone());
        let node = self.state.tree.node_mut(id);
        node.full_name = Some(full_title.clone());
        node.history_id = Some(history_id(full_title));
        let uuid = node.uuid.clone();

        if !test.id.is_empty() {
            let attempts = self.state.test_ids.entry(test.id.clone()).or_default();
            if !attempts.contains(&uuid) {
                attempts.push(uuid);
            }
        }
    }

    pub fn pass_test_case(&mut self, test: &TestInfo) -> ReporterResult<()> {
        if self.state.running_test().is_none() {
            debug!("No running test for '{}', creating one", test.title);
            self.start_case(test)?;
        }
        self.enrich_running_test();
        self.update_test(Status::Passed, None)
    }

    pub fn pending_test_case(&mut self, test: &TestInfo) -> ReporterResult<()> {
        self.start_case(test)?;
        if self.state.running_test().is_none() {
            return Ok(());
        }
        self.enrich_running_test();
        self.update_test(
            Status::Skipped,
            Some(StatusDetails::new("Test ignored", None)),
        )
    }

    /// Record a failure. A failure raised by a before hook also fails the
    /// first test that never ran and breaks the rest, in declared order.
    pub fn fail_test_case(&mut self, test: &TestInfo, err: &ErrorInfo) -> ReporterResult<()> {
        let from_hook = test.kind == RunnableKind::Hook;
        if from_hook {
            // before starting a test, which resets the ledger
            self.flush_commands(Status::Failed);
        }
        if self.state.running_test().is_none() {
            debug!("No running test for '{}', creating one", test.title);
            self.start_case(test)?;
        }
        let details = StatusDetails::new(err.message.clone(), err.stack.clone());
        let cascade = from_hook && test.is_before_hook();

        if cascade {
            if let Some(first) = test.remaining_tests.first() {
                self.assign_identity(first);
            }
        }
        if from_hook {
            self.end_hook(&test.as_hook(err));
        } else {
            self.enrich_running_test();
        }
        self.update_test(Status::Failed, Some(details.clone()))?;

        if cascade {
            for sibling in test.remaining_tests.iter().skip(1) {
                debug!("Breaking '{}' after hook failure", sibling.title);
                self.start_case(sibling)?;
                self.update_test(Status::Broken, Some(details.clone()))?;
            }
        }
        Ok(())
    }

    /// Finalize the running test: flush commands and open steps at the given
    /// severity, then apply stored labels, details and status
    pub fn update_test(
        &mut self,
        status: Status,
        details: Option<StatusDetails>,
    ) -> ReporterResult<()> {
        let test = self
            .state
            .running_test()
            .ok_or(ReporterError::NoRunningTest)?;

        for label in self.state.label_storage.clone() {
            self.state.tree.upsert_label(test, &label.name, label.value);
        }
        if self.state.config.logs_anything() {
            self.flush_commands(status);
        }
        self.state.finish_open_steps(status);
        self.state.parent_step = None;

        if details.is_some() {
            self.state.tree.node_mut(test).status_details = details;
        }
        self.state.tree.set_status(test, status);
        self.state.tree.end(test);
        info!("Test '{}' {}", self.state.tree.node(test).name, status);
        Ok(())
    }

    fn enrich_running_test(&mut self) {
        if let (Some(test), Some(snapshot)) = (self.state.running_test(), self.scenario.as_ref()) {
            gherkin::enrich(&mut self.state, test, snapshot);
        }
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    /// Suite-scoped hooks become suite fixtures, per-test hooks become steps
    /// of the running test
    pub fn start_hook(&mut self, hook: &HookInfo) {
        let Some(suite) = self.state.current_suite() else {
            debug!("No suite for hook '{}'", hook.title);
            return;
        };
        if hook.empty {
            return;
        }
        let placement = if hook.is_before() {
            HookPlacement::Before
        } else {
            HookPlacement::After
        };

        if hook.is_suite_scoped() {
            let id = self.state.tree.start_fixture(suite, placement, hook.title.clone());
            self.state.current_hook = Some(id);
            return;
        }

        if !self.state.config.log_commands {
            return;
        }
        let Some(test) = self.state.running_test() else {
            debug!("No running test for hook '{}'", hook.title);
            return;
        };
        let stripped = EACH_HOOK_DECORATION.replace_all(&hook.title, "");
        let name = match stripped.trim() {
            "" => hook.title.clone(),
            custom => custom.to_string(),
        };
        let id = self.state.tree.start_step(test, name);
        self.state.tree.node_mut(id).kind = NodeKind::Hook(placement);
        self.state.current_hook = Some(id);
    }

    pub fn end_hook(&mut self, hook: &HookInfo) {
        if self.state.current_suite().is_none() || hook.empty {
            return;
        }
        let Some(id) = self.state.current_hook.take() else {
            return;
        };

        let status = match &hook.err {
            Some(err) => {
                self.state.tree.node_mut(id).status_details =
                    Some(StatusDetails::new(err.message.clone(), err.stack.clone()));
                Status::Failed
            }
            None => Status::Passed,
        };
        self.state.finish_open_steps(status);
        self.state.tree.set_status(id, status);
        self.state.tree.end(id);
        debug!("Finished hook '{}' as {}", hook.title, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn titles(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_suite_labels() {
        assert_eq!(suite_labels(&titles(&["Login"])), vec![Label::new("suite", "Login")]);
        assert_eq!(
            suite_labels(&titles(&["App", "Login"])),
            vec![Label::new("parentSuite", "App"), Label::new("suite", "Login")]
        );
        assert_eq!(
            suite_labels(&titles(&["App", "Login", "Form", "Errors"])),
            vec![
                Label::new("parentSuite", "App"),
                Label::new("suite", "Login"),
                Label::new("subSuite", "Form > Errors"),
            ]
        );
        assert!(suite_labels(&[]).is_empty());
    }

    #[test_case("cypress/e2e/login.cy.js", Some("javascript") ; "javascript")]
    #[test_case("cypress/e2e/login.cy.ts", Some("typescript") ; "typescript")]
    #[test_case("features/login.feature", Some("gherkin") ; "gherkin")]
    #[test_case("specs/login.coffee", Some("coffee") ; "other extension")]
    #[test_case("Makefile", None ; "no extension")]
    fn test_language_label(file: &str, expected: Option<&str>) {
        assert_eq!(language_label(file).as_deref(), expected);
    }

    #[test]
    fn test_each_hook_decoration() {
        assert_eq!(EACH_HOOK_DECORATION.replace_all("\"before each\" hook: login", ""), "login");
        assert_eq!(EACH_HOOK_DECORATION.replace_all("\"after each\" hook", ""), "");
    }
}
