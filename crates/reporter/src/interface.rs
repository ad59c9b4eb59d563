//! Reporting interface exposed to test code
//!
//! Test code labels, links, parameterizes and attaches to the running test
//! and declares its own logical steps through these calls.

use allure_bridge_common::{Label, NodeId, PendingFile, Status};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::gherkin::link_url;
use crate::ledger::StepRef;
use crate::reporter::{Reporter, OVERWRITE_TEST_NAME};

/// Host command names that are reporting-interface calls; they never become
/// command steps of their own
pub const INTERFACE_COMMANDS: [&str; 26] = [
    "label",
    "tag",
    "epic",
    "feature",
    "story",
    "suite",
    "owner",
    "severity",
    "link",
    "issue",
    "tms",
    "description",
    "descriptionHtml",
    "parameter",
    "testParameter",
    "testName",
    "attachment",
    "testAttachment",
    "fileAttachment",
    "step",
    "stepStart",
    "stepEnd",
    "logStep",
    "writeEnvironmentInfo",
    "writeExecutorInfo",
    "writeCategoriesDefinitions",
];

pub trait ReportingInterface {
    /// Set a label on the running test, replacing one of the same name.
    /// Without a running test the label is stored for the suite.
    fn label(&mut self, name: &str, value: &str);
    fn tag(&mut self, tags: &[String]);
    fn epic(&mut self, epic: &str);
    fn feature(&mut self, feature: &str);
    fn story(&mut self, story: &str);
    fn suite(&mut self, suite: &str);
    fn owner(&mut self, owner: &str);
    fn severity(&mut self, severity: &str);
    fn link(&mut self, url: &str, name: Option<&str>, link_type: Option<&str>);
    fn issue(&mut self, name: &str, url: &str);
    fn tms(&mut self, name: &str, url: &str);
    fn description(&mut self, markdown: &str);
    fn description_html(&mut self, html: &str);
    /// Parameter on the innermost executable
    fn parameter(&mut self, name: &str, value: &str);
    fn test_parameter(&mut self, name: &str, value: &str);
    /// Rename the test in the written results
    fn test_name(&mut self, name: &str);
    /// Attachment on the innermost executable
    fn attachment(&mut self, name: &str, content: &[u8], content_type: &str);
    fn test_attachment(&mut self, name: &str, content: &[u8], content_type: &str);
    /// A file on disk copied next to the results at write time
    fn file_attachment(&mut self, name: &str, path: &str, content_type: &str);
    /// Declare a logical step. A parent step closes every open logical step
    /// and collects the following child steps; a child step closes the
    /// previous child.
    fn step(&mut self, name: &str, is_parent: bool);
    fn step_start(&mut self, name: &str);
    fn step_end(&mut self);
    /// A closed leaf step with a fixed status
    fn log_step(&mut self, name: &str, status: Status);
    fn write_environment_info(&mut self, info: BTreeMap<String, String>);
    fn write_executor_info(&mut self, info: Value);
    fn write_categories_definitions(&mut self, categories: Vec<Value>);
}

impl Reporter {
    fn test_for_interface(&self, call: &str) -> Option<NodeId> {
        let test = self.state.running_test();
        if test.is_none() {
            warn!("{} called while no test is running", call);
        }
        test
    }

    fn executable_for_interface(&self, call: &str) -> Option<NodeId> {
        let executable = self.state.current_executable();
        if executable.is_none() {
            warn!("{} called outside of any suite", call);
        }
        executable
    }
}

impl ReportingInterface for Reporter {
    fn label(&mut self, name: &str, value: &str) {
        match self.state.running_test() {
            Some(test) => self.state.tree.upsert_label(test, name, value),
            None => {
                debug!("Storing label {}={} until a test runs", name, value);
                self.state.label_storage.push(Label::new(name, value));
            }
        }
    }

    fn tag(&mut self, tags: &[String]) {
        if let Some(test) = self.test_for_interface("tag") {
            for tag in tags {
                self.state.tree.add_label(test, "tag", tag.clone());
            }
        }
    }

    fn epic(&mut self, epic: &str) {
        self.label("epic", epic);
    }

    fn feature(&mut self, feature: &str) {
        self.label("feature", feature);
    }

    fn story(&mut self, story: &str) {
        self.label("story", story);
    }

    fn suite(&mut self, suite: &str) {
        self.label("suite", suite);
    }

    fn owner(&mut self, owner: &str) {
        self.label("owner", owner);
    }

    fn severity(&mut self, severity: &str) {
        self.label("severity", severity);
    }

    fn link(&mut self, url: &str, name: Option<&str>, link_type: Option<&str>) {
        if let Some(test) = self.test_for_interface("link") {
            self.state
                .tree
                .add_link(test, url, name.unwrap_or(url), link_type);
        }
    }

    fn issue(&mut self, name: &str, url: &str) {
        let url = link_url(&self.state.config, "issue", url);
        self.link(&url, Some(name), Some("issue"));
    }

    fn tms(&mut self, name: &str, url: &str) {
        let url = link_url(&self.state.config, "tms", url);
        self.link(&url, Some(name), Some("tms"));
    }

    fn description(&mut self, markdown: &str) {
        if let Some(test) = self.test_for_interface("description") {
            self.state.tree.node_mut(test).description = Some(markdown.to_string());
        }
    }

    fn description_html(&mut self, html: &str) {
        if let Some(test) = self.test_for_interface("descriptionHtml") {
            self.state.tree.node_mut(test).description_html = Some(html.to_string());
        }
    }

    fn parameter(&mut self, name: &str, value: &str) {
        if let Some(executable) = self.executable_for_interface("parameter") {
            self.state.tree.add_parameter(executable, name, value);
        }
    }

    fn test_parameter(&mut self, name: &str, value: &str) {
        if let Some(test) = self.test_for_interface("testParameter") {
            self.state.tree.add_parameter(test, name, value);
        }
    }

    fn test_name(&mut self, name: &str) {
        if let Some(test) = self.test_for_interface("testName") {
            self.state.tree.add_parameter(test, OVERWRITE_TEST_NAME, name);
        }
    }

    fn attachment(&mut self, name: &str, content: &[u8], content_type: &str) {
        if let Some(executable) = self.executable_for_interface("attachment") {
            let source = self.state.tree.write_attachment(content, content_type);
            self.state
                .tree
                .add_attachment(executable, name, content_type, source);
        }
    }

    fn test_attachment(&mut self, name: &str, content: &[u8], content_type: &str) {
        let Some(target) = self.state.running_test().or(self.state.current_hook) else {
            warn!("testAttachment called while no test is running");
            return;
        };
        let source = self.state.tree.write_attachment(content, content_type);
        self.state.tree.add_attachment(target, name, content_type, source);
    }

    fn file_attachment(&mut self, name: &str, path: &str, content_type: &str) {
        let test_name = self.state.test_name_for_attachment();
        self.state.files.push(PendingFile {
            name: name.to_string(),
            path: path.to_string(),
            content_type: content_type.to_string(),
            test_name,
        });
    }

    fn step(&mut self, name: &str, is_parent: bool) {
        let owner = if is_parent {
            self.state.running_test().or(self.state.current_hook)
        } else {
            self.state
                .parent_step
                .or(self.state.current_hook)
                .or(self.state.running_test())
        };
        let Some(owner) = owner else {
            warn!("step '{}' called while no test is running", name);
            return;
        };

        if is_parent {
            self.state.finish_open_steps(Status::Passed);
            let step = self.state.tree.start_step(owner, name);
            self.state.parent_step = Some(step);
        } else {
            self.step_end();
            let step = self.state.tree.start_step(owner, name);
            self.state.tree.set_status(step, Status::Passed);
            self.state.steps.push(step);
        }
    }

    fn step_start(&mut self, name: &str) {
        let Some(fallback) = self.executable_for_interface("stepStart") else {
            return;
        };
        // a step of a still running command is a more precise home when newer
        let chained = self
            .tracker
            .ledger()
            .latest_with_real_step()
            .and_then(|index| self.tracker.ledger().get(index).step)
            .and_then(StepRef::node)
            .filter(|step| {
                self.state.tree.node(*step).start > self.state.tree.node(fallback).start
            });

        let step = self.state.tree.start_step(chained.unwrap_or(fallback), name);
        self.state.steps.push(step);
    }

    fn step_end(&mut self) {
        let Some(step) = self.state.steps.pop() else {
            return;
        };
        if self.state.tree.node(step).status != Some(Status::Failed) {
            let status = self.state.status_for_user_step();
            self.state.tree.set_status(step, status);
        }
        self.state.tree.end(step);
    }

    fn log_step(&mut self, name: &str, status: Status) {
        if let Some(executable) = self.executable_for_interface("logStep") {
            let step = self.state.tree.start_step(executable, name);
            self.state.tree.set_status(step, status);
            self.state.tree.end(step);
        }
    }

    fn write_environment_info(&mut self, info: BTreeMap<String, String>) {
        self.state.tree.environment = Some(info);
    }

    fn write_executor_info(&mut self, info: Value) {
        self.state.tree.executor = Some(info);
    }

    fn write_categories_definitions(&mut self, categories: Vec<Value>) {
        self.state.tree.categories = Some(categories);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SuiteInfo, TestInfo};
    use allure_bridge_common::ReporterConfig;
    use serde_json::json;

    fn running(config: ReporterConfig) -> Reporter {
        let mut reporter = Reporter::new(config);
        reporter.start_suite(&SuiteInfo {
            title: "Login".to_string(),
            full_title: "Login".to_string(),
            ..Default::default()
        });
        reporter
            .start_case(&TestInfo {
                title: "signs in".to_string(),
                ..Default::default()
            })
            .unwrap();
        reporter
    }

    fn test_node(reporter: &Reporter) -> &allure_bridge_common::ReportNode {
        reporter.tree().node(reporter.current_test().unwrap())
    }

    #[test]
    fn test_label_overwrites_existing_value() {
        let mut reporter = running(ReporterConfig::default());
        reporter.severity("minor");
        reporter.severity("critical");
        reporter.tag(&["smoke".to_string(), "auth".to_string()]);

        let node = test_node(&reporter);
        assert_eq!(node.label("severity"), Some("critical"));
        assert_eq!(node.labels.iter().filter(|l| l.name == "tag").count(), 2);
    }

    #[test]
    fn test_label_without_test_is_stored() {
        let mut reporter = Reporter::new(ReporterConfig::default());
        reporter.owner("qa-team");
        assert_eq!(reporter.state.label_storage.len(), 1);
        assert_eq!(reporter.state.label_storage[0].value, "qa-team");
    }

    #[test]
    fn test_issue_and_tms_use_prefixes() {
        let mut reporter = running(ReporterConfig {
            issue_prefix: Some("https://issues.example/*/view".to_string()),
            tms_prefix: Some("https://tms.example/".to_string()),
            ..Default::default()
        });
        reporter.issue("bug", "BUG-7");
        reporter.tms("case", "C-1");

        let links = &test_node(&reporter).links;
        assert_eq!(links[0].url, "https://issues.example/BUG-7/view");
        assert_eq!(links[0].link_type.as_deref(), Some("issue"));
        assert_eq!(links[1].url, "https://tms.example/C-1");
        assert_eq!(links[1].name, "case");
    }

    #[test]
    fn test_child_step_closes_previous_child() {
        let mut reporter = running(ReporterConfig::default());
        reporter.step("Given a user", true);
        reporter.step("fills the form", false);
        reporter.step("submits", false);

        let test = test_node(&reporter);
        let parent = reporter.tree().node(test.steps[0]);
        assert_eq!(parent.name, "Given a user");
        assert!(!parent.is_closed());

        let children: Vec<bool> = parent
            .steps
            .iter()
            .map(|s| reporter.tree().node(*s).is_closed())
            .collect();
        assert_eq!(children, vec![true, false]);

        reporter.step("When it submits", true);
        assert!(reporter.tree().node(test_node(&reporter).steps[0]).is_closed());
        assert_eq!(reporter.open_logical_steps(), 1);
    }

    #[test]
    fn test_step_start_and_end() {
        let mut reporter = running(ReporterConfig::default());
        reporter.step_start("outer");
        reporter.step_start("inner");
        reporter.step_end();
        assert_eq!(reporter.open_logical_steps(), 1);
        reporter.step_end();
        reporter.step_end();
        assert_eq!(reporter.open_logical_steps(), 0);

        let test = test_node(&reporter);
        let outer = reporter.tree().node(test.steps[0]);
        assert_eq!(reporter.tree().node(outer.steps[0]).name, "inner");
        assert_eq!(outer.status, Some(Status::Passed));
    }

    #[test]
    fn test_log_step_and_attachments() {
        let mut reporter = running(ReporterConfig::default());
        reporter.log_step("checkpoint", Status::Broken);
        reporter.attachment("payload", b"{}", "application/json");
        reporter.file_attachment("video", "videos/login.mp4", "video/mp4");

        let test = test_node(&reporter);
        let step = reporter.tree().node(test.steps[0]);
        assert_eq!(step.status, Some(Status::Broken));
        assert!(step.is_closed());
        assert_eq!(test.attachments[0].name, "payload");
        assert!(reporter.tree().attachments.contains_key(&test.attachments[0].source));
        assert_eq!(reporter.state.files[0].test_name.as_deref(), Some("signs in"));
    }

    #[test]
    fn test_run_metadata() {
        let mut reporter = running(ReporterConfig::default());
        reporter.write_environment_info(BTreeMap::from([("os".to_string(), "linux".to_string())]));
        reporter.write_executor_info(json!({"name": "ci"}));
        reporter.write_categories_definitions(vec![json!({"name": "flaky"})]);
        let tree = reporter.tree();
        assert_eq!(tree.environment.as_ref().unwrap()["os"], "linux");
        assert_eq!(tree.executor.as_ref().unwrap()["name"], "ci");
        assert_eq!(tree.categories.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_test_name_overwrites_result_name() {
        let mut reporter = running(ReporterConfig::default());
        reporter.test_name("signs in with sso");
        reporter.pass_test_case(&TestInfo {
            title: "signs in".to_string(),
            ..Default::default()
        })
        .unwrap();

        let results = reporter.results();
        let test = &results.tests[0];
        assert_eq!(test.name, "signs in with sso");
        assert!(test.parameters.is_empty());
    }
}
