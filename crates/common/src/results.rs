//! Flat result handoff consumed by result writers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{
    Attachment, Label, Link, NodeId, NodeKind, Parameter, ReportTree, Stage, Status,
    StatusDetails,
};

/// A step or a suite fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,
    pub stage: Stage,
    pub start: i64,
    pub stop: Option<i64>,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<Attachment>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub uuid: String,
    pub history_id: Option<String>,
    pub full_name: Option<String>,
    pub name: String,
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,
    pub stage: Stage,
    pub start: i64,
    pub stop: Option<i64>,
    pub steps: Vec<StepResult>,
    pub attachments: Vec<Attachment>,
    pub parameters: Vec<Parameter>,
    pub labels: Vec<Label>,
    pub links: Vec<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_html: Option<String>,
}

/// A closed suite: its fixtures and the uuids of its tests and nested suites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultContainer {
    pub uuid: String,
    pub name: String,
    pub children: Vec<String>,
    pub befores: Vec<StepResult>,
    pub afters: Vec<StepResult>,
    pub start: i64,
    pub stop: Option<i64>,
}

/// A file on disk that should be copied next to the results and attached
/// to every test with a matching name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFile {
    pub name: String,
    pub path: String,
    pub content_type: String,
    pub test_name: Option<String>,
}

/// Everything a writer needs to persist a finished run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    pub containers: Vec<TestResultContainer>,
    pub tests: Vec<TestResult>,
    #[serde(skip)]
    pub attachments: BTreeMap<String, Vec<u8>>,
    pub files: Vec<PendingFile>,
    pub environment: Option<BTreeMap<String, String>>,
    pub executor: Option<serde_json::Value>,
    pub categories: Option<Vec<serde_json::Value>>,
    /// Host per-test id to generated test uuids, one per attempt
    pub test_ids: BTreeMap<String, Vec<String>>,
}

impl RunResults {
    pub fn test(&self, name: &str) -> Option<&TestResult> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn tests_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TestResult> + 'a {
        self.tests.iter().filter(move |t| t.name == name)
    }
}

impl StepResult {
    /// Depth-first search for a step whose name contains `needle`
    pub fn find(&self, needle: &str) -> Option<&StepResult> {
        if self.name.contains(needle) {
            return Some(self);
        }
        self.steps.iter().find_map(|s| s.find(needle))
    }
}

impl TestResult {
    pub fn find_step(&self, needle: &str) -> Option<&StepResult> {
        self.steps.iter().find_map(|s| s.find(needle))
    }

    pub fn labels_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.labels
            .iter()
            .filter(move |l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

impl ReportTree {
    /// Per-test hook steps that recorded nothing and did not fail are noise
    fn is_reported_step(&self, id: NodeId) -> bool {
        let node = self.node(id);
        !matches!(node.kind, NodeKind::Hook(_))
            || !node.steps.is_empty()
            || node.status == Some(Status::Failed)
    }

    fn nested_steps(&self, id: NodeId) -> Vec<StepResult> {
        self.node(id)
            .steps
            .iter()
            .filter(|s| self.is_reported_step(**s))
            .map(|s| self.step_result(*s))
            .collect()
    }

    fn step_result(&self, id: NodeId) -> StepResult {
        let node = self.node(id);
        StepResult {
            name: node.name.clone(),
            status: node.status,
            status_details: node.status_details.clone(),
            stage: node.stage,
            start: node.start,
            stop: node.stop,
            steps: self.nested_steps(id),
            attachments: node.attachments.clone(),
            parameters: node.parameters.clone(),
        }
    }

    fn test_result(&self, id: NodeId) -> TestResult {
        let node = self.node(id);
        TestResult {
            uuid: node.uuid.clone(),
            history_id: node.history_id.clone(),
            full_name: node.full_name.clone(),
            name: node.name.clone(),
            status: node.status,
            status_details: node.status_details.clone(),
            stage: node.stage,
            start: node.start,
            stop: node.stop,
            steps: self.nested_steps(id),
            attachments: node.attachments.clone(),
            parameters: node.parameters.clone(),
            labels: node.labels.clone(),
            links: node.links.clone(),
            description: node.description.clone(),
            description_html: node.description_html.clone(),
        }
    }

    fn container(&self, id: NodeId) -> TestResultContainer {
        let node = self.node(id);
        let fixtures = |ids: &[NodeId]| {
            ids.iter()
                .filter(|f| !self.node(**f).steps.is_empty())
                .map(|f| self.step_result(*f))
                .collect()
        };
        TestResultContainer {
            uuid: node.uuid.clone(),
            name: node.name.clone(),
            children: node
                .children
                .iter()
                .map(|c| self.node(*c).uuid.clone())
                .collect(),
            befores: fixtures(&node.befores),
            afters: fixtures(&node.afters),
            start: node.start,
            stop: node.stop,
        }
    }

    /// Flatten closed suites and tests into the writer handoff
    pub fn collect(&self) -> RunResults {
        let mut results = RunResults {
            attachments: self.attachments.clone(),
            environment: self.environment.clone(),
            executor: self.executor.clone(),
            categories: self.categories.clone(),
            ..Default::default()
        };
        for id in self.ids() {
            let node = self.node(id);
            if !node.is_closed() {
                continue;
            }
            match node.kind {
                NodeKind::Suite => results.containers.push(self.container(id)),
                NodeKind::Test => results.tests.push(self.test_result(id)),
                NodeKind::Hook(_) | NodeKind::Step => {}
            }
        }
        results
    }
}
