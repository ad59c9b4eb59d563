//! Report entity model
//!
//! Suites, tests, hooks and steps live in a single arena owned by the run
//! (`ReportTree`) and are addressed by `NodeId`. Components never hold node
//! references across events, only ids, so ownership of a node moves between
//! the lifecycle controller and the command tracker without locking.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Terminal status of a report node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Passed,
    Failed,
    Broken,
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Passed => write!(f, "passed"),
            Status::Failed => write!(f, "failed"),
            Status::Broken => write!(f, "broken"),
            Status::Skipped => write!(f, "skipped"),
        }
    }
}

/// Execution stage of a report node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Running,
    Finished,
}

/// Message and trace attached to a failed or broken node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl StatusDetails {
    pub fn new(message: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            message: Some(message.into()),
            trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub url: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub source: String,
}

/// Which fixture list a hook belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPlacement {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Suite,
    Test,
    Hook(HookPlacement),
    Step,
}

/// Arena index of a report node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A suite, test, hook or step
#[derive(Debug, Clone)]
pub struct ReportNode {
    pub uuid: String,
    pub kind: NodeKind,
    pub name: String,
    pub status: Option<Status>,
    pub status_details: Option<StatusDetails>,
    pub stage: Stage,
    pub start: i64,
    pub stop: Option<i64>,
    pub parent: Option<NodeId>,
    /// Nested steps (tests, hooks, steps)
    pub steps: Vec<NodeId>,
    /// Tests and nested suites (suites only)
    pub children: Vec<NodeId>,
    pub befores: Vec<NodeId>,
    pub afters: Vec<NodeId>,
    pub attachments: Vec<Attachment>,
    pub parameters: Vec<Parameter>,
    pub labels: Vec<Label>,
    pub links: Vec<Link>,
    pub full_name: Option<String>,
    pub history_id: Option<String>,
    pub description: Option<String>,
    pub description_html: Option<String>,
}

impl ReportNode {
    fn new(kind: NodeKind, name: String, parent: Option<NodeId>, start: i64) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            kind,
            name,
            status: None,
            status_details: None,
            stage: Stage::Running,
            start,
            stop: None,
            parent,
            steps: Vec::new(),
            children: Vec::new(),
            befores: Vec::new(),
            afters: Vec::new(),
            attachments: Vec::new(),
            parameters: Vec::new(),
            labels: Vec::new(),
            links: Vec::new(),
            full_name: None,
            history_id: None,
            description: None,
            description_html: None,
        }
    }

    /// A node is closed once its stop timestamp is set
    pub fn is_closed(&self) -> bool {
        self.stop.is_some()
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

/// Epoch-millisecond clock whose readings strictly increase
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: i64,
}

impl MonotonicClock {
    pub fn now(&mut self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        self.last = wall.max(self.last + 1);
        self.last
    }
}

/// Stable history identity for cross-run matching of a test
pub fn history_id(full_title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_title.as_bytes());
    hex::encode(hasher.finalize())
}

/// File extension used when writing an attachment of the given type
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "application/json" => "json",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        "application/xml" | "text/xml" => "xml",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// The whole-run report tree
#[derive(Debug, Default)]
pub struct ReportTree {
    nodes: Vec<ReportNode>,
    roots: Vec<NodeId>,
    clock: MonotonicClock,
    /// Attachment bytes keyed by source file name
    pub attachments: BTreeMap<String, Vec<u8>>,
    pub environment: Option<BTreeMap<String, String>>,
    pub executor: Option<serde_json::Value>,
    pub categories: Option<Vec<serde_json::Value>>,
}

impl ReportTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &ReportNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ReportNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level suites in creation order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// All tests in creation order
    pub fn tests(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().filter(|id| self.node(*id).kind == NodeKind::Test)
    }

    pub fn find_by_uuid(&self, uuid: &str) -> Option<NodeId> {
        self.ids().find(|id| self.node(*id).uuid == uuid)
    }

    pub fn now(&mut self) -> i64 {
        self.clock.now()
    }

    fn push(&mut self, kind: NodeKind, name: String, parent: Option<NodeId>) -> NodeId {
        let start = self.clock.now();
        let id = NodeId(self.nodes.len());
        self.nodes.push(ReportNode::new(kind, name, parent, start));
        id
    }

    /// Open a suite, nested under `parent` when given
    pub fn start_suite(&mut self, parent: Option<NodeId>, name: impl Into<String>) -> NodeId {
        let id = self.push(NodeKind::Suite, name.into(), parent);
        match parent {
            Some(p) => self.node_mut(p).children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn start_test(&mut self, suite: NodeId, name: impl Into<String>) -> NodeId {
        let id = self.push(NodeKind::Test, name.into(), Some(suite));
        self.node_mut(suite).children.push(id);
        id
    }

    /// Add a suite-level precondition or postcondition fixture
    pub fn start_fixture(
        &mut self,
        suite: NodeId,
        placement: HookPlacement,
        name: impl Into<String>,
    ) -> NodeId {
        let id = self.push(NodeKind::Hook(placement), name.into(), Some(suite));
        let suite = self.node_mut(suite);
        match placement {
            HookPlacement::Before => suite.befores.push(id),
            HookPlacement::After => suite.afters.push(id),
        }
        id
    }

    pub fn start_step(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let id = self.push(NodeKind::Step, name.into(), Some(parent));
        self.node_mut(parent).steps.push(id);
        id
    }

    /// Close a node; unset status defaults to passed. Closing twice is a no-op.
    pub fn end(&mut self, id: NodeId) {
        if self.node(id).is_closed() {
            return;
        }
        let now = self.clock.now();
        let node = self.node_mut(id);
        node.stage = Stage::Finished;
        node.stop = Some(now);
        if node.status.is_none() {
            node.status = Some(Status::Passed);
        }
    }

    /// Set status without closing the node; only `end` finishes the stage
    pub fn set_status(&mut self, id: NodeId, status: Status) {
        self.node_mut(id).status = Some(status);
    }

    /// Rename a node that is not closed yet
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        let node = self.node_mut(id);
        if node.is_closed() {
            return false;
        }
        node.name = name.into();
        true
    }

    pub fn add_label(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.node_mut(id).labels.push(Label::new(name, value));
    }

    /// Overwrite the first label with this name, or append one
    pub fn upsert_label(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let labels = &mut self.node_mut(id).labels;
        match labels.iter_mut().find(|l| l.name == name) {
            Some(existing) => existing.value = value.into(),
            None => labels.push(Label::new(name, value)),
        }
    }

    /// Append a label only when no label with this name exists
    pub fn label_if_missing(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        let labels = &mut self.node_mut(id).labels;
        if !labels.iter().any(|l| l.name == name) {
            labels.push(Label::new(name, value));
        }
    }

    pub fn add_link(
        &mut self,
        id: NodeId,
        url: impl Into<String>,
        name: impl Into<String>,
        link_type: Option<&str>,
    ) {
        self.node_mut(id).links.push(Link {
            name: name.into(),
            url: url.into(),
            link_type: link_type.map(str::to_string),
        });
    }

    pub fn add_parameter(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.node_mut(id).parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn add_attachment(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
        content_type: impl Into<String>,
        source: impl Into<String>,
    ) {
        self.node_mut(id).attachments.push(Attachment {
            name: name.into(),
            content_type: content_type.into(),
            source: source.into(),
        });
    }

    /// Store attachment bytes in the side channel, returning the source name
    pub fn write_attachment(&mut self, content: impl Into<Vec<u8>>, content_type: &str) -> String {
        let source = format!(
            "{}-attachment.{}",
            Uuid::new_v4(),
            extension_for(content_type)
        );
        self.attachments.insert(source.clone(), content.into());
        source
    }

    /// Whether any step below `id` ended up failed
    pub fn has_failed_descendant(&self, id: NodeId) -> bool {
        self.node(id).steps.iter().any(|child| {
            self.node(*child).status == Some(Status::Failed) || self.has_failed_descendant(*child)
        })
    }

    /// Every node still open, innermost last
    pub fn open_nodes(&self) -> Vec<NodeId> {
        self.ids().filter(|id| !self.node(*id).is_closed()).collect()
    }
}
