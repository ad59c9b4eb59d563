//! Recorded host event streams
//!
//! A host binding records every signal it delivers as one JSON object per
//! line. Replaying such a stream through a [`Reporter`] reproduces the run's
//! report without the host.

use allure_bridge_common::Status;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, warn};

use crate::context::ReporterContext;
use crate::error::{ReporterError, ReporterResult};
use crate::event::{CommandAttrs, ErrorInfo, HookInfo, SuiteInfo, TestInfo};
use crate::gherkin::ScenarioSnapshot;
use crate::interface::ReportingInterface;
use crate::reporter::Reporter;

/// One signal from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    SuiteBegin { suite: SuiteInfo },
    SuiteEnd { suite: SuiteInfo },
    TestBegin { test: TestInfo },
    TestPass { test: TestInfo },
    TestPending { test: TestInfo },
    TestFail { test: TestInfo, err: ErrorInfo },
    HookBegin { hook: HookInfo },
    HookEnd { hook: HookInfo },
    CommandEnqueued { command: CommandAttrs },
    CommandStarted { command: CommandAttrs },
    CommandEnded { command: CommandAttrs },
    CommandFailed { command: CommandAttrs },
    /// Snapshot of the executing BDD scenario, `null` outside of one
    Scenario {
        #[serde(default)]
        scenario: Option<ScenarioSnapshot>,
    },
    /// Title of the test the host is executing
    HostTest {
        #[serde(default)]
        title: Option<String>,
    },
    /// A reporting-interface call made by test code
    Api { call: ApiCall },
    RunEnd,
}

fn default_true() -> bool {
    true
}

/// Reporting-interface call, keyed by the host method name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ApiCall {
    Label { name: String, value: String },
    Tag { tags: Vec<String> },
    Epic { value: String },
    Feature { value: String },
    Story { value: String },
    Suite { value: String },
    Owner { value: String },
    Severity { value: String },
    Link {
        url: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "type")]
        link_type: Option<String>,
    },
    Issue { name: String, url: String },
    Tms { name: String, url: String },
    Description { text: String },
    DescriptionHtml { html: String },
    Parameter { name: String, value: String },
    TestParameter { name: String, value: String },
    TestName { name: String },
    /// `content` is base64 when `encoding` is `base64`
    Attachment {
        name: String,
        content: String,
        #[serde(rename = "type")]
        content_type: String,
        #[serde(default)]
        encoding: Option<String>,
    },
    TestAttachment {
        name: String,
        content: String,
        #[serde(rename = "type")]
        content_type: String,
        #[serde(default)]
        encoding: Option<String>,
    },
    FileAttachment {
        name: String,
        path: String,
        #[serde(rename = "type")]
        content_type: String,
    },
    Step {
        name: String,
        #[serde(default = "default_true", rename = "isParent")]
        is_parent: bool,
    },
    StepStart { name: String },
    StepEnd,
    LogStep {
        name: String,
        #[serde(default = "passed")]
        status: Status,
    },
    WriteEnvironmentInfo { info: BTreeMap<String, String> },
    WriteExecutorInfo { info: Value },
    WriteCategoriesDefinitions { categories: Vec<Value> },
}

fn passed() -> Status {
    Status::Passed
}

fn attachment_bytes(content: &str, encoding: Option<&str>) -> ReporterResult<Vec<u8>> {
    match encoding {
        Some("base64") => base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|e| ReporterError::InvalidAttachment(e.to_string())),
        _ => Ok(content.as_bytes().to_vec()),
    }
}

/// Parse an NDJSON event stream. Blank lines and `#` comments are skipped.
pub fn load_events<R: BufRead>(reader: R) -> ReporterResult<Vec<HostEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = serde_json::from_str(trimmed).map_err(|e| ReporterError::EventParse {
            line: index + 1,
            reason: e.to_string(),
        })?;
        events.push(event);
    }
    Ok(events)
}

pub fn load_events_file(path: &Path) -> ReporterResult<Vec<HostEvent>> {
    let file = std::fs::File::open(path)?;
    load_events(std::io::BufReader::new(file))
}

/// Deliver one event to the reporter
pub fn dispatch(reporter: &mut Reporter, event: HostEvent) -> ReporterResult<()> {
    match event {
        HostEvent::SuiteBegin { suite } => reporter.start_suite(&suite),
        HostEvent::SuiteEnd { suite } => reporter.end_suite(suite.root),
        HostEvent::TestBegin { test } => reporter.start_case(&test)?,
        HostEvent::TestPass { test } => reporter.pass_test_case(&test)?,
        HostEvent::TestPending { test } => reporter.pending_test_case(&test)?,
        HostEvent::TestFail { test, err } => reporter.fail_test_case(&test, &err)?,
        HostEvent::HookBegin { hook } => reporter.start_hook(&hook),
        HostEvent::HookEnd { hook } => reporter.end_hook(&hook),
        HostEvent::CommandEnqueued { command } => reporter.command_enqueued(&command),
        HostEvent::CommandStarted { command } => reporter.command_started(&command),
        HostEvent::CommandEnded { command } => reporter.command_ended(&command),
        HostEvent::CommandFailed { command } => reporter.command_failed(&command),
        HostEvent::Scenario { scenario } => reporter.set_scenario(scenario),
        HostEvent::HostTest { title } => reporter.set_host_test(title),
        HostEvent::Api { call } => call_interface(reporter, call)?,
        HostEvent::RunEnd => reporter.end_run(),
    }
    Ok(())
}

fn call_interface(reporter: &mut Reporter, call: ApiCall) -> ReporterResult<()> {
    match call {
        ApiCall::Label { name, value } => reporter.label(&name, &value),
        ApiCall::Tag { tags } => reporter.tag(&tags),
        ApiCall::Epic { value } => reporter.epic(&value),
        ApiCall::Feature { value } => reporter.feature(&value),
        ApiCall::Story { value } => reporter.story(&value),
        ApiCall::Suite { value } => reporter.suite(&value),
        ApiCall::Owner { value } => reporter.owner(&value),
        ApiCall::Severity { value } => reporter.severity(&value),
        ApiCall::Link {
            url,
            name,
            link_type,
        } => reporter.link(&url, name.as_deref(), link_type.as_deref()),
        ApiCall::Issue { name, url } => reporter.issue(&name, &url),
        ApiCall::Tms { name, url } => reporter.tms(&name, &url),
        ApiCall::Description { text } => reporter.description(&text),
        ApiCall::DescriptionHtml { html } => reporter.description_html(&html),
        ApiCall::Parameter { name, value } => reporter.parameter(&name, &value),
        ApiCall::TestParameter { name, value } => reporter.test_parameter(&name, &value),
        ApiCall::TestName { name } => reporter.test_name(&name),
        ApiCall::Attachment {
            name,
            content,
            content_type,
            encoding,
        } => {
            let bytes = attachment_bytes(&content, encoding.as_deref())?;
            reporter.attachment(&name, &bytes, &content_type)
        }
        ApiCall::TestAttachment {
            name,
            content,
            content_type,
            encoding,
        } => {
            let bytes = attachment_bytes(&content, encoding.as_deref())?;
            reporter.test_attachment(&name, &bytes, &content_type)
        }
        ApiCall::FileAttachment {
            name,
            path,
            content_type,
        } => reporter.file_attachment(&name, &path, &content_type),
        ApiCall::Step { name, is_parent } => reporter.step(&name, is_parent),
        ApiCall::StepStart { name } => reporter.step_start(&name),
        ApiCall::StepEnd => reporter.step_end(),
        ApiCall::LogStep { name, status } => reporter.log_step(&name, status),
        ApiCall::WriteEnvironmentInfo { info } => reporter.write_environment_info(info),
        ApiCall::WriteExecutorInfo { info } => reporter.write_executor_info(info),
        ApiCall::WriteCategoriesDefinitions { categories } => {
            reporter.write_categories_definitions(categories)
        }
    }
    Ok(())
}

/// Replay a whole stream into a context. Events that violate the host
/// contract are logged and skipped so the rest of the run is still reported.
pub fn replay(context: &mut ReporterContext, events: Vec<HostEvent>) -> usize {
    let Some(reporter) = context.handle() else {
        return 0;
    };
    let mut rejected = 0;
    for (index, event) in events.into_iter().enumerate() {
        if let Err(e) = dispatch(reporter, event) {
            warn!("Event {} rejected: {}", index + 1, e);
            rejected += 1;
        }
    }
    debug!("Replay finished with {} rejected event(s)", rejected);
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_events_skips_comments_and_blanks() {
        let stream = r##"
# recorded run
{"event": "suite_begin", "suite": {"title": "", "root": true}}

{"event": "api", "call": {"method": "severity", "value": "critical"}}
{"event": "run_end"}
"##;
        let events = load_events(stream.as_bytes()).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], HostEvent::SuiteBegin { .. }));
        assert!(matches!(
            &events[1],
            HostEvent::Api { call: ApiCall::Severity { value } } if value == "critical"
        ));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let stream = "{\"event\": \"run_end\"}\n{\"event\": \"unknown\"}\n";
        match load_events(stream.as_bytes()) {
            Err(ReporterError::EventParse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_api_call_shapes() {
        let step: ApiCall =
            serde_json::from_value(json!({"method": "step", "name": "Given a user"})).unwrap();
        assert!(matches!(step, ApiCall::Step { is_parent: true, .. }));

        let attachment: ApiCall = serde_json::from_value(json!({
            "method": "testAttachment",
            "name": "shot",
            "content": "aGVsbG8=",
            "type": "text/plain",
            "encoding": "base64"
        }))
        .unwrap();
        let ApiCall::TestAttachment { content, encoding, .. } = attachment else {
            panic!("wrong variant");
        };
        assert_eq!(attachment_bytes(&content, encoding.as_deref()).unwrap(), b"hello");
        assert!(attachment_bytes("***", Some("base64")).is_err());
    }

    #[test]
    fn test_command_event_uses_host_field_names() {
        let event: HostEvent = serde_json::from_value(json!({
            "event": "command_enqueued",
            "command": {"chainerId": "ch-1", "name": "visit", "args": ["/"]}
        }))
        .unwrap();
        let HostEvent::CommandEnqueued { command } = event else {
            panic!("wrong variant");
        };
        assert_eq!(command.chainer_id, "ch-1");
    }
}
