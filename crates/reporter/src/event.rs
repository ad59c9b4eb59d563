//! Host framework descriptors
//!
//! Plain data delivered by the host test runner with each lifecycle and
//! command signal. Field names follow the host's camelCase JSON so recorded
//! event streams deserialize directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReporterError, ReporterResult};

/// Suite begin/end descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteInfo {
    #[serde(default)]
    pub title: String,

    /// Titles of every enclosing suite and this one, space-joined
    #[serde(default)]
    pub full_title: String,

    /// Title of the enclosing suite, if any
    #[serde(default)]
    pub parent_title: Option<String>,

    /// The host's anonymous per-file wrapper suite
    #[serde(default)]
    pub root: bool,
}

/// Whether a failing runnable was a test body or a hook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnableKind {
    #[default]
    Test,
    Hook,
}

/// Error delivered with a failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Test (or failing hook) descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestInfo {
    /// Host per-test id, stable across retries
    #[serde(default)]
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub full_title: String,

    /// Titles of the enclosing suites, outermost first
    #[serde(default)]
    pub title_path: Vec<String>,

    #[serde(default)]
    pub current_retry: u32,

    /// Spec file the test was declared in
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: RunnableKind,

    /// For hooks: "before all", "before each", "after each", "after all"
    #[serde(default)]
    pub hook_name: Option<String>,

    /// For a failing hook: the declared tests of its suite that never ran,
    /// in declaration order
    #[serde(default)]
    pub remaining_tests: Vec<TestInfo>,
}

/// Hook begin/end descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInfo {
    pub title: String,

    /// "before all", "before each", "after each" or "after all"
    pub hook_name: String,

    /// The hook body is an empty function
    #[serde(default)]
    pub empty: bool,

    #[serde(default)]
    pub err: Option<ErrorInfo>,
}

impl HookInfo {
    /// Runs once per suite rather than once per test
    pub fn is_suite_scoped(&self) -> bool {
        self.hook_name.contains("all")
    }

    pub fn is_before(&self) -> bool {
        self.hook_name.contains("before")
    }
}

impl TestInfo {
    /// Hook view of a failing hook runnable
    pub fn as_hook(&self, err: &ErrorInfo) -> HookInfo {
        HookInfo {
            title: self.title.clone(),
            hook_name: self.hook_name.clone().unwrap_or_default(),
            empty: false,
            err: Some(err.clone()),
        }
    }

    /// Failure originated in a before-all or before-each hook
    pub fn is_before_hook(&self) -> bool {
        self.kind == RunnableKind::Hook
            && matches!(self.hook_name.as_deref(), Some("before all") | Some("before each"))
    }
}

/// The host's command classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainerType {
    #[default]
    Parent,
    Child,
    Dual,
    Assertion,
    #[serde(other)]
    Other,
}

/// Command metadata delivered with enqueued, started and ended signals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAttrs {
    pub chainer_id: String,

    pub name: String,

    #[serde(default, rename = "type")]
    pub chainer_type: ChainerType,

    /// Query commands re-run until their assertions pass
    #[serde(default)]
    pub query: bool,

    #[serde(default)]
    pub args: Vec<Value>,

    /// Log entries produced by the command, filled by the time it ends
    #[serde(default)]
    pub logs: Vec<RawLogEntry>,

    /// The command drives a BDD step
    #[serde(default)]
    pub gherkin: bool,
}

impl CommandAttrs {
    pub fn new(chainer_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            chainer_id: chainer_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Some argument carries `{ log: false }`
    pub fn is_not_logged(&self) -> bool {
        self.args
            .iter()
            .any(|arg| arg.get("log").and_then(Value::as_bool) == Some(false))
    }

    pub fn is_gherkin_step(&self) -> bool {
        self.gherkin || self.name == "step"
    }
}

/// A command log entry as delivered by the host, before conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawLogEntry(pub Value);

impl RawLogEntry {
    /// Newer hosts tag entries with the owning command's log id, and
    /// already deliver them in processing order
    pub fn has_command_log_id(&self) -> bool {
        self.0
            .pointer("/attributes/commandLogId")
            .is_some_and(|v| !v.is_null())
    }

    /// Convert to the plain structured form
    pub fn to_plain(&self) -> ReporterResult<CommandLog> {
        if let Some(reason) = self.0.get("$error") {
            return Err(ReporterError::LogEntry(
                reason.as_str().unwrap_or("inspector failed").to_string(),
            ));
        }
        serde_json::from_value(self.0.clone()).map_err(|e| ReporterError::LogEntry(e.to_string()))
    }
}

/// State reported by a log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogState {
    Passed,
    Failed,
    #[default]
    Pending,
}

/// Plain structured form of a command log entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLog {
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: LogState,
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub console_props: Option<Value>,
    #[serde(default)]
    pub render_props: Option<Value>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub actual: Option<Value>,
    #[serde(default)]
    pub expected: Option<Value>,
}

impl CommandLog {
    /// Stand-in for a command that ended without usable log output
    pub fn synthetic(passed: bool) -> Self {
        Self {
            state: if passed { LogState::Passed } else { LogState::Failed },
            ..Default::default()
        }
    }

    pub fn is_gherkin_step(&self) -> bool {
        self.name == "step"
    }

    fn console(&self, key: &str) -> Option<&Value> {
        self.console_props.as_ref()?.get(key).filter(|v| !v.is_null())
    }

    pub fn console_str(&self, key: &str) -> Option<&str> {
        self.console(key).and_then(Value::as_str)
    }

    pub fn console_value(&self, key: &str) -> Option<&Value> {
        self.console(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_attrs_from_host_json() {
        let attrs: CommandAttrs = serde_json::from_value(json!({
            "chainerId": "ch-12",
            "name": "get",
            "type": "parent",
            "query": true,
            "args": ["#login", {"timeout": 100}],
        }))
        .unwrap();
        assert_eq!(attrs.chainer_id, "ch-12");
        assert_eq!(attrs.chainer_type, ChainerType::Parent);
        assert!(attrs.query);
        assert!(!attrs.is_not_logged());
        assert!(attrs.logs.is_empty());
    }

    #[test]
    fn test_unknown_chainer_type() {
        let attrs: CommandAttrs =
            serde_json::from_value(json!({"chainerId": "1", "name": "x", "type": "utility"}))
                .unwrap();
        assert_eq!(attrs.chainer_type, ChainerType::Other);
    }

    #[test]
    fn test_log_false_argument() {
        let mut attrs = CommandAttrs::new("1", "wrap");
        attrs.args = vec![json!("subject"), json!({"log": false})];
        assert!(attrs.is_not_logged());
    }

    #[test]
    fn test_raw_entry_conversion() {
        let ok = RawLogEntry(json!({"name": "click", "message": "", "state": "passed"}));
        let log = ok.to_plain().unwrap();
        assert_eq!(log.name, "click");
        assert_eq!(log.state, LogState::Passed);

        let inspector_failed = RawLogEntry(json!({"$error": "consoleProps threw"}));
        assert!(matches!(inspector_failed.to_plain(), Err(ReporterError::LogEntry(_))));

        let nameless = RawLogEntry(json!({"message": "x"}));
        assert!(nameless.to_plain().is_err());
    }

    #[test]
    fn test_command_log_id_detection() {
        assert!(RawLogEntry(json!({"attributes": {"commandLogId": "log-1"}})).has_command_log_id());
        assert!(!RawLogEntry(json!({"attributes": {"commandLogId": null}})).has_command_log_id());
        assert!(!RawLogEntry(json!({"name": "get"})).has_command_log_id());
    }

    #[test]
    fn test_before_hook_detection() {
        let hook = TestInfo {
            title: "\"before all\" hook".to_string(),
            kind: RunnableKind::Hook,
            hook_name: Some("before all".to_string()),
            ..Default::default()
        };
        assert!(hook.is_before_hook());

        let after = TestInfo {
            hook_name: Some("after each".to_string()),
            ..hook.clone()
        };
        assert!(!after.is_before_hook());
        assert!(!after.as_hook(&ErrorInfo::default()).is_before());
    }
}
