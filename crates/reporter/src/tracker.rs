//! Command tracker
//!
//! Turns the host's flat enqueued/started/ended command signals into nested
//! report steps. Each command moves Enqueued -> Started -> Finished exactly
//! once; correlation is by chain id, name and liveness only, so `ended`
//! signals may arrive in any order relative to siblings.
//!
//! A command with pending children is finished bottom-up: every finishing
//! child removes itself from its parent before the parent is re-examined,
//! and the parent finishes once its last child has.

use allure_bridge_common::{NodeId, Status};
use tracing::{debug, warn};

use crate::args::command_step_name;
use crate::event::{ChainerType, CommandAttrs, CommandLog, LogState, RawLogEntry};
use crate::interface::INTERFACE_COMMANDS;
use crate::ledger::{ChainLedger, CommandKind, StepRef};
use crate::log::{self, EMPTY_CALLBACK};
use crate::state::RunState;

/// How a command is being finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    /// Host `ended` signal; waits for pending children
    Ended,
    /// Boundary sweep; closes pending children first
    Forced,
    /// Like `Forced`, and the failure propagates to the parent chain
    Failed,
}

#[derive(Debug, Default)]
pub struct CommandTracker {
    ledger: ChainLedger,
    /// Chain of the most recently started command
    current_chain: Option<String>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &ChainLedger {
        &self.ledger
    }

    pub fn current_chain(&self) -> Option<&str> {
        self.current_chain.as_deref()
    }

    /// Forget every command of the previous test
    pub fn reset(&mut self) {
        self.ledger.clear();
        self.current_chain = None;
    }

    // ========================================================================
    // Host signals
    // ========================================================================

    pub fn on_enqueue(&mut self, attrs: &CommandAttrs) {
        let kind = CommandKind::resolve(attrs);
        let skip = kind == CommandKind::Assertion
            || attrs.name == "allure"
            || (INTERFACE_COMMANDS.contains(&attrs.name.as_str())
                && attrs.chainer_type == ChainerType::Child)
            || attrs.is_not_logged();
        if skip {
            debug!("Skipping command '{}' ({})", attrs.name, attrs.chainer_id);
            return;
        }

        let index = self.ledger.add(
            attrs.chainer_id.clone(),
            attrs.name.clone(),
            kind,
            self.current_chain.clone(),
        );
        self.ledger.get_mut(index).attrs = Some(attrs.clone());
        debug!(
            "Tracking command '{}' ({}) under {:?}",
            attrs.name, attrs.chainer_id, self.current_chain
        );
    }

    pub fn on_start(&mut self, state: &mut RunState, attrs: &CommandAttrs) {
        let Some(index) = self
            .ledger
            .find_matching(&attrs.chainer_id, &attrs.name, false)
        else {
            debug!("Started command '{}' is not tracked", attrs.name);
            return;
        };

        let started_at = state.tree.now();
        let command = self.ledger.get(index);
        let step = if command.kind == CommandKind::PassThrough {
            // only becomes a real step if it logs something
            Some(StepRef::Placeholder)
        } else if should_be_logged(state, attrs) {
            let parent = command.parent.clone();
            self.resolve_executable(state, parent.as_deref())
                .map(|executable| {
                    let name = command_step_name(&attrs.name, &attrs.args);
                    debug!("Starting step '{}'", name);
                    StepRef::Real(state.tree.start_step(executable, name))
                })
        } else {
            None
        };

        let command = self.ledger.get_mut(index);
        command.step = step;
        command.started_at = Some(match step {
            Some(StepRef::Real(node)) => state.tree.node(node).start,
            _ => started_at,
        });
        command.attrs = Some(attrs.clone());
        self.current_chain = Some(attrs.chainer_id.clone());
    }

    /// `forced_failure` finishes the command as failed even with children
    /// still pending
    pub fn on_end(&mut self, state: &mut RunState, attrs: &CommandAttrs, forced_failure: bool) {
        let Some(index) = self
            .ledger
            .find_matching(&attrs.chainer_id, &attrs.name, true)
        else {
            debug!("Ended command '{}' has no open step", attrs.name);
            return;
        };

        self.ledger.get_mut(index).attrs = Some(attrs.clone());
        let completion = if forced_failure {
            Completion::Failed
        } else {
            Completion::Ended
        };
        self.finish(state, index, completion);
    }

    /// Force-finish every started command, oldest first
    pub fn flush_all(&mut self, state: &mut RunState, terminal: Status) {
        let open = self.ledger.open_with_steps();
        if open.is_empty() {
            return;
        }
        debug!("Flushing {} open command(s) as {}", open.len(), terminal);
        let completion = if terminal == Status::Failed {
            Completion::Failed
        } else {
            Completion::Forced
        };
        for index in open {
            if !self.ledger.get(index).finished {
                self.finish(state, index, completion);
            }
        }
        self.current_chain = None;
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Report node a command (or one of its log entries) should nest under
    pub fn resolve_executable(&self, state: &RunState, parent: Option<&str>) -> Option<NodeId> {
        let mut parent = parent.map(str::to_string);
        // ids may be reused, so bound the walk
        for _ in 0..=self.ledger.len() {
            let Some(index) = parent.as_deref().and_then(|p| self.ledger.find_open_parent(p))
            else {
                return state.current_executable();
            };
            let record = self.ledger.get(index);
            if record.kind == CommandKind::PassThrough {
                // callbacks are transparent for placement
                parent = record.parent.clone();
                continue;
            }
            let Some(StepRef::Real(step)) = record.step else {
                return state.current_executable();
            };
            // a logical step opened after the parent wins
            return match state.current_step() {
                Some(logical) if state.tree.node(logical).start > state.tree.node(step).start => {
                    Some(logical)
                }
                _ => Some(step),
            };
        }
        state.current_executable()
    }

    // ========================================================================
    // Completion
    // ========================================================================

    fn finish(&mut self, state: &mut RunState, index: usize, completion: Completion) {
        if self.ledger.get(index).finished {
            return;
        }
        self.current_chain = None;

        if !self.ledger.get(index).children.is_empty() {
            if completion == Completion::Ended {
                debug!("Command '{}' still has children", self.ledger.get(index).name);
                return;
            }
            self.finish_children(state, index, completion);
            if self.ledger.get(index).finished {
                return;
            }
        }
        if completion == Completion::Failed {
            self.ledger.get_mut(index).passed = false;
        }

        let logs = self
            .ledger
            .get(index)
            .attrs
            .as_ref()
            .map(|a| a.logs.clone())
            .unwrap_or_default();
        if logs.is_empty() {
            let passed = self.ledger.get(index).passed;
            let step = self.ledger.get(index).step;
            self.finish_step(state, step, &CommandLog::synthetic(passed), passed);
        } else {
            self.process_logs(state, index, reorder(logs));
        }

        let command = self.ledger.get_mut(index);
        command.finished = true;
        let failed = completion == Completion::Failed || !command.passed;
        debug!("Finished command '{}' (failed: {})", command.name, failed);
        self.notify_parent(state, index, failed);
    }

    /// Close children still pending on a force-finished command, newest first
    fn finish_children(&mut self, state: &mut RunState, index: usize, completion: Completion) {
        while let Some(child_id) = self.ledger.get(index).children.front().cloned() {
            if let Some(child) = self
                .ledger
                .find_open_parent(&child_id)
                .filter(|child| *child != index)
            {
                self.finish(state, child, completion);
                if self.ledger.get(index).finished {
                    return;
                }
            }
            // never started, or linked elsewhere: nothing left to wait for
            self.ledger.remove_child(index, &child_id);
        }
    }

    fn notify_parent(&mut self, state: &mut RunState, child: usize, failed: bool) {
        let child = self.ledger.get(child);
        let Some(parent_id) = child.parent.clone() else {
            return;
        };
        let Some(parent) = self.ledger.find_open_parent(&parent_id) else {
            return;
        };
        let (child_id, child_passed) = (child.id.clone(), child.passed);

        if self.ledger.remove_child(parent, &child_id) && (!child_passed || failed) {
            self.ledger.get_mut(parent).passed = false;
        }

        let record = self.ledger.get(parent);
        if record.children.is_empty() || failed {
            let completion = if failed || !record.passed {
                Completion::Failed
            } else {
                Completion::Ended
            };
            self.finish(state, parent, completion);
        }
    }

    fn process_logs(&mut self, state: &mut RunState, index: usize, logs: Vec<RawLogEntry>) {
        let last = logs.len() - 1;
        for (position, entry) in logs.iter().enumerate() {
            if position == last {
                self.process_final_log(state, index, entry);
                continue;
            }
            let log = match entry.to_plain() {
                Ok(log) => log,
                Err(e) => {
                    warn!("Skipping command log entry #{}: {}", position, e);
                    continue;
                }
            };
            // sub-entries (chained assertions) place independently
            let parent = self.ledger.get(index).parent.clone();
            let executable = self.resolve_executable(state, parent.as_deref());
            let step = self.start_log_step(state, executable, &log);
            if !self.finish_step(state, step.map(StepRef::Real), &log, true) {
                self.ledger.get_mut(index).passed = false;
            }
        }
    }

    fn process_final_log(&mut self, state: &mut RunState, index: usize, entry: &RawLogEntry) {
        let passed = self.ledger.get(index).passed;
        let log = entry.to_plain().unwrap_or_else(|e| {
            warn!("Closing '{}' without its log entry: {}", self.ledger.get(index).name, e);
            CommandLog::synthetic(passed)
        });

        if self.ledger.get(index).kind == CommandKind::PassThrough {
            self.promote(state, index, &log);
        }

        let step = self.ledger.get(index).step;
        if !self.finish_step(state, step, &log, passed) {
            self.ledger.get_mut(index).passed = false;
        }
    }

    /// Give a callback command a real step when it produced log output
    fn promote(&mut self, state: &mut RunState, index: usize, log: &CommandLog) {
        let command = self.ledger.get(index);
        let gherkin = log.is_gherkin_step()
            || command.attrs.as_ref().is_some_and(CommandAttrs::is_gherkin_step);
        let enabled = if gherkin {
            state.config.log_gherkin_steps
        } else {
            state.config.log_commands
        };
        if !enabled || log.name.is_empty() {
            return;
        }

        let parent = command.parent.clone();
        let executable = self.resolve_executable(state, parent.as_deref());
        let Some(step) = self.start_log_step(state, executable, log) else {
            return;
        };
        debug!("Promoted '{}' to step '{}'", command.name, state.tree.node(step).name);
        let passed = command.passed;
        self.ledger.get_mut(index).step = Some(StepRef::Real(step));

        if gherkin {
            // a BDD step closes everything before it and hosts what follows
            state.finish_open_steps(if passed { Status::Passed } else { Status::Failed });
            state.steps.push(step);
            state.parent_step = Some(step);
        }
    }

    /// Open a step for a log entry, or nothing for empty callbacks
    fn start_log_step(
        &self,
        state: &mut RunState,
        executable: Option<NodeId>,
        log: &CommandLog,
    ) -> Option<NodeId> {
        let executable = if log.is_gherkin_step() {
            state.running_test()
        } else {
            executable
        }?;

        let name = log::step_name(log);
        if name == EMPTY_CALLBACK {
            return None;
        }
        let step = state.tree.start_step(executable, name);

        if log.is_gherkin_step() {
            if let Some((kind, content)) = log::doc_string(log) {
                state.tree.add_parameter(step, kind, content);
            }
        }
        if log.name == "assert" {
            if let Some(actual) = log.actual.as_ref().filter(|v| !v.is_null()) {
                state.tree.add_parameter(step, "actual", log::display_value(actual));
            }
            if let Some(expected) = log.expected.as_ref().filter(|v| !v.is_null()) {
                state.tree.add_parameter(step, "expected", log::display_value(expected));
            }
        }
        Some(step)
    }

    /// Apply a log entry's outcome to a step; returns whether it passed
    fn finish_step(
        &self,
        state: &mut RunState,
        step: Option<StepRef>,
        log: &CommandLog,
        command_passed: bool,
    ) -> bool {
        let passed = log.err.is_none() && command_passed && log.state != LogState::Failed;
        let Some(StepRef::Real(step)) = step else {
            return passed;
        };

        self.attach_requests(state, step, log);
        if let Some(name) = log::closing_name(log) {
            state.tree.rename(step, name);
        }

        state
            .tree
            .set_status(step, if passed { Status::Passed } else { Status::Failed });
        // BDD steps on the logical stack stay open as the parent of what follows
        let hosts_following = state.parent_step == Some(step) || state.steps.contains(&step);
        if !(log.is_gherkin_step() && hosts_following) {
            state.tree.end(step);
        }
        passed
    }

    fn attach_requests(&self, state: &mut RunState, step: NodeId, log: &CommandLog) {
        let Some(details) = log::request_details(log) else {
            return;
        };
        if let Some(title) = details.title {
            state.tree.rename(step, title);
        }
        if !state.config.attach_requests {
            return;
        }
        for (name, content) in details.parts {
            let (body, content_type) = log::attachment_body(&content);
            let source = state.tree.write_attachment(body, content_type);
            state.tree.add_attachment(step, name, content_type, source);
        }
    }
}

fn should_be_logged(state: &RunState, attrs: &CommandAttrs) -> bool {
    if attrs.is_gherkin_step() {
        state.config.log_gherkin_steps
    } else {
        state.config.log_commands
    }
}

/// Process the command's own entry last. Hosts that tag entries with a
/// command log id already deliver them in that order.
fn reorder(mut logs: Vec<RawLogEntry>) -> Vec<RawLogEntry> {
    if !logs.iter().any(RawLogEntry::has_command_log_id) {
        logs.rotate_left(1);
    }
    logs
}

#[cfg(test)]
mod tests {
    use super::*;
    use allure_bridge_common::ReporterConfig;
    use serde_json::json;

    fn setup() -> (RunState, CommandTracker, NodeId) {
        let mut state = RunState::new(ReporterConfig::default());
        let suite = state.tree.start_suite(None, "Suite");
        state.suites.push(suite);
        let test = state.tree.start_test(suite, "test");
        state.set_current_test(Some(test));
        (state, CommandTracker::new(), test)
    }

    fn command(id: &str, name: &str) -> CommandAttrs {
        CommandAttrs::new(id, name)
    }

    fn with_log(mut attrs: CommandAttrs, log: serde_json::Value) -> CommandAttrs {
        attrs.logs.push(RawLogEntry(log));
        attrs
    }

    fn step_names(state: &RunState, parent: NodeId) -> Vec<String> {
        state
            .tree
            .node(parent)
            .steps
            .iter()
            .map(|s| state.tree.node(*s).name.clone())
            .collect()
    }

    #[test]
    fn test_assertions_and_unlogged_commands_are_skipped() {
        let (_, mut tracker, _) = setup();
        let mut should = command("1", "should");
        should.chainer_type = ChainerType::Assertion;
        tracker.on_enqueue(&should);

        let mut wrap = command("1", "wrap");
        wrap.args = vec![json!({"log": false})];
        tracker.on_enqueue(&wrap);

        tracker.on_enqueue(&command("1", "allure"));

        let mut interface_child = command("1", "label");
        interface_child.chainer_type = ChainerType::Child;
        tracker.on_enqueue(&interface_child);

        assert!(tracker.ledger().is_empty());
    }

    #[test]
    fn test_single_command_becomes_step() {
        let (mut state, mut tracker, test) = setup();
        let mut visit = command("1", "visit");
        visit.args = vec![json!("/login")];
        tracker.on_enqueue(&visit);
        tracker.on_start(&mut state, &visit);
        assert_eq!(tracker.current_chain(), Some("1"));

        let ended = with_log(visit, json!({"name": "visit", "state": "passed"}));
        tracker.on_end(&mut state, &ended, false);
        assert_eq!(tracker.current_chain(), None);
        assert_eq!(step_names(&state, test), vec!["visit (\"/login\")"]);
        let step = state.tree.node(test).steps[0];
        assert_eq!(state.tree.node(step).status, Some(Status::Passed));
        assert!(state.tree.node(step).is_closed());
    }

    #[test]
    fn test_unknown_end_is_ignored() {
        let (mut state, mut tracker, test) = setup();
        tracker.on_end(&mut state, &command("9", "click"), false);
        assert!(state.tree.node(test).steps.is_empty());
    }

    #[test]
    fn test_sub_entries_are_processed_before_own_entry() {
        let (mut state, mut tracker, test) = setup();
        let get = command("1", "get");
        tracker.on_enqueue(&get);
        tracker.on_start(&mut state, &get);

        let mut ended = get.clone();
        ended.logs = vec![
            RawLogEntry(json!({"name": "get", "message": "#submit", "state": "passed"})),
            RawLogEntry(json!({"name": "assert", "message": "expected visible", "state": "failed",
                "actual": "hidden", "expected": "visible"})),
        ];
        tracker.on_end(&mut state, &ended, false);

        let names = step_names(&state, test);
        assert_eq!(names, vec!["get #submit", "assert expected visible"]);
        let get_step = state.tree.node(test).steps[0];
        let assert_step = state.tree.node(test).steps[1];
        assert_eq!(state.tree.node(assert_step).status, Some(Status::Failed));
        assert_eq!(state.tree.node(assert_step).parameters.len(), 2);
        // the failing assertion fails the command
        assert_eq!(state.tree.node(get_step).status, Some(Status::Failed));
        assert!(!tracker.ledger().get(0).passed);
    }

    #[test]
    fn test_unconvertible_entries_are_skipped() {
        let (mut state, mut tracker, test) = setup();
        let click = command("1", "click");
        tracker.on_enqueue(&click);
        tracker.on_start(&mut state, &click);

        let mut ended = click.clone();
        ended.logs = vec![
            RawLogEntry(json!({"name": "click", "state": "passed"})),
            RawLogEntry(json!({"$error": "consoleProps threw"})),
            RawLogEntry(json!({"name": "assert", "message": "ok", "state": "passed"})),
        ];
        tracker.on_end(&mut state, &ended, false);

        assert_eq!(step_names(&state, test), vec!["click", "assert ok"]);
        let click_step = state.tree.node(test).steps[0];
        assert_eq!(state.tree.node(click_step).status, Some(Status::Passed));
    }

    #[test]
    fn test_final_entry_failure_still_closes_step() {
        let (mut state, mut tracker, test) = setup();
        let click = command("1", "click");
        tracker.on_enqueue(&click);
        tracker.on_start(&mut state, &click);
        tracker.on_end(&mut state, &with_log(click, json!({"$error": "boom"})), false);

        let step = state.tree.node(test).steps[0];
        assert!(state.tree.node(step).is_closed());
        assert_eq!(state.tree.node(step).status, Some(Status::Passed));
    }

    #[test]
    fn test_parent_finishes_after_last_child() {
        let (mut state, mut tracker, test) = setup();
        let login = command("1", "login");
        tracker.on_enqueue(&login);
        tracker.on_start(&mut state, &login);
        let typed = command("2", "type");
        let clicked = command("3", "click");
        tracker.on_enqueue(&typed);
        tracker.on_enqueue(&clicked);

        // host reports the parent done before its children
        tracker.on_end(&mut state, &login, false);
        let login_step = state.tree.node(test).steps[0];
        assert!(!state.tree.node(login_step).is_closed());

        tracker.on_start(&mut state, &typed);
        tracker.on_end(&mut state, &typed, false);
        assert!(!state.tree.node(login_step).is_closed());

        tracker.on_start(&mut state, &clicked);
        tracker.on_end(&mut state, &clicked, false);
        assert!(state.tree.node(login_step).is_closed());
        assert_eq!(step_names(&state, login_step), vec!["type", "click"]);
        assert_eq!(state.tree.node(login_step).status, Some(Status::Passed));
    }

    #[test]
    fn test_flush_closes_children_before_parents() {
        let (mut state, mut tracker, test) = setup();
        let login = command("1", "login");
        tracker.on_enqueue(&login);
        tracker.on_start(&mut state, &login);
        let clicked = command("2", "click");
        tracker.on_enqueue(&clicked);
        tracker.on_start(&mut state, &clicked);
        let failing = with_log(
            clicked,
            json!({"name": "click", "state": "failed", "err": {"message": "detached"}}),
        );
        // the failing command never ends on its own
        tracker.ledger.get_mut(1).attrs = Some(failing);

        tracker.flush_all(&mut state, Status::Failed);

        let login_step = state.tree.node(test).steps[0];
        let click_step = state.tree.node(login_step).steps[0];
        assert_eq!(state.tree.node(click_step).status, Some(Status::Failed));
        assert_eq!(state.tree.node(login_step).status, Some(Status::Failed));
        assert!(state.tree.node(click_step).stop < state.tree.node(login_step).stop);
        assert!(tracker.ledger().open_with_steps().is_empty());
    }

    #[test]
    fn test_failing_flush_fails_silent_commands() {
        let (mut state, mut tracker, test) = setup();
        let click = command("1", "click");
        tracker.on_enqueue(&click);
        tracker.on_start(&mut state, &click);

        tracker.flush_all(&mut state, Status::Failed);
        let step = state.tree.node(test).steps[0];
        assert_eq!(state.tree.node(step).status, Some(Status::Failed));

        let (mut state, mut tracker, test) = setup();
        tracker.on_enqueue(&click);
        tracker.on_start(&mut state, &click);
        tracker.flush_all(&mut state, Status::Passed);
        let step = state.tree.node(test).steps[0];
        assert_eq!(state.tree.node(step).status, Some(Status::Passed));
    }

    #[test]
    fn test_flush_with_nothing_open_is_a_no_op() {
        let (mut state, mut tracker, _) = setup();
        let nodes = state.tree.len();
        tracker.flush_all(&mut state, Status::Failed);
        assert_eq!(state.tree.len(), nodes);
        assert!(tracker.ledger().is_empty());
    }

    #[test]
    fn test_gherkin_pass_through_becomes_parent_step() {
        let (mut state, mut tracker, test) = setup();
        state.config.log_gherkin_steps = true;
        let then = command("1", "then");
        tracker.on_enqueue(&then);
        tracker.on_start(&mut state, &then);
        let logged = json!({
            "name": "step",
            "displayName": "Given ",
            "message": "**a user**",
            "state": "passed"
        });
        tracker.on_end(&mut state, &with_log(then, logged), false);

        assert_eq!(step_names(&state, test), vec!["Given a user"]);
        let bdd = state.tree.node(test).steps[0];
        assert_eq!(state.parent_step, Some(bdd));
        assert!(!state.tree.node(bdd).is_closed());

        let click = command("2", "click");
        tracker.on_enqueue(&click);
        tracker.on_start(&mut state, &click);
        tracker.on_end(&mut state, &click, false);
        assert_eq!(step_names(&state, bdd), vec!["click"]);
    }

    #[test]
    fn test_logging_disabled_creates_no_steps() {
        let (mut state, mut tracker, test) = setup();
        state.config.log_commands = false;
        let click = command("1", "click");
        tracker.on_enqueue(&click);
        tracker.on_start(&mut state, &click);
        tracker.on_end(&mut state, &click, false);
        assert!(state.tree.node(test).steps.is_empty());
    }

    #[test]
    fn test_request_attachments() {
        let (mut state, mut tracker, test) = setup();
        state.config.attach_requests = true;
        let request = command("1", "request");
        tracker.on_enqueue(&request);
        tracker.on_start(&mut state, &request);
        tracker.on_end(
            &mut state,
            &with_log(request, json!({
                "name": "request",
                "message": "GET /api",
                "state": "passed",
                "consoleProps": {
                    "Request": {"Request Headers": {"accept": "json"}},
                    "Yielded": {"body": "not json"}
                }
            })),
            false,
        );

        let step = state.tree.node(test).steps[0];
        let attachments = &state.tree.node(step).attachments;
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].name, "requestHeaders");
        assert_eq!(attachments[0].content_type, "application/json");
        assert_eq!(attachments[1].content_type, "text/plain");
        assert_eq!(state.tree.attachments.len(), 2);
    }

    #[test]
    fn test_reorder_respects_command_log_ids() {
        let plain = vec![RawLogEntry(json!({"name": "a"})), RawLogEntry(json!({"name": "b"}))];
        let reordered = reorder(plain);
        assert_eq!(reordered[0].0["name"], "b");

        let tagged = vec![
            RawLogEntry(json!({"name": "a", "attributes": {"commandLogId": "x"}})),
            RawLogEntry(json!({"name": "b"})),
        ];
        assert_eq!(reorder(tagged)[0].0["name"], "a");
    }
}
