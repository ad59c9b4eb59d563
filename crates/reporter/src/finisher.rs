//! Step finisher
//!
//! Closes logical steps left open when a test, hook or suite boundary is
//! crossed. A step with nested steps takes its status from them (failed if
//! anything below it failed); a leaf takes the status supplied by the
//! boundary.

use allure_bridge_common::{NodeId, Status};
use tracing::debug;

use crate::state::RunState;

impl RunState {
    /// Drain the logical step stack innermost first, then close the open
    /// parent step marker
    pub fn finish_open_steps(&mut self, status: Status) {
        while let Some(step) = self.steps.pop() {
            self.close_step(step, status);
        }
        if let Some(parent) = self.parent_step.take() {
            self.close_step(parent, status);
        }
    }

    fn close_step(&mut self, step: NodeId, status: Status) {
        if self.tree.node(step).is_closed() {
            return;
        }
        let status = if self.tree.node(step).steps.is_empty() {
            status
        } else if self.tree.has_failed_descendant(step) {
            Status::Failed
        } else {
            Status::Passed
        };
        debug!("Closing step '{}' as {}", self.tree.node(step).name, status);
        self.tree.set_status(step, status);
        self.tree.end(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allure_bridge_common::ReporterConfig;

    fn state_with_test() -> (RunState, NodeId) {
        let mut state = RunState::new(ReporterConfig::default());
        let suite = state.tree.start_suite(None, "Suite");
        state.suites.push(suite);
        let test = state.tree.start_test(suite, "test");
        state.set_current_test(Some(test));
        (state, test)
    }

    #[test]
    fn test_leaf_steps_take_supplied_status() {
        let (mut state, test) = state_with_test();
        let step = state.tree.start_step(test, "leaf");
        state.steps.push(step);

        state.finish_open_steps(Status::Broken);
        assert_eq!(state.tree.node(step).status, Some(Status::Broken));
        assert!(state.tree.node(step).is_closed());
        assert!(state.steps.is_empty());
    }

    #[test]
    fn test_stepped_parent_status_is_derived() {
        let (mut state, test) = state_with_test();
        let outer = state.tree.start_step(test, "outer");
        let child = state.tree.start_step(outer, "child");
        state.tree.set_status(child, Status::Failed);
        state.tree.end(child);
        state.steps.push(outer);

        state.finish_open_steps(Status::Passed);
        assert_eq!(state.tree.node(outer).status, Some(Status::Failed));

        let other = state.tree.start_step(test, "other");
        let ok = state.tree.start_step(other, "ok");
        state.tree.end(ok);
        state.steps.push(other);
        state.finish_open_steps(Status::Failed);
        assert_eq!(state.tree.node(other).status, Some(Status::Passed));
    }

    #[test]
    fn test_inner_steps_close_before_outer() {
        let (mut state, test) = state_with_test();
        let outer = state.tree.start_step(test, "outer");
        let inner = state.tree.start_step(outer, "inner");
        state.steps.push(outer);
        state.steps.push(inner);

        state.finish_open_steps(Status::Failed);
        assert_eq!(state.tree.node(inner).status, Some(Status::Failed));
        assert_eq!(state.tree.node(outer).status, Some(Status::Failed));
        assert!(state.tree.node(inner).stop < state.tree.node(outer).stop);
    }

    #[test]
    fn test_parent_marker_is_closed_and_cleared() {
        let (mut state, test) = state_with_test();
        let parent = state.tree.start_step(test, "Given a user");
        state.parent_step = Some(parent);
        state.steps.push(parent);

        state.finish_open_steps(Status::Passed);
        assert_eq!(state.parent_step, None);
        assert_eq!(state.tree.node(parent).status, Some(Status::Passed));
    }

    #[test]
    fn test_nothing_open_is_a_no_op() {
        let (mut state, _) = state_with_test();
        let nodes = state.tree.len();
        state.finish_open_steps(Status::Failed);
        assert_eq!(state.tree.len(), nodes);
    }
}
