//! Chain ledger
//!
//! Append-only record of the commands enqueued during the current test.
//! Chain ids are the only correlation token the host exposes and may be
//! reused, so every lookup filters on id plus liveness (and name where the
//! caller knows it) instead of assuming any global ordering. Records are
//! addressed by their insertion index, which stays valid until `clear`.

use allure_bridge_common::NodeId;
use std::collections::VecDeque;

use crate::event::{ChainerType, CommandAttrs};

/// Callback-style commands that wrap a user function
pub const PASS_THROUGH_COMMANDS: [&str; 4] = ["then", "spread", "each", "within"];

/// Command category, resolved once at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Action,
    Assertion,
    Query,
    /// Transparent for step placement; gets a step only if it logs output
    PassThrough,
}

impl CommandKind {
    pub fn resolve(attrs: &CommandAttrs) -> Self {
        if PASS_THROUGH_COMMANDS.contains(&attrs.name.as_str()) {
            CommandKind::PassThrough
        } else if attrs.chainer_type == ChainerType::Assertion {
            CommandKind::Assertion
        } else if attrs.query {
            CommandKind::Query
        } else {
            CommandKind::Action
        }
    }
}

/// The report step owned by a started command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRef {
    Real(NodeId),
    /// No-op stand-in for pass-through commands
    Placeholder,
}

impl StepRef {
    pub fn node(self) -> Option<NodeId> {
        match self {
            StepRef::Real(id) => Some(id),
            StepRef::Placeholder => None,
        }
    }
}

/// One enqueued command invocation
#[derive(Debug, Clone)]
pub struct ChainCommand {
    pub id: String,
    pub name: String,
    pub kind: CommandKind,
    /// Chain that was current when this command was enqueued
    pub parent: Option<String>,
    /// Unfinished child chain ids, most recently enqueued first
    pub children: VecDeque<String>,
    /// Cleared by its own failure or any child failure
    pub passed: bool,
    pub finished: bool,
    pub step: Option<StepRef>,
    pub started_at: Option<i64>,
    /// Latest attributes seen for this command (logs accumulate until end)
    pub attrs: Option<CommandAttrs>,
}

impl ChainCommand {
    fn is_open_with_step(&self) -> bool {
        !self.finished && self.step.is_some()
    }
}

#[derive(Debug, Default)]
pub struct ChainLedger {
    commands: Vec<ChainCommand>,
}

impl ChainLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, registering it with its parent when that parent is
    /// still open
    pub fn add(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: CommandKind,
        parent: Option<String>,
    ) -> usize {
        let id = id.into();
        if let Some(p) = parent.as_deref().and_then(|p| self.find_open_parent(p)) {
            // newest child is expected to finish first
            self.commands[p].children.push_front(id.clone());
        }
        self.commands.push(ChainCommand {
            id,
            name: name.into(),
            kind,
            parent,
            children: VecDeque::new(),
            passed: true,
            finished: false,
            step: None,
            started_at: None,
            attrs: None,
        });
        self.commands.len() - 1
    }

    /// Unfinished record with a step for this id; among several, the one
    /// started last wins
    pub fn find_open_parent(&self, id: &str) -> Option<usize> {
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.id == id && c.is_open_with_step())
            .max_by_key(|(index, c)| (c.started_at.unwrap_or(i64::MIN), *index))
            .map(|(index, _)| index)
    }

    /// Most recently added unfinished record matching id and name, with or
    /// without a step
    pub fn find_matching(&self, id: &str, name: &str, has_step: bool) -> Option<usize> {
        self.commands
            .iter()
            .rposition(|c| {
                c.id == id && c.name == name && !c.finished && c.step.is_some() == has_step
            })
    }

    /// Unfinished records with steps, oldest first
    pub fn open_with_steps(&self) -> Vec<usize> {
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_open_with_step())
            .map(|(index, _)| index)
            .collect()
    }

    /// Newest unfinished record owning a real report step
    pub fn latest_with_real_step(&self) -> Option<usize> {
        self.commands
            .iter()
            .rposition(|c| !c.finished && matches!(c.step, Some(StepRef::Real(_))))
    }

    /// Remove a child id from a parent record, returning whether it was there
    pub fn remove_child(&mut self, parent: usize, child: &str) -> bool {
        let children = &mut self.commands[parent].children;
        match children.iter().position(|c| c == child) {
            Some(index) => {
                children.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> &ChainCommand {
        &self.commands[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut ChainCommand {
        &mut self.commands[index]
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}
