//! allure-bridge reporter
//!
//! Turns the lifecycle and command signals of a host test runner into a
//! report tree of suites, tests, hooks and nested steps:
//! - Tracks every enqueued command in a chain ledger and nests command
//!   steps by the chain that was current when they were enqueued
//! - Finishes command steps bottom-up, propagating child failures
//! - Force-closes open commands and logical steps at test boundaries
//! - Fails or breaks the remaining tests of a suite when a before hook throws
//! - Enriches tests from BDD feature, rule, scenario and example-row tags
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ReporterContext (one per run)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reporter                                                   │
//! │    ├── lifecycle: start_suite / start_case / fail_test_case │
//! │    │              start_hook / end_hook / update_test       │
//! │    ├── CommandTracker                                       │
//! │    │     ├── ChainLedger (enqueued commands of the test)    │
//! │    │     └── on_enqueue / on_start / on_end / flush_all     │
//! │    ├── finish_open_steps (logical step stack)               │
//! │    ├── gherkin::enrich (tags -> labels and links)           │
//! │    └── ReportingInterface (calls made by test code)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RunState                                                   │
//! │    └── ReportTree arena, suite stack, step stack, markers   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  dispose() -> RunResults -> ResultSink (memory, JSON dir)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod args;
pub mod context;
pub mod error;
pub mod event;
pub mod finisher;
pub mod gherkin;
pub mod interface;
pub mod ledger;
pub mod lifecycle;
pub mod log;
pub mod replay;
pub mod reporter;
pub mod sink;
pub mod state;
pub mod tracker;

pub use context::ReporterContext;
pub use error::{ReporterError, ReporterResult};
pub use event::{
    ChainerType, CommandAttrs, CommandLog, ErrorInfo, HookInfo, RawLogEntry, RunnableKind,
    SuiteInfo, TestInfo,
};
pub use gherkin::{Examples, ExampleRow, Scenario, ScenarioSnapshot, TagScope};
pub use interface::ReportingInterface;
pub use replay::{ApiCall, HostEvent};
pub use reporter::Reporter;
pub use sink::{JsonDirSink, MemorySink, ResultSink};
