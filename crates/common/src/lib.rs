//! allure-bridge common library
//!
//! Report entity model, result handoff types, configuration and the shared
//! error type used by the reporter and the CLI.

pub mod config;
pub mod error;
pub mod model;
pub mod results;

// Re-export commonly used types
pub use config::ReporterConfig;
pub use error::{Error, Result};
pub use model::{
    extension_for, history_id, Attachment, HookPlacement, Label, Link, NodeId, NodeKind,
    Parameter, ReportNode, ReportTree, Stage, Status, StatusDetails,
};
pub use results::{PendingFile, RunResults, StepResult, TestResult, TestResultContainer};

/// allure-bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
