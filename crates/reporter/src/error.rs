//! Error types for the reporter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("No active suite")]
    NoActiveSuite,

    #[error("Finishing test while no test is running")]
    NoRunningTest,

    #[error("Log entry cannot be converted: {0}")]
    LogEntry(String),

    #[error("Event parse error at line {line}: {reason}")]
    EventParse { line: usize, reason: String },

    #[error("Invalid attachment content: {0}")]
    InvalidAttachment(String),

    #[error("Result sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ReporterResult<T> = Result<T, ReporterError>;
