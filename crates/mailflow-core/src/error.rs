//! Mailflow error taxonomy.
//!
//! Leaf operations surface the specific failure; the pipeline layer logs and
//! re-raises; the scan loop catches at task granularity so one task's failure
//! never stops the remaining tasks.

use thiserror::Error;

/// Convenience result type used across the workspace.
pub type Result<T> = std::result::Result<T, MailflowError>;

/// All errors produced by Mailflow components.
#[derive(Debug, Error)]
pub enum MailflowError {
    /// Task or event store could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Recipient file extension not recognized.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// A mail, summarization, or artifact-store call failed.
    #[error("Service error: {0}")]
    Service(String),

    /// A stored history file is corrupted.
    #[error("Malformed history: {0}")]
    MalformedHistory(String),

    /// Configuration could not be loaded or saved.
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
