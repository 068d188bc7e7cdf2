//! Capability traits implemented by adapter crates.
//!
//! The scheduler core depends only on these interfaces; SMTP/IMAP, LLM
//! endpoints, and artifact formats plug in behind them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EmailMessage, ExecutionRecord, ResponseFilter};

/// Outbound and inbound mail operations.
#[async_trait]
pub trait MailService: Send + Sync {
    /// Send one message to `to`, attaching each path in `attachments`.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<()>;

    /// Fetch mailbox messages passing `filter`, newest first.
    async fn list_matching(&self, filter: &ResponseFilter) -> Result<Vec<EmailMessage>>;
}

/// Summarizes a batch of collected messages under a task-supplied prompt.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[EmailMessage], prompt: &str) -> Result<String>;
}

/// Persists execution records to a destination file.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Append `record` to the artifact at `destination`, durably.
    async fn write(&self, record: &ExecutionRecord, destination: &Path) -> Result<()>;

    /// Load all records previously written to `destination`, oldest first.
    /// A missing file yields an empty history.
    async fn read_history(&self, destination: &Path) -> Result<Vec<ExecutionRecord>>;
}
