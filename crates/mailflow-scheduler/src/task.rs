//! Task definitions — the core data model for scheduled email work.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mailflow_core::types::{Recipient, StorageKind};
use serde::{Deserialize, Serialize};

/// A scheduled email workflow task.
///
/// Every optional field carries a serde default so task files written by
/// earlier versions keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID, assigned at creation and immutable.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Inactive tasks are skipped by the scan; one-time tasks flip this off
    /// after their first execution.
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Earliest moment the task is eligible to run.
    pub next_run: DateTime<Utc>,

    /// Gate for the outgoing-email step.
    #[serde(default)]
    pub send_emails: bool,
    /// Subject template; `{key}` placeholders are substituted per recipient.
    #[serde(default)]
    pub email_subject: String,
    /// Body template, same placeholder rules as the subject.
    #[serde(default)]
    pub email_body: String,
    #[serde(default)]
    pub manual_recipients: Vec<Recipient>,
    /// Optional CSV file contributing additional recipients.
    #[serde(default)]
    pub recipient_file: Option<String>,
    #[serde(default)]
    pub email_attachments: Vec<PathBuf>,

    /// Gate for the response collection step.
    #[serde(default)]
    pub process_responses: bool,
    /// Case-insensitive subject substring responses must contain.
    #[serde(default)]
    pub response_subject_filter: String,
    /// OR-matched body keywords.
    #[serde(default)]
    pub response_keywords: Vec<String>,
    /// How many days back to scan the mailbox.
    #[serde(default = "default_days_back")]
    pub response_days_back: i64,
    /// Instruction prompt handed to the summarizer.
    #[serde(default)]
    pub ai_prompt: String,
    #[serde(default)]
    pub storage_type: StorageKind,
    /// Artifact destination; empty means a per-task default under the
    /// configured summaries directory.
    #[serde(default)]
    pub storage_path: Option<String>,
}

fn default_active() -> bool {
    true
}

fn default_days_back() -> i64 {
    7
}

/// How often a task repeats. Unknown values load as `daily`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Once,
    Weekly,
    Monthly,
    #[serde(other)]
    Daily,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self::Daily
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once => write!(f, "once"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

impl Task {
    /// Create a new task with a fresh ID and both pipeline gates off.
    pub fn new(name: &str, next_run: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            active: true,
            recurrence: Recurrence::default(),
            next_run,
            send_emails: false,
            email_subject: String::new(),
            email_body: String::new(),
            manual_recipients: Vec::new(),
            recipient_file: None,
            email_attachments: Vec::new(),
            process_responses: false,
            response_subject_filter: String::new(),
            response_keywords: Vec::new(),
            response_days_back: default_days_back(),
            ai_prompt: String::new(),
            storage_type: StorageKind::default(),
            storage_path: None,
        }
    }

    /// Check whether this task is eligible to run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_run <= now
    }
}
