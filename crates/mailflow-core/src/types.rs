//! Data model shared between the scheduler core and its collaborators.
//!
//! Serde field names mirror the persisted JSON records, so files written by
//! earlier versions keep loading (missing keys fall back to defaults).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single email recipient, entered manually or loaded from a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

impl Recipient {
    pub fn new(name: Option<&str>, email: &str) -> Self {
        Self {
            name: name.map(String::from),
            email: email.to_string(),
        }
    }
}

/// A message fetched from the mailbox, as returned by the mail service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Mailbox-assigned identifier (IMAP UID or equivalent).
    pub id: String,
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub received_time: DateTime<Utc>,
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
}

/// Inbox filter for response collection.
///
/// The date window is half-open: `since <= received_time < until`. The
/// scheduler builds it as `[now - days_back, now + 1 day)` at day granularity
/// to tolerate timezone/truncation slop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFilter {
    /// Case-insensitive substring the subject must contain. `None` matches all.
    pub subject: Option<String>,
    /// OR-matched, case-insensitive body keywords. Empty matches all.
    pub keywords: Vec<String>,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl ResponseFilter {
    /// Build a filter looking back `days_back` days from `now`.
    pub fn looking_back(
        subject: &str,
        keywords: &[String],
        days_back: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let subject = subject.trim();
        Self {
            subject: (!subject.is_empty()).then(|| subject.to_string()),
            keywords: keywords.to_vec(),
            since: now - Duration::days(days_back),
            until: now + Duration::days(1),
        }
    }

    /// Check whether a message passes the subject, keyword, and window tests.
    pub fn matches(&self, message: &EmailMessage) -> bool {
        if let Some(subject) = &self.subject {
            if !message
                .subject
                .to_lowercase()
                .contains(&subject.to_lowercase())
            {
                return false;
            }
        }

        if message.received_time < self.since || message.received_time >= self.until {
            return false;
        }

        if !self.keywords.is_empty() {
            let body = message.body.to_lowercase();
            if !self
                .keywords
                .iter()
                .any(|kw| body.contains(&kw.to_lowercase()))
            {
                return false;
            }
        }

        true
    }
}

/// Maximum number of characters of a message body kept in stored artifacts.
pub const BODY_PREVIEW_CHARS: usize = 500;

/// A source message as persisted inside an artifact record (body truncated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEmail {
    pub sender: String,
    pub sender_email: String,
    pub subject: String,
    pub received_time: DateTime<Utc>,
    pub body: String,
}

impl StoredEmail {
    pub fn from_message(message: &EmailMessage) -> Self {
        Self {
            sender: message.sender_name.clone(),
            sender_email: message.sender_email.clone(),
            subject: message.subject.clone(),
            received_time: message.received_time,
            body: truncate_chars(&message.body, BODY_PREVIEW_CHARS),
        }
    }
}

/// One persisted execution result: a summary plus the messages it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub task_name: String,
    pub summary: String,
    pub emails: Vec<StoredEmail>,
}

impl ExecutionRecord {
    pub fn new(task_name: &str, summary: String, messages: &[EmailMessage]) -> Self {
        Self {
            timestamp: Utc::now(),
            task_name: task_name.to_string(),
            summary,
            emails: messages.iter().map(StoredEmail::from_message).collect(),
        }
    }
}

/// Artifact storage backend kind, selected per task.
/// Unknown values (e.g. files written by older versions) load as `json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Csv,
    #[serde(other)]
    Json,
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::Json
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Severity of an event-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Error,
}

/// Truncate to at most `max` characters, appending `...` when shortened.
/// Character-based, so multi-byte text never splits mid-codepoint.
fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}
