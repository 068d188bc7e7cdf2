//! CSV artifact store: one spreadsheet-friendly row per stored email.
//!
//! Rows are single physical lines; line breaks inside any field are flattened
//! to spaces so the reader can stay line-based. Consecutive rows sharing
//! (timestamp, task_name) reconstruct one execution record.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mailflow_core::csv::{escape_field, split_line};
use mailflow_core::error::{MailflowError, Result};
use mailflow_core::traits::ArtifactStore;
use mailflow_core::types::{ExecutionRecord, StoredEmail};

const HEADER: &str = "timestamp,task_name,summary,sender,sender_email,subject,received_time,body";

/// Appends execution records to a `.csv` log file.
#[derive(Debug, Default)]
pub struct CsvArtifactStore;

impl CsvArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactStore for CsvArtifactStore {
    async fn write(&self, record: &ExecutionRecord, destination: &Path) -> Result<()> {
        let path = destination.with_extension("csv");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MailflowError::Persistence(format!("create dir {parent:?}: {e}")))?;
        }
        let needs_header = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MailflowError::Persistence(format!("open {path:?}: {e}")))?;
        if needs_header {
            writeln!(file, "{HEADER}")
                .map_err(|e| MailflowError::Persistence(format!("write {path:?}: {e}")))?;
        }
        for row in rows_for(record) {
            writeln!(file, "{row}")
                .map_err(|e| MailflowError::Persistence(format!("write {path:?}: {e}")))?;
        }
        file.sync_all()
            .map_err(|e| MailflowError::Persistence(format!("sync {path:?}: {e}")))?;

        tracing::debug!(
            "💾 Appended {} rows for '{}' to {}",
            record.emails.len().max(1),
            record.task_name,
            path.display()
        );
        Ok(())
    }

    async fn read_history(&self, destination: &Path) -> Result<Vec<ExecutionRecord>> {
        let path = destination.with_extension("csv");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| MailflowError::Persistence(format!("read {path:?}: {e}")))?;
        parse_history(&content, &path)
    }
}

/// An execution with no stored emails still leaves one row so the run is
/// visible in the log.
fn rows_for(record: &ExecutionRecord) -> Vec<String> {
    let timestamp = record.timestamp.to_rfc3339();
    if record.emails.is_empty() {
        return vec![format_row(&timestamp, record, None)];
    }
    record
        .emails
        .iter()
        .map(|email| format_row(&timestamp, record, Some(email)))
        .collect()
}

fn format_row(timestamp: &str, record: &ExecutionRecord, email: Option<&StoredEmail>) -> String {
    let received = email.map(|e| e.received_time.to_rfc3339()).unwrap_or_default();
    let (sender, sender_email, subject, body) = match email {
        Some(e) => (
            e.sender.as_str(),
            e.sender_email.as_str(),
            e.subject.as_str(),
            e.body.as_str(),
        ),
        None => ("", "", "", ""),
    };
    [
        timestamp,
        &record.task_name,
        &record.summary,
        sender,
        sender_email,
        subject,
        &received,
        body,
    ]
    .map(|field| escape_field(&flatten(field)))
    .join(",")
}

fn flatten(field: &str) -> String {
    field.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

fn parse_history(content: &str, path: &Path) -> Result<Vec<ExecutionRecord>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    match lines.next() {
        Some(header) if header == HEADER => {}
        Some(_) => {
            return Err(MailflowError::MalformedHistory(format!(
                "{}: unexpected header row",
                path.display()
            )));
        }
        None => return Ok(Vec::new()),
    }

    let mut records: Vec<ExecutionRecord> = Vec::new();
    for (index, line) in lines.enumerate() {
        let row = index + 2;
        let fields = split_line(line);
        if fields.len() != 8 {
            return Err(MailflowError::MalformedHistory(format!(
                "{}: row {row} has {} fields, expected 8",
                path.display(),
                fields.len()
            )));
        }

        let timestamp = parse_time(&fields[0], path, row)?;
        let task_name = &fields[1];
        let continues_last = records
            .last()
            .map(|r| r.timestamp == timestamp && r.task_name == *task_name)
            .unwrap_or(false);
        if !continues_last {
            records.push(ExecutionRecord {
                timestamp,
                task_name: task_name.clone(),
                summary: fields[2].clone(),
                emails: Vec::new(),
            });
        }

        // An empty received_time marks a run that stored no emails.
        if !fields[6].is_empty() {
            let email = StoredEmail {
                sender: fields[3].clone(),
                sender_email: fields[4].clone(),
                subject: fields[5].clone(),
                received_time: parse_time(&fields[6], path, row)?,
                body: fields[7].clone(),
            };
            if let Some(record) = records.last_mut() {
                record.emails.push(email);
            }
        }
    }
    Ok(records)
}

fn parse_time(value: &str, path: &Path, row: usize) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            MailflowError::MalformedHistory(format!(
                "{}: row {row} has a bad timestamp '{value}': {e}",
                path.display()
            ))
        })
}
