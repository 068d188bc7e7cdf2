//! Recipient resolution: manual entries plus an optional CSV file.
//!
//! The CSV reader is header-mapped `name`/`email` columns
//! (case-insensitive), with quoting handled by [`mailflow_core::csv`].
//! Spreadsheet formats (.xlsx/.xls) are rejected with a pointer to CSV
//! export.

use mailflow_core::csv;
use mailflow_core::error::{MailflowError, Result};
use mailflow_core::types::Recipient;

use crate::task::Task;

/// Resolve the full recipient set for a task: manual recipients followed by
/// any parsed from `recipient_file`.
pub fn resolve(task: &Task) -> Result<Vec<Recipient>> {
    let mut recipients = task.manual_recipients.clone();
    if let Some(file) = &task.recipient_file {
        if !file.trim().is_empty() {
            recipients.extend(load_recipient_file(file)?);
        }
    }
    Ok(recipients)
}

/// Load recipients from a file path (tilde-expanded).
pub fn load_recipient_file(path: &str) -> Result<Vec<Recipient>> {
    let expanded = shellexpand::tilde(path).to_string();
    let extension = std::path::Path::new(&expanded)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => {
            let content = std::fs::read_to_string(&expanded)?;
            parse_csv(&content, path)
        }
        "xlsx" | "xls" => Err(MailflowError::UnsupportedFormat(format!(
            "{path}: spreadsheet files are not supported, export to .csv"
        ))),
        other => Err(MailflowError::UnsupportedFormat(format!(
            "{path}: unrecognized extension '.{other}', expected .csv"
        ))),
    }
}

fn parse_csv(content: &str, path: &str) -> Result<Vec<Recipient>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(h) => csv::split_line(h),
        None => return Ok(Vec::new()),
    };

    let column = |wanted: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(wanted))
    };
    let email_idx = column("email").ok_or_else(|| {
        MailflowError::UnsupportedFormat(format!("{path}: no 'email' column in header"))
    })?;
    let name_idx = column("name");

    let mut recipients = Vec::new();
    for line in lines {
        let fields = csv::split_line(line);
        let email = fields.get(email_idx).map(String::as_str).unwrap_or("");
        if email.is_empty() {
            tracing::warn!("⚠️ Skipping recipient row without an email in {path}");
            continue;
        }
        let name = name_idx
            .and_then(|i| fields.get(i))
            .filter(|n| !n.is_empty())
            .cloned();
        recipients.push(Recipient {
            name,
            email: email.to_string(),
        });
    }
    Ok(recipients)
}
