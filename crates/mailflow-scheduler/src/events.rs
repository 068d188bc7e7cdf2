//! Append-only event log — the user-facing activity history.
//!
//! Unlike the task store, a missing or malformed backing file is treated as
//! an empty history (self-healing on the next append), never a fatal error.

use chrono::{DateTime, Utc};
use mailflow_core::error::Result;
use mailflow_core::fs;
use mailflow_core::types::EventLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An immutable log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: EventLevel,
}

/// File-backed event log.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create a log backed by the given file (usually `events.json`).
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Append one event, stamped with the current time, and persist.
    pub fn append(&self, message: &str, level: EventLevel) -> Result<()> {
        let mut events = self.load_lenient();
        events.push(Event {
            timestamp: Utc::now(),
            message: message.to_string(),
            level,
        });
        fs::write_json_atomic(&self.path, &events)
    }

    /// The most recent `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let mut events = self.load_lenient();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        events
    }

    fn load_lenient(&self) -> Vec<Event> {
        match fs::read_json(&self.path) {
            Ok(Some(events)) => events,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("⚠️ Discarding unreadable event history: {e}");
                Vec::new()
            }
        }
    }
}
