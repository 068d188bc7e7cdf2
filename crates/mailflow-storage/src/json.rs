//! JSON artifact store: the full execution history of a destination as one
//! pretty-printed array, rewritten atomically on every append.

use std::path::Path;

use async_trait::async_trait;

use mailflow_core::error::{MailflowError, Result};
use mailflow_core::fs;
use mailflow_core::traits::ArtifactStore;
use mailflow_core::types::ExecutionRecord;

/// Appends execution records to a `.json` history file.
#[derive(Debug, Default)]
pub struct JsonArtifactStore;

impl JsonArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArtifactStore for JsonArtifactStore {
    async fn write(&self, record: &ExecutionRecord, destination: &Path) -> Result<()> {
        let path = destination.with_extension("json");
        let mut history = match fs::read_json::<Vec<ExecutionRecord>>(&path) {
            Ok(Some(records)) => records,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("⚠️ Discarding unreadable execution history: {e}");
                Vec::new()
            }
        };
        history.push(record.clone());
        fs::write_json_atomic(&path, &history)?;
        tracing::debug!(
            "💾 Stored execution record for '{}' in {}",
            record.task_name,
            path.display()
        );
        Ok(())
    }

    async fn read_history(&self, destination: &Path) -> Result<Vec<ExecutionRecord>> {
        let path = destination.with_extension("json");
        match fs::read_json(&path) {
            Ok(Some(records)) => Ok(records),
            Ok(None) => Ok(Vec::new()),
            Err(MailflowError::Persistence(msg)) => Err(MailflowError::MalformedHistory(msg)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mailflow_core::types::EmailMessage;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn message(subject: &str) -> EmailMessage {
        EmailMessage {
            id: "1".to_string(),
            subject: subject.to_string(),
            sender_name: "Alice".to_string(),
            sender_email: "alice@example.com".to_string(),
            received_time: Utc::now(),
            body: "hello".to_string(),
            html_body: None,
        }
    }

    #[tokio::test]
    async fn test_appends_across_writes() {
        let dir = scratch("mailflow-json-store-test");
        let dest = dir.join("summaries");
        let store = JsonArtifactStore::new();

        let first = ExecutionRecord::new("Weekly", "first".to_string(), &[message("a")]);
        let second = ExecutionRecord::new("Weekly", "second".to_string(), &[message("b")]);
        store.write(&first, &dest).await.unwrap();
        store.write(&second, &dest).await.unwrap();

        // Extension is forced regardless of what the destination says.
        assert!(dest.with_extension("json").exists());
        assert!(!dest.exists());

        let history = store.read_history(&dest).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].summary, "first");
        assert_eq!(history[1].summary, "second");
        assert_eq!(history[1].emails[0].subject, "b");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_history_is_empty() {
        let store = JsonArtifactStore::new();
        let history = store
            .read_history(Path::new("/nonexistent/mailflow/summaries"))
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_history_starts_fresh_on_write() {
        let dir = scratch("mailflow-json-corrupt-write-test");
        let dest = dir.join("summaries");
        std::fs::write(dest.with_extension("json"), "{broken").unwrap();

        let store = JsonArtifactStore::new();
        let record = ExecutionRecord::new("Weekly", "recovered".to_string(), &[]);
        store.write(&record, &dest).await.unwrap();

        let history = store.read_history(&dest).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].summary, "recovered");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_corrupted_history_errors_on_read() {
        let dir = scratch("mailflow-json-corrupt-read-test");
        let dest = dir.join("summaries");
        std::fs::write(dest.with_extension("json"), "{broken").unwrap();

        let store = JsonArtifactStore::new();
        let err = store.read_history(&dest).await.unwrap_err();
        assert!(matches!(err, MailflowError::MalformedHistory(_)));

        std::fs::remove_dir_all(&dir).ok();
    }
}
