//! Scheduler/executor — scans for due tasks and runs the execution pipeline.
//!
//! One non-blocking lock per task id guards against concurrent re-entry
//! (periodic scan racing a manual run). The schedule advance is persisted
//! *before* the pipeline runs, so a crash or slow pipeline can never cause
//! the same due instant to execute twice; a crash mid-pipeline loses that
//! run instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use mailflow_core::error::{MailflowError, Result};
use mailflow_core::traits::{ArtifactStore, MailService, Summarizer};
use mailflow_core::types::{EventLevel, ExecutionRecord, ResponseFilter, StorageKind};
use tokio::sync::Mutex as TokioMutex;

use crate::events::{Event, EventLog};
use crate::recipients;
use crate::recurrence::compute_next_run;
use crate::store::TaskStore;
use crate::task::{Recurrence, Task};
use crate::template;

/// The scheduling and execution core.
pub struct TaskManager {
    store: TaskStore,
    events: EventLog,
    mail: Arc<dyn MailService>,
    summarizer: Arc<dyn Summarizer>,
    /// Artifact store per storage kind; tasks naming an unconfigured kind
    /// fail their collect step.
    artifacts: HashMap<StorageKind, Arc<dyn ArtifactStore>>,
    /// Base directory for per-task default artifact destinations.
    summaries_dir: PathBuf,
    /// One lock per task id, created lazily, retained for the process
    /// lifetime. Task count is user-authored and small, so never pruned.
    locks: StdMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl TaskManager {
    pub fn new(
        store: TaskStore,
        events: EventLog,
        mail: Arc<dyn MailService>,
        summarizer: Arc<dyn Summarizer>,
        artifacts: HashMap<StorageKind, Arc<dyn ArtifactStore>>,
        summaries_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            events,
            mail,
            summarizer,
            artifacts,
            summaries_dir,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Scan all tasks and execute those that are due.
    ///
    /// Safe to call repeatedly and concurrently with `run_task_now`: a task
    /// whose lock is held is skipped for this scan and caught on a later
    /// one. One task's failure never aborts the scan of the remaining tasks.
    pub async fn process_due_tasks(&self) -> Result<()> {
        let now = Utc::now();
        let tasks = match self.store.load() {
            Ok(tasks) => tasks,
            Err(e) => {
                self.log_event(&format!("Failed to load tasks: {e}"), EventLevel::Error);
                return Err(e);
            }
        };

        for task in tasks {
            if !task.active {
                continue;
            }

            let lock = self.lock_for(&task.id);
            let Ok(_guard) = lock.try_lock_owned() else {
                tracing::debug!("⏭️ Task '{}' still running, skipping this scan", task.name);
                continue;
            };

            if !task.is_due(now) {
                continue;
            }
            tracing::info!("🔔 Task due: '{}'", task.name);

            // Advance and persist the schedule first. If that fails, skip the
            // pipeline this cycle rather than risk a duplicate run later.
            if let Err(e) = self.advance_schedule(&task) {
                self.log_event(
                    &format!("Failed to persist schedule for task '{}': {e}", task.name),
                    EventLevel::Error,
                );
                continue;
            }

            if let Err(e) = self.execute_task(&task).await {
                self.log_event(
                    &format!("Error executing task '{}': {e}", task.name),
                    EventLevel::Error,
                );
            }
        }
        Ok(())
    }

    /// Execute one task immediately, without touching its schedule.
    ///
    /// Returns a `Service` error if the task is mid-execution elsewhere.
    pub async fn run_task_now(&self, id: &str) -> Result<()> {
        let task = self
            .store
            .get(id)?
            .ok_or_else(|| MailflowError::Service(format!("Task with ID {id} not found")))?;

        let lock = self.lock_for(&task.id);
        let Ok(_guard) = lock.try_lock_owned() else {
            return Err(MailflowError::Service(format!(
                "Task '{}' is already running",
                task.name
            )));
        };

        if let Err(e) = self.execute_task(&task).await {
            self.log_event(
                &format!("Manual run failed for task '{}': {e}", task.name),
                EventLevel::Error,
            );
            return Err(e);
        }
        Ok(())
    }

    /// Recompute `next_run` (deactivating one-time tasks) and persist.
    fn advance_schedule(&self, task: &Task) -> Result<()> {
        let mut advanced = task.clone();
        advanced.next_run = compute_next_run(task.next_run, task.recurrence);
        if task.recurrence == Recurrence::Once {
            advanced.active = false;
        }
        self.store.upsert(&advanced)
    }

    /// The send → collect → summarize → store pipeline for one task.
    async fn execute_task(&self, task: &Task) -> Result<()> {
        self.log_event(&format!("Executing task: {}", task.name), EventLevel::Info);

        if task.send_emails {
            if let Err(e) = self.send_step(task).await {
                self.log_event(
                    &format!("Error sending emails for task '{}': {e}", task.name),
                    EventLevel::Error,
                );
                return Err(e);
            }
        }

        if task.process_responses {
            if let Err(e) = self.collect_step(task).await {
                self.log_event(
                    &format!("Error processing responses for task '{}': {e}", task.name),
                    EventLevel::Error,
                );
                return Err(e);
            }
        }

        self.log_event(&format!("Task completed: {}", task.name), EventLevel::Info);
        tracing::info!("✅ Task completed: '{}'", task.name);
        Ok(())
    }

    /// Render and send the templated email to every resolved recipient.
    ///
    /// Every recipient is attempted; failures are logged individually and
    /// the step fails afterward if any send failed.
    async fn send_step(&self, task: &Task) -> Result<()> {
        let recipients = recipients::resolve(task)?;
        if recipients.is_empty() {
            self.log_event(
                &format!("No recipients for task '{}'", task.name),
                EventLevel::Info,
            );
            return Ok(());
        }

        let today = Utc::now().date_naive();
        let mut failed = 0usize;
        for recipient in &recipients {
            let subject = template::render(&task.email_subject, recipient, today);
            let body = template::render(&task.email_body, recipient, today);
            match self
                .mail
                .send(&recipient.email, &subject, &body, &task.email_attachments)
                .await
            {
                Ok(()) => {
                    self.log_event(
                        &format!("Email sent to {}", recipient.email),
                        EventLevel::Info,
                    );
                }
                Err(e) => {
                    failed += 1;
                    self.log_event(
                        &format!("Failed to send email to {}: {e}", recipient.email),
                        EventLevel::Error,
                    );
                }
            }
        }

        if failed > 0 {
            return Err(MailflowError::Service(format!(
                "{failed} of {} sends failed",
                recipients.len()
            )));
        }
        self.log_event(
            &format!("Sent {} emails for task '{}'", recipients.len(), task.name),
            EventLevel::Info,
        );
        Ok(())
    }

    /// Collect matching responses, summarize them, and persist the artifact.
    async fn collect_step(&self, task: &Task) -> Result<()> {
        let filter = ResponseFilter::looking_back(
            &task.response_subject_filter,
            &task.response_keywords,
            task.response_days_back,
            Utc::now(),
        );
        let messages = self.mail.list_matching(&filter).await?;
        if messages.is_empty() {
            self.log_event(
                &format!("No responses found for task '{}'", task.name),
                EventLevel::Info,
            );
            return Ok(());
        }

        let summary = self.summarizer.summarize(&messages, &task.ai_prompt).await?;

        let store = self.artifacts.get(&task.storage_type).ok_or_else(|| {
            MailflowError::Service(format!(
                "no artifact store configured for '{}'",
                task.storage_type
            ))
        })?;
        let destination = self.artifact_destination(task);
        let record = ExecutionRecord::new(&task.name, summary, &messages);
        store.write(&record, &destination).await?;

        self.log_event(
            &format!(
                "Processed and stored {} responses for task '{}'",
                messages.len(),
                task.name
            ),
            EventLevel::Info,
        );
        Ok(())
    }

    /// The task's artifact destination: its `storage_path`, or a per-task
    /// default under the summaries directory.
    fn artifact_destination(&self, task: &Task) -> PathBuf {
        match &task.storage_path {
            Some(path) if !path.trim().is_empty() => {
                PathBuf::from(shellexpand::tilde(path).to_string())
            }
            _ => self.summaries_dir.join(&task.id),
        }
    }

    /// Persist a task (insert or update) with an audit event.
    pub async fn save_task(&self, task: &Task) -> Result<()> {
        match self.store.upsert(task) {
            Ok(()) => {
                self.log_event(
                    &format!("Task '{}' saved successfully", task.name),
                    EventLevel::Info,
                );
                Ok(())
            }
            Err(e) => {
                self.log_event(
                    &format!("Failed to save task '{}': {e}", task.name),
                    EventLevel::Error,
                );
                Err(e)
            }
        }
    }

    /// Delete a task by ID with an audit event. Returns whether it existed.
    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        match self.store.delete(id) {
            Ok(true) => {
                self.log_event(
                    &format!("Task with ID {id} deleted successfully"),
                    EventLevel::Info,
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                self.log_event(
                    &format!("Failed to delete task {id}: {e}"),
                    EventLevel::Error,
                );
                Err(e)
            }
        }
    }

    /// All stored tasks.
    pub fn tasks(&self) -> Result<Vec<Task>> {
        self.store.load()
    }

    /// One task by ID.
    pub fn task(&self, id: &str) -> Result<Option<Task>> {
        self.store.get(id)
    }

    /// The most recent `limit` events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.events.recent(limit)
    }

    /// Stored execution history for a task, oldest first. Reads through the
    /// same store and destination the collect step writes through.
    pub async fn task_results(&self, id: &str) -> Result<Vec<ExecutionRecord>> {
        let task = self
            .store
            .get(id)?
            .ok_or_else(|| MailflowError::Service(format!("Task with ID {id} not found")))?;
        let store = self.artifacts.get(&task.storage_type).ok_or_else(|| {
            MailflowError::Service(format!(
                "no artifact store configured for '{}'",
                task.storage_type
            ))
        })?;
        store.read_history(&self.artifact_destination(&task)).await
    }

    fn lock_for(&self, id: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Append to the persisted event log, mirrored to the process log.
    fn log_event(&self, message: &str, level: EventLevel) {
        match level {
            EventLevel::Info => tracing::info!("{message}"),
            EventLevel::Error => tracing::error!("{message}"),
        }
        if let Err(e) = self.events.append(message, level) {
            tracing::warn!("⚠️ Failed to persist event: {e}");
        }
    }
}

/// Drive periodic scans until the process exits.
pub async fn run_scheduler_loop(manager: Arc<TaskManager>, check_interval_secs: u64) {
    tracing::info!("⏰ Scheduler started (check every {check_interval_secs}s)");
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(check_interval_secs.max(1)));
    loop {
        interval.tick().await;
        if let Err(e) = manager.process_due_tasks().await {
            tracing::warn!("⚠️ Scan failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use mailflow_core::types::{EmailMessage, Recipient};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockMail {
        sent: StdMutex<Vec<(String, String, String)>>,
        inbox: Vec<EmailMessage>,
        fail_addresses: Vec<String>,
        delay_ms: u64,
    }

    #[async_trait]
    impl MailService for MockMail {
        async fn send(
            &self,
            to: &str,
            subject: &str,
            body: &str,
            _attachments: &[PathBuf],
        ) -> Result<()> {
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail_addresses.iter().any(|a| a == to) {
                return Err(MailflowError::Service(format!("smtp refused {to}")));
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }

        async fn list_matching(&self, filter: &ResponseFilter) -> Result<Vec<EmailMessage>> {
            Ok(self
                .inbox
                .iter()
                .filter(|m| filter.matches(m))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MockSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for MockSummarizer {
        async fn summarize(&self, _messages: &[EmailMessage], _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("summary text".to_string())
        }
    }

    #[derive(Default)]
    struct MockArtifacts {
        writes: StdMutex<Vec<(ExecutionRecord, PathBuf)>>,
    }

    #[async_trait]
    impl ArtifactStore for MockArtifacts {
        async fn write(&self, record: &ExecutionRecord, destination: &std::path::Path) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((record.clone(), destination.to_path_buf()));
            Ok(())
        }

        async fn read_history(
            &self,
            destination: &std::path::Path,
        ) -> Result<Vec<ExecutionRecord>> {
            Ok(self
                .writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, d)| d == destination)
                .map(|(record, _)| record.clone())
                .collect())
        }
    }

    struct Harness {
        manager: Arc<TaskManager>,
        mail: Arc<MockMail>,
        summarizer: Arc<MockSummarizer>,
        artifacts: Arc<MockArtifacts>,
        dir: PathBuf,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    fn harness(name: &str, mail: MockMail) -> Harness {
        let dir = std::env::temp_dir().join(name);
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();

        let mail = Arc::new(mail);
        let summarizer = Arc::new(MockSummarizer::default());
        let artifact = Arc::new(MockArtifacts::default());
        let mut artifacts: HashMap<StorageKind, Arc<dyn ArtifactStore>> = HashMap::new();
        artifacts.insert(StorageKind::Json, artifact.clone() as Arc<dyn ArtifactStore>);

        let manager = TaskManager::new(
            TaskStore::new(&dir.join("tasks.json")),
            EventLog::new(&dir.join("events.json")),
            mail.clone() as Arc<dyn MailService>,
            summarizer.clone() as Arc<dyn Summarizer>,
            artifacts,
            dir.join("summaries"),
        );
        Harness {
            manager: Arc::new(manager),
            mail,
            summarizer,
            artifacts: artifact,
            dir,
        }
    }

    fn due_task(name: &str) -> Task {
        Task::new(name, Utc::now() - Duration::minutes(1))
    }

    fn sending_task(name: &str, addresses: &[&str]) -> Task {
        let mut task = due_task(name);
        task.send_emails = true;
        task.email_subject = "Update for {name}".to_string();
        task.email_body = "Hello {name}, status due {current_date}.".to_string();
        task.manual_recipients = addresses
            .iter()
            .map(|a| Recipient::new(Some("Rcpt"), a))
            .collect();
        task
    }

    fn inbox_message(subject: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: "42".into(),
            subject: subject.into(),
            sender_name: "Bob".into(),
            sender_email: "bob@example.com".into(),
            received_time: Utc::now() - Duration::hours(2),
            body: body.into(),
            html_body: None,
        }
    }

    fn event_messages(h: &Harness) -> Vec<String> {
        h.manager
            .recent_events(100)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[tokio::test]
    async fn test_once_task_deactivates_and_runs_once() {
        let h = harness("mailflow-engine-once-test", MockMail::default());
        let mut task = sending_task("one shot", &["a@example.com"]);
        task.recurrence = Recurrence::Once;
        let original_next_run = task.next_run;
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();
        h.manager.process_due_tasks().await.unwrap();

        assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
        let stored = h.manager.task(&task.id).unwrap().unwrap();
        assert!(!stored.active);
        assert_eq!(stored.next_run, original_next_run);
    }

    #[tokio::test]
    async fn test_recurring_advance_happens_before_pipeline() {
        // The send fails, yet the schedule must already be advanced.
        let h = harness(
            "mailflow-engine-advance-test",
            MockMail {
                fail_addresses: vec!["a@example.com".to_string()],
                ..Default::default()
            },
        );
        let task = sending_task("daily digest", &["a@example.com"]);
        let original_next_run = task.next_run;
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        let stored = h.manager.task(&task.id).unwrap().unwrap();
        assert!(stored.active);
        assert_eq!(stored.next_run, original_next_run + Duration::days(1));
        assert!(
            event_messages(&h)
                .iter()
                .any(|m| m.starts_with("Error executing task 'daily digest'"))
        );
    }

    #[tokio::test]
    async fn test_schedule_persist_failure_skips_execution() {
        let h = harness("mailflow-engine-noadvance-test", MockMail::default());
        let task = sending_task("weekly digest", &["a@example.com"]);
        let original_next_run = task.next_run;
        h.manager.save_task(&task).await.unwrap();
        // A directory squatting on the store's temp path makes every save
        // after the first fail before the rename.
        std::fs::create_dir_all(h.dir.join("tasks.json.tmp")).unwrap();

        h.manager.process_due_tasks().await.unwrap();

        // The pipeline never ran and the schedule on disk is untouched.
        assert!(h.mail.sent.lock().unwrap().is_empty());
        let stored = h.manager.task(&task.id).unwrap().unwrap();
        assert!(stored.active);
        assert_eq!(stored.next_run, original_next_run);
        let events = event_messages(&h);
        assert!(
            events
                .iter()
                .any(|m| m.starts_with("Failed to persist schedule for task 'weekly digest'"))
        );
        assert!(!events.iter().any(|m| m.starts_with("Executing task")));
    }

    #[tokio::test]
    async fn test_future_task_is_not_run() {
        let h = harness("mailflow-engine-future-test", MockMail::default());
        let mut task = sending_task("later", &["a@example.com"]);
        task.next_run = Utc::now() + Duration::hours(1);
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        assert!(h.mail.sent.lock().unwrap().is_empty());
        let stored = h.manager.task(&task.id).unwrap().unwrap();
        assert_eq!(stored.next_run, task.next_run);
    }

    #[tokio::test]
    async fn test_concurrent_manual_runs_execute_once() {
        let h = harness(
            "mailflow-engine-lock-test",
            MockMail {
                delay_ms: 100,
                ..Default::default()
            },
        );
        let task = sending_task("locked", &["a@example.com"]);
        h.manager.save_task(&task).await.unwrap();

        let (first, second) = tokio::join!(
            h.manager.run_task_now(&task.id),
            h.manager.run_task_now(&task.id)
        );

        fn is_busy(result: &Result<()>) -> bool {
            matches!(result, Err(MailflowError::Service(msg)) if msg.contains("already running"))
        }
        assert!(is_busy(&first) != is_busy(&second));
        assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_now_does_not_advance_schedule() {
        let h = harness("mailflow-engine-runnow-test", MockMail::default());
        let mut task = sending_task("manual", &["a@example.com"]);
        task.next_run = Utc::now() + Duration::hours(3);
        h.manager.save_task(&task).await.unwrap();

        h.manager.run_task_now(&task.id).await.unwrap();

        assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
        let stored = h.manager.task(&task.id).unwrap().unwrap();
        assert_eq!(stored.next_run, task.next_run);
        assert!(stored.active);
    }

    #[tokio::test]
    async fn test_run_now_unknown_id_is_an_error() {
        let h = harness("mailflow-engine-unknown-test", MockMail::default());
        let err = h.manager.run_task_now("no-such-id").await.unwrap_err();
        assert!(matches!(err, MailflowError::Service(_)));
    }

    #[tokio::test]
    async fn test_gateless_task_only_logs() {
        let h = harness("mailflow-engine-gateless-test", MockMail::default());
        let task = due_task("quiet");
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        assert!(h.mail.sent.lock().unwrap().is_empty());
        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
        assert!(h.artifacts.writes.lock().unwrap().is_empty());
        let messages = event_messages(&h);
        assert!(messages.iter().any(|m| m == "Executing task: quiet"));
        assert!(messages.iter().any(|m| m == "Task completed: quiet"));
    }

    #[tokio::test]
    async fn test_zero_matches_skips_summarizer_and_store() {
        let h = harness(
            "mailflow-engine-nomatch-test",
            MockMail {
                inbox: vec![inbox_message("Unrelated", "nothing here")],
                ..Default::default()
            },
        );
        let mut task = due_task("collector");
        task.process_responses = true;
        task.response_subject_filter = "Weekly Report".to_string();
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 0);
        assert!(h.artifacts.writes.lock().unwrap().is_empty());
        assert!(
            event_messages(&h)
                .iter()
                .any(|m| m == "No responses found for task 'collector'")
        );
    }

    #[tokio::test]
    async fn test_collect_summarize_store_pipeline() {
        let h = harness(
            "mailflow-engine-collect-test",
            MockMail {
                inbox: vec![
                    inbox_message("RE: Weekly Report", "all approved"),
                    inbox_message("Weekly Report numbers", "see attached"),
                    inbox_message("Lunch?", "tacos"),
                ],
                ..Default::default()
            },
        );
        let mut task = due_task("collector");
        task.process_responses = true;
        task.response_subject_filter = "weekly report".to_string();
        task.ai_prompt = "Summarize the responses".to_string();
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        assert_eq!(h.summarizer.calls.load(Ordering::SeqCst), 1);
        let writes = h.artifacts.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (record, destination) = &writes[0];
        assert_eq!(record.task_name, "collector");
        assert_eq!(record.summary, "summary text");
        assert_eq!(record.emails.len(), 2);
        assert_eq!(*destination, h.dir.join("summaries").join(&task.id));
        drop(writes);
        assert!(
            event_messages(&h)
                .iter()
                .any(|m| m == "Processed and stored 2 responses for task 'collector'")
        );
    }

    #[tokio::test]
    async fn test_task_results_read_what_the_pipeline_stored() {
        let h = harness(
            "mailflow-engine-results-test",
            MockMail {
                inbox: vec![inbox_message("status update", "shipped")],
                ..Default::default()
            },
        );
        let mut task = due_task("reporter");
        task.process_responses = true;
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        let history = h.manager.task_results(&task.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_name, "reporter");
        assert_eq!(history[0].emails.len(), 1);

        let err = h.manager.task_results("no-such-id").await.unwrap_err();
        assert!(matches!(err, MailflowError::Service(_)));
    }

    #[tokio::test]
    async fn test_storage_path_overrides_destination() {
        let h = harness(
            "mailflow-engine-dest-test",
            MockMail {
                inbox: vec![inbox_message("status", "done")],
                ..Default::default()
            },
        );
        let mut task = due_task("custom dest");
        task.process_responses = true;
        task.storage_path = Some("/tmp/mailflow-custom/history".to_string());
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        let writes = h.artifacts.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, PathBuf::from("/tmp/mailflow-custom/history"));
    }

    #[tokio::test]
    async fn test_unconfigured_storage_kind_fails_step() {
        let h = harness(
            "mailflow-engine-nostore-test",
            MockMail {
                inbox: vec![inbox_message("status", "done")],
                ..Default::default()
            },
        );
        let mut task = due_task("csv writer");
        task.process_responses = true;
        task.storage_type = StorageKind::Csv; // harness only configures json
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        assert!(h.artifacts.writes.lock().unwrap().is_empty());
        assert!(
            event_messages(&h)
                .iter()
                .any(|m| m.contains("no artifact store configured for 'csv'"))
        );
    }

    #[tokio::test]
    async fn test_partial_send_failure_attempts_all_recipients() {
        let h = harness(
            "mailflow-engine-partial-test",
            MockMail {
                fail_addresses: vec!["bad@example.com".to_string()],
                ..Default::default()
            },
        );
        let task = sending_task("mixed", &["bad@example.com", "good@example.com"]);
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        // The failing recipient did not stop the next one.
        let sent = h.mail.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "good@example.com");
        drop(sent);

        let messages = event_messages(&h);
        assert!(
            messages
                .iter()
                .any(|m| m.starts_with("Failed to send email to bad@example.com"))
        );
        // The step still failed overall.
        assert!(
            messages
                .iter()
                .any(|m| m.starts_with("Error sending emails for task 'mixed'"))
        );
        assert!(!messages.iter().any(|m| m == "Task completed: mixed"));
    }

    #[tokio::test]
    async fn test_send_renders_templates_per_recipient() {
        let h = harness("mailflow-engine-render-test", MockMail::default());
        let mut task = sending_task("templated", &["alice@example.com"]);
        task.manual_recipients = vec![Recipient::new(Some("Alice"), "alice@example.com")];
        h.manager.save_task(&task).await.unwrap();

        h.manager.process_due_tasks().await.unwrap();

        let sent = h.mail.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Update for Alice");
        assert!(sent[0].2.starts_with("Hello Alice, status due "));
        assert!(!sent[0].2.contains("{current_date}"));
    }

    #[tokio::test]
    async fn test_save_and_delete_log_audit_events() {
        let h = harness("mailflow-engine-audit-test", MockMail::default());
        let task = due_task("audited");
        h.manager.save_task(&task).await.unwrap();
        assert!(h.manager.delete_task(&task.id).await.unwrap());
        assert!(!h.manager.delete_task(&task.id).await.unwrap());

        let messages = event_messages(&h);
        assert!(
            messages
                .iter()
                .any(|m| m == "Task 'audited' saved successfully")
        );
        assert!(
            messages
                .iter()
                .any(|m| m == &format!("Task with ID {} deleted successfully", task.id))
        );
    }

    #[tokio::test]
    async fn test_unreadable_task_file_aborts_scan() {
        let h = harness("mailflow-engine-badfile-test", MockMail::default());
        std::fs::write(h.dir.join("tasks.json"), "[{broken").unwrap();

        assert!(h.manager.process_due_tasks().await.is_err());
        assert!(
            event_messages(&h)
                .iter()
                .any(|m| m.starts_with("Failed to load tasks"))
        );
    }
}
