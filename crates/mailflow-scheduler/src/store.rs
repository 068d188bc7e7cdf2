//! File-based task store — tasks saved as one JSON file, human-readable.
//!
//! Every mutation is load-all/modify/save-all; the save goes through the
//! atomic rename in [`mailflow_core::fs`], so no partial collection is ever
//! visible.
//! An unreadable or unparsable backing file surfaces as a `Persistence`
//! error rather than an empty list, so a corrupt file cannot silently drop
//! the whole task collection.

use std::path::{Path, PathBuf};

use mailflow_core::error::Result;
use mailflow_core::fs;

use crate::task::Task;

/// File-based task store.
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    /// Create a store backed by the given file (usually `tasks.json`).
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Load all tasks. A missing file is an empty collection.
    pub fn load(&self) -> Result<Vec<Task>> {
        Ok(fs::read_json(&self.path)?.unwrap_or_default())
    }

    /// Look up a task by ID.
    pub fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.load()?.into_iter().find(|t| t.id == id))
    }

    /// Replace the task with a matching ID, or append if absent.
    pub fn upsert(&self, task: &Task) -> Result<()> {
        let mut tasks = self.load()?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.save(&tasks)
    }

    /// Remove the task with the given ID. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut tasks = self.load()?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Ok(false);
        }
        self.save(&tasks)?;
        Ok(true)
    }

    /// Save the whole collection to disk atomically.
    pub fn save(&self, tasks: &[Task]) -> Result<()> {
        fs::write_json_atomic(&self.path, &tasks)?;
        tracing::debug!("💾 Saved {} tasks to {}", tasks.len(), self.path.display());
        Ok(())
    }
}
