//! TOML configuration loaded from `~/.mailflow/config.toml`.
//!
//! Every field has a default, so a missing or partial file still yields a
//! usable configuration. The first load writes the defaults back out as a
//! starting point for editing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MailflowError, Result};

/// Top-level configuration for the mailflow daemon and CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MailflowConfig {
    /// Application state directory. Empty means `~/.mailflow`.
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-task scans.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_check_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
        }
    }
}

/// Summarization endpoint settings (OpenAI-compatible, Ollama by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Bearer token. Empty means no auth header (local endpoints).
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_ai_endpoint() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_ai_model() -> String {
    "llama2".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            api_key: String::new(),
            temperature: default_temperature(),
        }
    }
}

/// SMTP and IMAP account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    /// Account address, used for auth and as the From address.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub password: String,
    /// Optional display name for the From header.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Mailbox scanned for responses.
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Appended to every outgoing body when non-empty.
    #[serde(default)]
    pub signature: String,
    /// BCC address added to every outgoing message when non-empty.
    #[serde(default)]
    pub auto_bcc: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            imap_host: String::new(),
            imap_port: default_imap_port(),
            address: String::new(),
            password: String::new(),
            display_name: None,
            mailbox: default_mailbox(),
            signature: String::new(),
            auto_bcc: String::new(),
        }
    }
}

/// Artifact storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for summary artifacts. Empty means `~/.mailflow/summaries`.
    #[serde(default)]
    pub summaries_dir: String,
}

impl MailflowConfig {
    /// Load from the default path, writing defaults there on first run.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path, writing defaults there if absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| MailflowError::Config(format!("failed to read {path:?}: {e}")))?;
            toml::from_str(&content)
                .map_err(|e| MailflowError::Config(format!("failed to parse {path:?}: {e}")))
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Serialize to TOML at `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MailflowError::Config(format!("failed to create {parent:?}: {e}")))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| MailflowError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| MailflowError::Config(format!("failed to write {path:?}: {e}")))?;
        Ok(())
    }

    /// `~/.mailflow/config.toml`
    pub fn default_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// `~/.mailflow`, the fallback state directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mailflow")
    }

    /// The effective state directory, honoring the `data_dir` override.
    pub fn data_dir(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }

    /// Path of the persisted task list.
    pub fn tasks_file(&self) -> PathBuf {
        self.data_dir().join("tasks.json")
    }

    /// Path of the persisted event log.
    pub fn events_file(&self) -> PathBuf {
        self.data_dir().join("events.json")
    }

    /// Directory receiving summary artifacts.
    pub fn summaries_dir(&self) -> PathBuf {
        if self.storage.summaries_dir.is_empty() {
            self.data_dir().join("summaries")
        } else {
            PathBuf::from(&self.storage.summaries_dir)
        }
    }
}
