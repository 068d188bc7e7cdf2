//! # Mailflow Core
//!
//! Shared foundation for the Mailflow workspace: configuration, the error
//! taxonomy, the data model exchanged between the scheduler and its
//! collaborators, and the capability traits (mail, summarization, artifact
//! storage) that adapter crates implement.

pub mod config;
pub mod csv;
pub mod error;
pub mod fs;
pub mod traits;
pub mod types;

pub use config::MailflowConfig;
pub use error::{MailflowError, Result};
pub use traits::{ArtifactStore, MailService, Summarizer};
pub use types::{
    EmailMessage, EventLevel, ExecutionRecord, Recipient, ResponseFilter, StorageKind, StoredEmail,
};
