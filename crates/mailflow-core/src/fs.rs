//! Durable JSON file helpers shared by the stores.
//!
//! Writes go to a temp file in the same directory, are fsynced, then renamed
//! over the destination, so readers only ever see a complete collection.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{MailflowError, Result};

/// Atomically replace `path` with the pretty-printed JSON of `value`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| MailflowError::Persistence(format!("serialize {path:?}: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MailflowError::Persistence(format!("create dir {parent:?}: {e}")))?;
    }

    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| MailflowError::Persistence(format!("create {tmp:?}: {e}")))?;
        file.write_all(json.as_bytes())
            .map_err(|e| MailflowError::Persistence(format!("write {tmp:?}: {e}")))?;
        file.sync_all()
            .map_err(|e| MailflowError::Persistence(format!("sync {tmp:?}: {e}")))?;
    }
    std::fs::rename(&tmp, path)
        .map_err(|e| MailflowError::Persistence(format!("rename {tmp:?} -> {path:?}: {e}")))?;
    Ok(())
}

/// Load JSON from `path`. A missing file yields `None`; unreadable or
/// unparsable content is a `Persistence` error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| MailflowError::Persistence(format!("read {path:?}: {e}")))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| MailflowError::Persistence(format!("parse {path:?}: {e}")))?;
    Ok(Some(value))
}
