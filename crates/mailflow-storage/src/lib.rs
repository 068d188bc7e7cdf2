//! Artifact store backends: JSON execution history and CSV row logs.

pub mod csv;
pub mod json;

pub use csv::CsvArtifactStore;
pub use json::JsonArtifactStore;

use std::collections::HashMap;
use std::sync::Arc;

use mailflow_core::traits::ArtifactStore;
use mailflow_core::types::StorageKind;

/// Build the full set of artifact stores, one per storage kind.
pub fn default_stores() -> HashMap<StorageKind, Arc<dyn ArtifactStore>> {
    let mut stores: HashMap<StorageKind, Arc<dyn ArtifactStore>> = HashMap::new();
    stores.insert(StorageKind::Json, Arc::new(JsonArtifactStore::new()));
    stores.insert(StorageKind::Csv, Arc::new(CsvArtifactStore::new()));
    stores
}
