//! The uniform row shape returned by pulls.

use crate::checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};

/// A synchronized row as sent to clients.
///
/// Business fields travel in `data` and are opaque to the sync layer; only
/// the `(id, updated_at, deleted)` triple matters for paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Collection-unique id.
    pub id: String,
    /// Store-assigned modification timestamp.
    pub updated_at: f64,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
    /// Business fields.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WireRecord {
    /// Creates a live record.
    pub fn new(id: impl Into<String>, updated_at: f64, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            updated_at,
            deleted: false,
            data,
        }
    }

    /// Creates a tombstone.
    pub fn tombstone(id: impl Into<String>, updated_at: f64) -> Self {
        Self {
            id: id.into(),
            updated_at,
            deleted: true,
            data: serde_json::Value::Null,
        }
    }

    /// Returns the checkpoint that resumes a feed right after this record.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.id.clone(), self.updated_at)
    }
}
