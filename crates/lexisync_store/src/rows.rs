//! Row types persisted by the backing store.

use bytes::Bytes;
use lexisync_protocol::{LanguagePair, WireRecord};
use serde::{Deserialize, Serialize};

/// Length of a counter day, in seconds.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// A client-authored write to a synchronizable collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite {
    /// Collection-unique id chosen by the client.
    pub id: String,
    /// Soft-delete flag.
    pub deleted: bool,
    /// Business fields.
    pub data: serde_json::Value,
}

impl RecordWrite {
    /// Creates an upsert of a live record.
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            deleted: false,
            data,
        }
    }

    /// Creates a soft delete. The previous data is kept by the store.
    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            deleted: true,
            data: serde_json::Value::Null,
        }
    }
}

/// A record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Collection-unique id.
    pub id: String,
    /// Store-assigned timestamp of the last mutating write.
    pub updated_at: f64,
    /// Tombstone flag. Records are never physically removed.
    #[serde(default)]
    pub deleted: bool,
    /// Business fields.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl StoredRecord {
    /// Creates a live record with an explicit timestamp.
    pub fn new(id: impl Into<String>, updated_at: f64, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            updated_at,
            deleted: false,
            data,
        }
    }
}

impl From<StoredRecord> for WireRecord {
    fn from(record: StoredRecord) -> Self {
        WireRecord {
            id: record.id,
            updated_at: record.updated_at,
            deleted: record.deleted,
            data: record.data,
        }
    }
}

/// A computed dictionary entry.
///
/// Unique per `(language_pair, source_text)`; `source_text` is lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRow {
    /// Store-assigned numeric id, stable for the lifetime of the row.
    pub numeric_id: i64,
    /// Partition of the row.
    pub language_pair: LanguagePair,
    /// Lowercased source text.
    pub source_text: String,
    /// Store-assigned creation timestamp, strictly increasing store-wide.
    pub cached_at: f64,
    /// Provider output.
    pub payload: Bytes,
}

/// What happened to a word in a learning event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordEventKind {
    /// The word was displayed to the user.
    Seen,
    /// The user looked the word up.
    Checked,
}

/// A single learning event reported by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordEvent {
    /// Literal word text.
    pub word_text: String,
    /// Event type.
    pub kind: WordEventKind,
    /// Client-side event time.
    pub at: f64,
}

impl WordEvent {
    /// Creates a `Seen` event.
    pub fn seen(word_text: impl Into<String>, at: f64) -> Self {
        Self {
            word_text: word_text.into(),
            kind: WordEventKind::Seen,
            at,
        }
    }

    /// Creates a `Checked` event.
    pub fn checked(word_text: impl Into<String>, at: f64) -> Self {
        Self {
            word_text: word_text.into(),
            kind: WordEventKind::Checked,
            at,
        }
    }

    /// Returns the counter day this event belongs to.
    pub fn day(&self) -> i64 {
        (self.at / SECONDS_PER_DAY).floor() as i64
    }
}

/// Per-user counters for one word, keyed by literal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordCounter {
    /// Owner.
    pub user_id: String,
    /// Literal word text.
    pub word_text: String,
    /// Number of `Seen` events.
    pub seen: u64,
    /// Number of `Checked` events.
    pub checked: u64,
    /// `Seen` events since the last `Checked` event.
    pub seen_since_last_check: u64,
    /// Time of the last `Seen` event.
    pub last_seen: Option<f64>,
    /// Time of the last `Checked` event.
    pub last_checked: Option<f64>,
    /// Store-assigned timestamp of the last update.
    pub updated_at: f64,
}

impl WordCounter {
    pub(crate) fn empty(user_id: &str, word_text: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            word_text: word_text.to_string(),
            seen: 0,
            checked: 0,
            seen_since_last_check: 0,
            last_seen: None,
            last_checked: None,
            updated_at: 0.0,
        }
    }

    pub(crate) fn apply(&mut self, event: &WordEvent) {
        match event.kind {
            WordEventKind::Seen => {
                self.seen += 1;
                self.seen_since_last_check += 1;
                self.last_seen = Some(self.last_seen.map_or(event.at, |t| t.max(event.at)));
            }
            WordEventKind::Checked => {
                self.checked += 1;
                self.seen_since_last_check = 0;
                self.last_checked = Some(self.last_checked.map_or(event.at, |t| t.max(event.at)));
            }
        }
    }
}

/// Per-user counters for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayCounter {
    /// Owner.
    pub user_id: String,
    /// Days since the Unix epoch.
    pub day: i64,
    /// Number of `Seen` events that day.
    pub seen: u64,
    /// Number of `Checked` events that day.
    pub checked: u64,
    /// Store-assigned timestamp of the last update.
    pub updated_at: f64,
}

/// Identifies a generated export of the definition cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Exported partition.
    pub language_pair: LanguagePair,
    /// `cached_at` of the newest exported entry.
    pub latest_updated_at: f64,
    /// Numeric id of the newest exported entry.
    pub latest_numeric_id: i64,
    /// Provider that produced the exported entries.
    pub provider: String,
    /// Names of the chunk files, in order.
    pub chunk_names: Vec<String>,
    /// Number of exported entries.
    pub entry_count: usize,
}

impl SnapshotHeader {
    /// Returns the identifier clients use to fetch the snapshot's chunks.
    pub fn snapshot_id(&self) -> String {
        format!("{}-{}", self.latest_updated_at, self.latest_numeric_id)
    }
}
