//! Error types for store operations.

use lexisync_protocol::LanguagePair;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected an insert because another writer
    /// committed the same key first.
    #[error("unique constraint violated for {text:?} in {language_pair}")]
    Conflict {
        /// Partition of the conflicting row.
        language_pair: LanguagePair,
        /// Key of the conflicting row.
        text: String,
    },

    /// The write is not valid for the target collection.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    /// The store is unavailable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if this error is a unique-constraint race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}
