//! Error types for LexiSync core.

use lexisync_protocol::{EntityKind, LanguagePair};
use lexisync_store::StoreError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No handler is registered for this entity kind and language pair.
    #[error("{kind} is not implemented for language pair {language_pair}")]
    UnsupportedCollection {
        /// Requested collection.
        kind: EntityKind,
        /// The user's language pair.
        language_pair: LanguagePair,
    },

    /// A from-scratch reload is in flight, or an incremental reload could
    /// not get its turn in time.
    #[error("definition cache for {language_pair} is loading, retry shortly")]
    CacheLoading {
        /// Pair being loaded.
        language_pair: LanguagePair,
    },

    /// Words still unresolved after one forced reload.
    #[error("no cached definition for {words:?} in {language_pair}")]
    MissingCacheValue {
        /// Pair that was searched.
        language_pair: LanguagePair,
        /// Lowercased words that could not be resolved.
        words: Vec<String>,
    },

    /// The checkpoint id can not be interpreted for this collection.
    #[error("invalid checkpoint id {id:?}: {reason}")]
    InvalidCheckpoint {
        /// Offending id.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A definition provider failed.
    #[error("enrichment failed: {0}")]
    Enrichment(#[from] EnrichError),

    /// Backing store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error while writing export files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The definition cache was shut down.
    #[error("definition cache has been shut down")]
    ShutDown,
}

impl CoreError {
    /// Returns true if the same call may succeed when retried shortly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::CacheLoading { .. })
    }
}

/// Errors raised while computing a definition.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The provider has nothing for this text.
    #[error("no definition for {text:?}")]
    NotFound {
        /// Requested text.
        text: String,
    },

    /// Context-aware phonetic alignment did not line up with the text.
    #[error("inconsistent transliteration of {text:?}: {reason}")]
    TransliterationInconsistency {
        /// Text being transcribed.
        text: String,
        /// What did not line up.
        reason: String,
    },

    /// Any other provider failure.
    #[error("provider error: {0}")]
    Provider(String),
}
