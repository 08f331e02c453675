//! Backing store trait definitions.

use crate::error::StoreResult;
use crate::rows::{
    DayCounter, DefinitionRow, RecordWrite, SnapshotHeader, StoredRecord, WordCounter, WordEvent,
};
use bytes::Bytes;
use lexisync_protocol::{EntityKind, LanguagePair};
use std::future::Future;

/// Storage for client-authored collections.
///
/// # Invariants
///
/// - `write_record` assigns `updated_at`; for a given id it only ever increases
/// - records are never physically removed, deletes flip the tombstone flag
/// - `records_since` is a coarse pre-filter (`updated_at >= since`); exact
///   checkpoint boundaries and ordering are applied by the caller
pub trait RecordStore: Send + Sync {
    /// Upserts a record and returns it as committed.
    fn write_record(
        &self,
        kind: EntityKind,
        user_id: &str,
        write: RecordWrite,
    ) -> impl Future<Output = StoreResult<StoredRecord>> + Send;

    /// Returns every record of the collection with `updated_at >= since`,
    /// tombstones included, in no particular order.
    fn records_since(
        &self,
        kind: EntityKind,
        user_id: &str,
        since: f64,
    ) -> impl Future<Output = StoreResult<Vec<StoredRecord>>> + Send;
}

/// Storage for per-user learning counters.
pub trait CounterStore: Send + Sync {
    /// Folds a batch of learning events into the word and day counters.
    ///
    /// Returns the number of word counters touched.
    fn record_word_events(
        &self,
        user_id: &str,
        events: &[WordEvent],
    ) -> impl Future<Output = StoreResult<usize>> + Send;

    /// Returns word counters with `updated_at >= since`.
    fn word_counters_since(
        &self,
        user_id: &str,
        since: f64,
    ) -> impl Future<Output = StoreResult<Vec<WordCounter>>> + Send;

    /// Returns day counters with `updated_at >= since`.
    fn day_counters_since(
        &self,
        user_id: &str,
        since: f64,
    ) -> impl Future<Output = StoreResult<Vec<DayCounter>>> + Send;
}

/// Storage for computed dictionary entries.
///
/// # Invariants
///
/// - at most one row per `(language_pair, source_text)`; a second insert
///   fails with [`crate::StoreError::Conflict`]
/// - `cached_at` is strictly increasing in insertion order
/// - `definitions_since` returns rows with `cached_at > since` in
///   `cached_at` order
pub trait DefinitionStore: Send + Sync {
    /// Returns rows of `pair` strictly newer than `since`, oldest first.
    fn definitions_since(
        &self,
        pair: &LanguagePair,
        since: f64,
    ) -> impl Future<Output = StoreResult<Vec<DefinitionRow>>> + Send;

    /// Looks up a single row by its lowercased source text.
    fn definition_by_text(
        &self,
        pair: &LanguagePair,
        text: &str,
    ) -> impl Future<Output = StoreResult<Option<DefinitionRow>>> + Send;

    /// Inserts a row, failing with a conflict if the key already exists.
    fn insert_definition(
        &self,
        pair: &LanguagePair,
        text: &str,
        payload: Bytes,
    ) -> impl Future<Output = StoreResult<DefinitionRow>> + Send;

    /// Returns the most recent export snapshot of `pair`.
    fn latest_snapshot(
        &self,
        pair: &LanguagePair,
    ) -> impl Future<Output = StoreResult<Option<SnapshotHeader>>> + Send;

    /// Registers a generated export snapshot.
    fn record_snapshot(
        &self,
        header: SnapshotHeader,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

/// A store providing every collection the sync layer needs.
pub trait BackingStore: RecordStore + CounterStore + DefinitionStore + 'static {}

impl<T> BackingStore for T where T: RecordStore + CounterStore + DefinitionStore + 'static {}
