//! In-memory backing store.

use crate::backend::{CounterStore, DefinitionStore, RecordStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::rows::{
    DayCounter, DefinitionRow, RecordWrite, SnapshotHeader, StoredRecord, WordCounter, WordEvent,
};
use bytes::Bytes;
use lexisync_protocol::{EntityKind, LanguagePair};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Smallest step used to keep store-assigned timestamps strictly increasing.
const TIMESTAMP_STEP: f64 = 1e-6;

/// Counters describing the traffic a store has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of record upserts.
    pub record_writes: u64,
    /// Number of `definitions_since` calls.
    pub definition_scans: u64,
    /// Number of `definitions_since` calls starting from the beginning.
    pub full_definition_scans: u64,
    /// Number of committed definition inserts.
    pub definition_inserts: u64,
    /// Number of definition inserts rejected by the unique constraint.
    pub insert_conflicts: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    record_writes: AtomicU64,
    definition_scans: AtomicU64,
    full_definition_scans: AtomicU64,
    definition_inserts: AtomicU64,
    insert_conflicts: AtomicU64,
}

#[derive(Debug, Default)]
struct PairRows {
    rows: Vec<DefinitionRow>,
    by_text: HashMap<String, usize>,
}

/// One user's records of one kind.
#[derive(Debug, Default)]
struct Collection {
    rows: HashMap<String, StoredRecord>,
    /// Largest `updated_at` ever assigned in the collection.
    high_water: f64,
}

impl Collection {
    fn put(&mut self, record: StoredRecord) {
        self.high_water = self.high_water.max(record.updated_at);
        self.rows.insert(record.id.clone(), record);
    }
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<(EntityKind, String), Collection>,
    words: HashMap<(String, String), WordCounter>,
    days: HashMap<(String, i64), DayCounter>,
    definitions: HashMap<LanguagePair, PairRows>,
    snapshots: HashMap<LanguagePair, SnapshotHeader>,
    counter_marks: HashMap<String, f64>,
    last_definition_id: i64,
    last_cached_at: f64,
}

/// An in-memory backing store.
///
/// This store keeps every collection in memory and is suitable for:
/// - Unit and integration tests
/// - Command-line tools working on fixtures
/// - Single-node deployments that rebuild state on start
///
/// It enforces the same unique constraint on definitions as a relational
/// backend would, so concurrent computations of the same definition race
/// exactly like they would against a shared database.
///
/// # Thread Safety
///
/// The store is thread-safe; share it between "processes" with an `Arc`.
pub struct InMemoryStore {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    latency: Duration,
    stats: AtomicStats,
}

impl InMemoryStore {
    /// Creates an empty store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Creates an empty store driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            latency: Duration::ZERO,
            stats: AtomicStats::default(),
        }
    }

    /// Adds an artificial delay before every operation.
    ///
    /// Useful to widen race windows in concurrency tests.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inserts a record verbatim, keeping its `updated_at`.
    ///
    /// Intended for fixtures that need exact timestamps, including ties.
    pub fn put_record(&self, kind: EntityKind, user_id: &str, record: StoredRecord) {
        self.state
            .write()
            .records
            .entry((kind, user_id.to_string()))
            .or_default()
            .put(record);
    }

    /// Inserts a definition row verbatim, keeping its id and `cached_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the key already exists, or
    /// [`StoreError::InvalidWrite`] if the row would break `cached_at` order.
    pub fn import_definition(&self, row: DefinitionRow) -> StoreResult<()> {
        let mut state = self.state.write();
        if row.cached_at <= state.last_cached_at {
            return Err(StoreError::InvalidWrite(format!(
                "definition {:?} has cached_at {} not after {}",
                row.source_text, row.cached_at, state.last_cached_at
            )));
        }
        let pair_rows = state.definitions.entry(row.language_pair.clone()).or_default();
        if pair_rows.by_text.contains_key(&row.source_text) {
            return Err(StoreError::Conflict {
                language_pair: row.language_pair,
                text: row.source_text,
            });
        }
        pair_rows
            .by_text
            .insert(row.source_text.clone(), pair_rows.rows.len());
        let (numeric_id, cached_at) = (row.numeric_id, row.cached_at);
        pair_rows.rows.push(row);
        state.last_definition_id = state.last_definition_id.max(numeric_id);
        state.last_cached_at = cached_at;
        Ok(())
    }

    /// Returns a snapshot of the traffic counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            record_writes: self.stats.record_writes.load(Ordering::Relaxed),
            definition_scans: self.stats.definition_scans.load(Ordering::Relaxed),
            full_definition_scans: self.stats.full_definition_scans.load(Ordering::Relaxed),
            definition_inserts: self.stats.definition_inserts.load(Ordering::Relaxed),
            insert_conflicts: self.stats.insert_conflicts.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of definition rows stored for `pair`.
    pub fn definition_count(&self, pair: &LanguagePair) -> usize {
        self.state
            .read()
            .definitions
            .get(pair)
            .map_or(0, |p| p.rows.len())
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// Returns `now`, bumped past `previous` if the clock has not moved.
    fn stamp(now: f64, previous: f64) -> f64 {
        if now > previous {
            now
        } else {
            previous + TIMESTAMP_STEP.max(previous.abs() * f64::EPSILON * 4.0)
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("latency", &self.latency)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl RecordStore for InMemoryStore {
    async fn write_record(
        &self,
        kind: EntityKind,
        user_id: &str,
        write: RecordWrite,
    ) -> StoreResult<StoredRecord> {
        self.delay().await;
        if write.id.is_empty() {
            return Err(StoreError::InvalidWrite("record id must not be empty".into()));
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        let collection = state.records.entry((kind, user_id.to_string())).or_default();
        // Stamped past the whole collection, not just this id.
        let updated_at = Self::stamp(now, collection.high_water);
        let record = match collection.rows.remove(&write.id) {
            Some(mut existing) => {
                existing.updated_at = updated_at;
                existing.deleted = write.deleted;
                if !write.deleted {
                    existing.data = write.data;
                }
                existing
            }
            None => StoredRecord {
                id: write.id,
                updated_at,
                deleted: write.deleted,
                data: write.data,
            },
        };
        collection.put(record.clone());
        self.stats.record_writes.fetch_add(1, Ordering::Relaxed);
        Ok(record)
    }

    async fn records_since(
        &self,
        kind: EntityKind,
        user_id: &str,
        since: f64,
    ) -> StoreResult<Vec<StoredRecord>> {
        self.delay().await;
        let state = self.state.read();
        Ok(state
            .records
            .get(&(kind, user_id.to_string()))
            .map(|collection| {
                collection
                    .rows
                    .values()
                    .filter(|r| r.updated_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl CounterStore for InMemoryStore {
    async fn record_word_events(&self, user_id: &str, events: &[WordEvent]) -> StoreResult<usize> {
        self.delay().await;
        if events.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        let mut touched_words = HashSet::new();
        let mut touched_days = HashSet::new();

        for event in events {
            let word_key = (user_id.to_string(), event.word_text.clone());
            state
                .words
                .entry(word_key.clone())
                .or_insert_with(|| WordCounter::empty(user_id, &event.word_text))
                .apply(event);
            touched_words.insert(word_key);

            let day_key = (user_id.to_string(), event.day());
            let day = state.days.entry(day_key.clone()).or_insert_with(|| DayCounter {
                user_id: user_id.to_string(),
                day: event.day(),
                seen: 0,
                checked: 0,
                updated_at: 0.0,
            });
            match event.kind {
                crate::rows::WordEventKind::Seen => day.seen += 1,
                crate::rows::WordEventKind::Checked => day.checked += 1,
            }
            touched_days.insert(day_key);
        }

        let mark = state.counter_marks.entry(user_id.to_string()).or_insert(0.0);
        let updated_at = Self::stamp(now, *mark);
        *mark = updated_at;
        for key in &touched_words {
            if let Some(counter) = state.words.get_mut(key) {
                counter.updated_at = updated_at;
            }
        }
        for key in &touched_days {
            if let Some(counter) = state.days.get_mut(key) {
                counter.updated_at = updated_at;
            }
        }

        Ok(touched_words.len())
    }

    async fn word_counters_since(&self, user_id: &str, since: f64) -> StoreResult<Vec<WordCounter>> {
        self.delay().await;
        let state = self.state.read();
        Ok(state
            .words
            .values()
            .filter(|c| c.user_id == user_id && c.updated_at >= since)
            .cloned()
            .collect())
    }

    async fn day_counters_since(&self, user_id: &str, since: f64) -> StoreResult<Vec<DayCounter>> {
        self.delay().await;
        let state = self.state.read();
        Ok(state
            .days
            .values()
            .filter(|c| c.user_id == user_id && c.updated_at >= since)
            .cloned()
            .collect())
    }
}

impl DefinitionStore for InMemoryStore {
    async fn definitions_since(
        &self,
        pair: &LanguagePair,
        since: f64,
    ) -> StoreResult<Vec<DefinitionRow>> {
        self.delay().await;
        self.stats.definition_scans.fetch_add(1, Ordering::Relaxed);
        if since <= 0.0 {
            self.stats.full_definition_scans.fetch_add(1, Ordering::Relaxed);
        }

        let state = self.state.read();
        let Some(pair_rows) = state.definitions.get(pair) else {
            return Ok(Vec::new());
        };
        // Rows are appended in cached_at order, so the tail after the first
        // newer row is exactly the answer.
        let start = pair_rows.rows.partition_point(|row| row.cached_at <= since);
        Ok(pair_rows.rows[start..].to_vec())
    }

    async fn definition_by_text(
        &self,
        pair: &LanguagePair,
        text: &str,
    ) -> StoreResult<Option<DefinitionRow>> {
        self.delay().await;
        let state = self.state.read();
        Ok(state
            .definitions
            .get(pair)
            .and_then(|p| p.by_text.get(text).map(|&idx| p.rows[idx].clone())))
    }

    async fn insert_definition(
        &self,
        pair: &LanguagePair,
        text: &str,
        payload: Bytes,
    ) -> StoreResult<DefinitionRow> {
        self.delay().await;
        let now = self.clock.now();
        let mut state = self.state.write();

        if state
            .definitions
            .get(pair)
            .is_some_and(|p| p.by_text.contains_key(text))
        {
            self.stats.insert_conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::Conflict {
                language_pair: pair.clone(),
                text: text.to_string(),
            });
        }

        let cached_at = Self::stamp(now, state.last_cached_at);
        state.last_cached_at = cached_at;
        state.last_definition_id += 1;
        let row = DefinitionRow {
            numeric_id: state.last_definition_id,
            language_pair: pair.clone(),
            source_text: text.to_string(),
            cached_at,
            payload,
        };

        let pair_rows = state.definitions.entry(pair.clone()).or_default();
        pair_rows
            .by_text
            .insert(text.to_string(), pair_rows.rows.len());
        pair_rows.rows.push(row.clone());
        self.stats.definition_inserts.fetch_add(1, Ordering::Relaxed);
        Ok(row)
    }

    async fn latest_snapshot(&self, pair: &LanguagePair) -> StoreResult<Option<SnapshotHeader>> {
        self.delay().await;
        Ok(self.state.read().snapshots.get(pair).cloned())
    }

    async fn record_snapshot(&self, header: SnapshotHeader) -> StoreResult<()> {
        self.delay().await;
        let mut state = self.state.write();
        let newer = state
            .snapshots
            .get(&header.language_pair)
            .map_or(true, |current| {
                header.latest_updated_at >= current.latest_updated_at
            });
        if newer {
            state.snapshots.insert(header.language_pair.clone(), header);
        }
        Ok(())
    }
}
