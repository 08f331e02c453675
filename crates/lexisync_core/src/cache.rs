//! Per-language-pair snapshot of computed definitions.
//!
//! The cache mirrors the store's definitions table, one snapshot per
//! language pair:
//!
//! - populated lazily on first use by a full reload
//! - refreshed incrementally from its own high-water mark, never from an
//!   older timestamp
//! - at most one reload per pair in flight; a concurrent from-scratch load
//!   fails fast with `CacheLoading` while incremental refreshes wait their
//!   turn for a bounded time
//! - write-through: a miss computes the definition, inserts it in the store
//!   (unique per text, so racing processes converge on one row) and then
//!   refreshes the snapshot
//!
//! Snapshot entries are appended in `cached_at` order, so the last entry is
//! always the high-water mark.

use crate::config::CacheConfig;
use crate::error::{CoreError, CoreResult, EnrichError};
use crate::notifier::ChangeNotifier;
use crate::pager::{self, Page, Paged};
use crate::provider::DefinitionProvider;
use bytes::Bytes;
use lexisync_protocol::{ChannelName, Checkpoint, EntityKind, LanguagePair, WireRecord};
use lexisync_store::{DefinitionRow, DefinitionStore, StoreError};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, info, warn};

/// Normalizes a source text to its cache key.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// One cached definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Stable numeric id shared with clients.
    pub numeric_id: i64,
    /// Lowercased source text.
    pub source_text: String,
    /// Store timestamp of the computation.
    pub cached_at: f64,
    /// Opaque provider output.
    pub payload: Bytes,
}

impl CacheEntry {
    /// Renders the entry as a wire record keyed by its numeric id.
    ///
    /// JSON payloads are embedded as-is, anything else as text.
    pub fn to_wire(&self) -> WireRecord {
        let payload = serde_json::from_slice::<serde_json::Value>(&self.payload)
            .unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&self.payload).into_owned())
            });
        WireRecord::new(
            self.numeric_id.to_string(),
            self.cached_at,
            json!({
                "source_text": self.source_text,
                "definition": payload,
            }),
        )
    }
}

impl From<DefinitionRow> for CacheEntry {
    fn from(row: DefinitionRow) -> Self {
        Self {
            numeric_id: row.numeric_id,
            source_text: row.source_text,
            cached_at: row.cached_at,
            payload: row.payload,
        }
    }
}

impl Paged for CacheEntry {
    type Id = i64;

    fn updated_at(&self) -> f64 {
        self.cached_at
    }

    fn cursor_id(&self) -> i64 {
        self.numeric_id
    }

    fn is_tombstone(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    entries: Vec<Arc<CacheEntry>>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    fn high_water_mark(&self) -> f64 {
        self.entries.last().map_or(0.0, |entry| entry.cached_at)
    }

    /// Right-biased union: an incoming row replaces a cached entry with the
    /// same text and moves to the end.
    fn merge(&mut self, rows: Vec<DefinitionRow>) {
        for row in rows {
            let entry = Arc::new(CacheEntry::from(row));
            debug_assert!(entry.cached_at > self.high_water_mark() || self.entries.is_empty());
            if let Some(position) = self.index.remove(&entry.source_text) {
                self.entries.remove(position);
                for (offset, moved) in self.entries[position..].iter().enumerate() {
                    self.index.insert(moved.source_text.clone(), position + offset);
                }
            }
            self.index
                .insert(entry.source_text.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    fn get(&self, text: &str) -> Option<Arc<CacheEntry>> {
        self.index
            .get(text)
            .and_then(|position| self.entries.get(*position))
            .cloned()
    }
}

#[derive(Debug, Default)]
struct PairState {
    snapshot: RwLock<Option<Snapshot>>,
    reload_latch: AsyncMutex<()>,
}

/// How a reload obtains the per-pair latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadMode {
    /// Load from scratch; fail fast if another reload is in flight.
    Bootstrap,
    /// Refresh from the high-water mark; wait a bounded time for the latch.
    Incremental,
}

/// Write-through cache of computed definitions.
///
/// `S` is the backing store; one cache instance is shared by every request
/// of a process.
pub struct DefinitionCache<S> {
    store: Arc<S>,
    notifier: Arc<ChangeNotifier>,
    config: CacheConfig,
    pairs: RwLock<HashMap<LanguagePair, Arc<PairState>>>,
    shut_down: AtomicBool,
}

impl<S: DefinitionStore> DefinitionCache<S> {
    /// Creates an empty cache. Nothing is loaded until first use.
    pub fn new(store: Arc<S>, notifier: Arc<ChangeNotifier>, config: CacheConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            pairs: RwLock::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn check_open(&self) -> CoreResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(CoreError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn pair_state(&self, pair: &LanguagePair) -> Arc<PairState> {
        if let Some(state) = self.pairs.read().get(pair) {
            return Arc::clone(state);
        }
        Arc::clone(self.pairs.write().entry(pair.clone()).or_default())
    }

    fn existing_state(&self, pair: &LanguagePair) -> Option<Arc<PairState>> {
        self.pairs.read().get(pair).cloned()
    }

    /// Returns true once `pair` has been loaded.
    pub fn is_loaded(&self, pair: &LanguagePair) -> bool {
        self.existing_state(pair)
            .is_some_and(|state| state.snapshot.read().is_some())
    }

    /// Pairs with a loaded snapshot.
    pub fn loaded_pairs(&self) -> Vec<LanguagePair> {
        self.pairs
            .read()
            .iter()
            .filter(|(_, state)| state.snapshot.read().is_some())
            .map(|(pair, _)| pair.clone())
            .collect()
    }

    /// `cached_at` of the newest entry, `Some(0.0)` for an empty loaded
    /// snapshot and `None` if `pair` is not loaded.
    pub fn high_water_mark(&self, pair: &LanguagePair) -> Option<f64> {
        self.existing_state(pair)
            .and_then(|state| state.snapshot.read().as_ref().map(Snapshot::high_water_mark))
    }

    /// Number of cached entries for `pair`.
    pub fn len(&self, pair: &LanguagePair) -> usize {
        self.existing_state(pair)
            .and_then(|state| state.snapshot.read().as_ref().map(|s| s.entries.len()))
            .unwrap_or(0)
    }

    /// Returns true if nothing is cached for `pair`.
    pub fn is_empty(&self, pair: &LanguagePair) -> bool {
        self.len(pair) == 0
    }

    /// Looks up an entry without touching the store.
    pub fn get(&self, pair: &LanguagePair, text: &str) -> Option<Arc<CacheEntry>> {
        let state = self.existing_state(pair)?;
        let snapshot = state.snapshot.read();
        snapshot.as_ref()?.get(&normalize_text(text))
    }

    /// All cached entries of `pair` in `cached_at` order.
    pub fn entries(&self, pair: &LanguagePair) -> Vec<Arc<CacheEntry>> {
        self.existing_state(pair)
            .and_then(|state| state.snapshot.read().as_ref().map(|s| s.entries.clone()))
            .unwrap_or_default()
    }

    /// Pages the cached entries of `pair` after `checkpoint`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCheckpoint` if the checkpoint id is not numeric.
    pub fn page_after(
        &self,
        pair: &LanguagePair,
        checkpoint: Option<&Checkpoint>,
        limit: Option<usize>,
    ) -> CoreResult<Page<Arc<CacheEntry>>> {
        pager::page(self.entries(pair), checkpoint, limit)
    }

    /// Loads `pair` from scratch if it has not been loaded yet.
    ///
    /// # Errors
    ///
    /// Returns `CacheLoading` if another caller is loading the pair right
    /// now.
    pub async fn ensure_loaded(&self, pair: &LanguagePair) -> CoreResult<()> {
        self.check_open()?;
        if self.is_loaded(pair) {
            return Ok(());
        }
        self.reload_with(pair, ReloadMode::Bootstrap).await.map(|_| ())
    }

    /// Reloads `pair`.
    ///
    /// `since <= 0` requests a from-scratch load that fails fast with
    /// `CacheLoading` if a reload is already in flight. A positive `since`
    /// requests an incremental refresh that waits up to
    /// [`CacheConfig::reload_wait`] for its turn. Either way the scan never
    /// starts before the cache's own high-water mark.
    ///
    /// Returns the number of rows merged.
    pub async fn reload(&self, pair: &LanguagePair, since: f64) -> CoreResult<usize> {
        let mode = if since > 0.0 {
            ReloadMode::Incremental
        } else {
            ReloadMode::Bootstrap
        };
        self.reload_with(pair, mode).await
    }

    /// Incremental refresh from the current high-water mark.
    pub async fn refresh(&self, pair: &LanguagePair) -> CoreResult<usize> {
        self.reload_with(pair, ReloadMode::Incremental).await
    }

    async fn acquire<'a>(
        &self,
        pair: &LanguagePair,
        state: &'a PairState,
        mode: ReloadMode,
    ) -> CoreResult<AsyncMutexGuard<'a, ()>> {
        let loading = || CoreError::CacheLoading {
            language_pair: pair.clone(),
        };
        match mode {
            ReloadMode::Bootstrap => state.reload_latch.try_lock().map_err(|_| {
                debug!(language_pair = %pair, "reload already in flight");
                loading()
            }),
            ReloadMode::Incremental => {
                tokio::time::timeout(self.config.reload_wait, state.reload_latch.lock())
                    .await
                    .map_err(|_| {
                        warn!(
                            language_pair = %pair,
                            wait_ms = self.config.reload_wait.as_millis() as u64,
                            "gave up waiting for in-flight reload"
                        );
                        loading()
                    })
            }
        }
    }

    async fn reload_with(&self, pair: &LanguagePair, mode: ReloadMode) -> CoreResult<usize> {
        self.check_open()?;
        let state = self.pair_state(pair);
        let _latch = self.acquire(pair, &state, mode).await?;
        self.check_open()?;

        let current = state.snapshot.read().as_ref().map(Snapshot::high_water_mark);
        let from = current.unwrap_or(0.0);
        let rows = self.store.definitions_since(pair, from).await?;
        let merged = rows.len();

        let high_water_mark = {
            let mut snapshot = state.snapshot.write();
            let snapshot = snapshot.get_or_insert_with(Snapshot::default);
            snapshot.merge(rows);
            snapshot.high_water_mark()
        };

        if current.is_none() {
            info!(language_pair = %pair, entries = merged, high_water_mark, "definition cache loaded");
        } else {
            debug!(language_pair = %pair, merged, from, high_water_mark, "definition cache refreshed");
        }
        Ok(merged)
    }

    /// Returns the definition of `text`, computing and storing it on a miss.
    ///
    /// On a miss the store is consulted first, since another process may
    /// have computed the entry already. Otherwise `provider` computes it and
    /// the row is inserted; if a racing process wins the insert, the
    /// winner's row is used. New rows are announced on the `definitions`
    /// channel and the snapshot is refreshed before returning.
    ///
    /// # Errors
    ///
    /// Returns `Enrichment` for blank text or when the provider fails,
    /// `CacheLoading` if the pair is being loaded from scratch and `Store`
    /// on store failures.
    pub async fn definition<P>(
        &self,
        pair: &LanguagePair,
        text: &str,
        provider: &P,
    ) -> CoreResult<Arc<CacheEntry>>
    where
        P: DefinitionProvider + ?Sized,
    {
        let key = normalize_text(text);
        if key.is_empty() {
            return Err(EnrichError::NotFound {
                text: text.to_string(),
            }
            .into());
        }
        self.ensure_loaded(pair).await?;
        if let Some(entry) = self.get(pair, &key) {
            return Ok(entry);
        }

        let row = match self.store.definition_by_text(pair, &key).await? {
            Some(row) => row,
            None => self.compute_and_insert(pair, &key, provider).await?,
        };

        match self.refresh(pair).await {
            Ok(_) => {}
            Err(CoreError::CacheLoading { .. }) => {
                debug!(language_pair = %pair, text = %key, "serving definition before refresh");
            }
            Err(err) => return Err(err),
        }
        Ok(self
            .get(pair, &key)
            .unwrap_or_else(|| Arc::new(CacheEntry::from(row))))
    }

    async fn compute_and_insert<P>(
        &self,
        pair: &LanguagePair,
        key: &str,
        provider: &P,
    ) -> CoreResult<DefinitionRow>
    where
        P: DefinitionProvider + ?Sized,
    {
        let payload = provider.define(pair, key)?;
        match self.store.insert_definition(pair, key, payload).await {
            Ok(row) => {
                info!(
                    language_pair = %pair,
                    text = %key,
                    numeric_id = row.numeric_id,
                    provider = provider.name(),
                    "definition computed"
                );
                self.notifier
                    .publish(&ChannelName::for_kind(EntityKind::Definitions), pair.to_string());
                Ok(row)
            }
            Err(StoreError::Conflict { .. }) => {
                warn!(language_pair = %pair, text = %key, "definition inserted concurrently, using stored row");
                self.store
                    .definition_by_text(pair, key)
                    .await?
                    .ok_or_else(|| {
                        CoreError::Store(StoreError::Unavailable(format!(
                            "definition {key:?} vanished after insert conflict"
                        )))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Drops every snapshot and rejects further calls with `ShutDown`.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            let pairs = std::mem::take(&mut *self.pairs.write());
            info!(pairs = pairs.len(), "definition cache shut down");
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl<S> std::fmt::Debug for DefinitionCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionCache")
            .field("pairs", &self.pairs.read().len())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}
