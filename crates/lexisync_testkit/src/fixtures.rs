//! Test fixtures and server stack helpers.
//!
//! Provides an in-memory deployment with a controllable clock, plus helpers
//! for the common multi-step sync scenarios.

use lexisync_core::{DefinitionCache, ProviderConfig, RegistryConfig};
use lexisync_protocol::{Checkpoint, EntityKind, LanguagePair, PullRequest, PullResponse, WireRecord};
use lexisync_server::{ServerConfig, SyncServer, UserProfile};
use lexisync_store::{DefinitionRow, DefinitionStore, InMemoryStore, ManualClock};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Start time of every test clock.
pub const TEST_EPOCH: f64 = 1_700_000_000.0;

/// The language pair most fixtures use.
pub fn zh_en() -> LanguagePair {
    LanguagePair::new("zh-Hans", "en")
}

/// A pair no fixture registers a provider for.
pub fn unsupported_pair() -> LanguagePair {
    LanguagePair::new("tlh", "en")
}

/// Server configuration with providers for `zh-Hans:en` (echo) and
/// `en:zh-Hans` (small dictionary).
pub fn test_config() -> ServerConfig {
    ServerConfig::new().with_providers(
        RegistryConfig::default()
            .with_pair("zh-Hans", "en", ProviderConfig::Echo)
            .with_pair(
                "en",
                "zh-Hans",
                ProviderConfig::Dictionary {
                    entries: HashMap::from([
                        ("cat".to_string(), json!("猫")),
                        ("dog".to_string(), json!("狗")),
                    ]),
                },
            ),
    )
}

/// A server process over an in-memory store with a manual clock.
pub struct TestStack {
    /// The shared clock.
    pub clock: Arc<ManualClock>,
    /// The shared backing store.
    pub store: Arc<InMemoryStore>,
    /// This process' server.
    pub server: Arc<SyncServer<InMemoryStore>>,
}

impl TestStack {
    /// Creates a stack with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a stack with a custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(TEST_EPOCH));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let server = Arc::new(SyncServer::new(Arc::clone(&store), config));
        Self {
            clock,
            store,
            server,
        }
    }

    /// Creates another server process over the same store and clock, with
    /// its own definition cache and notifier.
    pub fn peer(&self) -> Self {
        let server = Arc::new(SyncServer::new(
            Arc::clone(&self.store),
            self.server.config().clone(),
        ));
        Self {
            clock: Arc::clone(&self.clock),
            store: Arc::clone(&self.store),
            server,
        }
    }

    /// This process' definition cache.
    pub fn cache(&self) -> &Arc<DefinitionCache<InMemoryStore>> {
        self.server.cache()
    }

    /// Registers `user_id` with `pair` on this process.
    pub fn user(&self, user_id: &str, pair: LanguagePair) {
        self.server.register_user(UserProfile::new(user_id, pair));
    }

    /// Advances the clock by `seconds`.
    pub fn tick(&self, seconds: f64) {
        self.clock.advance(seconds);
    }

    /// Inserts definitions straight into the store, one clock second apart,
    /// as if another process had computed them.
    pub async fn seed_definitions(&self, pair: &LanguagePair, words: &[&str]) -> Vec<DefinitionRow> {
        let mut rows = Vec::with_capacity(words.len());
        for word in words {
            self.tick(1.0);
            let payload = bytes::Bytes::from(json!({ "gloss": word }).to_string());
            rows.push(
                self.store
                    .insert_definition(pair, word, payload)
                    .await
                    .expect("seed definition"),
            );
        }
        rows
    }

    /// Pulls one page.
    pub async fn pull(
        &self,
        kind: EntityKind,
        user_id: &str,
        checkpoint: Option<&Checkpoint>,
        limit: u32,
    ) -> PullResponse {
        let mut request = PullRequest::new(kind.as_str(), user_id, limit);
        if let Some(checkpoint) = checkpoint {
            request = request.after(checkpoint);
        }
        self.server.handle_pull(request).await
    }

    /// Pulls pages until an empty one comes back, starting after
    /// `checkpoint`. Returns every record and the final checkpoint.
    ///
    /// # Panics
    ///
    /// Panics if a pull fails.
    pub async fn pull_from(
        &self,
        kind: EntityKind,
        user_id: &str,
        mut checkpoint: Option<Checkpoint>,
        limit: u32,
    ) -> (Vec<WireRecord>, Option<Checkpoint>) {
        let mut records = Vec::new();
        loop {
            let response = self.pull(kind, user_id, checkpoint.as_ref(), limit).await;
            assert!(
                response.is_success(),
                "pull of {kind} failed: {:?}",
                response.failure
            );
            if response.records.is_empty() {
                assert_eq!(response.checkpoint, checkpoint, "empty page must echo checkpoint");
                return (records, checkpoint);
            }
            records.extend(response.records);
            checkpoint = response.checkpoint;
        }
    }

    /// Pulls the way a client does: until a page shorter than `limit`
    /// comes back. Returns every record and the number of pulls made.
    ///
    /// # Panics
    ///
    /// Panics if a pull fails.
    pub async fn pull_until_short(
        &self,
        kind: EntityKind,
        user_id: &str,
        limit: u32,
    ) -> (Vec<WireRecord>, usize) {
        let mut records = Vec::new();
        let mut checkpoint: Option<Checkpoint> = None;
        let mut pulls = 0;
        loop {
            let response = self.pull(kind, user_id, checkpoint.as_ref(), limit).await;
            pulls += 1;
            assert!(
                response.is_success(),
                "pull of {kind} failed: {:?}",
                response.failure
            );
            let short = response.records.len() < limit as usize;
            records.extend(response.records);
            checkpoint = response.checkpoint;
            if short {
                return (records, pulls);
            }
        }
    }

    /// Pulls a whole collection from the beginning.
    pub async fn pull_all(&self, kind: EntityKind, user_id: &str, limit: u32) -> Vec<WireRecord> {
        self.pull_from(kind, user_id, None, limit).await.0
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}

/// A client-side replica of one collection, keyed by id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Replica {
    /// Latest known version of every record.
    pub records: HashMap<String, WireRecord>,
    /// Checkpoint to present on the next pull.
    pub checkpoint: Option<Checkpoint>,
}

impl Replica {
    /// Creates an empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a page of records, keeping the newest version of each id.
    pub fn apply(&mut self, records: Vec<WireRecord>, checkpoint: Option<Checkpoint>) {
        for record in records {
            let newer = self
                .records
                .get(&record.id)
                .map_or(true, |known| record.updated_at >= known.updated_at);
            if newer {
                self.records.insert(record.id.clone(), record);
            }
        }
        self.checkpoint = checkpoint;
    }

    /// Syncs the replica against `stack` until caught up.
    pub async fn sync(&mut self, stack: &TestStack, kind: EntityKind, user_id: &str, limit: u32) {
        let (records, checkpoint) = stack
            .pull_from(kind, user_id, self.checkpoint.clone(), limit)
            .await;
        self.apply(records, checkpoint);
    }

    /// Ids of live (non-tombstoned) records, sorted.
    pub fn live_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .records
            .values()
            .filter(|r| !r.deleted)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
