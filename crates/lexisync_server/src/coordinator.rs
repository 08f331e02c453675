//! Per-collection pull dispatch.
//!
//! The coordinator picks the pipeline for each collection:
//! - client-authored collections go straight through the pager
//! - `persons` ignores the checkpoint and returns every live row
//! - `wordmodelstats` goes through the stats correlator
//! - `daymodelstats` pages the per-day counters
//! - `definitions` pages the definition cache, or returns the latest export
//!   snapshot when no checkpoint is given
//!
//! Collections that depend on the user's language pair fail with
//! `UnsupportedCollection` when no provider serves the pair, so clients can
//! tell "nothing new" from "you can't sync this". There are no retries at
//! this layer.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use lexisync_core::pager::{self, Page};
use lexisync_core::{CoreError, DefinitionCache, ProviderRegistry, StatsCorrelator};
use lexisync_protocol::{Checkpoint, EntityKind, LanguagePair, WireRecord};
use lexisync_store::{BackingStore, DayCounter, SnapshotHeader};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered user and the language pair they are learning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User id.
    pub id: String,
    /// Source and target language.
    pub language_pair: LanguagePair,
}

impl UserProfile {
    /// Creates a profile.
    pub fn new(id: impl Into<String>, language_pair: LanguagePair) -> Self {
        Self {
            id: id.into(),
            language_pair,
        }
    }
}

/// Dispatches pulls to the pager, the correlator or the definition cache.
pub struct SyncCoordinator<S> {
    config: ServerConfig,
    store: Arc<S>,
    cache: Arc<DefinitionCache<S>>,
    correlator: StatsCorrelator<S>,
    registry: ProviderRegistry,
    users: RwLock<HashMap<String, UserProfile>>,
}

impl<S: BackingStore> SyncCoordinator<S> {
    /// Creates a coordinator.
    pub fn new(
        config: ServerConfig,
        store: Arc<S>,
        cache: Arc<DefinitionCache<S>>,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            correlator: StatsCorrelator::new(Arc::clone(&cache)),
            config,
            store,
            cache,
            registry,
            users: RwLock::new(HashMap::new()),
        }
    }

    /// The provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Registers or replaces a user profile.
    pub fn register_user(&self, profile: UserProfile) {
        debug!(user_id = %profile.id, language_pair = %profile.language_pair, "user registered");
        self.users.write().insert(profile.id.clone(), profile);
    }

    /// Looks up a user profile.
    pub fn user(&self, user_id: &str) -> Option<UserProfile> {
        self.users.read().get(user_id).cloned()
    }

    /// The language pair of `user_id`, checked against the registry for
    /// collections that need a provider.
    pub fn supported_pair(&self, kind: EntityKind, user_id: &str) -> ServerResult<LanguagePair> {
        let profile = self
            .user(user_id)
            .ok_or_else(|| ServerError::UnknownUser(user_id.to_string()))?;
        if !self.registry.supports(&profile.language_pair) {
            return Err(CoreError::UnsupportedCollection {
                kind,
                language_pair: profile.language_pair,
            }
            .into());
        }
        Ok(profile.language_pair)
    }

    /// Returns the page of `kind` for `user_id` after `checkpoint`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a limit above the configured maximum,
    /// `UnsupportedCollection` for pair-dependent collections the user's
    /// pair has no provider for, and propagates cache, correlator
    /// and store failures unchanged.
    pub async fn pull(
        &self,
        kind: EntityKind,
        user_id: &str,
        checkpoint: Option<&Checkpoint>,
        limit: Option<u32>,
    ) -> ServerResult<Page<WireRecord>> {
        let limit = self.config.page_limit(limit)?;
        let since = checkpoint.map_or(0.0, |cp| cp.updated_at);
        debug!(entity_kind = %kind, user_id, since, limit, "pull");

        let page = match kind {
            EntityKind::Persons => {
                let rows = self.store.records_since(kind, user_id, 0.0).await?;
                pager::page(pager::live_only(rows), None, None)?.map(WireRecord::from)
            }
            EntityKind::Cards
            | EntityKind::WordLists
            | EntityKind::Imports
            | EntityKind::Contents
            | EntityKind::Surveys => {
                let rows = self.store.records_since(kind, user_id, since).await?;
                pager::page(rows, checkpoint, Some(limit))?.map(WireRecord::from)
            }
            EntityKind::WordModelStats => {
                let pair = self.supported_pair(kind, user_id)?;
                let counters = self.store.word_counters_since(user_id, since).await?;
                self.correlator
                    .resolve_page(&pair, counters, checkpoint, Some(limit))
                    .await?
                    .map(|resolved| resolved.to_wire())
            }
            EntityKind::DayModelStats => {
                let counters = self.store.day_counters_since(user_id, since).await?;
                pager::page(counters, checkpoint, Some(limit))?.map(|day| day_to_wire(&day))
            }
            EntityKind::Definitions => {
                let pair = self.supported_pair(kind, user_id)?;
                self.pull_definitions(&pair, checkpoint, limit).await?
            }
        };
        debug!(entity_kind = %kind, user_id, rows = page.len(), "pull served");
        Ok(page)
    }

    async fn pull_definitions(
        &self,
        pair: &LanguagePair,
        checkpoint: Option<&Checkpoint>,
        limit: usize,
    ) -> ServerResult<Page<WireRecord>> {
        if checkpoint.is_none() {
            if let Some(header) = self.store.latest_snapshot(pair).await? {
                return Ok(snapshot_page(&header));
            }
        }

        self.cache.ensure_loaded(pair).await?;
        match self.cache.refresh(pair).await {
            Ok(_) => {}
            Err(CoreError::CacheLoading { .. }) => {
                debug!(language_pair = %pair, "paging definitions without refresh");
            }
            Err(err) => return Err(err.into()),
        }
        Ok(self
            .cache
            .page_after(pair, checkpoint, Some(limit))?
            .map(|entry| entry.to_wire()))
    }
}

impl<S> std::fmt::Debug for SyncCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("users", &self.users.read().len())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn day_to_wire(day: &DayCounter) -> WireRecord {
    WireRecord::new(
        day.day.to_string(),
        day.updated_at,
        json!({ "day": day.day, "seen": day.seen, "checked": day.checked }),
    )
}

/// The single-record page that points a fresh client at the latest export.
///
/// Its checkpoint resumes right after the snapshot's newest entry, so the
/// next pull returns only what was computed after the export.
fn snapshot_page(header: &SnapshotHeader) -> Page<WireRecord> {
    let record = WireRecord::new(
        header.snapshot_id(),
        header.latest_updated_at,
        json!({
            "snapshot_id": header.snapshot_id(),
            "provider": header.provider,
            "chunks": header.chunk_names,
            "entry_count": header.entry_count,
        }),
    );
    Page {
        records: vec![record],
        checkpoint: Some(Checkpoint::new(
            header.latest_numeric_id.to_string(),
            header.latest_updated_at,
        )),
    }
}
