//! Main sync server.

use crate::config::ServerConfig;
use crate::coordinator::{SyncCoordinator, UserProfile};
use crate::error::{ServerError, ServerResult};
use lexisync_core::{
    CacheEntry, ChangeNotifier, CoreError, DefinitionCache, ProviderRegistry, Subscription,
};
use lexisync_protocol::{ChannelName, EntityKind, PullRequest, PullResponse};
use lexisync_store::{BackingStore, RecordWrite, StoredRecord, WordEvent};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// The client side of a long-lived change-subscription connection.
pub trait ConnectionSink: Send {
    /// Sends one text frame. An error means the connection is gone.
    fn send_text(&mut self, text: String) -> impl Future<Output = io::Result<()>> + Send;

    /// Completes once the client has gone away.
    fn closed(&mut self) -> impl Future<Output = ()> + Send;
}

impl ConnectionSink for mpsc::Sender<String> {
    async fn send_text(&mut self, text: String) -> io::Result<()> {
        self.send(text)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
    }

    async fn closed(&mut self) {
        mpsc::Sender::closed(self).await;
    }
}

/// The sync server.
///
/// Handles pulls, writes, word events and definition lookups for clients
/// and bridges change notifications to their connections. Several servers
/// may share one backing store; each keeps its own definition cache.
///
/// # Example
///
/// ```
/// use lexisync_server::{ServerConfig, SyncServer};
/// use lexisync_store::InMemoryStore;
/// use std::sync::Arc;
///
/// let server = SyncServer::new(Arc::new(InMemoryStore::new()), ServerConfig::default());
///
/// // In a real application, transport endpoints call server.handle_pull(),
/// // server.write() and server.serve_connection()
/// ```
pub struct SyncServer<S> {
    config: ServerConfig,
    store: Arc<S>,
    cache: Arc<DefinitionCache<S>>,
    notifier: Arc<ChangeNotifier>,
    coordinator: SyncCoordinator<S>,
    shutdown: watch::Sender<bool>,
}

impl<S: BackingStore> SyncServer<S> {
    /// Creates a server over `store`.
    pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
        let notifier = Arc::new(ChangeNotifier::new(config.notifier.clone()));
        let cache = Arc::new(DefinitionCache::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            config.cache.clone(),
        ));
        let registry = ProviderRegistry::from_config(&config.providers);
        info!(pairs = ?registry.pairs(), "sync server created");
        let coordinator = SyncCoordinator::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&cache),
            registry,
        );
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            store,
            cache,
            notifier,
            coordinator,
            shutdown,
        }
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The pull coordinator.
    pub fn coordinator(&self) -> &SyncCoordinator<S> {
        &self.coordinator
    }

    /// The process-wide definition cache.
    pub fn cache(&self) -> &Arc<DefinitionCache<S>> {
        &self.cache
    }

    /// The change notifier.
    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Registers or replaces a user profile.
    pub fn register_user(&self, profile: UserProfile) {
        self.coordinator.register_user(profile);
    }

    fn check_running(&self) -> ServerResult<()> {
        if *self.shutdown.borrow() {
            Err(ServerError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Handles a pull request.
    ///
    /// Never fails: every error becomes a response carrying a failure code,
    /// so clients can tell "nothing new" from "can't sync".
    pub async fn handle_pull(&self, request: PullRequest) -> PullResponse {
        match self.try_pull(&request).await {
            Ok(response) => response,
            Err(err) => {
                let code = err.failure_code();
                if err.is_retryable() {
                    debug!(entity_kind = %request.entity_kind, user_id = %request.user_id, error = %err, "pull deferred");
                } else if err.is_client_error() {
                    debug!(entity_kind = %request.entity_kind, user_id = %request.user_id, error = %err, "pull rejected");
                } else {
                    error!(entity_kind = %request.entity_kind, user_id = %request.user_id, error = %err, "pull failed");
                }
                PullResponse::failure(code, err.to_string())
            }
        }
    }

    async fn try_pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        self.check_running()?;
        let kind: EntityKind = request.entity_kind.parse()?;
        let checkpoint = request.checkpoint();
        let page = self
            .coordinator
            .pull(kind, &request.user_id, checkpoint.as_ref(), request.limit)
            .await?;
        Ok(PullResponse::page(page.records, page.checkpoint))
    }

    /// Handles a CBOR-encoded pull request and returns the CBOR-encoded
    /// response.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the request can not be decoded or the
    /// response can not be encoded.
    pub async fn handle_pull_bytes(&self, bytes: &[u8]) -> ServerResult<Vec<u8>> {
        let request = PullRequest::decode(bytes)?;
        Ok(self.handle_pull(request).await.encode()?)
    }

    /// Writes a client-authored record and notifies subscribers once the
    /// write has committed.
    ///
    /// # Errors
    ///
    /// Returns `NotWritable` for derived collections and propagates store
    /// failures.
    pub async fn write(
        &self,
        user_id: &str,
        kind: EntityKind,
        write: RecordWrite,
    ) -> ServerResult<StoredRecord> {
        self.check_running()?;
        if kind.is_derived() {
            return Err(ServerError::NotWritable(kind));
        }
        let record = self.store.write_record(kind, user_id, write).await?;
        let delivered = self.notifier.notify_change(user_id, kind);
        debug!(
            entity_kind = %kind,
            user_id,
            id = %record.id,
            updated_at = record.updated_at,
            delivered,
            "record written"
        );
        Ok(record)
    }

    /// Aggregates word events into the user's counters and notifies the
    /// stats channels. Returns the number of word counters touched.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn record_word_events(
        &self,
        user_id: &str,
        events: &[WordEvent],
    ) -> ServerResult<usize> {
        self.check_running()?;
        if events.is_empty() {
            return Ok(0);
        }
        let touched = self.store.record_word_events(user_id, events).await?;
        self.notifier
            .notify_change(user_id, EntityKind::WordModelStats);
        self.notifier
            .notify_change(user_id, EntityKind::DayModelStats);
        debug!(user_id, events = events.len(), touched, "word events recorded");
        Ok(touched)
    }

    /// Returns the definition of `text` in the user's language pair,
    /// computing it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser`, `UnsupportedCollection` when the pair has no
    /// provider, and propagates cache failures.
    pub async fn define(&self, user_id: &str, text: &str) -> ServerResult<Arc<CacheEntry>> {
        self.check_running()?;
        let pair = self
            .coordinator
            .supported_pair(EntityKind::Definitions, user_id)?;
        let provider = self
            .coordinator
            .registry()
            .get(&pair)
            .ok_or_else(|| CoreError::UnsupportedCollection {
                kind: EntityKind::Definitions,
                language_pair: pair.clone(),
            })?;
        Ok(self.cache.definition(&pair, text, &*provider).await?)
    }

    /// Subscribes to every change of `user_id`.
    pub fn subscribe_changes(&self, user_id: &str) -> Subscription {
        self.notifier.subscribe(ChannelName::changed(user_id))
    }

    /// Bridges the user's change channel to a client connection.
    ///
    /// Forwards every message verbatim until the client disconnects or the
    /// server shuts down, and returns the number of forwarded messages. The
    /// subscription is released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown` if the server is already shut down.
    pub async fn serve_connection<C: ConnectionSink>(
        &self,
        user_id: &str,
        sink: &mut C,
    ) -> ServerResult<u64> {
        self.check_running()?;
        let connection_id = Uuid::new_v4();
        let span = info_span!("connection", %connection_id, user_id);
        let mut shutdown = self.shutdown.subscribe();
        let mut subscription = self.subscribe_changes(user_id);

        async move {
            info!("connection opened");
            let mut forwarded = 0u64;
            loop {
                tokio::select! {
                    message = subscription.recv() => {
                        let Some(message) = message else { break };
                        if let Err(err) = sink.send_text(message).await {
                            debug!(error = %err, "sink closed");
                            break;
                        }
                        forwarded += 1;
                    }
                    () = sink.closed() => {
                        debug!("client disconnected");
                        break;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            drop(subscription);
            info!(forwarded, "connection closed");
            Ok(forwarded)
        }
        .instrument(span)
        .await
    }

    /// Stops the server: open connections return, the definition cache is
    /// dropped and further calls fail with `ShutDown`.
    pub fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            warn!("sync server already shut down");
            return;
        }
        self.cache.shutdown();
        info!("sync server shut down");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl<S> std::fmt::Debug for SyncServer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexisync_core::{ProviderConfig, RegistryConfig};
    use lexisync_protocol::{FailureCode, LanguagePair};
    use lexisync_store::InMemoryStore;
    use serde_json::json;

    fn server() -> SyncServer<InMemoryStore> {
        let config = ServerConfig::new()
            .with_providers(RegistryConfig::default().with_pair("zh-Hans", "en", ProviderConfig::Echo));
        let server = SyncServer::new(Arc::new(InMemoryStore::new()), config);
        server.register_user(UserProfile::new("7", LanguagePair::new("zh-Hans", "en")));
        server
    }

    #[test]
    fn server_lifecycle() {
        let server = server();
        assert!(!server.is_shut_down());
        server.shutdown();
        assert!(server.is_shut_down());
        assert!(server.cache().is_shut_down());
        server.shutdown();
    }

    #[tokio::test]
    async fn write_then_pull() {
        let server = server();
        server
            .write("7", EntityKind::Cards, RecordWrite::new("c1", json!({"front": "猫"})))
            .await
            .unwrap();

        let response = server
            .handle_pull(PullRequest::new("cards", "7", 10))
            .await;
        assert!(response.is_success());
        assert_eq!(response.records.len(), 1);
        assert_eq!(response.records[0].data["front"], "猫");
    }

    #[tokio::test]
    async fn derived_kinds_are_not_writable() {
        let server = server();
        let err = server
            .write("7", EntityKind::Definitions, RecordWrite::new("1", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotWritable(EntityKind::Definitions)));
    }

    #[tokio::test]
    async fn unknown_kind_is_invalid_request() {
        let server = server();
        let response = server
            .handle_pull(PullRequest::new("bogus", "7", 10))
            .await;
        assert_eq!(response.failure_code(), Some(FailureCode::InvalidRequest));
    }

    #[tokio::test]
    async fn cbor_round_trip_through_server() {
        let server = server();
        let bytes = PullRequest::new("cards", "7", 10).encode().unwrap();
        let response = PullResponse::decode(&server.handle_pull_bytes(&bytes).await.unwrap()).unwrap();
        assert!(response.is_success());
        assert!(response.records.is_empty());
    }

    #[tokio::test]
    async fn calls_after_shutdown_fail() {
        let server = server();
        server.shutdown();
        let response = server
            .handle_pull(PullRequest::new("cards", "7", 10))
            .await;
        assert_eq!(response.failure_code(), Some(FailureCode::Internal));
        assert!(matches!(
            server.define("7", "猫").await,
            Err(ServerError::ShutDown)
        ));
    }
}
