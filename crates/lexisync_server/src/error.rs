//! Error types for the sync server.

use lexisync_core::CoreError;
use lexisync_protocol::{EntityKind, FailureCode, ProtocolError};
use lexisync_store::StoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No profile is registered for this user.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Derived collections are written by the server only.
    #[error("{0} is not writable by clients")]
    NotWritable(EntityKind),

    /// Wire decoding or encoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Core error (paging, cache, correlation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Backing store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The server was shut down.
    #[error("server is shutting down")]
    ShutDown,
}

impl ServerError {
    /// Returns true if the caller sent something that can not succeed.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::UnknownUser(_)
            | ServerError::NotWritable(_)
            | ServerError::Protocol(_) => true,
            ServerError::Core(core) => matches!(
                core,
                CoreError::UnsupportedCollection { .. } | CoreError::InvalidCheckpoint { .. }
            ),
            ServerError::Store(store) => matches!(store, StoreError::InvalidWrite(_)),
            ServerError::ShutDown => false,
        }
    }

    /// Returns true if this is a server-side failure.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns true if the same request may succeed shortly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Core(core) if core.is_retryable())
    }

    /// The structured failure code reported to pulling clients.
    pub fn failure_code(&self) -> FailureCode {
        match self {
            ServerError::Core(CoreError::UnsupportedCollection { .. }) => {
                FailureCode::NotImplemented
            }
            ServerError::Core(CoreError::CacheLoading { .. }) => FailureCode::CacheLoading,
            ServerError::Core(CoreError::MissingCacheValue { .. }) => {
                FailureCode::MissingCacheValue
            }
            err if err.is_client_error() => FailureCode::InvalidRequest,
            _ => FailureCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexisync_protocol::LanguagePair;

    fn pair() -> LanguagePair {
        LanguagePair::new("zh-Hans", "en")
    }

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::NotWritable(EntityKind::Definitions).is_client_error());
        assert!(ServerError::ShutDown.is_server_error());
        assert!(ServerError::Store(StoreError::Unavailable("down".into())).is_server_error());
        assert!(ServerError::Core(CoreError::InvalidCheckpoint {
            id: "x".into(),
            reason: "nope".into()
        })
        .is_client_error());
    }

    #[test]
    fn only_cache_loading_is_retryable() {
        let loading = ServerError::Core(CoreError::CacheLoading {
            language_pair: pair(),
        });
        assert!(loading.is_retryable());
        assert!(loading.is_server_error());
        assert!(!ServerError::ShutDown.is_retryable());
    }

    #[test]
    fn failure_codes() {
        let code = |err: ServerError| err.failure_code();
        assert_eq!(
            code(ServerError::Core(CoreError::UnsupportedCollection {
                kind: EntityKind::Definitions,
                language_pair: pair(),
            })),
            FailureCode::NotImplemented
        );
        assert_eq!(
            code(ServerError::Core(CoreError::CacheLoading {
                language_pair: pair()
            })),
            FailureCode::CacheLoading
        );
        assert_eq!(
            code(ServerError::Core(CoreError::MissingCacheValue {
                language_pair: pair(),
                words: vec!["龙".into()],
            })),
            FailureCode::MissingCacheValue
        );
        assert_eq!(
            code(ServerError::Protocol(ProtocolError::UnknownEntityKind("x".into()))),
            FailureCode::InvalidRequest
        );
        assert_eq!(code(ServerError::ShutDown), FailureCode::Internal);
    }

    #[test]
    fn error_display() {
        let err = ServerError::NotWritable(EntityKind::WordModelStats);
        assert_eq!(err.to_string(), "wordmodelstats is not writable by clients");
    }
}
