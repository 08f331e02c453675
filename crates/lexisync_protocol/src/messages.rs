//! Protocol messages for pulls.

use crate::checkpoint::Checkpoint;
use crate::error::{ProtocolError, ProtocolResult};
use crate::record::WireRecord;
use serde::{Deserialize, Serialize};

fn default_cursor_updated_at() -> f64 {
    -1.0
}

/// Pull request from client.
///
/// `cursor_updated_at <= 0` means "from the beginning", except for the
/// `definitions` kind where it asks for the latest snapshot identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Name of the collection to pull.
    pub entity_kind: String,
    /// Owner of the collection.
    pub user_id: String,
    /// Maximum number of records to return (`None` = server default).
    #[serde(default)]
    pub limit: Option<u32>,
    /// Checkpoint id.
    #[serde(default)]
    pub cursor_id: String,
    /// Checkpoint timestamp.
    #[serde(default = "default_cursor_updated_at")]
    pub cursor_updated_at: f64,
}

impl PullRequest {
    /// Creates a pull request starting from the beginning of the feed.
    pub fn new(entity_kind: impl Into<String>, user_id: impl Into<String>, limit: u32) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            user_id: user_id.into(),
            limit: Some(limit),
            cursor_id: String::new(),
            cursor_updated_at: default_cursor_updated_at(),
        }
    }

    /// Resumes the feed after `checkpoint`.
    #[must_use]
    pub fn after(mut self, checkpoint: &Checkpoint) -> Self {
        self.cursor_id = checkpoint.id.clone();
        self.cursor_updated_at = checkpoint.updated_at;
        self
    }

    /// Returns the checkpoint carried by this request, if any.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        Checkpoint::from_cursor(&self.cursor_id, self.cursor_updated_at)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// Distinguished failure categories of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The entity kind / language pair combination has no handler.
    NotImplemented,
    /// A from-scratch cache reload is in flight; retry shortly.
    CacheLoading,
    /// A stats row references a word the cache can not resolve.
    MissingCacheValue,
    /// The request itself is malformed.
    InvalidRequest,
    /// Unexpected server-side failure.
    Internal,
}

impl FailureCode {
    /// Returns true if the client should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureCode::CacheLoading)
    }
}

/// Structured failure attached to a pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullFailure {
    /// Failure category.
    pub code: FailureCode,
    /// Human-readable detail.
    pub message: String,
}

/// Pull response from server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Records of this page in `(updated_at, id)` order.
    #[serde(default)]
    pub records: Vec<WireRecord>,
    /// Checkpoint to present on the next pull.
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
    /// Set when the pull failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PullFailure>,
}

impl PullResponse {
    /// Creates a successful page.
    pub fn page(records: Vec<WireRecord>, checkpoint: Option<Checkpoint>) -> Self {
        Self {
            records,
            checkpoint,
            failure: None,
        }
    }

    /// Creates a failed response.
    pub fn failure(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            checkpoint: None,
            failure: Some(PullFailure {
                code,
                message: message.into(),
            }),
        }
    }

    /// Returns true if the pull succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns the failure code, if any.
    pub fn failure_code(&self) -> Option<FailureCode> {
        self.failure.as_ref().map(|f| f.code)
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }

    /// Encodes to JSON.
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
