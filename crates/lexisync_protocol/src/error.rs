//! Error types for the pull protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while parsing or encoding protocol values.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The entity kind name is not one of the known collections.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// The language pair string is malformed.
    #[error("invalid language pair: {0:?} (expected `from:to`)")]
    InvalidLanguagePair(String),

    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR or JSON decoding failed.
    #[error("decode error: {0}")]
    Decode(String),
}
