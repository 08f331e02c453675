//! # LexiSync Protocol
//!
//! Pull protocol types and codecs for LexiSync.
//!
//! This crate provides:
//! - [`Checkpoint`], the `(id, updated_at)` pair a client presents to resume a feed
//! - [`EntityKind`] and [`LanguagePair`], the routing keys of every pull
//! - [`WireRecord`], the uniform shape of a synchronized row on the wire
//! - Pull messages ([`PullRequest`], [`PullResponse`]) with CBOR and JSON codecs
//! - [`ChannelName`], the pub/sub routing key for change notifications
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod checkpoint;
mod entity;
mod error;
mod messages;
mod record;

pub use channel::ChannelName;
pub use checkpoint::Checkpoint;
pub use entity::{EntityKind, LanguagePair};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{FailureCode, PullFailure, PullRequest, PullResponse};
pub use record::WireRecord;
