//! # LexiSync Server
//!
//! Sync coordinator and server facade for LexiSync.
//!
//! This crate provides:
//! - Pull handling for every synchronized collection, with structured
//!   failures instead of empty pages for unsupported collections
//! - The write path, which notifies subscribers after every commit
//! - Word-event ingestion into per-word and per-day counters
//! - On-demand definition lookup through the write-through cache
//! - The change-subscription bridge for long-lived client connections
//!
//! # Architecture
//!
//! The server holds no durable state of its own. Every process:
//! - shares the backing store with every other process
//! - keeps a process-wide definition cache, rebuilt from the store
//! - fans change hints out to its own connected clients
//!
//! # Protocol
//!
//! Clients pull each collection with a checkpoint and a limit:
//! 1. Client pulls with no checkpoint (or the one it saved last time)
//! 2. Server returns a page plus the checkpoint to present next
//! 3. Client repeats until a page comes back empty
//! 4. A change hint on `changed<user_id>` means "pull that kind again"

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod coordinator;
mod error;
mod server;

pub use config::ServerConfig;
pub use coordinator::{SyncCoordinator, UserProfile};
pub use error::{ServerError, ServerResult};
pub use server::{ConnectionSink, SyncServer};
