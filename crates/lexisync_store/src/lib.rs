//! # LexiSync Store
//!
//! Backing store traits and the in-memory reference store for LexiSync.
//!
//! The backing store is the only durable shared resource of the system.
//! Every process reads and writes it concurrently; conflicting inserts are
//! resolved by unique-constraint rejection, never by locking.
//!
//! ## Traits
//!
//! - [`RecordStore`] - client-authored collections (cards, word lists, ...)
//! - [`CounterStore`] - per-word and per-day learning counters
//! - [`DefinitionStore`] - computed dictionary entries and export snapshots
//! - [`BackingStore`] - everything above, implemented automatically
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For tests, tools and single-node deployments
//!
//! ## Example
//!
//! ```rust
//! use lexisync_protocol::EntityKind;
//! use lexisync_store::{InMemoryStore, RecordStore, RecordWrite};
//!
//! # tokio_test_block(async {
//! let store = InMemoryStore::new();
//! let written = store
//!     .write_record(EntityKind::Cards, "7", RecordWrite::new("c1", serde_json::json!({})))
//!     .await
//!     .unwrap();
//! let rows = store.records_since(EntityKind::Cards, "7", 0.0).await.unwrap();
//! assert_eq!(rows[0].updated_at, written.updated_at);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod clock;
mod error;
mod memory;
mod rows;

pub use backend::{BackingStore, CounterStore, DefinitionStore, RecordStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, StoreStats};
pub use rows::{
    DayCounter, DefinitionRow, RecordWrite, SnapshotHeader, StoredRecord, WordCounter, WordEvent,
    WordEventKind, SECONDS_PER_DAY,
};
