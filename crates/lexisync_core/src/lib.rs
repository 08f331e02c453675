//! # LexiSync Core
//!
//! Incremental synchronization core for LexiSync.
//!
//! This crate provides:
//! - [`pager`]: the cursor pager, written once for every collection
//! - [`DefinitionCache`]: per-language-pair snapshot of computed definitions
//!   with lazy population, single-flight reload and monotonic refresh
//! - [`StatsCorrelator`]: joins word counters against the cache to resolve
//!   stable numeric ids, retrying once on a miss
//! - [`ChangeNotifier`]: per-channel fan-out of "something changed" hints
//! - [`ProviderRegistry`]: compile-time registry of definition providers
//! - [`SnapshotExporter`]: the cache regeneration job
//!
//! ## Key Invariants
//!
//! - Pages are ordered by `(updated_at, id)` and resume strictly after the
//!   presented checkpoint
//! - A cache snapshot is append-only and its insertion order is `cached_at`
//!   order; its last entry is the high-water mark
//! - A process never reloads from a timestamp older than its own
//!   high-water mark
//! - At most one reload per language pair is in flight per process
//! - Change notifications are hints; pulls are the only source of record
//!   content

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod correlator;
mod error;
mod export;
mod notifier;
pub mod pager;
mod provider;
mod transliterate;

pub use cache::{normalize_text, CacheEntry, DefinitionCache};
pub use config::{CacheConfig, ExportConfig, NotifierConfig};
pub use correlator::{plausible_word, ResolvedCounter, StatsCorrelator};
pub use error::{CoreError, CoreResult, EnrichError};
pub use export::{ExportedEntry, SnapshotChunk, SnapshotExporter, SnapshotManifest, MANIFEST_FILE};
pub use notifier::{ChangeNotifier, Subscription};
pub use pager::{OrderKey, Page, Paged};
pub use provider::{
    DefinitionProvider, DictionaryProvider, EchoProvider, PairProvider, PhoneticProvider,
    ProviderConfig, ProviderRegistry, RegistryConfig,
};
pub use transliterate::{TableTransliterator, TransliterationPipeline, Transliterator};

/// Core version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
