//! Snapshot export of the definition cache.
//!
//! The export job writes the cached definitions of a language pair as a
//! set of JSON chunks that clients download in bulk instead of paging from
//! scratch. Chunks are named after the snapshot's newest entry so a new
//! export never overwrites an older one.

use crate::cache::{CacheEntry, DefinitionCache};
use crate::config::ExportConfig;
use crate::error::CoreResult;
use lexisync_protocol::LanguagePair;
use lexisync_store::{DefinitionStore, SnapshotHeader};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Name of the manifest file written next to the chunks.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One exported definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedEntry {
    /// Stable numeric id.
    pub numeric_id: i64,
    /// Lowercased source text.
    pub source_text: String,
    /// Store timestamp of the computation.
    pub cached_at: f64,
    /// Provider output.
    pub definition: serde_json::Value,
}

impl From<&CacheEntry> for ExportedEntry {
    fn from(entry: &CacheEntry) -> Self {
        let wire = entry.to_wire();
        Self {
            numeric_id: entry.numeric_id,
            source_text: entry.source_text.clone(),
            cached_at: entry.cached_at,
            definition: wire.data["definition"].clone(),
        }
    }
}

/// A named slice of the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotChunk {
    /// File name of the chunk.
    pub name: String,
    /// Entries in `cached_at` order.
    pub entries: Vec<ExportedEntry>,
}

/// A complete export: header plus chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotManifest {
    /// Header as registered in the store.
    pub header: SnapshotHeader,
    /// Chunks in order.
    pub chunks: Vec<SnapshotChunk>,
}

impl SnapshotManifest {
    /// Returns true if the export holds no entries.
    pub fn is_empty(&self) -> bool {
        self.header.entry_count == 0
    }

    /// Writes every chunk and `manifest.json` into `dir`, creating it if
    /// needed. Returns the written paths, manifest last.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file can not be written.
    pub fn write_to(&self, dir: &Path) -> CoreResult<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.chunks.len() + 1);
        for chunk in &self.chunks {
            let path = dir.join(&chunk.name);
            write_json(&path, &chunk.entries)?;
            written.push(path);
        }
        let path = dir.join(MANIFEST_FILE);
        write_json(&path, &self.header)?;
        written.push(path);
        Ok(written)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> CoreResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value).map_err(std::io::Error::from)?;
    writer.flush()?;
    Ok(())
}

/// Regenerates export snapshots from the definition cache.
pub struct SnapshotExporter<S> {
    cache: Arc<DefinitionCache<S>>,
    config: ExportConfig,
}

impl<S: DefinitionStore> SnapshotExporter<S> {
    /// Creates an exporter over `cache`.
    pub fn new(cache: Arc<DefinitionCache<S>>, config: ExportConfig) -> Self {
        Self { cache, config }
    }

    /// Exports the cached definitions of `pair` and registers the snapshot
    /// in the store.
    ///
    /// Loads the pair if needed but never refreshes it, so the export
    /// reflects the snapshot as of the call. An empty pair yields an empty
    /// manifest that is not registered.
    ///
    /// # Errors
    ///
    /// Returns `CacheLoading` while the pair is being loaded, or a store
    /// error if registration fails.
    pub async fn export(
        &self,
        pair: &LanguagePair,
        provider: &str,
    ) -> CoreResult<SnapshotManifest> {
        self.cache.ensure_loaded(pair).await?;
        let entries = self.cache.entries(pair);
        let (latest_updated_at, latest_numeric_id) = entries
            .last()
            .map_or((0.0, 0), |entry| (entry.cached_at, entry.numeric_id));

        let chunks: Vec<SnapshotChunk> = entries
            .chunks(self.config.chunk_size.max(1))
            .enumerate()
            .map(|(index, slice)| SnapshotChunk {
                name: format!("{latest_updated_at}-{latest_numeric_id}-{provider}-{index}.json"),
                entries: slice.iter().map(|entry| ExportedEntry::from(&**entry)).collect(),
            })
            .collect();

        let header = SnapshotHeader {
            language_pair: pair.clone(),
            latest_updated_at,
            latest_numeric_id,
            provider: provider.to_string(),
            chunk_names: chunks.iter().map(|chunk| chunk.name.clone()).collect(),
            entry_count: entries.len(),
        };
        if !entries.is_empty() {
            self.cache.store().record_snapshot(header.clone()).await?;
            info!(
                language_pair = %pair,
                snapshot = %header.snapshot_id(),
                entries = header.entry_count,
                chunks = header.chunk_names.len(),
                "definition snapshot exported"
            );
        }
        Ok(SnapshotManifest { header, chunks })
    }
}

impl<S> std::fmt::Debug for SnapshotExporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotExporter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChangeNotifier;
    use crate::config::CacheConfig;
    use bytes::Bytes;
    use lexisync_store::{DefinitionRow, InMemoryStore};

    fn pair() -> LanguagePair {
        LanguagePair::new("zh-Hans", "en")
    }

    fn exporter(rows: usize, chunk_size: usize) -> (Arc<InMemoryStore>, SnapshotExporter<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        for i in 1..=rows {
            store
                .import_definition(DefinitionRow {
                    numeric_id: i as i64,
                    language_pair: pair(),
                    source_text: format!("w{i}"),
                    cached_at: i as f64 * 10.0,
                    payload: Bytes::from_static(b"{\"gloss\":\"x\"}"),
                })
                .unwrap();
        }
        let cache = Arc::new(DefinitionCache::new(
            Arc::clone(&store),
            Arc::new(ChangeNotifier::default()),
            CacheConfig::default(),
        ));
        let exporter = SnapshotExporter::new(cache, ExportConfig::new().with_chunk_size(chunk_size));
        (store, exporter)
    }

    #[tokio::test]
    async fn export_chunks_and_registers_snapshot() {
        let (store, exporter) = exporter(5, 2);
        let manifest = exporter.export(&pair(), "echo").await.unwrap();

        assert_eq!(manifest.chunks.len(), 3);
        assert_eq!(manifest.chunks[0].name, "50-5-echo-0.json");
        assert_eq!(manifest.chunks[2].entries.len(), 1);
        assert_eq!(manifest.chunks[0].entries[0].definition["gloss"], "x");
        assert_eq!(manifest.header.entry_count, 5);
        assert_eq!(manifest.header.snapshot_id(), "50-5");

        let registered = store.latest_snapshot(&pair()).await.unwrap().unwrap();
        assert_eq!(registered, manifest.header);
    }

    #[tokio::test]
    async fn export_does_not_move_high_water_mark() {
        let (store, exporter) = exporter(2, 10);
        exporter.cache.ensure_loaded(&pair()).await.unwrap();
        store
            .insert_definition(&pair(), "late", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let manifest = exporter.export(&pair(), "echo").await.unwrap();
        assert_eq!(manifest.header.entry_count, 2);
        assert_eq!(exporter.cache.high_water_mark(&pair()), Some(20.0));
    }

    #[tokio::test]
    async fn empty_pair_is_not_registered() {
        let (store, exporter) = exporter(0, 10);
        let manifest = exporter.export(&pair(), "echo").await.unwrap();
        assert!(manifest.is_empty());
        assert!(manifest.chunks.is_empty());
        assert!(store.latest_snapshot(&pair()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_to_creates_chunk_files_and_manifest() {
        let (_store, exporter) = exporter(3, 2);
        let manifest = exporter.export(&pair(), "echo").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = manifest.write_to(&dir.path().join("out")).unwrap();

        assert_eq!(written.len(), 3);
        assert!(written.last().unwrap().ends_with(MANIFEST_FILE));
        let chunk: Vec<ExportedEntry> =
            serde_json::from_slice(&std::fs::read(&written[0]).unwrap()).unwrap();
        assert_eq!(chunk.len(), 2);
        let header: SnapshotHeader =
            serde_json::from_slice(&std::fs::read(&written[2]).unwrap()).unwrap();
        assert_eq!(header, manifest.header);
    }
}
