//! Export command implementation.

use bytes::Bytes;
use lexisync_core::{
    normalize_text, CacheConfig, ChangeNotifier, DefinitionCache, ExportConfig, SnapshotExporter,
    SnapshotManifest,
};
use lexisync_protocol::LanguagePair;
use lexisync_store::{DefinitionRow, InMemoryStore};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One definition in the export fixture.
#[derive(Debug, Deserialize)]
pub struct DefinitionFixture {
    /// Stable numeric id.
    pub numeric_id: i64,
    /// Source text.
    pub source_text: String,
    /// Computation timestamp.
    pub cached_at: f64,
    /// Provider output.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Fixture layout read by `export`.
#[derive(Debug, Deserialize)]
pub struct ExportFixture {
    /// Definitions in any order.
    pub definitions: Vec<DefinitionFixture>,
}

/// Runs the export command.
pub fn run(
    input: &Path,
    pair: &str,
    output: &Path,
    chunk_size: usize,
    provider: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let pair: LanguagePair = pair.parse()?;
    let fixture: ExportFixture = serde_json::from_slice(&fs::read(input)?)?;
    info!(
        input = %input.display(),
        definitions = fixture.definitions.len(),
        language_pair = %pair,
        "exporting fixture"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let manifest = runtime.block_on(export(fixture, &pair, chunk_size, provider))?;
    let written = manifest.write_to(output)?;
    info!(output = %output.display(), files = written.len(), "snapshot written");

    println!(
        "Exported {} definitions for {} as snapshot {}",
        manifest.header.entry_count,
        pair,
        manifest.header.snapshot_id()
    );
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Seeds an in-memory store with the fixture and runs the exporter.
pub async fn export(
    fixture: ExportFixture,
    pair: &LanguagePair,
    chunk_size: usize,
    provider: &str,
) -> Result<SnapshotManifest, Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new());
    let mut definitions = fixture.definitions;
    definitions.sort_by(|a, b| a.cached_at.total_cmp(&b.cached_at));
    for definition in definitions {
        store.import_definition(DefinitionRow {
            numeric_id: definition.numeric_id,
            language_pair: pair.clone(),
            source_text: normalize_text(&definition.source_text),
            cached_at: definition.cached_at,
            payload: Bytes::from(serde_json::to_vec(&definition.payload)?),
        })?;
    }

    let cache = Arc::new(DefinitionCache::new(
        store,
        Arc::new(ChangeNotifier::default()),
        CacheConfig::default(),
    ));
    let exporter = SnapshotExporter::new(cache, ExportConfig::new().with_chunk_size(chunk_size));
    Ok(exporter.export(pair, provider).await?)
}
