//! Benchmark utilities.

use bytes::Bytes;
use lexisync_protocol::{LanguagePair, WireRecord};
use lexisync_store::{DefinitionRow, InMemoryStore};
use serde_json::json;

/// Generate `count` records where every `ties` consecutive records share a
/// timestamp, in reverse order.
pub fn generate_records(count: usize, ties: usize) -> Vec<WireRecord> {
    let ties = ties.max(1);
    (0..count)
        .rev()
        .map(|i| {
            let updated_at = (i / ties) as f64 + 1.0;
            if i % 17 == 0 {
                WireRecord::tombstone(format!("r{i:08}"), updated_at)
            } else {
                WireRecord::new(format!("r{i:08}"), updated_at, json!({ "n": i }))
            }
        })
        .collect()
}

/// Generate a store holding `count` definitions of `pair`.
pub fn seeded_store(pair: &LanguagePair, count: usize) -> InMemoryStore {
    let store = InMemoryStore::new();
    for i in 1..=count {
        // Fresh store, strictly increasing cached_at and unique text.
        let _ = store.import_definition(DefinitionRow {
            numeric_id: i as i64,
            language_pair: pair.clone(),
            source_text: format!("word{i}"),
            cached_at: i as f64,
            payload: Bytes::from(format!("{{\"gloss\":\"g{i}\"}}")),
        });
    }
    store
}
