//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random write sequences, word events
//! and vocabulary that respect the store's invariants.

use lexisync_store::{RecordWrite, WordEvent};
use proptest::prelude::*;
use serde_json::json;

/// Characters words are drawn from.
const HANZI: &[char] = &['猫', '狗', '鱼', '鸟', '马', '牛', '羊', '猪', '龙', '虎'];

/// Strategy for generating valid record ids.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-h][0-9]?").expect("Invalid regex")
}

/// Strategy for generating an upsert or a delete.
pub fn record_write_strategy() -> impl Strategy<Value = RecordWrite> {
    (record_id_strategy(), any::<bool>(), any::<u16>()).prop_map(|(id, delete, value)| {
        if delete {
            RecordWrite::delete(id)
        } else {
            RecordWrite::new(id, json!({ "value": value }))
        }
    })
}

/// Strategy for generating batches of writes that share a timestamp.
///
/// The outer vector is a sequence of batches; a pull may happen between
/// batches, never inside one.
pub fn write_batches_strategy(max_batches: usize) -> impl Strategy<Value = Vec<Vec<RecordWrite>>> {
    prop::collection::vec(prop::collection::vec(record_write_strategy(), 1..5), 1..max_batches)
}

/// Strategy for generating a short Chinese word.
pub fn hanzi_word_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(HANZI), 1..3)
        .prop_map(|chars| chars.into_iter().collect())
}

/// Strategy for generating a word event at an offset from `start`.
pub fn word_event_strategy(start: f64) -> impl Strategy<Value = WordEvent> {
    (hanzi_word_strategy(), any::<bool>(), 0u32..200_000).prop_map(move |(word, checked, offset)| {
        let at = start + f64::from(offset);
        if checked {
            WordEvent::checked(word, at)
        } else {
            WordEvent::seen(word, at)
        }
    })
}
