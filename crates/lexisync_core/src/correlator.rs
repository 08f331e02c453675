//! Resolution of word counters to stable definition ids.
//!
//! Word counters are keyed by text on the server but clients index them by
//! the numeric id of the word's definition. The correlator joins a batch of
//! counters against the definition cache; a word that is missing may have
//! been computed by another process after this process loaded its snapshot,
//! so the batch is retried once after an incremental refresh. A word still
//! missing after that is reported, never silently dropped.

use crate::cache::{normalize_text, DefinitionCache};
use crate::error::{CoreError, CoreResult};
use crate::pager::{self, Page, Paged};
use lexisync_protocol::{Checkpoint, LanguagePair, WireRecord};
use lexisync_store::{DefinitionStore, WordCounter};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

const MAX_WORD_CHARS: usize = 64;

/// A word counter tagged with the numeric id of its definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCounter {
    /// Numeric id of the word's definition.
    pub numeric_id: i64,
    /// The underlying counter.
    pub counter: WordCounter,
}

impl ResolvedCounter {
    /// Renders the counter as a wire record keyed by its numeric id.
    pub fn to_wire(&self) -> WireRecord {
        let c = &self.counter;
        WireRecord::new(
            self.numeric_id.to_string(),
            c.updated_at,
            json!({
                "word": c.word_text,
                "seen": c.seen,
                "checked": c.checked,
                "seen_since_last_check": c.seen_since_last_check,
                "last_seen": c.last_seen,
                "last_checked": c.last_checked,
            }),
        )
    }
}

impl Paged for ResolvedCounter {
    type Id = i64;

    fn updated_at(&self) -> f64 {
        self.counter.updated_at
    }

    fn cursor_id(&self) -> i64 {
        self.numeric_id
    }

    fn is_tombstone(&self) -> bool {
        false
    }
}

/// Returns true if `word` can plausibly be a word of `source_language`.
///
/// Counters for implausible words (stray punctuation, overlong input,
/// wrong script) never get a definition and are skipped before lookup.
pub fn plausible_word(source_language: &str, word: &str) -> bool {
    let word = word.trim();
    let length = word.chars().count();
    if length == 0 || length > MAX_WORD_CHARS || word.chars().any(char::is_control) {
        return false;
    }
    let base = source_language
        .split(['-', '_'])
        .next()
        .unwrap_or(source_language)
        .to_ascii_lowercase();
    match base.as_str() {
        "zh" | "ja" => word.chars().all(is_cjk),
        _ => word
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, '\'' | '-' | ' ')),
    }
}

fn is_cjk(c: char) -> bool {
    matches!(
        c as u32,
        0x3005 | 0x3007
            | 0x3040..=0x30FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xF900..=0xFAFF
            | 0x20000..=0x2FA1F
    )
}

/// Joins word counters against the definition cache.
pub struct StatsCorrelator<S> {
    cache: Arc<DefinitionCache<S>>,
}

impl<S: DefinitionStore> StatsCorrelator<S> {
    /// Creates a correlator over `cache`.
    pub fn new(cache: Arc<DefinitionCache<S>>) -> Self {
        Self { cache }
    }

    /// Resolves every plausible counter of the batch.
    ///
    /// Implausible words are skipped. If several counters normalize to the
    /// same word, the most recently updated one wins.
    ///
    /// # Errors
    ///
    /// Returns `MissingCacheValue` if some word is unresolved after one
    /// refresh, or `CacheLoading` if the pair is still loading.
    pub async fn resolve(
        &self,
        pair: &LanguagePair,
        counters: Vec<WordCounter>,
    ) -> CoreResult<Vec<ResolvedCounter>> {
        self.cache.ensure_loaded(pair).await?;
        let counters: Vec<WordCounter> = counters
            .into_iter()
            .filter(|c| plausible_word(&pair.from, &c.word_text))
            .collect();

        let missing = match self.lookup(pair, &counters) {
            Ok(resolved) => return Ok(resolved),
            Err(missing) => missing,
        };
        debug!(language_pair = %pair, missing = missing.len(), "refreshing cache for unresolved words");
        self.cache.refresh(pair).await?;

        self.lookup(pair, &counters).map_err(|words| {
            error!(language_pair = %pair, words = ?words, "word counters reference uncached definitions");
            CoreError::MissingCacheValue {
                language_pair: pair.clone(),
                words,
            }
        })
    }

    /// Resolves the batch and returns the page after `checkpoint`.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve); also `InvalidCheckpoint` for a
    /// non-numeric checkpoint id.
    pub async fn resolve_page(
        &self,
        pair: &LanguagePair,
        counters: Vec<WordCounter>,
        checkpoint: Option<&Checkpoint>,
        limit: Option<usize>,
    ) -> CoreResult<Page<ResolvedCounter>> {
        let resolved = self.resolve(pair, counters).await?;
        pager::page(resolved, checkpoint, limit)
    }

    /// All-or-nothing lookup of a batch; returns the missing words on
    /// failure.
    fn lookup(
        &self,
        pair: &LanguagePair,
        counters: &[WordCounter],
    ) -> Result<Vec<ResolvedCounter>, Vec<String>> {
        let mut resolved: HashMap<i64, ResolvedCounter> = HashMap::with_capacity(counters.len());
        let mut missing = Vec::new();
        for counter in counters {
            let key = normalize_text(&counter.word_text);
            match self.cache.get(pair, &key) {
                Some(entry) => {
                    let newer = resolved
                        .get(&entry.numeric_id)
                        .map_or(true, |kept| counter.updated_at > kept.counter.updated_at);
                    if newer {
                        resolved.insert(
                            entry.numeric_id,
                            ResolvedCounter {
                                numeric_id: entry.numeric_id,
                                counter: counter.clone(),
                            },
                        );
                    }
                }
                None => missing.push(key),
            }
        }
        if missing.is_empty() {
            Ok(resolved.into_values().collect())
        } else {
            missing.sort();
            missing.dedup();
            Err(missing)
        }
    }
}

impl<S> std::fmt::Debug for StatsCorrelator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsCorrelator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::notifier::ChangeNotifier;
    use bytes::Bytes;
    use lexisync_store::InMemoryStore;

    fn pair() -> LanguagePair {
        LanguagePair::new("zh-Hans", "en")
    }

    fn counter(word: &str, updated_at: f64) -> WordCounter {
        WordCounter {
            user_id: "7".into(),
            word_text: word.into(),
            seen: 1,
            checked: 0,
            seen_since_last_check: 1,
            last_seen: Some(updated_at),
            last_checked: None,
            updated_at,
        }
    }

    async fn setup(words: &[&str]) -> (Arc<InMemoryStore>, StatsCorrelator<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        for word in words {
            store
                .insert_definition(&pair(), word, Bytes::from_static(b"{}"))
                .await
                .unwrap();
        }
        let cache = Arc::new(DefinitionCache::new(
            Arc::clone(&store),
            Arc::new(ChangeNotifier::default()),
            CacheConfig::default(),
        ));
        cache.ensure_loaded(&pair()).await.unwrap();
        (store, StatsCorrelator::new(cache))
    }

    #[test]
    fn plausibility_filter() {
        assert!(plausible_word("zh-Hans", "猫"));
        assert!(plausible_word("zh", "中文"));
        assert!(plausible_word("ja", "ねこ"));
        assert!(!plausible_word("zh-Hans", "cat"));
        assert!(!plausible_word("zh-Hans", "猫!"));
        assert!(plausible_word("en", "don't"));
        assert!(plausible_word("fr", "pomme de terre"));
        assert!(!plausible_word("en", "a1"));
        assert!(!plausible_word("en", ""));
        assert!(!plausible_word("en", "tab\tbed"));
        assert!(!plausible_word("en", &"a".repeat(65)));
    }

    #[tokio::test]
    async fn resolves_and_orders_by_update_then_id() {
        let (_store, correlator) = setup(&["猫", "狗", "鱼"]).await;
        let page = correlator
            .resolve_page(
                &pair(),
                vec![counter("鱼", 5.0), counter("狗", 5.0), counter("猫", 9.0)],
                None,
                Some(2),
            )
            .await
            .unwrap();
        let ids: Vec<i64> = page.records.iter().map(|r| r.numeric_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(page.checkpoint, Some(Checkpoint::new("3", 5.0)));
    }

    #[tokio::test]
    async fn word_inserted_after_snapshot_resolves_on_retry() {
        let (store, correlator) = setup(&["猫"]).await;
        store
            .insert_definition(&pair(), "狗", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let scans_before = store.stats().definition_scans;

        let resolved = correlator
            .resolve(&pair(), vec![counter("猫", 1.0), counter("狗", 2.0)])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(store.stats().definition_scans, scans_before + 1);
    }

    #[tokio::test]
    async fn unknown_word_fails_after_exactly_one_retry() {
        let (store, correlator) = setup(&["猫"]).await;
        let scans_before = store.stats().definition_scans;

        let err = correlator
            .resolve(&pair(), vec![counter("猫", 1.0), counter("龙", 2.0)])
            .await
            .unwrap_err();
        match err {
            CoreError::MissingCacheValue { words, .. } => assert_eq!(words, vec!["龙"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.stats().definition_scans, scans_before + 1);
    }

    #[tokio::test]
    async fn implausible_words_are_skipped_without_retry() {
        let (store, correlator) = setup(&["猫"]).await;
        let scans_before = store.stats().definition_scans;
        let resolved = correlator
            .resolve(&pair(), vec![counter("猫", 1.0), counter("hello", 2.0)])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(store.stats().definition_scans, scans_before);
    }

    #[tokio::test]
    async fn resolution_is_stable_across_checkpoints() {
        let (_store, correlator) = setup(&["猫", "狗"]).await;
        let batch = vec![counter("猫", 3.0), counter("狗", 3.0)];
        let first = correlator
            .resolve_page(&pair(), batch.clone(), None, Some(1))
            .await
            .unwrap();
        let second = correlator
            .resolve_page(&pair(), batch, first.checkpoint.as_ref(), Some(1))
            .await
            .unwrap();
        assert_eq!(first.records[0].numeric_id, 1);
        assert_eq!(second.records[0].numeric_id, 2);
    }

    #[test]
    fn wire_form_is_keyed_by_numeric_id() {
        let resolved = ResolvedCounter {
            numeric_id: 12,
            counter: counter("猫", 4.0),
        };
        let wire = resolved.to_wire();
        assert_eq!(wire.id, "12");
        assert_eq!(wire.data["word"], "猫");
        assert_eq!(wire.data["seen"], 1);
    }
}
