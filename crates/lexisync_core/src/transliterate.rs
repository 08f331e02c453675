//! Phonetic transcription with per-token fallback.
//!
//! Context-aware transcription of a phrase reads better than transcribing
//! tokens one by one, but it can fail to line up with the source text. The
//! pipeline then falls back to token-by-token transcription instead of
//! failing the whole definition.

use crate::error::EnrichError;
use std::collections::HashMap;
use tracing::warn;

/// A phonetic transcription scheme.
pub trait Transliterator: Send + Sync {
    /// Transcribes a whole phrase, returning one reading per unit of the
    /// source text.
    ///
    /// # Errors
    ///
    /// Returns `TransliterationInconsistency` if the readings can not be
    /// aligned with the source text.
    fn transliterate_aligned(&self, text: &str) -> Result<Vec<String>, EnrichError>;

    /// Transcribes one token without context. Never fails; units without a
    /// reading pass through unchanged.
    fn transliterate_token(&self, token: &str) -> String;
}

/// A table-driven transliterator using greedy longest-match segmentation.
#[derive(Debug, Clone, Default)]
pub struct TableTransliterator {
    table: HashMap<String, String>,
    longest_key: usize,
}

impl TableTransliterator {
    /// Builds a transliterator from a `unit -> reading` table.
    pub fn new(table: HashMap<String, String>) -> Self {
        let longest_key = table.keys().map(|k| k.chars().count()).max().unwrap_or(0);
        Self { table, longest_key }
    }

    /// Greedy longest match starting at `chars[start]`.
    fn match_at(&self, chars: &[char], start: usize) -> Option<(usize, &str)> {
        let max = self.longest_key.min(chars.len() - start);
        (1..=max).rev().find_map(|len| {
            let unit: String = chars[start..start + len].iter().collect();
            self.table.get(&unit).map(|reading| (len, reading.as_str()))
        })
    }
}

impl Transliterator for TableTransliterator {
    fn transliterate_aligned(&self, text: &str) -> Result<Vec<String>, EnrichError> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut readings = Vec::new();
        let mut position = 0;
        while position < chars.len() {
            match self.match_at(&chars, position) {
                Some((len, reading)) => {
                    readings.push(reading.to_string());
                    position += len;
                }
                None => {
                    return Err(EnrichError::TransliterationInconsistency {
                        text: text.to_string(),
                        reason: format!("no reading for {:?} at unit {position}", chars[position]),
                    })
                }
            }
        }
        Ok(readings)
    }

    fn transliterate_token(&self, token: &str) -> String {
        let chars: Vec<char> = token.chars().collect();
        let mut out = Vec::new();
        let mut position = 0;
        while position < chars.len() {
            match self.match_at(&chars, position) {
                Some((len, reading)) => {
                    out.push(reading.to_string());
                    position += len;
                }
                None => {
                    out.push(chars[position].to_string());
                    position += 1;
                }
            }
        }
        out.join(" ")
    }
}

/// Runs a transliterator with per-token fallback.
#[derive(Debug, Clone)]
pub struct TransliterationPipeline<T> {
    inner: T,
}

impl<T: Transliterator> TransliterationPipeline<T> {
    /// Wraps `inner`.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Transcribes `text`, falling back to per-token transcription when the
    /// aligned pass is inconsistent.
    pub fn transcribe(&self, text: &str) -> Vec<String> {
        match self.inner.transliterate_aligned(text) {
            Ok(readings) => readings,
            Err(err) => {
                warn!(error = %err, "falling back to per-token transliteration");
                text.split_whitespace()
                    .map(|token| self.inner.transliterate_token(token))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinyin() -> TableTransliterator {
        TableTransliterator::new(
            [("中", "zhōng"), ("文", "wén"), ("中文", "zhōngwén"), ("猫", "māo")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn aligned_prefers_longest_match() {
        let readings = pinyin().transliterate_aligned("中文猫").unwrap();
        assert_eq!(readings, vec!["zhōngwén", "māo"]);
    }

    #[test]
    fn aligned_fails_on_unknown_unit() {
        let err = pinyin().transliterate_aligned("中x").unwrap_err();
        assert!(matches!(err, EnrichError::TransliterationInconsistency { .. }));
    }

    #[test]
    fn token_pass_keeps_unknown_units() {
        assert_eq!(pinyin().transliterate_token("猫x"), "māo x");
    }

    #[test]
    fn pipeline_falls_back_per_token() {
        let pipeline = TransliterationPipeline::new(pinyin());
        assert_eq!(pipeline.transcribe("中文"), vec!["zhōngwén"]);
        assert_eq!(pipeline.transcribe("猫 ok"), vec!["māo", "o k"]);
    }
}
