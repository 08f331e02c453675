//! Definition providers and their registry.
//!
//! Providers are registered per language pair at startup from
//! configuration; the set of supported pairs is fixed for the life of the
//! process.

use crate::error::EnrichError;
use crate::transliterate::{TableTransliterator, TransliterationPipeline};
use bytes::Bytes;
use lexisync_protocol::LanguagePair;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Computes the definition payload of a source text.
pub trait DefinitionProvider: Send + Sync {
    /// Short provider name, used in logs and export chunk names.
    fn name(&self) -> &str;

    /// Computes the payload for the lowercased `text`.
    ///
    /// # Errors
    ///
    /// Returns an [`EnrichError`] if no definition can be produced.
    fn define(&self, pair: &LanguagePair, text: &str) -> Result<Bytes, EnrichError>;
}

fn to_payload(value: &serde_json::Value) -> Result<Bytes, EnrichError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| EnrichError::Provider(e.to_string()))
}

/// Echoes the source text back as its own gloss.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProvider;

impl DefinitionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn define(&self, pair: &LanguagePair, text: &str) -> Result<Bytes, EnrichError> {
        to_payload(&json!({
            "source": text,
            "target_language": pair.to,
            "gloss": text,
        }))
    }
}

/// Serves definitions from a fixed dictionary.
#[derive(Debug, Clone, Default)]
pub struct DictionaryProvider {
    entries: HashMap<String, serde_json::Value>,
}

impl DictionaryProvider {
    /// Creates a provider; keys are lowercased.
    pub fn new(entries: impl IntoIterator<Item = (String, serde_json::Value)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(text, value)| (text.to_lowercase(), value))
                .collect(),
        }
    }
}

impl DefinitionProvider for DictionaryProvider {
    fn name(&self) -> &str {
        "dictionary"
    }

    fn define(&self, _pair: &LanguagePair, text: &str) -> Result<Bytes, EnrichError> {
        let value = self.entries.get(text).ok_or_else(|| EnrichError::NotFound {
            text: text.to_string(),
        })?;
        to_payload(&json!({ "source": text, "definition": value }))
    }
}

/// Produces phonetic readings through a transliteration table.
#[derive(Debug, Clone)]
pub struct PhoneticProvider {
    pipeline: TransliterationPipeline<TableTransliterator>,
}

impl PhoneticProvider {
    /// Creates a provider from a `unit -> reading` table.
    pub fn new(table: HashMap<String, String>) -> Self {
        Self {
            pipeline: TransliterationPipeline::new(TableTransliterator::new(table)),
        }
    }
}

impl DefinitionProvider for PhoneticProvider {
    fn name(&self) -> &str {
        "phonetic"
    }

    fn define(&self, _pair: &LanguagePair, text: &str) -> Result<Bytes, EnrichError> {
        let readings = self.pipeline.transcribe(text);
        if readings.is_empty() {
            return Err(EnrichError::NotFound {
                text: text.to_string(),
            });
        }
        to_payload(&json!({ "source": text, "phonetics": readings }))
    }
}

/// Declarative provider selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// [`EchoProvider`].
    Echo,
    /// [`DictionaryProvider`] over inline entries.
    Dictionary {
        /// `text -> definition` entries.
        entries: HashMap<String, serde_json::Value>,
    },
    /// [`PhoneticProvider`] over an inline table.
    Phonetic {
        /// `unit -> reading` table.
        table: HashMap<String, String>,
    },
}

impl ProviderConfig {
    /// Instantiates the configured provider.
    pub fn build(&self) -> Arc<dyn DefinitionProvider> {
        match self {
            ProviderConfig::Echo => Arc::new(EchoProvider),
            ProviderConfig::Dictionary { entries } => Arc::new(DictionaryProvider::new(
                entries.iter().map(|(k, v)| (k.clone(), v.clone())),
            )),
            ProviderConfig::Phonetic { table } => Arc::new(PhoneticProvider::new(table.clone())),
        }
    }
}

/// One `(from, to) -> provider` registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairProvider {
    /// Source language.
    pub from: String,
    /// Target language.
    pub to: String,
    /// Provider for the pair.
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

/// The provider registrations of a process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registered pairs.
    #[serde(default)]
    pub pairs: Vec<PairProvider>,
}

impl RegistryConfig {
    /// Adds a registration.
    #[must_use]
    pub fn with_pair(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        provider: ProviderConfig,
    ) -> Self {
        self.pairs.push(PairProvider {
            from: from.into(),
            to: to.into(),
            provider,
        });
        self
    }
}

/// Maps supported language pairs to their provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<LanguagePair, Arc<dyn DefinitionProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configuration. Later registrations of the
    /// same pair replace earlier ones.
    pub fn from_config(config: &RegistryConfig) -> Self {
        let mut registry = Self::new();
        for entry in &config.pairs {
            registry.register(
                LanguagePair::new(entry.from.clone(), entry.to.clone()),
                entry.provider.build(),
            );
        }
        registry
    }

    /// Registers `provider` for `pair`.
    pub fn register(&mut self, pair: LanguagePair, provider: Arc<dyn DefinitionProvider>) {
        self.providers.insert(pair, provider);
    }

    /// The provider of `pair`, if supported.
    pub fn get(&self, pair: &LanguagePair) -> Option<Arc<dyn DefinitionProvider>> {
        self.providers.get(pair).cloned()
    }

    /// Returns true if `pair` has a provider.
    pub fn supports(&self, pair: &LanguagePair) -> bool {
        self.providers.contains_key(pair)
    }

    /// Supported pairs in sorted order.
    pub fn pairs(&self) -> Vec<LanguagePair> {
        self.providers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.providers.iter().map(|(pair, p)| (pair.to_string(), p.name().to_string())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> LanguagePair {
        LanguagePair::new("zh-Hans", "en")
    }

    #[test]
    fn echo_payload_is_json() {
        let payload = EchoProvider.define(&pair(), "猫").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["gloss"], "猫");
        assert_eq!(value["target_language"], "en");
    }

    #[test]
    fn dictionary_misses_are_not_found() {
        let provider = DictionaryProvider::new([("Cat".to_string(), json!("a small feline"))]);
        assert!(provider.define(&pair(), "cat").is_ok());
        assert!(matches!(
            provider.define(&pair(), "dog"),
            Err(EnrichError::NotFound { .. })
        ));
    }

    #[test]
    fn phonetic_provider_reads_table() {
        let provider = PhoneticProvider::new(HashMap::from([("猫".to_string(), "māo".to_string())]));
        let payload = provider.define(&pair(), "猫").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["phonetics"], json!(["māo"]));
    }

    #[test]
    fn registry_from_json_config() {
        let config: RegistryConfig = serde_json::from_str(
            r#"{"pairs": [
                {"from": "zh-Hans", "to": "en", "provider": "echo"},
                {"from": "en", "to": "zh-Hans", "provider": "dictionary", "entries": {"cat": "猫"}}
            ]}"#,
        )
        .unwrap();
        let registry = ProviderRegistry::from_config(&config);
        assert!(registry.supports(&pair()));
        assert!(registry.supports(&LanguagePair::new("en", "zh-Hans")));
        assert!(!registry.supports(&LanguagePair::new("fr", "en")));
        assert_eq!(registry.get(&pair()).unwrap().name(), "echo");
        assert_eq!(registry.pairs().len(), 2);
    }

    #[test]
    fn later_registration_wins() {
        let config = RegistryConfig::default()
            .with_pair("zh-Hans", "en", ProviderConfig::Echo)
            .with_pair("zh-Hans", "en", ProviderConfig::Phonetic { table: HashMap::new() });
        let registry = ProviderRegistry::from_config(&config);
        assert_eq!(registry.get(&pair()).unwrap().name(), "phonetic");
    }
}
