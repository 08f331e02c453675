//! Server configuration.

use crate::error::{ServerError, ServerResult};
use lexisync_core::{CacheConfig, NotifierConfig, RegistryConfig};

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Page size used when a pull does not ask for one.
    pub default_pull_limit: u32,
    /// Upper bound for requested page sizes.
    pub max_pull_limit: u32,
    /// Definition cache settings.
    pub cache: CacheConfig,
    /// Change notifier settings.
    pub notifier: NotifierConfig,
    /// Definition providers per language pair.
    pub providers: RegistryConfig,
}

impl ServerConfig {
    /// Creates a configuration with default values and no providers.
    pub fn new() -> Self {
        Self {
            default_pull_limit: 100,
            max_pull_limit: 1_000,
            cache: CacheConfig::default(),
            notifier: NotifierConfig::default(),
            providers: RegistryConfig::default(),
        }
    }

    /// Sets the default page size.
    #[must_use]
    pub fn with_default_pull_limit(mut self, limit: u32) -> Self {
        self.default_pull_limit = limit.max(1);
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub fn with_max_pull_limit(mut self, limit: u32) -> Self {
        self.max_pull_limit = limit.max(1);
        self
    }

    /// Sets the definition cache configuration.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the change notifier configuration.
    #[must_use]
    pub fn with_notifier(mut self, notifier: NotifierConfig) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the provider registrations.
    #[must_use]
    pub fn with_providers(mut self, providers: RegistryConfig) -> Self {
        self.providers = providers;
        self
    }

    /// Resolves a requested page size: absent or zero means the default.
    ///
    /// Requests above `max_pull_limit` are refused, never cut down.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `requested` exceeds `max_pull_limit`.
    pub fn page_limit(&self, requested: Option<u32>) -> ServerResult<usize> {
        match requested {
            Some(0) | None => Ok(self.default_pull_limit.min(self.max_pull_limit) as usize),
            Some(n) if n > self.max_pull_limit => Err(ServerError::InvalidRequest(format!(
                "limit {n} exceeds the maximum of {}",
                self.max_pull_limit
            ))),
            Some(n) => Ok(n as usize),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexisync_core::ProviderConfig;
    use std::time::Duration;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.default_pull_limit, 100);
        assert_eq!(config.max_pull_limit, 1_000);
        assert!(config.providers.pairs.is_empty());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_default_pull_limit(20)
            .with_max_pull_limit(50)
            .with_cache(CacheConfig::new().with_reload_wait(Duration::from_millis(10)))
            .with_providers(RegistryConfig::default().with_pair("zh-Hans", "en", ProviderConfig::Echo));

        assert_eq!(config.default_pull_limit, 20);
        assert_eq!(config.cache.reload_wait, Duration::from_millis(10));
        assert_eq!(config.providers.pairs.len(), 1);
    }

    #[test]
    fn page_limit_defaults_and_bounds() {
        let config = ServerConfig::new()
            .with_default_pull_limit(20)
            .with_max_pull_limit(50);
        assert_eq!(config.page_limit(None).unwrap(), 20);
        assert_eq!(config.page_limit(Some(0)).unwrap(), 20);
        assert_eq!(config.page_limit(Some(7)).unwrap(), 7);
        assert_eq!(config.page_limit(Some(50)).unwrap(), 50);
        assert!(matches!(
            config.page_limit(Some(500)),
            Err(ServerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn default_limit_never_exceeds_maximum() {
        let config = ServerConfig::new()
            .with_default_pull_limit(80)
            .with_max_pull_limit(30);
        assert_eq!(config.page_limit(None).unwrap(), 30);
    }
}
