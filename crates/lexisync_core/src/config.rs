//! Core configuration.

use std::time::Duration;

/// Configuration of the definition cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long an incremental reload waits for an in-flight reload of the
    /// same language pair before giving up with `CacheLoading`.
    pub reload_wait: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            reload_wait: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bounded wait for in-flight reloads.
    #[must_use]
    pub const fn with_reload_wait(mut self, wait: Duration) -> Self {
        self.reload_wait = wait;
        self
    }
}

/// Configuration of the change notifier.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Messages buffered per channel before slow subscribers start lagging.
    pub channel_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl NotifierConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-channel buffer. Zero is raised to one.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Configuration of the snapshot exporter.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Entries per chunk file.
    pub chunk_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { chunk_size: 5_000 }
    }
}

impl ExportConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of entries per chunk. Zero is raised to one.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(CacheConfig::default().reload_wait, Duration::from_secs(5));
        assert_eq!(NotifierConfig::default().channel_capacity, 256);
        assert_eq!(ExportConfig::default().chunk_size, 5_000);
    }

    #[test]
    fn builders_clamp_zero() {
        assert_eq!(NotifierConfig::new().with_channel_capacity(0).channel_capacity, 1);
        assert_eq!(ExportConfig::new().with_chunk_size(0).chunk_size, 1);
        let cache = CacheConfig::new().with_reload_wait(Duration::from_millis(50));
        assert_eq!(cache.reload_wait, Duration::from_millis(50));
    }
}
