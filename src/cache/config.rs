//! Cache configuration.
//!
//! Every service cache is built from the `[cache]` section of `holmok.toml`.

use std::time::Duration;

const DEFAULT_MAX_SIZE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_TTL_SECS: u64 = 60 * 60;

/// Budget and lifetime shared by a family of caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Resident byte budget of a single cache instance.
    pub max_size_bytes: usize,
    /// Time after insertion at which an entry is treated as absent.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_size_bytes: settings.max_size_bytes.get(),
            ttl: settings.ttl,
        }
    }
}
