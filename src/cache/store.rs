//! Size- and time-bounded read-through cache.
//!
//! Entries are costed by the byte length of their JSON serialization. Eviction is
//! least-recently-used and happens only on insert; expired entries are dropped when
//! touched, and purged in bulk whenever an insert would overflow the budget.
//! `invalidate` and `clear` advance a generation counter; a read-through fetch
//! that started under an older generation returns its value without caching it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

/// A resident value together with its accounting data.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub size_bytes: usize,
    /// `None` when the TTL reaches past the clock's range.
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Entries<V> {
    lru: LruCache<String, CacheEntry<V>>,
    resident_bytes: usize,
    generation: u64,
}

impl<V> Entries<V> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.lru.pop(key)?;
        self.resident_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .lru
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (key, entry) = self.lru.pop_lru()?;
        self.resident_bytes -= entry.size_bytes;
        Some(key)
    }
}

/// Key/value cache bounded by a byte budget and a time-to-live.
///
/// One instance is created per query family at startup and shared by every
/// request through an `Arc`. Concurrent misses on the same key are collapsed so
/// that only one caller runs the fetch; the rest wait and read its result.
pub struct BoundedCache<V> {
    name: &'static str,
    max_size_bytes: usize,
    ttl: Duration,
    entries: Mutex<Entries<V>>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<V> BoundedCache<V>
where
    V: Clone + Serialize,
{
    pub fn new(name: &'static str, config: &CacheConfig) -> Self {
        Self {
            name,
            max_size_bytes: config.max_size_bytes,
            ttl: config.ttl,
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                resident_bytes: 0,
                generation: 0,
            }),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    /// Returns the resident, unexpired value for `key` and marks it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        match entries.lru.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        entries.remove(key);
        None
    }

    /// Stores `value` under `key`, evicting least-recently-used entries to fit.
    ///
    /// Returns `false` when the value was not cached: it could not be sized, or it
    /// alone exceeds the budget. Any previous entry for `key` is dropped either way.
    pub fn insert(&self, key: impl Into<String>, value: V) -> bool {
        self.insert_if_current(key.into(), value, None)
    }

    /// Inserts unless the cache generation moved past `expected_generation`.
    fn insert_if_current(&self, key: String, value: V, expected_generation: Option<u64>) -> bool {
        let size_bytes = match serialized_size(&value) {
            Ok(size) => size,
            Err(err) => {
                warn!(
                    target = "holmok::cache",
                    cache = self.name,
                    key = %key,
                    error = %err,
                    "cache value could not be sized; skipping insert"
                );
                self.invalidate(&key);
                return false;
            }
        };

        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "insert");
        if expected_generation.is_some_and(|generation| generation != entries.generation) {
            debug!(
                target = "holmok::cache",
                cache = self.name,
                key = %key,
                "cache invalidated during fetch; result not cached"
            );
            return false;
        }
        entries.remove(&key);

        if size_bytes > self.max_size_bytes {
            debug!(
                target = "holmok::cache",
                cache = self.name,
                key = %key,
                size_bytes,
                max_size_bytes = self.max_size_bytes,
                "value exceeds cache budget; not cached"
            );
            return false;
        }

        if entries.resident_bytes + size_bytes > self.max_size_bytes {
            let purged = entries.purge_expired(now);
            if purged > 0 {
                debug!(
                    target = "holmok::cache",
                    cache = self.name,
                    purged,
                    "purged expired entries"
                );
            }
        }

        while entries.resident_bytes + size_bytes > self.max_size_bytes {
            let Some(evicted) = entries.evict_lru() else {
                break;
            };
            counter!("holmok_cache_evict_total", "cache" => self.name).increment(1);
            debug!(
                target = "holmok::cache",
                cache = self.name,
                key = %evicted,
                "evicted least recently used entry"
            );
        }

        entries.resident_bytes += size_bytes;
        entries.lru.push(
            key,
            CacheEntry {
                value,
                size_bytes,
                expires_at: now.checked_add(self.ttl),
            },
        );
        true
    }

    /// Read-through lookup.
    ///
    /// On a miss `fetch` runs once per key at a time; a present result is cached,
    /// absence is not. Errors from `fetch` are returned unchanged and nothing is cached.
    pub async fn get_or_populate<F, Fut, E>(&self, key: &str, fetch: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(value) = self.get(key) {
            counter!("holmok_cache_hit_total", "cache" => self.name).increment(1);
            return Ok(Some(value));
        }

        let _flight = self.join_flight(key).await;

        // Another caller may have populated the key while we waited.
        if let Some(value) = self.get(key) {
            counter!("holmok_cache_hit_total", "cache" => self.name).increment(1);
            return Ok(Some(value));
        }

        counter!("holmok_cache_miss_total", "cache" => self.name).increment(1);
        let generation = mutex_lock(&self.entries, SOURCE, "generation").generation;
        let fetched = fetch().await?;
        if let Some(value) = fetched.as_ref() {
            self.insert_if_current(key.to_string(), value.clone(), Some(generation));
        }
        Ok(fetched)
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "invalidate");
        entries.generation = entries.generation.wrapping_add(1);
        entries.remove(key);
    }

    pub fn clear(&self) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "clear");
        entries.generation = entries.generation.wrapping_add(1);
        entries.lru.clear();
        entries.resident_bytes = 0;
    }

    /// Number of resident entries, expired ones included.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "resident_bytes").resident_bytes
    }

    async fn join_flight(&self, key: &str) -> FlightGuard<'_> {
        let slot = {
            let mut flights = mutex_lock(&self.in_flight, SOURCE, "join_flight");
            flights.entry(key.to_string()).or_default().clone()
        };
        let permit = slot.lock_owned().await;
        FlightGuard {
            flights: &self.in_flight,
            key: key.to_string(),
            permit: Some(permit),
        }
    }
}

struct FlightGuard<'a> {
    flights: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    key: String,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        let mut flights = mutex_lock(self.flights, SOURCE, "leave_flight");
        // Only the map still references the slot once every waiter is gone.
        if let Some(slot) = flights.get(&self.key)
            && Arc::strong_count(slot) == 1
        {
            flights.remove(&self.key);
        }
    }
}

fn serialized_size<V: Serialize>(value: &V) -> Result<usize, serde_json::Error> {
    serde_json::to_vec(value).map(|bytes| bytes.len())
}
