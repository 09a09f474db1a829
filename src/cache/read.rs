use serde::Serialize;

use super::config::CacheConfig;
use super::store::BoundedCache;

/// The list and item caches behind one read service.
///
/// Writes invalidate single item keys but always clear the list side, since
/// membership and ordering of any cached list may have changed.
pub struct ReadCaches<T> {
    lists: BoundedCache<Vec<T>>,
    items: BoundedCache<T>,
}

impl<T> ReadCaches<T>
where
    T: Clone + Serialize,
{
    pub fn new(list_name: &'static str, item_name: &'static str, config: &CacheConfig) -> Self {
        Self {
            lists: BoundedCache::new(list_name, config),
            items: BoundedCache::new(item_name, config),
        }
    }

    pub fn lists(&self) -> &BoundedCache<Vec<T>> {
        &self.lists
    }

    pub fn items(&self) -> &BoundedCache<T> {
        &self.items
    }

    pub fn clear(&self) {
        self.lists.clear();
        self.items.clear();
    }
}
