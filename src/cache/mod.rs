//! Holmok cache system
//!
//! Read paths of the category and photo services go through a [`BoundedCache`]:
//! a byte-budgeted, TTL-bounded LRU map with read-through population.
//!
//! ## Configuration
//!
//! Budget and lifetime come from the `[cache]` section of `holmok.toml`:
//!
//! ```toml
//! [cache]
//! max_size_mb = 5
//! ttl_minutes = 60
//! ```

mod config;
mod lock;
mod read;
mod store;

pub use config::CacheConfig;
pub use read::ReadCaches;
pub use store::{BoundedCache, CacheEntry};
