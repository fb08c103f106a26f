//! Named response caches for offline support.
//!
//! This module provides the host-side Cache Store API:
//! - Named stores, one per worker version, keyed by request URL
//! - All-or-nothing batch population
//! - Lookups in a single store or across every store
//! - A cache-first layer that never writes runtime responses back

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use traits::{CacheEntry, CacheResult, CacheSource, CachedResponse};
