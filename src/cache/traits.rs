//! Core types for the caching system.

use chrono::{DateTime, Utc};

use crate::http::Response;

/// A response to be written into a cache store under `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub url: String,
  pub response: Response,
}

impl CacheEntry {
  pub fn new(url: impl Into<String>, response: Response) -> Self {
    Self {
      url: url.into(),
      response,
    }
  }
}

/// A response read back from a cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  /// Store the entry was found in
  pub cache_name: String,
  pub url: String,
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Result from a cache-first lookup, including the response and where it came from.
#[derive(Debug, Clone)]
pub struct CacheResult {
  /// The actual response
  pub response: Response,
  /// Where the response came from
  pub source: CacheSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl CacheResult {
  /// Create a new cache result from a network response.
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a cache hit.
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: CacheSource::Cache {
        cache_name: cached.cache_name,
      },
      cached_at: Some(cached.cached_at),
    }
  }

  pub fn is_from_cache(&self) -> bool {
    matches!(self.source, CacheSource::Cache { .. })
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the network on a cache miss
  Network,
  /// Served from the named cache store
  Cache { cache_name: String },
}
