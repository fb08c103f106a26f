//! Cache layer that orchestrates cache-first lookups with network fetching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::storage::CacheStorage;
use super::traits::CacheResult;
use crate::http::Response;

/// Cache layer that sits between intercepted requests and the network.
///
/// Responses fetched on a miss are handed back untouched and never written
/// to a store.
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self { storage }
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    &self.storage
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check every store - on a hit, return immediately
  /// 2. On a miss, return whatever the fetcher produces
  ///
  /// Fetcher errors propagate unchanged.
  pub async fn fetch_first<F, Fut, E>(&self, url: &str, fetcher: F) -> Result<CacheResult, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, E>>,
    E: From<color_eyre::Report>,
  {
    if let Some(cached) = self.storage.match_any(url)? {
      debug!(url, cache = %cached.cache_name, "cache hit");
      return Ok(CacheResult::from_cache(cached));
    }

    debug!(url, "cache miss, going to network");
    let response = fetcher().await?;
    Ok(CacheResult::from_network(response))
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::traits::CacheEntry;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn layer() -> CacheLayer {
    CacheLayer::new(Arc::new(MemoryStorage::new()))
  }

  #[tokio::test]
  async fn test_hit_skips_fetcher() {
    let layer = layer();
    layer
      .storage()
      .put_all(
        "cache-v1",
        &[CacheEntry::new("http://h/app.js", Response::new(200, "js"))],
      )
      .unwrap();

    let calls = AtomicU32::new(0);
    let result = layer
      .fetch_first("http://h/app.js", || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, color_eyre::Report>(Response::new(200, "network"))
      })
      .await
      .unwrap();

    assert!(result.is_from_cache());
    assert_eq!(result.response.body, b"js");
    assert!(result.cached_at.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_miss_uses_fetcher_without_write_back() {
    let layer = layer();

    let result = layer
      .fetch_first("http://h/api/data", || async {
        Ok::<_, color_eyre::Report>(Response::new(200, "fresh"))
      })
      .await
      .unwrap();

    assert!(!result.is_from_cache());
    assert_eq!(result.response.body, b"fresh");
    assert!(layer.storage().match_any("http://h/api/data").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_fetcher_error_propagates() {
    let layer = layer();

    let result = layer
      .fetch_first("http://h/api/data", || async {
        Err::<Response, _>(color_eyre::eyre::eyre!("offline"))
      })
      .await;

    assert_eq!(result.unwrap_err().to_string(), "offline");
  }
}
