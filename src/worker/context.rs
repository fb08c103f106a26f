use std::sync::Arc;

use crate::cache::{CacheLayer, CacheStorage};
use crate::clients::ClientControl;
use crate::manifest::{AssetManifest, Version};
use crate::network::Network;

/// Everything one worker version needs, created once and shared by every
/// event it handles.
pub struct WorkerContext {
  version: Version,
  cache_name: String,
  manifest: AssetManifest,
  cache: CacheLayer,
  network: Arc<dyn Network>,
  clients: Arc<dyn ClientControl>,
}

impl WorkerContext {
  pub fn new(
    version: Version,
    manifest: AssetManifest,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    clients: Arc<dyn ClientControl>,
  ) -> Self {
    Self {
      cache_name: version.cache_name(),
      version,
      manifest,
      cache: CacheLayer::new(storage),
      network,
      clients,
    }
  }

  pub fn version(&self) -> &Version {
    &self.version
  }

  /// Name of the store this version owns.
  pub fn cache_name(&self) -> &str {
    &self.cache_name
  }

  pub fn manifest(&self) -> &AssetManifest {
    &self.manifest
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  pub fn storage(&self) -> &Arc<dyn CacheStorage> {
    self.cache.storage()
  }

  pub fn network(&self) -> &Arc<dyn Network> {
    &self.network
  }

  pub fn clients(&self) -> &Arc<dyn ClientControl> {
    &self.clients
  }
}
