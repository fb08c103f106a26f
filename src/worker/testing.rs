//! Test doubles for the host collaborators.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

use super::context::WorkerContext;
use crate::cache::{CacheEntry, CacheStorage, CachedResponse, MemoryStorage};
use crate::clients::Registration;
use crate::http::{Request, Response};
use crate::manifest::{AssetManifest, Version};
use crate::network::{Network, NetworkError};

pub const ORIGIN: &str = "http://localhost:5173/";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Network serving a fixed set of paths and recording every request.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  requests: Mutex<Vec<(String, String)>>,
  offline: Mutex<bool>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(self, path: &str, response: Response) -> Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url(path).to_string(), response);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    *self.offline.lock().unwrap() = offline;
  }

  /// (method, url) of every request seen so far.
  pub fn requests(&self) -> Vec<(String, String)> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self
      .requests
      .lock()
      .unwrap()
      .push((request.method.to_string(), request.url.to_string()));

    if *self.offline.lock().unwrap() {
      return Err(NetworkError::Unavailable(request.url.to_string()));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

/// Storage whose deletes fail for chosen store names, or whose listing fails.
pub struct FlakyStorage {
  inner: MemoryStorage,
  failing: Vec<String>,
  failing_keys: bool,
}

impl FlakyStorage {
  pub fn failing_deletes(names: &[&str]) -> Self {
    Self {
      inner: MemoryStorage::new(),
      failing: names.iter().map(|s| s.to_string()).collect(),
      failing_keys: false,
    }
  }

  pub fn failing_keys() -> Self {
    Self {
      inner: MemoryStorage::new(),
      failing: Vec::new(),
      failing_keys: true,
    }
  }
}

impl CacheStorage for FlakyStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.inner.open(name)
  }

  fn put_all(&self, name: &str, entries: &[CacheEntry]) -> Result<()> {
    self.inner.put_all(name, entries)
  }

  fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>> {
    self.inner.match_in(name, url)
  }

  fn match_any(&self, url: &str) -> Result<Option<CachedResponse>> {
    self.inner.match_any(url)
  }

  fn keys(&self) -> Result<Vec<String>> {
    if self.failing_keys {
      return Err(eyre!("cannot list caches"));
    }
    self.inner.keys()
  }

  fn delete(&self, name: &str) -> Result<bool> {
    if self.failing.iter().any(|f| f == name) {
      return Err(eyre!("disk is read-only"));
    }
    self.inner.delete(name)
  }

  fn entries(&self, name: &str) -> Result<Vec<String>> {
    self.inner.entries(name)
  }
}

pub fn manifest(paths: &[&str]) -> AssetManifest {
  let build: Vec<String> = paths.iter().map(|s| s.to_string()).collect();
  AssetManifest::resolve(&Url::parse(ORIGIN).unwrap(), &build, &[]).unwrap()
}

/// Context for `version` over shared collaborators. The registration
/// already knows the version, as it would after the host began installing.
pub fn context(
  version: &str,
  paths: &[&str],
  storage: Arc<dyn CacheStorage>,
  network: Arc<FakeNetwork>,
  registration: Arc<Registration>,
) -> WorkerContext {
  registration.begin_install(version).unwrap();
  host_context(version, paths, storage, network, registration)
}

/// Context as a host builds it, leaving registration to the host.
pub fn host_context(
  version: &str,
  paths: &[&str],
  storage: Arc<dyn CacheStorage>,
  network: Arc<FakeNetwork>,
  registration: Arc<Registration>,
) -> WorkerContext {
  WorkerContext::new(
    Version::new(version).unwrap(),
    manifest(paths),
    storage,
    network,
    registration,
  )
}
