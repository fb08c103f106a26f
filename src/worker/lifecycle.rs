//! Install, activate and fetch handlers of the offline cache manager.

use futures::future::try_join_all;
use tracing::{debug, info, warn};
use url::Url;

use super::context::WorkerContext;
use super::error::WorkerError;
use crate::cache::{CacheEntry, CacheResult};
use crate::http::Request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cache_name: String,
  /// Cache keys written, in manifest order
  pub stored: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  pub deleted: Vec<String>,
  /// Stale stores that could not be deleted, with the reason
  pub failed: Vec<(String, String)>,
  /// Set when the stores could not be listed and cleanup was skipped
  pub enumerate_error: Option<String>,
  pub claimed: bool,
}

/// What the fetch handler decided for one request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// The worker answers the request.
  Respond(CacheResult),
  /// The worker stays out of it; the host does its default network handling.
  PassThrough,
}

/// Precache every manifest asset into this version's store.
///
/// All assets are fetched before anything is written, so one failure leaves
/// the store without any of them.
pub async fn install(ctx: &WorkerContext) -> Result<InstallReport, WorkerError> {
  let cache_name = ctx.cache_name();
  info!(
    cache = cache_name,
    assets = ctx.manifest().len(),
    "precaching assets"
  );

  ctx.storage().open(cache_name)?;

  let fetches: Vec<_> = ctx
    .manifest()
    .iter()
    .map(|url| fetch_asset(ctx, url))
    .collect();
  let entries = try_join_all(fetches).await?;

  ctx.storage().put_all(cache_name, &entries)?;
  ctx
    .clients()
    .skip_waiting(ctx.version().as_str())
    .map_err(WorkerError::Clients)?;

  info!(cache = cache_name, stored = entries.len(), "install complete");
  Ok(InstallReport {
    cache_name: cache_name.to_string(),
    stored: entries.into_iter().map(|e| e.url).collect(),
  })
}

async fn fetch_asset(ctx: &WorkerContext, url: &Url) -> Result<CacheEntry, WorkerError> {
  let request = Request::get(url.clone());
  let response = ctx
    .network()
    .fetch(&request)
    .await
    .map_err(|source| WorkerError::AssetFetch {
      url: url.to_string(),
      source,
    })?;

  if !response.is_success() {
    return Err(WorkerError::AssetStatus {
      url: url.to_string(),
      status: response.status,
    });
  }

  Ok(CacheEntry::new(request.cache_key(), response))
}

/// Delete every store but this version's, then claim all clients.
///
/// Each deletion stands alone; failures are logged and reported.
pub async fn activate(ctx: &WorkerContext) -> Result<ActivateReport, WorkerError> {
  let current = ctx.cache_name();
  let mut report = ActivateReport::default();

  match ctx.storage().keys() {
    Ok(keys) => {
      for key in keys.into_iter().filter(|k| k != current) {
        match ctx.storage().delete(&key) {
          Ok(true) => {
            info!(cache = %key, "deleted stale cache");
            report.deleted.push(key);
          }
          Ok(false) => debug!(cache = %key, "stale cache already gone"),
          Err(e) => {
            warn!(cache = %key, error = %e, "failed to delete stale cache");
            report.failed.push((key, e.to_string()));
          }
        }
      }
    }
    Err(e) => {
      warn!(error = %e, "failed to enumerate caches, skipping cleanup");
      report.enumerate_error = Some(e.to_string());
    }
  }

  ctx
    .clients()
    .claim(ctx.version().as_str())
    .map_err(WorkerError::Clients)?;
  report.claimed = true;

  info!(
    cache = current,
    deleted = report.deleted.len(),
    failed = report.failed.len(),
    "activated"
  );
  Ok(report)
}

/// Cache-first handling of one intercepted request. Only GET is answered.
pub async fn fetch(ctx: &WorkerContext, request: Request) -> Result<FetchOutcome, WorkerError> {
  if !request.is_get() {
    debug!(method = %request.method, url = %request.url, "not intercepting");
    return Ok(FetchOutcome::PassThrough);
  }

  let key = request.cache_key();
  let network = ctx.network().clone();
  let result = ctx
    .cache()
    .fetch_first(&key, || async move {
      network
        .fetch(&request)
        .await
        .map_err(WorkerError::Network)
    })
    .await?;

  debug!(
    url = %key,
    status = result.response.status,
    from_cache = result.is_from_cache(),
    "answered fetch"
  );
  Ok(FetchOutcome::Respond(result))
}
