use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use crate::clients::Registration;
use crate::config::Config;
use crate::db::Database;
use crate::http::Request;
use crate::network::HttpNetwork;
use crate::worker::{Dispatcher, Route, WorkerContext, WorkerHost};

/// Main application state: one worker version wired to its host collaborators
pub struct App {
  config: Config,
  host: WorkerHost,
  storage: Arc<dyn CacheStorage>,
  registration: Arc<Registration>,
  cache_name: String,
  ephemeral: bool,
}

impl App {
  /// Build the worker for the configured version. `ephemeral` keeps caches
  /// and registration state in memory for this process only.
  pub fn new(config: Config, ephemeral: bool) -> Result<Self> {
    let manifest = config.asset_manifest()?;
    if manifest.is_empty() {
      warn!("asset manifest is empty, nothing will be precached");
    }
    let version = config.version(&manifest)?;
    let cache_name = version.cache_name();

    let (storage, registration): (Arc<dyn CacheStorage>, Arc<Registration>) = if ephemeral {
      (
        Arc::new(MemoryStorage::new()),
        Arc::new(Registration::in_memory()),
      )
    } else {
      let db = Arc::new(Database::open(config.storage.path.as_deref())?);
      (
        Arc::new(SqliteStorage::new(Arc::clone(&db))),
        Arc::new(Registration::persistent(db)),
      )
    };

    let network = Arc::new(HttpNetwork::new(&config.network)?);

    info!(%version, cache = %cache_name, assets = manifest.len(), "worker configured");
    let context = WorkerContext::new(
      version,
      manifest,
      Arc::clone(&storage),
      network.clone(),
      registration.clone(),
    );
    let host = WorkerHost::new(
      Dispatcher::offline_cache(Arc::new(context)),
      registration.clone(),
      network,
    );

    Ok(Self {
      config,
      host,
      storage,
      registration,
      cache_name,
      ephemeral,
    })
  }

  pub async fn install(&self) -> Result<()> {
    match self.host.register().await? {
      Some(report) => {
        println!(
          "Installed {} ({} assets)",
          report.cache_name,
          report.stored.len()
        );
        for url in &report.stored {
          println!("  {}", url);
        }
      }
      None => println!("Installed {}", self.cache_name),
    }
    Ok(())
  }

  pub async fn activate(&self, force: bool) -> Result<()> {
    let report = self.host.activate(force).await?;
    println!("Activated {}", self.cache_name);

    if let Some(report) = report {
      for name in &report.deleted {
        println!("  deleted {}", name);
      }
      for (name, reason) in &report.failed {
        println!("  could not delete {}: {}", name, reason);
      }
      if let Some(reason) = &report.enumerate_error {
        println!("  skipped cleanup, could not list caches: {}", reason);
      }
      if report.claimed {
        println!("  claimed open clients");
      }
    }
    Ok(())
  }

  /// Install, then activate immediately.
  pub async fn deploy(&self) -> Result<()> {
    self.install().await?;
    self.activate(false).await
  }

  pub async fn fetch(
    &self,
    target: &str,
    method: &str,
    headers: &[String],
    output: Option<&Path>,
  ) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
    let mut request = Request::new(method, self.config.resolve_url(target)?);
    for header in headers {
      let (name, value) = parse_header(header)?;
      request = request.with_header(name, value);
    }

    self.ensure_in_control().await?;
    let served = self.host.handle_request(request).await?;
    let route = match &served.route {
      Route::Cache { cache_name } => format!("cache ({})", cache_name),
      Route::Network => "network".to_string(),
      Route::PassThrough => "passthrough".to_string(),
    };
    eprintln!("{} via {}", served.response.status, route);
    if let Some(cached_at) = served.cached_at {
      eprintln!("cached at {}", cached_at.to_rfc3339());
    }
    if let Some(content_type) = served.response.header("content-type") {
      eprintln!("content-type: {}", content_type);
    }

    match output {
      Some(path) => tokio::fs::write(path, &served.response.body)
        .await
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
      None => {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&served.response.body).await?;
        stdout.flush().await?;
      }
    }
    Ok(())
  }

  /// An ephemeral run starts with nothing registered, so bring the configured
  /// version into control before routing a request through it.
  async fn ensure_in_control(&self) -> Result<()> {
    if !self.ephemeral || self.host.controls_clients()? {
      return Ok(());
    }
    info!(cache = %self.cache_name, "ephemeral run, installing and activating first");
    self.host.register().await?;
    self.host.activate(false).await?;
    Ok(())
  }

  /// Look a URL up without touching the network.
  pub fn lookup(&self, target: &str, cache: Option<&str>) -> Result<()> {
    let key = crate::http::cache_key(&self.config.resolve_url(target)?);
    let hit = match cache {
      Some(name) => self.storage.match_in(name, &key)?,
      None => self.storage.match_any(&key)?,
    };

    match hit {
      Some(cached) => println!(
        "{} -> {} (status {}, {} bytes, cached {})",
        key,
        cached.cache_name,
        cached.response.status,
        cached.response.body.len(),
        cached.cached_at.to_rfc3339()
      ),
      None => return Err(eyre!("{} is not cached", key)),
    }
    Ok(())
  }

  pub fn caches(&self) -> Result<()> {
    let keys = self.storage.keys()?;
    if keys.is_empty() {
      println!("No caches");
    }
    for name in keys {
      let marker = if name == self.cache_name { "*" } else { " " };
      let count = self.storage.entries(&name)?.len();
      println!("{} {} ({} entries)", marker, name, count);
    }
    Ok(())
  }

  pub fn status(&self) -> Result<()> {
    let records = self.registration.all()?;
    if records.is_empty() {
      println!("No worker versions registered");
    }
    for record in records {
      let mut flags = Vec::new();
      if record.skip_waiting {
        flags.push("skip-waiting");
      }
      if record.claimed {
        flags.push("claimed");
      }
      println!(
        "{:<16} {:<11} {:<24} {}",
        record.version,
        record.state,
        flags.join(","),
        record.updated_at.to_rfc3339()
      );
    }
    Ok(())
  }
}

/// Parse a "Name: value" header argument.
fn parse_header(raw: &str) -> Result<(String, String)> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| eyre!("Invalid header '{}', expected 'Name: value'", raw))?;
  let name = name.trim();
  if name.is_empty() {
    return Err(eyre!("Invalid header '{}': empty name", raw));
  }
  Ok((name.to_string(), value.trim().to_string()))
}
