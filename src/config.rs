use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::manifest::{AssetManifest, Version};

/// Environment variable that overrides the configured version identifier.
pub const VERSION_ENV: &str = "SWCACHE_VERSION";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL every manifest path and fetched URL is resolved against
  pub origin: String,
  /// Version identifier; derived from the manifest when absent
  pub version: Option<String>,
  #[serde(default)]
  pub manifest: ManifestConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub network: NetworkConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestConfig {
  /// Application bundle outputs
  #[serde(default)]
  pub build: Vec<String>,
  /// Static files
  #[serde(default)]
  pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database path (default: $XDG_DATA_HOME/swcache/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkConfig {
  /// Per-request timeout. Requests never time out when unset.
  pub timeout_secs: Option<u64>,
  pub user_agent: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/swcache/config.yaml\n\
                 See swcache.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.origin_url()?;
    Ok(config)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a path or absolute URL against the origin.
  pub fn resolve_url(&self, target: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(target)
      .map_err(|e| eyre!("Invalid URL '{}': {}", target, e))
  }

  pub fn asset_manifest(&self) -> Result<AssetManifest> {
    AssetManifest::resolve(
      &self.origin_url()?,
      &self.manifest.build,
      &self.manifest.files,
    )
  }

  /// Version identifier: $SWCACHE_VERSION, then the config file, then the
  /// manifest fingerprint.
  pub fn version(&self, manifest: &AssetManifest) -> Result<Version> {
    self.resolve_version(manifest, std::env::var(VERSION_ENV).ok())
  }

  fn resolve_version(&self, manifest: &AssetManifest, env: Option<String>) -> Result<Version> {
    match env.or_else(|| self.version.clone()) {
      Some(v) => Version::new(v),
      None => Ok(manifest.fingerprint()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
origin: http://localhost:5173
version: v1
manifest:
  build:
    - /app.js
  files:
    - /app.css
storage:
  path: /tmp/swcache-test.db
network:
  timeout_secs: 30
"#;

  #[test]
  fn test_parse_full_config() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.version.as_deref(), Some("v1"));
    assert_eq!(config.manifest.build, vec!["/app.js"]);
    assert_eq!(config.manifest.files, vec!["/app.css"]);
    assert_eq!(
      config.storage.path.as_deref(),
      Some(Path::new("/tmp/swcache-test.db"))
    );
    assert_eq!(config.network.timeout_secs, Some(30));
    assert!(config.network.user_agent.is_none());
  }

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml("origin: http://localhost:5173\n").unwrap();
    assert!(config.version.is_none());
    assert!(config.manifest.build.is_empty());
    assert!(config.storage.path.is_none());
    assert!(config.network.timeout_secs.is_none());
  }

  #[test]
  fn test_invalid_origin_rejected() {
    assert!(Config::from_yaml("origin: not a url\n").is_err());
  }

  #[test]
  fn test_missing_explicit_file() {
    let err = Config::load(Some(Path::new("/nonexistent/swcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("swcache.yaml");
    std::fs::write(&path, SAMPLE).unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.origin, "http://localhost:5173");
  }

  #[test]
  fn test_manifest_resolution() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let manifest = config.asset_manifest().unwrap();
    let urls: Vec<&str> = manifest.iter().map(Url::as_str).collect();
    assert_eq!(
      urls,
      vec!["http://localhost:5173/app.js", "http://localhost:5173/app.css"]
    );
  }

  #[test]
  fn test_resolve_url() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(
      config.resolve_url("/api/data").unwrap().as_str(),
      "http://localhost:5173/api/data"
    );
    assert_eq!(
      config.resolve_url("https://cdn.example.com/x.js").unwrap().as_str(),
      "https://cdn.example.com/x.js"
    );
  }

  #[test]
  fn test_version_precedence() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    let manifest = config.asset_manifest().unwrap();

    let from_env = config
      .resolve_version(&manifest, Some("v9".to_string()))
      .unwrap();
    assert_eq!(from_env.as_str(), "v9");

    let from_file = config.resolve_version(&manifest, None).unwrap();
    assert_eq!(from_file.as_str(), "v1");

    let unversioned = Config {
      version: None,
      ..config
    };
    let derived = unversioned.resolve_version(&manifest, None).unwrap();
    assert_eq!(derived, manifest.fingerprint());
  }
}
