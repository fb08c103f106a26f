//! Asset manifest and version identifier for a worker build.

use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Prefix of every cache store name.
pub const CACHE_PREFIX: &str = "cache-";

/// Number of hex digits kept when deriving a version from the manifest.
const FINGERPRINT_LEN: usize = 12;

/// Opaque identifier of a worker build. Names the build's cache store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
  pub fn new(version: impl Into<String>) -> Result<Self> {
    let version = version.into();
    if version.trim().is_empty() {
      return Err(eyre!("Version identifier must not be empty"));
    }
    Ok(Self(version))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Name of the cache store owned by this version.
  pub fn cache_name(&self) -> String {
    format!("{}{}", CACHE_PREFIX, self.0)
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Ordered, de-duplicated list of every URL the application needs offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
  assets: Vec<Url>,
}

impl AssetManifest {
  /// Resolve bundle outputs followed by static files against `origin`.
  ///
  /// Later duplicates are dropped so the first occurrence keeps its position.
  pub fn resolve(origin: &Url, build: &[String], files: &[String]) -> Result<Self> {
    let mut assets: Vec<Url> = Vec::with_capacity(build.len() + files.len());

    for path in build.iter().chain(files) {
      if path.trim().is_empty() {
        return Err(eyre!("Manifest contains an empty asset path"));
      }
      let url = origin
        .join(path)
        .map_err(|e| eyre!("Invalid asset path '{}': {}", path, e))?;
      if !assets.contains(&url) {
        assets.push(url);
      }
    }

    Ok(Self { assets })
  }

  pub fn iter(&self) -> impl Iterator<Item = &Url> {
    self.assets.iter()
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  /// Version derived from the manifest contents.
  pub fn fingerprint(&self) -> Version {
    let mut hasher = Sha256::new();
    for (i, url) in self.assets.iter().enumerate() {
      if i > 0 {
        hasher.update(b"\n");
      }
      hasher.update(url.as_str().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    Version(digest[..FINGERPRINT_LEN].to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("http://localhost:5173/").unwrap()
  }

  fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_cache_name() {
    assert_eq!(Version::new("v1").unwrap().cache_name(), "cache-v1");
  }

  #[test]
  fn test_empty_version_rejected() {
    assert!(Version::new("  ").is_err());
  }

  #[test]
  fn test_build_then_files_order() {
    let manifest = AssetManifest::resolve(
      &origin(),
      &paths(&["/_app/immutable/app.js", "/_app/immutable/app.css"]),
      &paths(&["/favicon.png", "/manifest.json"]),
    )
    .unwrap();

    let urls: Vec<&str> = manifest.iter().map(Url::as_str).collect();
    assert_eq!(
      urls,
      vec![
        "http://localhost:5173/_app/immutable/app.js",
        "http://localhost:5173/_app/immutable/app.css",
        "http://localhost:5173/favicon.png",
        "http://localhost:5173/manifest.json",
      ]
    );
  }

  #[test]
  fn test_duplicates_keep_first_position() {
    let manifest = AssetManifest::resolve(
      &origin(),
      &paths(&["/app.js", "/app.css"]),
      &paths(&["/app.js", "/logo.svg"]),
    )
    .unwrap();
    assert_eq!(manifest.len(), 3);
  }

  #[test]
  fn test_empty_path_rejected() {
    assert!(AssetManifest::resolve(&origin(), &paths(&["/app.js", ""]), &[]).is_err());
  }

  #[test]
  fn test_fingerprint_tracks_manifest() {
    let a = AssetManifest::resolve(&origin(), &paths(&["/app.js"]), &[]).unwrap();
    let b = AssetManifest::resolve(&origin(), &paths(&["/app.js"]), &[]).unwrap();
    let c = AssetManifest::resolve(&origin(), &paths(&["/app.2.js"]), &[]).unwrap();

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_eq!(a.fingerprint().as_str().len(), FINGERPRINT_LEN);
  }
}
