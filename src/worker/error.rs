use thiserror::Error;

use super::dispatch::EventKind;
use crate::network::NetworkError;

/// Failures surfaced by worker event handlers.
///
/// Asset failures are fatal to install. Stale-cache deletion failures are
/// not errors at all; they are reported in `ActivateReport`.
#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("Failed to fetch asset {url}: {source}")]
  AssetFetch {
    url: String,
    #[source]
    source: NetworkError,
  },

  #[error("Asset {url} returned status {status}")]
  AssetStatus { url: String, status: u16 },

  #[error("Cache storage error: {0}")]
  Storage(color_eyre::Report),

  #[error("Client control error: {0}")]
  Clients(color_eyre::Report),

  #[error(transparent)]
  Network(#[from] NetworkError),

  #[error("{kind} handler did not complete: {reason}")]
  Aborted { kind: EventKind, reason: String },
}

impl From<color_eyre::Report> for WorkerError {
  fn from(report: color_eyre::Report) -> Self {
    Self::Storage(report)
  }
}

impl WorkerError {
  /// True when the error means a new version must not be installed.
  pub fn is_install_fatal(&self) -> bool {
    matches!(
      self,
      Self::AssetFetch { .. } | Self::AssetStatus { .. } | Self::Storage(_)
    )
  }
}
