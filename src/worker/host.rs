//! Host side of the worker lifecycle: registration, activation and request routing.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::dispatch::{Dispatcher, EventOutcome, WorkerEvent};
use super::lifecycle::{ActivateReport, FetchOutcome, InstallReport};
use crate::cache::CacheSource;
use crate::clients::{Registration, WorkerState};
use crate::http::{Request, Response};
use crate::network::Network;

/// How a request ended up being answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
  /// The worker answered from a cache store
  Cache { cache_name: String },
  /// The worker answered from the network after a miss
  Network,
  /// The worker did not answer; the host went to the network itself
  PassThrough,
}

#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub route: Route,
  pub cached_at: Option<DateTime<Utc>>,
}

/// Drives one worker version through its host-side lifecycle.
pub struct WorkerHost {
  dispatcher: Dispatcher,
  registration: Arc<Registration>,
  network: Arc<dyn Network>,
}

impl WorkerHost {
  pub fn new(
    dispatcher: Dispatcher,
    registration: Arc<Registration>,
    network: Arc<dyn Network>,
  ) -> Self {
    Self {
      dispatcher,
      registration,
      network,
    }
  }

  fn version(&self) -> &str {
    self.dispatcher.context().version().as_str()
  }

  /// Register the worker version and run its install handler.
  ///
  /// On failure the version becomes redundant and whatever version was
  /// active stays in control. Re-registering the active version refreshes
  /// its store but never takes it out of control.
  pub async fn register(&self) -> Result<Option<InstallReport>> {
    let version = self.version();
    let already_active = self
      .registration
      .get(version)?
      .is_some_and(|record| record.state == WorkerState::Activated);

    if already_active {
      info!(version, "version already active, refreshing its cache");
    } else {
      self.registration.begin_install(version)?;
    }

    let Some(pending) = self.dispatcher.dispatch(WorkerEvent::Install) else {
      if !already_active {
        self.registration.set_state(version, WorkerState::Installed)?;
      }
      return Ok(None);
    };

    debug!(version, event = %pending.kind(), "waiting on handler");
    match pending.wait_until().await {
      Ok(outcome) => {
        if !already_active {
          self.registration.set_state(version, WorkerState::Installed)?;
        }
        info!(version, "installed");
        match outcome {
          EventOutcome::Installed(report) => Ok(Some(report)),
          _ => Ok(None),
        }
      }
      Err(e) if already_active => {
        warn!(version, error = %e, "refresh failed, active version keeps its cache");
        Err(eyre!("Reinstall of active version {} failed: {}", version, e))
      }
      Err(e) => {
        error!(version, fatal = e.is_install_fatal(), error = %e, "install failed");
        self.registration.set_state(version, WorkerState::Redundant)?;
        Err(eyre!("Install of version {} failed: {}", version, e))
      }
    }
  }

  /// Whether the installed version may activate now: nothing else is in
  /// control, or it asked to skip waiting.
  pub fn can_activate(&self) -> Result<bool> {
    let version = self.version();
    let record = self
      .registration
      .get(version)?
      .ok_or_else(|| eyre!("Version {} is not registered", version))?;

    let other_active = self
      .registration
      .active()?
      .is_some_and(|active| active.version != version);

    Ok(record.skip_waiting || !other_active)
  }

  /// Run the activate handler and put this version in control.
  ///
  /// `force` activates even when the version is waiting on another one.
  pub async fn activate(&self, force: bool) -> Result<Option<ActivateReport>> {
    let version = self.version();
    let record = self
      .registration
      .get(version)?
      .ok_or_else(|| eyre!("Version {} is not registered; run install first", version))?;

    match record.state {
      WorkerState::Installed | WorkerState::Activated => {}
      state => {
        return Err(eyre!(
          "Version {} is {} and cannot be activated",
          version,
          state
        ))
      }
    }

    if !force && !self.can_activate()? {
      return Err(eyre!(
        "Version {} is waiting for the active version to release its clients",
        version
      ));
    }

    let previous = record.state;
    self
      .registration
      .set_state(version, WorkerState::Activating)?;

    let Some(pending) = self.dispatcher.dispatch(WorkerEvent::Activate) else {
      self.registration.promote(version)?;
      return Ok(None);
    };

    debug!(version, event = %pending.kind(), "waiting on handler");
    match pending.wait_until().await {
      Ok(outcome) => {
        self.registration.promote(version)?;
        info!(version, "activated");
        match outcome {
          EventOutcome::Activated(report) => Ok(Some(report)),
          _ => Ok(None),
        }
      }
      Err(e) => {
        self.registration.set_state(version, previous)?;
        Err(eyre!("Activation of version {} failed: {}", version, e))
      }
    }
  }

  /// Whether fetch events go to this version.
  pub fn controls_clients(&self) -> Result<bool> {
    Ok(
      self
        .registration
        .active()?
        .is_some_and(|active| active.version == self.version()),
    )
  }

  /// Route one request from a page: through the fetch handler when this
  /// version is in control, otherwise straight to the network.
  pub async fn handle_request(&self, request: Request) -> Result<Served> {
    if self.controls_clients()? {
      if let Some(pending) = self
        .dispatcher
        .dispatch(WorkerEvent::Fetch(request.clone()))
      {
        match pending.wait_until().await? {
          EventOutcome::Fetched(FetchOutcome::Respond(result)) => {
            let route = match result.source {
              CacheSource::Cache { cache_name } => Route::Cache { cache_name },
              CacheSource::Network => Route::Network,
            };
            return Ok(Served {
              response: result.response,
              route,
              cached_at: result.cached_at,
            });
          }
          EventOutcome::Fetched(FetchOutcome::PassThrough) => {}
          other => return Err(eyre!("Unexpected fetch outcome: {:?}", other)),
        }
      }
    }

    let response = self.network.fetch(&request).await?;
    Ok(Served {
      response,
      route: Route::PassThrough,
      cached_at: None,
    })
  }
}
