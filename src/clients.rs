//! Client notification API and the host's record of worker versions.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::db::Database;

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  /// Installed and waiting to activate
  Installed,
  Activating,
  /// In control of clients
  Activated,
  /// Failed to install or superseded
  Redundant,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "installing" => Ok(Self::Installing),
      "installed" => Ok(Self::Installed),
      "activating" => Ok(Self::Activating),
      "activated" => Ok(Self::Activated),
      "redundant" => Ok(Self::Redundant),
      other => Err(eyre!("Unknown worker state '{}'", other)),
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Signals a worker sends to its host about the clients it controls.
pub trait ClientControl: Send + Sync {
  /// Make the installed version eligible for activation right away.
  fn skip_waiting(&self, version: &str) -> Result<()>;

  /// Take control of every open client.
  fn claim(&self, version: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
  pub version: String,
  pub state: WorkerState,
  pub skip_waiting: bool,
  pub claimed: bool,
  pub updated_at: DateTime<Utc>,
}

impl VersionRecord {
  fn new(version: &str, state: WorkerState) -> Self {
    Self {
      version: version.to_string(),
      state,
      skip_waiting: false,
      claimed: false,
      updated_at: Utc::now(),
    }
  }
}

enum Backing {
  Memory(Mutex<Vec<VersionRecord>>),
  Sqlite(Arc<Database>),
}

/// Host-side registration: which versions exist and which one is in control.
pub struct Registration {
  backing: Backing,
}

impl Registration {
  pub fn in_memory() -> Self {
    Self {
      backing: Backing::Memory(Mutex::new(Vec::new())),
    }
  }

  pub fn persistent(db: Arc<Database>) -> Self {
    Self {
      backing: Backing::Sqlite(db),
    }
  }

  /// Every known version, oldest first.
  pub fn all(&self) -> Result<Vec<VersionRecord>> {
    match &self.backing {
      Backing::Memory(records) => Ok(
        records
          .lock()
          .map_err(|e| eyre!("Lock poisoned: {}", e))?
          .clone(),
      ),
      Backing::Sqlite(db) => {
        let conn = db.lock()?;
        let mut stmt = conn
          .prepare(
            "SELECT version, state, skip_waiting, claimed, updated_at
             FROM registrations ORDER BY rowid",
          )
          .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

        let rows = stmt
          .query_map([], |row| {
            Ok((
              row.get::<_, String>(0)?,
              row.get::<_, String>(1)?,
              row.get::<_, bool>(2)?,
              row.get::<_, bool>(3)?,
              row.get::<_, String>(4)?,
            ))
          })
          .map_err(|e| eyre!("Failed to read registrations: {}", e))?
          .collect::<rusqlite::Result<Vec<_>>>()
          .map_err(|e| eyre!("Failed to read registration row: {}", e))?;

        rows
          .into_iter()
          .map(
            |(version, state, skip_waiting, claimed, updated_at)| -> Result<VersionRecord> {
              Ok(VersionRecord {
                version,
                state: WorkerState::parse(&state)?,
                skip_waiting,
                claimed,
                updated_at: DateTime::parse_from_rfc3339(&updated_at)
                  .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", updated_at, e))?
                  .with_timezone(&Utc),
              })
            },
          )
          .collect()
      }
    }
  }

  fn save(&self, record: &VersionRecord) -> Result<()> {
    match &self.backing {
      Backing::Memory(records) => {
        let mut records = records.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
        match records.iter_mut().find(|r| r.version == record.version) {
          Some(existing) => *existing = record.clone(),
          None => records.push(record.clone()),
        }
        Ok(())
      }
      Backing::Sqlite(db) => {
        db.lock()?
          .execute(
            "INSERT INTO registrations (version, state, skip_waiting, claimed, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(version) DO UPDATE SET
               state = ?2, skip_waiting = ?3, claimed = ?4, updated_at = ?5",
            params![
              record.version,
              record.state.as_str(),
              record.skip_waiting,
              record.claimed,
              record.updated_at.to_rfc3339()
            ],
          )
          .map_err(|e| eyre!("Failed to save registration {}: {}", record.version, e))?;
        Ok(())
      }
    }
  }

  pub fn get(&self, version: &str) -> Result<Option<VersionRecord>> {
    Ok(self.all()?.into_iter().find(|r| r.version == version))
  }

  /// The version currently in control, if any.
  pub fn active(&self) -> Result<Option<VersionRecord>> {
    Ok(
      self
        .all()?
        .into_iter()
        .find(|r| r.state == WorkerState::Activated),
    )
  }

  /// Start installing `version`, resetting any earlier record of it.
  pub fn begin_install(&self, version: &str) -> Result<()> {
    self.save(&VersionRecord::new(version, WorkerState::Installing))
  }

  pub fn set_state(&self, version: &str, state: WorkerState) -> Result<()> {
    self.update(version, |record| record.state = state)
  }

  /// Put `version` in control; the previously active version becomes redundant.
  pub fn promote(&self, version: &str) -> Result<()> {
    for mut record in self.all()? {
      if record.version != version && record.state == WorkerState::Activated {
        record.state = WorkerState::Redundant;
        record.claimed = false;
        record.updated_at = Utc::now();
        self.save(&record)?;
      }
    }
    self.set_state(version, WorkerState::Activated)
  }

  fn update(&self, version: &str, f: impl FnOnce(&mut VersionRecord)) -> Result<()> {
    let mut record = self
      .get(version)?
      .ok_or_else(|| eyre!("Version {} is not registered", version))?;
    f(&mut record);
    record.updated_at = Utc::now();
    self.save(&record)
  }
}

impl ClientControl for Registration {
  fn skip_waiting(&self, version: &str) -> Result<()> {
    self.update(version, |record| record.skip_waiting = true)
  }

  fn claim(&self, version: &str) -> Result<()> {
    for mut record in self.all()? {
      if record.version != version && record.claimed {
        record.claimed = false;
        self.save(&record)?;
      }
    }
    self.update(version, |record| record.claimed = true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn backends() -> Vec<(&'static str, Registration)> {
    vec![
      ("memory", Registration::in_memory()),
      (
        "sqlite",
        Registration::persistent(Arc::new(Database::open_in_memory().unwrap())),
      ),
    ]
  }

  #[test]
  fn test_state_round_trip_names() {
    for state in [
      WorkerState::Installing,
      WorkerState::Installed,
      WorkerState::Activating,
      WorkerState::Activated,
      WorkerState::Redundant,
    ] {
      assert_eq!(WorkerState::parse(state.as_str()).unwrap(), state);
    }
    assert!(WorkerState::parse("sleeping").is_err());
  }

  #[test]
  fn test_begin_install_registers_version() {
    for (backend, registration) in backends() {
      registration.begin_install("v1").unwrap();
      let record = registration.get("v1").unwrap().unwrap();
      assert_eq!(record.state, WorkerState::Installing, "{}", backend);
      assert!(!record.skip_waiting);
      assert!(!record.claimed);
    }
  }

  #[test]
  fn test_skip_waiting_and_claim() {
    for (backend, registration) in backends() {
      registration.begin_install("v1").unwrap();
      registration.skip_waiting("v1").unwrap();
      registration.claim("v1").unwrap();

      let record = registration.get("v1").unwrap().unwrap();
      assert!(record.skip_waiting, "{}", backend);
      assert!(record.claimed, "{}", backend);
    }
  }

  #[test]
  fn test_signals_for_unknown_version_fail() {
    for (backend, registration) in backends() {
      assert!(registration.skip_waiting("ghost").is_err(), "{}", backend);
      assert!(registration.claim("ghost").is_err(), "{}", backend);
    }
  }

  #[test]
  fn test_promote_retires_previous_version() {
    for (backend, registration) in backends() {
      registration.begin_install("v1").unwrap();
      registration.promote("v1").unwrap();
      registration.claim("v1").unwrap();

      registration.begin_install("v2").unwrap();
      registration.set_state("v2", WorkerState::Installed).unwrap();
      assert_eq!(
        registration.active().unwrap().unwrap().version,
        "v1",
        "{}",
        backend
      );

      registration.promote("v2").unwrap();
      registration.claim("v2").unwrap();

      let v1 = registration.get("v1").unwrap().unwrap();
      assert_eq!(v1.state, WorkerState::Redundant, "{}", backend);
      assert!(!v1.claimed);
      assert_eq!(registration.active().unwrap().unwrap().version, "v2");

      let versions: Vec<String> = registration
        .all()
        .unwrap()
        .into_iter()
        .map(|r| r.version)
        .collect();
      assert_eq!(versions, vec!["v1", "v2"]);
    }
  }
}
