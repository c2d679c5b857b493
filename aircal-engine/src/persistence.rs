//! Versioned Persistence for Engine State
//!
//! ## File Schema
//!
//! One JSON document per climate entity:
//!
//! ```json
//! {
//!   "version": "2.1",
//!   "entity_id": "climate.living_room",
//!   "last_updated": "2026-08-06T12:00:00+00:00",
//!   "learning_data": {
//!     "engine_state": { "enable_learning": true },
//!     "learner_data": { "samples": [] },
//!     "hysteresis_data": { "start_temps": [], "stop_temps": [] },
//!     "seasonal_data": null
//!   },
//!   "thermal_data": null
//! }
//! ```
//!
//! Legacy documents (no `version` key, or a version other than "2.1") are
//! read as if the whole payload were the `learning_data` object, with
//! seasonal data absent. Migration is lazy: old data is accepted on load
//! and only rewritten in the current shape on the next save.
//!
//! ## Save Discipline
//!
//! Each save first copies the previous file to `<path>.backup`, then
//! writes the new document to `<path>.tmp` and renames it into place.
//! The rename makes the save atomic from the caller's perspective; the
//! backup is best-effort and not transactional with it. Failed saves
//! increment a counter and log, they never raise.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use thiserror_no_std::Error;

use crate::engine::{EngineSnapshot, PersistedState};

/// Schema version written by this coordinator
pub const SCHEMA_VERSION: &str = "2.1";

/// Persistence failures; logged and counted, never propagated to the host
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Filesystem error while reading or writing state
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document could not be serialized or parsed
    #[error("schema error: {detail}")]
    Schema {
        /// What went wrong
        detail: String,
    },
}

/// Saves and restores one climate entity's engine state
pub struct PersistenceCoordinator {
    path: PathBuf,
    entity_id: String,
    failed_saves: u32,
    last_save_latency_ms: Option<u64>,
}

impl PersistenceCoordinator {
    /// Coordinator writing to `path` for `entity_id`
    pub fn new(path: impl Into<PathBuf>, entity_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entity_id: entity_id.into(),
            failed_saves: 0,
            last_save_latency_ms: None,
        }
    }

    /// File this coordinator owns
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of saves that have failed since construction
    pub fn failed_saves(&self) -> u32 {
        self.failed_saves
    }

    /// Duration of the most recent successful save
    pub fn last_save_latency_ms(&self) -> Option<u64> {
        self.last_save_latency_ms
    }

    /// Persist a snapshot; returns the save latency in milliseconds
    ///
    /// On failure the failed-save counter is incremented and the error
    /// returned for logging; the previous file (and its backup) remain.
    pub fn save(
        &mut self,
        snapshot: &EngineSnapshot,
        thermal_data: Option<Value>,
    ) -> Result<u64, PersistenceError> {
        let started = Instant::now();

        match self.save_inner(snapshot, thermal_data) {
            Ok(()) => {
                let latency = started.elapsed().as_millis() as u64;
                self.last_save_latency_ms = Some(latency);
                Ok(latency)
            }
            Err(err) => {
                self.failed_saves += 1;
                log::warn!(
                    "failed to save state for {} ({} failures so far): {}",
                    self.entity_id,
                    self.failed_saves,
                    err
                );
                Err(err)
            }
        }
    }

    fn save_inner(
        &self,
        snapshot: &EngineSnapshot,
        thermal_data: Option<Value>,
    ) -> Result<(), PersistenceError> {
        let document = json!({
            "version": SCHEMA_VERSION,
            "entity_id": self.entity_id,
            "last_updated": Utc::now().to_rfc3339(),
            "learning_data": {
                "engine_state": { "enable_learning": snapshot.enable_learning },
                "learner_data": snapshot.learner_data,
                "hysteresis_data": snapshot.hysteresis_data.clone().unwrap_or(Value::Null),
                "seasonal_data": snapshot.seasonal_data.clone().unwrap_or(Value::Null),
            },
            "thermal_data": thermal_data.unwrap_or(Value::Null),
        });

        let bytes = serde_json::to_vec_pretty(&document).map_err(|e| PersistenceError::Schema {
            detail: e.to_string(),
        })?;

        // Best-effort backup of whatever is currently on disk
        if self.path.exists() {
            let backup = self.backup_path();
            if let Err(err) = fs::copy(&self.path, &backup) {
                log::warn!("backup write failed, continuing with save: {}", err);
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }

    /// Load persisted state, migrating legacy schemas lazily
    ///
    /// Any I/O or parse failure returns `None` so the caller keeps its
    /// in-memory state.
    pub fn load(&self) -> Option<PersistedState> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to read state for {}: {}", self.entity_id, err);
                }
                return None;
            }
        };

        let document: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("corrupt state file for {}: {}", self.entity_id, err);
                return None;
            }
        };

        let top = document.as_object()?;

        let is_current = top
            .get("version")
            .and_then(Value::as_str)
            .map(|v| v == SCHEMA_VERSION)
            .unwrap_or(false);

        if is_current {
            let learning = top.get("learning_data");
            Some(PersistedState {
                enable_learning: learning
                    .and_then(|l| l.get("engine_state"))
                    .and_then(|e| e.get("enable_learning"))
                    .and_then(Value::as_bool),
                learner_data: learning.and_then(|l| l.get("learner_data")).cloned(),
                hysteresis_data: learning
                    .and_then(|l| l.get("hysteresis_data"))
                    .filter(|v| !v.is_null())
                    .cloned(),
                seasonal_data: learning
                    .and_then(|l| l.get("seasonal_data"))
                    .filter(|v| !v.is_null())
                    .cloned(),
                thermal_data: top
                    .get("thermal_data")
                    .filter(|v| !v.is_null())
                    .cloned(),
            })
        } else {
            // v1/v2 file: the payload itself is the learning data
            log::info!(
                "legacy state file for {}, migrating on next save",
                self.entity_id
            );
            Some(PersistedState {
                enable_learning: top
                    .get("engine_state")
                    .and_then(|e| e.get("enable_learning"))
                    .and_then(Value::as_bool),
                learner_data: top.get("learner_data").cloned(),
                hysteresis_data: top
                    .get("hysteresis_data")
                    .filter(|v| !v.is_null())
                    .cloned(),
                seasonal_data: None,
                thermal_data: None,
            })
        }
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
