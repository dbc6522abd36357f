//! On-disk snapshot of a replay engine.
//!
//! Layout under the configured replay directory:
//!
//!   state.json     the reconstructor's four record streams (`ReplayLog`)
//!   timeline.json  `{ saved_at, event_count, events }`
//!
//! Each file is written to a `.tmp` sibling and renamed into place, so a
//! crash mid-save leaves the previous snapshot readable.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use sator_contracts::{
    error::{SatorError, SatorResult},
    timeline::TimelineEvent,
};

use crate::{engine::ReplayEngine, state::ReplayLog};

const STATE_FILE: &str = "state.json";
const TIMELINE_FILE: &str = "timeline.json";

#[derive(Debug, Serialize, Deserialize)]
struct TimelineFile {
    saved_at: DateTime<Utc>,
    event_count: usize,
    events: Vec<TimelineEvent>,
}

pub struct ReplayStore {
    dir: PathBuf,
}

impl ReplayStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a saved snapshot exists.
    pub fn exists(&self) -> bool {
        self.dir.join(STATE_FILE).exists()
    }

    /// Write the engine's records and timeline, replacing any earlier snapshot.
    pub fn save(&self, engine: &ReplayEngine) -> SatorResult<()> {
        let log = engine.export_log()?;
        let events = engine.timeline().export_events()?;

        fs::create_dir_all(&self.dir).map_err(|e| SatorError::PersistenceFailed {
            reason: format!("failed to create '{}': {}", self.dir.display(), e),
        })?;
        write_json(&self.dir.join(STATE_FILE), &log)?;
        write_json(
            &self.dir.join(TIMELINE_FILE),
            &TimelineFile {
                saved_at: Utc::now(),
                event_count: events.len(),
                events,
            },
        )?;

        info!(
            dir = %self.dir.display(),
            telemetry_points = log.telemetry.len(),
            trust_updates = log.trust_updates.len(),
            contradictions = log.contradictions.len(),
            mode_transitions = log.mode_transitions.len(),
            "replay snapshot saved"
        );
        Ok(())
    }

    /// Replace the engine's contents with the saved snapshot.
    ///
    /// Returns `Ok(false)` and leaves the engine untouched when nothing has
    /// been saved. A missing timeline file means an empty timeline.
    pub fn load_into(&self, engine: &ReplayEngine) -> SatorResult<bool> {
        let state_path = self.dir.join(STATE_FILE);
        if !state_path.exists() {
            debug!(dir = %self.dir.display(), "no replay snapshot to load");
            return Ok(false);
        }
        let log: ReplayLog = read_json(&state_path)?;

        let timeline_path = self.dir.join(TIMELINE_FILE);
        let events = if timeline_path.exists() {
            read_json::<TimelineFile>(&timeline_path)?.events
        } else {
            Vec::new()
        };

        engine.restore(log, events)?;
        info!(dir = %self.dir.display(), "replay snapshot loaded");
        Ok(true)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> SatorResult<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)
        .and_then(|_| fs::rename(&tmp_path, path))
        .map_err(|e| SatorError::PersistenceFailed {
            reason: format!("failed to write '{}': {}", path.display(), e),
        })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SatorResult<T> {
    let data = fs::read(path).map_err(|e| SatorError::PersistenceFailed {
        reason: format!("failed to read '{}': {}", path.display(), e),
    })?;
    serde_json::from_slice(&data).map_err(|e| SatorError::Serialization {
        reason: format!("{}: {}", path.display(), e),
    })
}
