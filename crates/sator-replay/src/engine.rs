//! `ReplayEngine`: the forensic-review facade over the state reconstructor
//! and the timeline index.
//!
//! Producers record into the engine from any thread; readers reconstruct
//! concurrently. The reconstructor sits behind an `RwLock` so queries do not
//! serialize against each other, only against writes.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::info;

use sator_contracts::{
    error::{SatorError, SatorResult},
    events::{Contradiction, OperationalMode, SystemState, TrustUpdate},
    telemetry::TelemetryPoint,
    time::parse_timestamp,
    timeline::TimelineEvent,
};

use crate::{
    state::{ReconstructorSnapshot, ReplayLog, StateReconstructor},
    timeline::{TimelineIndexer, TimelineQuery},
};

pub struct ReplayEngine {
    reconstructor: RwLock<StateReconstructor>,
    timeline: TimelineIndexer,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::with_default_limit(TimelineIndexer::DEFAULT_LIMIT)
    }

    /// An engine whose timeline queries return at most `default_limit`
    /// events unless the query says otherwise.
    pub fn with_default_limit(default_limit: usize) -> Self {
        Self {
            reconstructor: RwLock::new(StateReconstructor::new()),
            timeline: TimelineIndexer::with_default_limit(default_limit),
        }
    }

    fn read(&self) -> SatorResult<RwLockReadGuard<'_, StateReconstructor>> {
        self.reconstructor.read().map_err(|e| SatorError::LockPoisoned {
            reason: format!("state reconstructor lock poisoned: {}", e),
        })
    }

    fn write(&self) -> SatorResult<RwLockWriteGuard<'_, StateReconstructor>> {
        self.reconstructor.write().map_err(|e| SatorError::LockPoisoned {
            reason: format!("state reconstructor lock poisoned: {}", e),
        })
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    pub fn record_telemetry(&self, point: TelemetryPoint) -> SatorResult<()> {
        self.write()?.record_telemetry(point);
        Ok(())
    }

    pub fn record_trust_update(&self, update: TrustUpdate) -> SatorResult<()> {
        self.write()?.record_trust_update(update);
        Ok(())
    }

    pub fn record_contradiction(&self, contradiction: Contradiction) -> SatorResult<()> {
        self.write()?.record_contradiction(contradiction);
        Ok(())
    }

    pub fn resolve_contradiction(&self, contradiction_id: &str, at: DateTime<Utc>) -> SatorResult<bool> {
        Ok(self.write()?.resolve_contradiction(contradiction_id, at))
    }

    pub fn record_mode_transition(
        &self,
        timestamp: DateTime<Utc>,
        mode: OperationalMode,
        trigger: Option<String>,
    ) -> SatorResult<()> {
        self.write()?.record_mode_transition(timestamp, mode, trigger);
        Ok(())
    }

    pub fn index_event(&self, event: TimelineEvent) -> SatorResult<String> {
        self.timeline.index(event)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Reconstruct the state at an ISO-8601 instant.
    ///
    /// A malformed instant is `SatorError::InvalidTimestamp`, the client-error
    /// signal for callers.
    pub fn state_at(&self, timestamp: &str) -> SatorResult<SystemState> {
        let at = parse_timestamp(timestamp)?;
        self.state_at_time(at)
    }

    pub fn state_at_time(&self, at: DateTime<Utc>) -> SatorResult<SystemState> {
        Ok(self.read()?.reconstruct(at))
    }

    pub fn timeline_events(&self, query: &TimelineQuery) -> SatorResult<Vec<TimelineEvent>> {
        self.timeline.get_events(query)
    }

    pub fn timeline(&self) -> &TimelineIndexer {
        &self.timeline
    }

    pub fn snapshot(&self) -> SatorResult<ReconstructorSnapshot> {
        Ok(self.read()?.snapshot())
    }

    /// Every recorded item, for saving.
    pub fn export_log(&self) -> SatorResult<ReplayLog> {
        Ok(self.read()?.export_log())
    }

    /// Replace all recorded state and indexed events with saved ones.
    pub fn restore(&self, log: ReplayLog, events: Vec<TimelineEvent>) -> SatorResult<()> {
        let rebuilt = StateReconstructor::from_log(log);
        *self.write()? = rebuilt;
        self.timeline.replace_events(events)
    }

    /// Drop all recorded state and indexed events.
    pub fn clear(&self) -> SatorResult<()> {
        self.write()?.clear();
        self.timeline.clear()?;
        info!("replay state cleared");
        Ok(())
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}
