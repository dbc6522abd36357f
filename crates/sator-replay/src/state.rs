//! Point-in-time reconstruction of the system's belief state.
//!
//! `StateReconstructor` keeps four independent, append-only logs:
//!
//!   telemetry (per tag) | trust updates | contradictions | mode transitions
//!
//! `reconstruct(T)` answers "what was known at T" using only records whose
//! own timestamp is `<= T`. Telemetry, trust updates and mode transitions
//! are kept sorted by timestamp, so the answer never depends on the order in
//! which producers delivered them. Records sharing a timestamp keep their
//! arrival order; the later one wins.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sator_contracts::{
    error::SatorResult,
    events::{Contradiction, ModeTransition, OperationalMode, SystemState, TrustUpdate},
    telemetry::TelemetryPoint,
    time::parse_timestamp,
};

/// Record counts per stream, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconstructorSnapshot {
    pub telemetry_tags: Vec<String>,
    pub telemetry_points: usize,
    pub trust_updates: usize,
    pub contradictions: usize,
    pub mode_transitions: usize,
}

/// Every recorded item of a reconstructor, in a form that survives a
/// restart. Feeding it back through `StateReconstructor::from_log` yields
/// the same answer for every `reconstruct(T)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplayLog {
    #[serde(default)]
    pub telemetry: Vec<TelemetryPoint>,
    #[serde(default)]
    pub trust_updates: Vec<TrustUpdate>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub mode_transitions: Vec<ModeTransition>,
}

#[derive(Debug, Clone, Default)]
pub struct StateReconstructor {
    telemetry: BTreeMap<String, Vec<TelemetryPoint>>,
    trust_updates: Vec<TrustUpdate>,
    contradictions: Vec<Contradiction>,
    mode_transitions: Vec<ModeTransition>,
}

/// Insert after every element with a timestamp `<= at`.
fn insert_sorted<T>(items: &mut Vec<T>, item: T, at: DateTime<Utc>, timestamp: impl Fn(&T) -> DateTime<Utc>) {
    let index = items.partition_point(|existing| timestamp(existing) <= at);
    items.insert(index, item);
}

/// Number of leading elements with a timestamp `<= at`.
fn count_at_or_before<T>(items: &[T], at: DateTime<Utc>, timestamp: impl Fn(&T) -> DateTime<Utc>) -> usize {
    items.partition_point(|item| timestamp(item) <= at)
}

impl StateReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Recording ─────────────────────────────────────────────────────────────

    pub fn record_telemetry(&mut self, point: TelemetryPoint) {
        let at = point.timestamp;
        let points = self.telemetry.entry(point.tag_id.clone()).or_default();
        insert_sorted(points, point, at, |p| p.timestamp);
    }

    pub fn record_trust_update(&mut self, update: TrustUpdate) {
        let at = update.timestamp;
        insert_sorted(&mut self.trust_updates, update, at, |u| u.timestamp);
    }

    pub fn record_contradiction(&mut self, contradiction: Contradiction) {
        self.contradictions.push(contradiction);
    }

    /// Mark a contradiction resolved at `at`.
    ///
    /// Returns `false` when the id is unknown or it was already resolved; a
    /// contradiction is resolved at most once.
    pub fn resolve_contradiction(&mut self, contradiction_id: &str, at: DateTime<Utc>) -> bool {
        match self
            .contradictions
            .iter_mut()
            .find(|c| c.contradiction_id == contradiction_id)
        {
            Some(c) if !c.resolved => {
                c.resolved = true;
                c.resolved_at = Some(at);
                true
            }
            _ => false,
        }
    }

    pub fn record_mode_transition(
        &mut self,
        timestamp: DateTime<Utc>,
        mode: OperationalMode,
        trigger: Option<String>,
    ) {
        let transition = ModeTransition {
            timestamp,
            mode,
            trigger,
        };
        insert_sorted(&mut self.mode_transitions, transition, timestamp, |t| t.timestamp);
    }

    // ── Reconstruction ────────────────────────────────────────────────────────

    /// The belief state at `at`, built only from records timestamped `<= at`.
    pub fn reconstruct(&self, at: DateTime<Utc>) -> SystemState {
        let telemetry = self.telemetry_at(at);
        let (trust_scores, active_reason_codes) = self.trust_at(at);
        let unresolved_contradictions = self
            .contradictions
            .iter()
            .filter(|c| c.unresolved_at(at))
            .map(|c| c.contradiction_id.clone())
            .collect::<Vec<_>>();
        let (operational_mode, decision_clock_started) = self.mode_at(at);

        debug!(
            at = %at,
            tags = telemetry.len(),
            trusted_tags = trust_scores.len(),
            unresolved = unresolved_contradictions.len(),
            mode = operational_mode.as_str(),
            "state reconstructed"
        );

        SystemState {
            timestamp: at,
            telemetry,
            trust_scores,
            active_reason_codes,
            unresolved_contradictions,
            operational_mode,
            decision_clock_started,
        }
    }

    /// Parse an ISO-8601 instant and reconstruct at it.
    ///
    /// Malformed input is `SatorError::InvalidTimestamp`; it never falls back
    /// to "now".
    pub fn reconstruct_query(&self, timestamp: &str) -> SatorResult<SystemState> {
        Ok(self.reconstruct(parse_timestamp(timestamp)?))
    }

    /// Last value per tag at or before `at`. Tags with no such reading map
    /// to `None`.
    fn telemetry_at(&self, at: DateTime<Utc>) -> BTreeMap<String, Option<f64>> {
        self.telemetry
            .iter()
            .map(|(tag, points)| {
                let known = count_at_or_before(points, at, |p| p.timestamp);
                let value = known.checked_sub(1).and_then(|i| points[i].value);
                (tag.clone(), value)
            })
            .collect()
    }

    fn trust_at(&self, at: DateTime<Utc>) -> (BTreeMap<String, f64>, BTreeMap<String, Vec<String>>) {
        let known = count_at_or_before(&self.trust_updates, at, |u| u.timestamp);
        let mut scores = BTreeMap::new();
        let mut codes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for update in &self.trust_updates[..known] {
            scores.insert(update.tag_id.clone(), update.new_score);
            codes.insert(
                update.tag_id.clone(),
                update.reason_codes.iter().map(|rc| rc.as_str().to_string()).collect(),
            );
        }
        (scores, codes)
    }

    fn mode_at(&self, at: DateTime<Utc>) -> (OperationalMode, Option<DateTime<Utc>>) {
        let known = count_at_or_before(&self.mode_transitions, at, |t| t.timestamp);
        let mut mode = OperationalMode::default();
        let mut clock = None;
        for transition in &self.mode_transitions[..known] {
            mode = transition.mode;
            clock = (mode == OperationalMode::Decision).then_some(transition.timestamp);
        }
        (mode, clock)
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Copy out every record, each stream in its stored order.
    pub fn export_log(&self) -> ReplayLog {
        ReplayLog {
            telemetry: self.telemetry.values().flatten().cloned().collect(),
            trust_updates: self.trust_updates.clone(),
            contradictions: self.contradictions.clone(),
            mode_transitions: self.mode_transitions.clone(),
        }
    }

    /// Rebuild from a saved log. Records go through the same insertion path
    /// as live ones, so a hand-edited or reordered log is still sorted.
    pub fn from_log(log: ReplayLog) -> Self {
        let mut reconstructor = Self::new();
        for point in log.telemetry {
            reconstructor.record_telemetry(point);
        }
        for update in log.trust_updates {
            reconstructor.record_trust_update(update);
        }
        reconstructor.contradictions = log.contradictions;
        for transition in log.mode_transitions {
            reconstructor.record_mode_transition(transition.timestamp, transition.mode, transition.trigger);
        }
        reconstructor
    }

    // ── Housekeeping ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> ReconstructorSnapshot {
        ReconstructorSnapshot {
            telemetry_tags: self.telemetry.keys().cloned().collect(),
            telemetry_points: self.telemetry.values().map(Vec::len).sum(),
            trust_updates: self.trust_updates.len(),
            contradictions: self.contradictions.len(),
            mode_transitions: self.mode_transitions.len(),
        }
    }

    pub fn clear(&mut self) {
        self.telemetry.clear();
        self.trust_updates.clear();
        self.contradictions.clear();
        self.mode_transitions.clear();
    }
}
