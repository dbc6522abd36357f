//! Trust, contradiction, and operational-mode records consumed by replay.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a sensor's trust score changed or a contradiction was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReasonCode {
    /// Missing bursts: data gaps.
    RC01,
    /// Stale stream.
    RC02,
    /// Time jitter: out-of-order packets.
    RC03,
    /// Upstream BAD quality flag.
    RC04,
    /// Range violation.
    RC05,
    /// Rate-of-change violation.
    RC06,
    /// Flatline.
    RC07,
    /// Spike density.
    RC08,
    /// Drift versus peers.
    RC09,
    /// Redundancy conflict.
    RC10,
    /// Physics contradiction.
    RC11,
    /// Context mismatch.
    RC12,
    /// Clock anomaly.
    RC13,
    /// Suspected replay or spoofing.
    RC14,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::RC01 => "RC01",
            ReasonCode::RC02 => "RC02",
            ReasonCode::RC03 => "RC03",
            ReasonCode::RC04 => "RC04",
            ReasonCode::RC05 => "RC05",
            ReasonCode::RC06 => "RC06",
            ReasonCode::RC07 => "RC07",
            ReasonCode::RC08 => "RC08",
            ReasonCode::RC09 => "RC09",
            ReasonCode::RC10 => "RC10",
            ReasonCode::RC11 => "RC11",
            ReasonCode::RC12 => "RC12",
            ReasonCode::RC13 => "RC13",
            ReasonCode::RC14 => "RC14",
        }
    }
}

/// A change to one sensor's trust score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub event_id: String,
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
    pub previous_score: f64,
    /// In `[0, 1]`.
    pub new_score: f64,
    pub delta: f64,
    /// Ordered, duplicate-free.
    pub reason_codes: Vec<ReasonCode>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

/// Sensors that should agree but do not, or a violated physical invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub contradiction_id: String,
    pub timestamp: DateTime<Utc>,
    pub primary_tag_id: String,
    #[serde(default)]
    pub secondary_tag_ids: Vec<String>,
    pub reason_code: ReasonCode,
    pub description: String,
    #[serde(default)]
    pub values: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub expected_relationship: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolution_method: Option<String>,
}

impl Contradiction {
    /// Whether this contradiction existed and was still open at `at`.
    ///
    /// A contradiction resolved after `at` counts as unresolved at `at`.
    pub fn unresolved_at(&self, at: DateTime<Utc>) -> bool {
        if self.timestamp > at {
            return false;
        }
        match (self.resolved, self.resolved_at) {
            (false, _) => true,
            (true, Some(resolved_at)) => resolved_at > at,
            (true, None) => false,
        }
    }
}

/// Operational mode of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalMode {
    /// Passive situational awareness.
    #[default]
    Observe,
    /// Formal commitment required; the decision clock runs.
    Decision,
    /// Forensic review.
    Replay,
}

impl OperationalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalMode::Observe => "observe",
            OperationalMode::Decision => "decision",
            OperationalMode::Replay => "replay",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub timestamp: DateTime<Utc>,
    pub mode: OperationalMode,
    #[serde(default)]
    pub trigger: Option<String>,
}

/// What the system believed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub timestamp: DateTime<Utc>,
    /// Last known value per tag; `None` if no reading at or before `timestamp`.
    pub telemetry: BTreeMap<String, Option<f64>>,
    pub trust_scores: BTreeMap<String, f64>,
    pub active_reason_codes: BTreeMap<String, Vec<String>>,
    pub unresolved_contradictions: Vec<String>,
    pub operational_mode: OperationalMode,
    pub decision_clock_started: Option<DateTime<Utc>>,
}
