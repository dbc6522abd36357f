//! Discrete events shown on the replay timeline scrubber.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    Alarm,
    TrustDrop,
    TrustRecovery,
    ContradictionDetected,
    ContradictionResolved,
    ModeTransition,
    OperatorAction,
    FailureInjected,
    SimulationStart,
    SimulationEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Empty when the producer leaves id assignment to the indexer.
    #[serde(default)]
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: TimelineEventType,
    #[serde(default)]
    pub severity: EventSeverity,
    pub summary: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
    #[serde(default)]
    pub related_tags: Vec<String>,
}

/// Compact projection used to draw markers on the scrubber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMarker {
    pub timestamp: DateTime<Utc>,
    pub event_type: TimelineEventType,
    pub severity: EventSeverity,
}

impl From<&TimelineEvent> for EventMarker {
    fn from(event: &TimelineEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            event_type: event.event_type,
            severity: event.severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimelineStats {
    pub total_events: usize,
    pub by_type: BTreeMap<TimelineEventType, usize>,
    pub by_severity: BTreeMap<EventSeverity, usize>,
    pub time_range: TimeRange,
}
