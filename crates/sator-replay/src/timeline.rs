//! Timestamp-sorted index of timeline events for the replay scrubber.
//!
//! Events are inserted at their binary-search position rather than appended
//! and re-sorted, and insertion is serialized behind a `Mutex`. Events that
//! share a timestamp keep their indexing order.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use sator_contracts::{
    error::{SatorError, SatorResult},
    events::{Contradiction, OperationalMode, ReasonCode},
    time::parse_timestamp,
    timeline::{EventMarker, EventSeverity, TimeRange, TimelineEvent, TimelineEventType, TimelineStats},
};

/// Trust scores below this are a critical drop rather than a warning.
pub const CRITICAL_TRUST_THRESHOLD: f64 = 0.4;

/// Filters for `TimelineIndexer::get_events`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineQuery {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
    /// Empty means every type.
    pub event_types: Vec<TimelineEventType>,
    pub severity: Option<EventSeverity>,
    pub tag_id: Option<String>,
    /// Falls back to the indexer's default limit.
    pub limit: Option<usize>,
}

impl TimelineQuery {
    /// A query bounded by ISO-8601 instants, as received from a client.
    pub fn between(start: Option<&str>, end: Option<&str>) -> SatorResult<Self> {
        Ok(Self {
            start: start.map(parse_timestamp).transpose()?,
            end: end.map(parse_timestamp).transpose()?,
            ..Self::default()
        })
    }

    pub fn types(mut self, event_types: impl IntoIterator<Item = TimelineEventType>) -> Self {
        self.event_types = event_types.into_iter().collect();
        self
    }

    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn tag(mut self, tag_id: impl Into<String>) -> Self {
        self.tag_id = Some(tag_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &TimelineEvent) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
            && self.severity.map_or(true, |s| s == event.severity)
            && self
                .tag_id
                .as_ref()
                .map_or(true, |tag| event.related_tags.contains(tag))
    }
}

#[derive(Default)]
struct TimelineState {
    events: Vec<TimelineEvent>,
    counter: u64,
}

impl TimelineState {
    /// Events in `[start, end)`, in timestamp order.
    fn window(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> &[TimelineEvent] {
        let from = start.map_or(0, |s| self.events.partition_point(|e| e.timestamp < s));
        let to = end.map_or(self.events.len(), |e| self.events.partition_point(|ev| ev.timestamp < e));
        if from < to {
            &self.events[from..to]
        } else {
            &[]
        }
    }
}

pub struct TimelineIndexer {
    state: Mutex<TimelineState>,
    default_limit: usize,
}

impl TimelineIndexer {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new() -> Self {
        Self::with_default_limit(Self::DEFAULT_LIMIT)
    }

    pub fn with_default_limit(default_limit: usize) -> Self {
        Self {
            state: Mutex::new(TimelineState::default()),
            default_limit,
        }
    }

    fn lock(&self) -> SatorResult<MutexGuard<'_, TimelineState>> {
        self.state.lock().map_err(|e| SatorError::LockPoisoned {
            reason: format!("timeline index lock poisoned: {}", e),
        })
    }

    /// Index one event and return its id.
    ///
    /// An empty `event_id` is replaced with the next `evt_NNNNNN` id.
    pub fn index(&self, mut event: TimelineEvent) -> SatorResult<String> {
        let mut state = self.lock()?;
        if event.event_id.is_empty() {
            state.counter += 1;
            event.event_id = format!("evt_{:06}", state.counter);
        }
        let event_id = event.event_id.clone();
        let position = state.events.partition_point(|e| e.timestamp <= event.timestamp);
        debug!(
            event_id = %event_id,
            event_type = ?event.event_type,
            position,
            "timeline event indexed"
        );
        state.events.insert(position, event);
        Ok(event_id)
    }

    pub fn get_events(&self, query: &TimelineQuery) -> SatorResult<Vec<TimelineEvent>> {
        let state = self.lock()?;
        Ok(state
            .window(query.start, query.end)
            .iter()
            .filter(|e| query.matches(e))
            .take(query.limit.unwrap_or(self.default_limit))
            .cloned()
            .collect())
    }

    /// Compact markers for every event in `[start, end)`.
    pub fn get_event_markers(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> SatorResult<Vec<EventMarker>> {
        let state = self.lock()?;
        Ok(state.window(start, end).iter().map(EventMarker::from).collect())
    }

    pub fn get_event_by_id(&self, event_id: &str) -> SatorResult<Option<TimelineEvent>> {
        let state = self.lock()?;
        Ok(state.events.iter().find(|e| e.event_id == event_id).cloned())
    }

    pub fn get_stats(&self) -> SatorResult<TimelineStats> {
        let state = self.lock()?;
        let mut by_type = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        for event in &state.events {
            *by_type.entry(event.event_type).or_insert(0) += 1;
            *by_severity.entry(event.severity).or_insert(0) += 1;
        }
        Ok(TimelineStats {
            total_events: state.events.len(),
            by_type,
            by_severity,
            time_range: TimeRange {
                start: state.events.first().map(|e| e.timestamp),
                end: state.events.last().map(|e| e.timestamp),
            },
        })
    }

    pub fn len(&self) -> SatorResult<usize> {
        Ok(self.lock()?.events.len())
    }

    pub fn is_empty(&self) -> SatorResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Every indexed event in timestamp order.
    pub fn export_events(&self) -> SatorResult<Vec<TimelineEvent>> {
        Ok(self.lock()?.events.clone())
    }

    /// Replace the index with `events`, e.g. after a restart.
    ///
    /// Events without an id get one. Id generation resumes after the highest
    /// `evt_NNNNNN` already present.
    pub fn replace_events(&self, mut events: Vec<TimelineEvent>) -> SatorResult<()> {
        let mut counter = events
            .iter()
            .filter_map(|e| e.event_id.strip_prefix("evt_")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        for event in events.iter_mut().filter(|e| e.event_id.is_empty()) {
            counter += 1;
            event.event_id = format!("evt_{:06}", counter);
        }
        events.sort_by_key(|e| e.timestamp);

        let mut state = self.lock()?;
        debug!(event_count = events.len(), counter, "timeline index replaced");
        state.events = events;
        state.counter = counter;
        Ok(())
    }

    /// Drop every event and restart id generation at `evt_000001`.
    pub fn clear(&self) -> SatorResult<()> {
        let mut state = self.lock()?;
        state.events.clear();
        state.counter = 0;
        Ok(())
    }
}

impl Default for TimelineIndexer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Event constructors ────────────────────────────────────────────────────────

fn event(
    at: DateTime<Utc>,
    event_type: TimelineEventType,
    severity: EventSeverity,
    summary: String,
    details: BTreeMap<String, Value>,
    related_tags: Vec<String>,
) -> TimelineEvent {
    TimelineEvent {
        event_id: String::new(),
        timestamp: at,
        event_type,
        severity,
        summary,
        details,
        related_tags,
    }
}

fn details<const N: usize>(entries: [(&str, Value); N]) -> BTreeMap<String, Value> {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn codes(reason_codes: &[ReasonCode]) -> Vec<&'static str> {
    reason_codes.iter().map(ReasonCode::as_str).collect()
}

pub fn alarm_event(
    at: DateTime<Utc>,
    summary: impl Into<String>,
    severity: EventSeverity,
    tag_id: Option<&str>,
    details: BTreeMap<String, Value>,
) -> TimelineEvent {
    event(
        at,
        TimelineEventType::Alarm,
        severity,
        summary.into(),
        details,
        tag_id.map(str::to_string).into_iter().collect(),
    )
}

/// Critical below `CRITICAL_TRUST_THRESHOLD`, otherwise a warning.
pub fn trust_drop_event(
    at: DateTime<Utc>,
    tag_id: &str,
    old_score: f64,
    new_score: f64,
    reason_codes: &[ReasonCode],
) -> TimelineEvent {
    let severity = if new_score < CRITICAL_TRUST_THRESHOLD {
        EventSeverity::Critical
    } else {
        EventSeverity::Warning
    };
    event(
        at,
        TimelineEventType::TrustDrop,
        severity,
        format!("Trust dropped: {tag_id} ({old_score:.2} → {new_score:.2})"),
        details([
            ("old_score", json!(old_score)),
            ("new_score", json!(new_score)),
            ("reason_codes", json!(codes(reason_codes))),
        ]),
        vec![tag_id.to_string()],
    )
}

pub fn trust_recovery_event(at: DateTime<Utc>, tag_id: &str, old_score: f64, new_score: f64) -> TimelineEvent {
    event(
        at,
        TimelineEventType::TrustRecovery,
        EventSeverity::Info,
        format!("Trust recovered: {tag_id} ({old_score:.2} → {new_score:.2})"),
        details([("old_score", json!(old_score)), ("new_score", json!(new_score))]),
        vec![tag_id.to_string()],
    )
}

pub fn contradiction_detected_event(contradiction: &Contradiction) -> TimelineEvent {
    let related_tags = std::iter::once(&contradiction.primary_tag_id)
        .chain(&contradiction.secondary_tag_ids)
        .cloned()
        .collect();
    event(
        contradiction.timestamp,
        TimelineEventType::ContradictionDetected,
        EventSeverity::Critical,
        contradiction.description.clone(),
        details([
            ("contradiction_id", json!(contradiction.contradiction_id)),
            ("reason_code", json!(contradiction.reason_code.as_str())),
        ]),
        related_tags,
    )
}

pub fn contradiction_resolved_event(
    at: DateTime<Utc>,
    contradiction_id: &str,
    resolution_method: Option<&str>,
    related_tags: Vec<String>,
) -> TimelineEvent {
    event(
        at,
        TimelineEventType::ContradictionResolved,
        EventSeverity::Info,
        format!("Contradiction {contradiction_id} resolved"),
        details([
            ("contradiction_id", json!(contradiction_id)),
            ("resolution_method", json!(resolution_method)),
        ]),
        related_tags,
    )
}

/// Info when returning to observe, a warning for any other mode.
pub fn mode_transition_event(at: DateTime<Utc>, mode: OperationalMode, trigger: Option<&str>) -> TimelineEvent {
    let severity = match mode {
        OperationalMode::Observe => EventSeverity::Info,
        _ => EventSeverity::Warning,
    };
    event(
        at,
        TimelineEventType::ModeTransition,
        severity,
        format!("Mode changed to {}", mode.as_str().to_uppercase()),
        details([("mode", json!(mode.as_str())), ("trigger", json!(trigger))]),
        Vec::new(),
    )
}

pub fn operator_action_event(
    at: DateTime<Utc>,
    operator_id: &str,
    action_type: &str,
    action_description: &str,
    related_tags: Vec<String>,
) -> TimelineEvent {
    event(
        at,
        TimelineEventType::OperatorAction,
        EventSeverity::Info,
        format!("Operator {operator_id}: {action_description}"),
        details([
            ("operator_id", json!(operator_id)),
            ("action_type", json!(action_type)),
        ]),
        related_tags,
    )
}
