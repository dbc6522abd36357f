//! # sator-replay
//!
//! Forensic replay for the SATOR operations dashboard.
//!
//! This crate provides:
//! - [`state::StateReconstructor`]: "what was known at time T", computed
//!   only from records timestamped at or before T
//! - [`timeline::TimelineIndexer`]: a timestamp-sorted index of discrete
//!   events for the timeline scrubber
//! - [`engine::ReplayEngine`]: a thread-safe facade owning both
//! - [`store::ReplayStore`]: saves and restores an engine across restarts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sator_replay::ReplayEngine;
//!
//! let engine = ReplayEngine::new();
//! engine.record_telemetry(point)?;
//! let state = engine.state_at("2026-03-01T10:15:00Z")?;
//! ```

pub mod engine;
pub mod state;
pub mod store;
pub mod timeline;

pub use engine::ReplayEngine;
pub use state::{ReconstructorSnapshot, ReplayLog, StateReconstructor};
pub use store::ReplayStore;
pub use timeline::{TimelineIndexer, TimelineQuery};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc, thread};

    use chrono::{DateTime, Utc};

    use sator_contracts::{
        error::SatorError,
        events::{Contradiction, OperationalMode, ReasonCode, TrustUpdate},
        telemetry::TelemetryPoint,
        time::format_micros,
        timeline::{EventSeverity, TimelineEvent, TimelineEventType},
    };

    use super::{
        timeline::{
            alarm_event, contradiction_detected_event, mode_transition_event, operator_action_event,
            trust_drop_event, trust_recovery_event,
        },
        ReconstructorSnapshot, ReplayEngine, ReplayStore, StateReconstructor, TimelineIndexer, TimelineQuery,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Seconds after a fixed epoch.
    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_767_225_600 + secs, 0).unwrap()
    }

    fn point(tag: &str, at: i64, value: f64) -> TelemetryPoint {
        TelemetryPoint::new(tag, t(at), Some(value))
    }

    fn trust(tag: &str, at: i64, score: f64, codes: Vec<ReasonCode>) -> TrustUpdate {
        TrustUpdate {
            event_id: format!("tu-{tag}-{at}"),
            tag_id: tag.to_string(),
            timestamp: t(at),
            previous_score: 1.0,
            new_score: score,
            delta: score - 1.0,
            reason_codes: codes,
            evidence_refs: vec![],
            explanation: String::new(),
        }
    }

    fn contradiction(id: &str, at: i64) -> Contradiction {
        Contradiction {
            contradiction_id: id.to_string(),
            timestamp: t(at),
            primary_tag_id: "PT-101".to_string(),
            secondary_tag_ids: vec!["PT-102".to_string(), "FT-201".to_string()],
            reason_code: ReasonCode::RC10,
            description: "Redundant pressure transmitters disagree".to_string(),
            values: BTreeMap::from([("PT-101".to_string(), Some(4.2)), ("PT-102".to_string(), Some(6.9))]),
            expected_relationship: "PT-101 ≈ PT-102".to_string(),
            resolved: false,
            resolved_at: None,
            resolution_method: None,
        }
    }

    fn timeline_event(at: i64, event_type: TimelineEventType, severity: EventSeverity, tags: &[&str]) -> TimelineEvent {
        TimelineEvent {
            event_id: String::new(),
            timestamp: t(at),
            event_type,
            severity,
            summary: format!("{event_type:?} at {at}"),
            details: BTreeMap::new(),
            related_tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    // ── State reconstruction ──────────────────────────────────────────────────

    /// A reading is visible only from its own timestamp onwards.
    #[test]
    fn test_telemetry_causality() {
        let mut r = StateReconstructor::new();
        r.record_telemetry(point("PT-101", 10, 5.0));
        r.record_telemetry(point("PT-101", 20, 9.0));

        assert_eq!(r.reconstruct(t(15)).telemetry["PT-101"], Some(5.0));
        assert_eq!(r.reconstruct(t(25)).telemetry["PT-101"], Some(9.0));
        assert_eq!(r.reconstruct(t(5)).telemetry["PT-101"], None);
        assert_eq!(r.reconstruct(t(20)).telemetry["PT-101"], Some(9.0));
    }

    /// Arrival order does not change the answer.
    #[test]
    fn test_out_of_order_telemetry() {
        let mut r = StateReconstructor::new();
        r.record_telemetry(point("FT-201", 30, 3.0));
        r.record_telemetry(point("FT-201", 10, 1.0));
        r.record_telemetry(point("FT-201", 20, 2.0));

        assert_eq!(r.reconstruct(t(15)).telemetry["FT-201"], Some(1.0));
        assert_eq!(r.reconstruct(t(25)).telemetry["FT-201"], Some(2.0));
        assert_eq!(r.reconstruct(t(35)).telemetry["FT-201"], Some(3.0));
    }

    #[test]
    fn test_same_timestamp_later_record_wins() {
        let mut r = StateReconstructor::new();
        r.record_telemetry(point("LT-301", 10, 1.0));
        r.record_telemetry(point("LT-301", 10, 2.0));
        assert_eq!(r.reconstruct(t(10)).telemetry["LT-301"], Some(2.0));

        // A reading that reported no value shadows the earlier one.
        r.record_telemetry(TelemetryPoint::new("LT-301", t(12), None));
        assert_eq!(r.reconstruct(t(12)).telemetry["LT-301"], None);
    }

    /// The last qualifying trust update per tag wins.
    #[test]
    fn test_trust_overwrite() {
        let mut r = StateReconstructor::new();
        r.record_trust_update(trust("PT-101", 20, 0.3, vec![ReasonCode::RC10, ReasonCode::RC11]));
        r.record_trust_update(trust("PT-101", 10, 0.9, vec![ReasonCode::RC05]));
        r.record_trust_update(trust("FT-201", 12, 0.7, vec![]));

        let early = r.reconstruct(t(15));
        assert_eq!(early.trust_scores["PT-101"], 0.9);
        assert_eq!(early.active_reason_codes["PT-101"], vec!["RC05"]);
        assert_eq!(early.trust_scores["FT-201"], 0.7);

        let late = r.reconstruct(t(25));
        assert_eq!(late.trust_scores["PT-101"], 0.3);
        assert_eq!(late.active_reason_codes["PT-101"], vec!["RC10", "RC11"]);

        assert!(r.reconstruct(t(5)).trust_scores.is_empty());
    }

    /// Resolution later than T does not hide a contradiction at T.
    #[test]
    fn test_contradiction_resolution_window() {
        let mut r = StateReconstructor::new();
        r.record_contradiction(contradiction("c-1", 5));
        r.record_contradiction(contradiction("c-2", 50));
        assert!(r.resolve_contradiction("c-1", t(30)));

        assert_eq!(r.reconstruct(t(10)).unresolved_contradictions, vec!["c-1"]);
        assert_eq!(r.reconstruct(t(20)).unresolved_contradictions, vec!["c-1"]);
        assert!(r.reconstruct(t(40)).unresolved_contradictions.is_empty());
        assert_eq!(r.reconstruct(t(60)).unresolved_contradictions, vec!["c-2"]);
        assert!(r.reconstruct(t(1)).unresolved_contradictions.is_empty());
    }

    #[test]
    fn test_resolve_contradiction_only_once() {
        let mut r = StateReconstructor::new();
        r.record_contradiction(contradiction("c-1", 5));
        assert!(!r.resolve_contradiction("missing", t(10)));
        assert!(r.resolve_contradiction("c-1", t(10)));
        assert!(!r.resolve_contradiction("c-1", t(20)));
        assert_eq!(r.reconstruct(t(15)).unresolved_contradictions.len(), 0);
    }

    #[test]
    fn test_mode_and_decision_clock() {
        let mut r = StateReconstructor::new();
        assert_eq!(r.reconstruct(t(0)).operational_mode, OperationalMode::Observe);

        r.record_mode_transition(t(50), OperationalMode::Observe, Some("operator acted".to_string()));
        r.record_mode_transition(t(10), OperationalMode::Decision, Some("c-1".to_string()));

        let during = r.reconstruct(t(30));
        assert_eq!(during.operational_mode, OperationalMode::Decision);
        assert_eq!(during.decision_clock_started, Some(t(10)));

        let after = r.reconstruct(t(60));
        assert_eq!(after.operational_mode, OperationalMode::Observe);
        assert_eq!(after.decision_clock_started, None);

        r.record_mode_transition(t(70), OperationalMode::Replay, None);
        r.record_mode_transition(t(80), OperationalMode::Decision, None);
        assert_eq!(r.reconstruct(t(75)).decision_clock_started, None);
        assert_eq!(r.reconstruct(t(90)).decision_clock_started, Some(t(80)));
    }

    #[test]
    fn test_reconstruct_query_parses_and_rejects() {
        let mut r = StateReconstructor::new();
        r.record_telemetry(point("PT-101", 10, 5.0));

        let state = r.reconstruct_query(&format_micros(&t(15))).unwrap();
        assert_eq!(state.timestamp, t(15));
        assert_eq!(state.telemetry["PT-101"], Some(5.0));

        for bad in ["", "yesterday", "2026-13-45T99:00:00Z"] {
            let err = r.reconstruct_query(bad).unwrap_err();
            assert!(matches!(err, SatorError::InvalidTimestamp { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn test_snapshot_and_clear() {
        let mut r = StateReconstructor::new();
        r.record_telemetry(point("PT-101", 1, 1.0));
        r.record_telemetry(point("PT-101", 2, 1.0));
        r.record_telemetry(point("FT-201", 2, 1.0));
        r.record_trust_update(trust("PT-101", 3, 0.5, vec![]));
        r.record_contradiction(contradiction("c-1", 4));
        r.record_mode_transition(t(5), OperationalMode::Decision, None);

        let snap = r.snapshot();
        assert_eq!(snap.telemetry_tags, vec!["FT-201", "PT-101"]);
        assert_eq!(snap.telemetry_points, 3);
        assert_eq!(snap.trust_updates, 1);
        assert_eq!(snap.contradictions, 1);
        assert_eq!(snap.mode_transitions, 1);

        r.clear();
        assert_eq!(r.snapshot(), ReconstructorSnapshot::default());
        assert!(r.reconstruct(t(10)).telemetry.is_empty());
    }

    // ── Timeline index ────────────────────────────────────────────────────────

    #[test]
    fn test_index_generates_ids_and_sorts() {
        let index = TimelineIndexer::new();
        let late = index
            .index(timeline_event(30, TimelineEventType::Alarm, EventSeverity::Warning, &[]))
            .unwrap();
        let early = index
            .index(timeline_event(10, TimelineEventType::Alarm, EventSeverity::Info, &[]))
            .unwrap();
        let mut named = timeline_event(20, TimelineEventType::OperatorAction, EventSeverity::Info, &[]);
        named.event_id = "op-1".to_string();
        assert_eq!(index.index(named).unwrap(), "op-1");

        assert_eq!(late, "evt_000001");
        assert_eq!(early, "evt_000002");

        let ids: Vec<String> = index
            .get_events(&TimelineQuery::default())
            .unwrap()
            .into_iter()
            .map(|e| e.event_id)
            .collect();
        assert_eq!(ids, vec!["evt_000002", "op-1", "evt_000001"]);
        assert_eq!(index.get_event_by_id("op-1").unwrap().unwrap().timestamp, t(20));
        assert!(index.get_event_by_id("evt_999999").unwrap().is_none());
    }

    /// Start is inclusive, end is exclusive.
    #[test]
    fn test_time_bounds_half_open() {
        let index = TimelineIndexer::new();
        for at in [10, 20, 30, 40] {
            index
                .index(timeline_event(at, TimelineEventType::Alarm, EventSeverity::Info, &[]))
                .unwrap();
        }
        let query = TimelineQuery {
            start: Some(t(20)),
            end: Some(t(40)),
            ..TimelineQuery::default()
        };
        let times: Vec<_> = index
            .get_events(&query)
            .unwrap()
            .iter()
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(times, vec![t(20), t(30)]);

        let markers = index.get_event_markers(Some(t(20)), Some(t(40))).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].timestamp, t(20));

        let inverted = TimelineQuery {
            start: Some(t(40)),
            end: Some(t(10)),
            ..TimelineQuery::default()
        };
        assert!(index.get_events(&inverted).unwrap().is_empty());
    }

    #[test]
    fn test_query_filters_and_limits() {
        let index = TimelineIndexer::with_default_limit(3);
        index.index(timeline_event(1, TimelineEventType::Alarm, EventSeverity::Critical, &["PT-101"])).unwrap();
        index.index(timeline_event(2, TimelineEventType::TrustDrop, EventSeverity::Warning, &["PT-101"])).unwrap();
        index.index(timeline_event(3, TimelineEventType::TrustDrop, EventSeverity::Critical, &["FT-201"])).unwrap();
        index.index(timeline_event(4, TimelineEventType::ModeTransition, EventSeverity::Warning, &[])).unwrap();
        index.index(timeline_event(5, TimelineEventType::Alarm, EventSeverity::Info, &["FT-201"])).unwrap();

        assert_eq!(index.get_events(&TimelineQuery::default()).unwrap().len(), 3);
        assert_eq!(index.get_events(&TimelineQuery::default().limit(10)).unwrap().len(), 5);

        let drops = index
            .get_events(&TimelineQuery::default().types([TimelineEventType::TrustDrop]))
            .unwrap();
        assert_eq!(drops.len(), 2);

        let critical = index
            .get_events(&TimelineQuery::default().severity(EventSeverity::Critical))
            .unwrap();
        assert_eq!(critical.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![t(1), t(3)]);

        let flow = index.get_events(&TimelineQuery::default().tag("FT-201")).unwrap();
        assert_eq!(flow.len(), 2);

        let combined = TimelineQuery::default()
            .types([TimelineEventType::Alarm, TimelineEventType::TrustDrop])
            .tag("PT-101")
            .limit(1);
        assert_eq!(index.get_events(&combined).unwrap()[0].timestamp, t(1));
    }

    #[test]
    fn test_query_between_rejects_bad_bounds() {
        let query = TimelineQuery::between(Some(&format_micros(&t(5))), None).unwrap();
        assert_eq!(query.start, Some(t(5)));
        assert_eq!(query.end, None);

        let err = TimelineQuery::between(None, Some("not-a-time")).unwrap_err();
        assert!(matches!(err, SatorError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_stats_and_clear() {
        let index = TimelineIndexer::new();
        assert_eq!(index.get_stats().unwrap().time_range.start, None);

        index.index(timeline_event(30, TimelineEventType::Alarm, EventSeverity::Critical, &[])).unwrap();
        index.index(timeline_event(10, TimelineEventType::Alarm, EventSeverity::Info, &[])).unwrap();
        index.index(timeline_event(20, TimelineEventType::OperatorAction, EventSeverity::Info, &[])).unwrap();

        let stats = index.get_stats().unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.by_type[&TimelineEventType::Alarm], 2);
        assert_eq!(stats.by_type[&TimelineEventType::OperatorAction], 1);
        assert_eq!(stats.by_severity[&EventSeverity::Info], 2);
        assert_eq!(stats.time_range.start, Some(t(10)));
        assert_eq!(stats.time_range.end, Some(t(30)));

        index.clear().unwrap();
        assert!(index.is_empty().unwrap());
        let id = index
            .index(timeline_event(1, TimelineEventType::Alarm, EventSeverity::Info, &[]))
            .unwrap();
        assert_eq!(id, "evt_000001");
    }

    /// Concurrent producers never corrupt the sort order.
    #[test]
    fn test_concurrent_indexing_stays_sorted() {
        let index = Arc::new(TimelineIndexer::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for i in 0..50 {
                        let at = (i * 7 + worker * 13) % 100;
                        index
                            .index(timeline_event(at, TimelineEventType::Alarm, EventSeverity::Info, &[]))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let events = index.get_events(&TimelineQuery::default().limit(1_000)).unwrap();
        assert_eq!(events.len(), 200);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    // ── Event constructors ────────────────────────────────────────────────────

    #[test]
    fn test_trust_events_severity() {
        let critical = trust_drop_event(t(1), "PT-101", 0.8, 0.35, &[ReasonCode::RC10]);
        assert_eq!(critical.severity, EventSeverity::Critical);
        assert_eq!(critical.summary, "Trust dropped: PT-101 (0.80 → 0.35)");
        assert_eq!(critical.details["reason_codes"], serde_json::json!(["RC10"]));
        assert_eq!(critical.related_tags, vec!["PT-101"]);

        let warning = trust_drop_event(t(1), "PT-101", 0.9, 0.4, &[]);
        assert_eq!(warning.severity, EventSeverity::Warning);

        let recovery = trust_recovery_event(t(2), "PT-101", 0.35, 0.9);
        assert_eq!(recovery.event_type, TimelineEventType::TrustRecovery);
        assert_eq!(recovery.severity, EventSeverity::Info);
    }

    #[test]
    fn test_mode_and_contradiction_events() {
        let decision = mode_transition_event(t(1), OperationalMode::Decision, Some("c-1"));
        assert_eq!(decision.severity, EventSeverity::Warning);
        assert_eq!(decision.summary, "Mode changed to DECISION");
        assert_eq!(decision.details["trigger"], serde_json::json!("c-1"));

        let observe = mode_transition_event(t(2), OperationalMode::Observe, None);
        assert_eq!(observe.severity, EventSeverity::Info);
        assert!(observe.details["trigger"].is_null());

        let detected = contradiction_detected_event(&contradiction("c-9", 3));
        assert_eq!(detected.severity, EventSeverity::Critical);
        assert_eq!(detected.timestamp, t(3));
        assert_eq!(detected.related_tags, vec!["PT-101", "PT-102", "FT-201"]);
        assert_eq!(detected.details["contradiction_id"], serde_json::json!("c-9"));

        let alarm = alarm_event(t(4), "High discharge pressure", EventSeverity::Critical, Some("PT-101"), BTreeMap::new());
        assert_eq!(alarm.related_tags, vec!["PT-101"]);

        let action = operator_action_event(t(5), "op-3", "act", "close valve V-12", vec![]);
        assert_eq!(action.event_type, TimelineEventType::OperatorAction);
        assert_eq!(action.summary, "Operator op-3: close valve V-12");
    }

    // ── Replay engine ─────────────────────────────────────────────────────────

    #[test]
    fn test_engine_state_at_and_timeline() {
        let engine = ReplayEngine::with_default_limit(50);
        engine.record_telemetry(point("PT-101", 10, 5.0)).unwrap();
        engine.record_contradiction(contradiction("c-1", 12)).unwrap();
        engine
            .record_mode_transition(t(12), OperationalMode::Decision, Some("c-1".to_string()))
            .unwrap();
        engine.index_event(contradiction_detected_event(&contradiction("c-1", 12))).unwrap();
        engine.index_event(mode_transition_event(t(12), OperationalMode::Decision, Some("c-1"))).unwrap();
        assert!(engine.resolve_contradiction("c-1", t(40)).unwrap());

        let state = engine.state_at(&format_micros(&t(20))).unwrap();
        assert_eq!(state.telemetry["PT-101"], Some(5.0));
        assert_eq!(state.unresolved_contradictions, vec!["c-1"]);
        assert_eq!(state.operational_mode, OperationalMode::Decision);

        assert!(matches!(
            engine.state_at("20-20-20"),
            Err(SatorError::InvalidTimestamp { .. })
        ));

        let events = engine
            .timeline_events(&TimelineQuery::between(None, Some(&format_micros(&t(13)))).unwrap())
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, TimelineEventType::ContradictionDetected);

        assert_eq!(engine.snapshot().unwrap().contradictions, 1);
        engine.clear().unwrap();
        assert_eq!(engine.snapshot().unwrap().telemetry_points, 0);
        assert!(engine.timeline().is_empty().unwrap());
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    fn populated_engine() -> ReplayEngine {
        let engine = ReplayEngine::new();
        engine.record_telemetry(point("PT-101", 30, 7.5)).unwrap();
        engine.record_telemetry(point("PT-101", 10, 5.0)).unwrap();
        engine.record_telemetry(point("FT-201", 12, 0.1 + 0.2)).unwrap();
        engine
            .record_trust_update(trust("PT-101", 20, 0.35, vec![ReasonCode::RC10]))
            .unwrap();
        engine.record_contradiction(contradiction("c-1", 15)).unwrap();
        engine.record_contradiction(contradiction("c-2", 40)).unwrap();
        assert!(engine.resolve_contradiction("c-1", t(35)).unwrap());
        engine
            .record_mode_transition(t(15), OperationalMode::Decision, Some("c-1".to_string()))
            .unwrap();
        engine.record_mode_transition(t(36), OperationalMode::Observe, None).unwrap();
        engine.index_event(contradiction_detected_event(&contradiction("c-1", 15))).unwrap();
        engine.index_event(mode_transition_event(t(15), OperationalMode::Decision, Some("c-1"))).unwrap();
        engine.index_event(trust_drop_event(t(20), "PT-101", 1.0, 0.35, &[ReasonCode::RC10])).unwrap();
        engine
    }

    /// A reloaded engine answers every point-in-time query like the original.
    #[test]
    fn test_saved_replay_reconstructs_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ReplayStore::new(dir.path().join("replay"));
        let original = populated_engine();
        store.save(&original).unwrap();
        assert!(store.exists());

        let reloaded = ReplayEngine::new();
        assert!(store.load_into(&reloaded).unwrap());

        for at in [0, 10, 12, 15, 20, 30, 35, 36, 40, 100] {
            assert_eq!(
                reloaded.state_at_time(t(at)).unwrap(),
                original.state_at_time(t(at)).unwrap(),
                "state at {at}"
            );
        }
        assert_eq!(reloaded.snapshot().unwrap(), original.snapshot().unwrap());
        assert_eq!(
            reloaded.timeline().export_events().unwrap(),
            original.timeline().export_events().unwrap()
        );

        // Generated ids continue after the restored ones.
        let next = reloaded
            .index_event(timeline_event(50, TimelineEventType::Alarm, EventSeverity::Info, &[]))
            .unwrap();
        assert_eq!(next, "evt_000004");
    }

    #[test]
    fn test_load_without_snapshot_leaves_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ReplayStore::new(dir.path());
        let engine = populated_engine();
        let before = engine.snapshot().unwrap();

        assert!(!store.exists());
        assert!(!store.load_into(&engine).unwrap());
        assert_eq!(engine.snapshot().unwrap(), before);
    }

    /// Restoring goes through the sorted insert path, so log order is irrelevant.
    #[test]
    fn test_from_log_sorts_records() {
        let mut r = StateReconstructor::new();
        r.record_telemetry(point("PT-101", 10, 1.0));
        r.record_telemetry(point("PT-101", 20, 2.0));
        r.record_trust_update(trust("PT-101", 5, 0.9, vec![]));
        r.record_trust_update(trust("PT-101", 25, 0.2, vec![ReasonCode::RC05]));

        let mut log = r.export_log();
        log.telemetry.reverse();
        log.trust_updates.reverse();
        let restored = StateReconstructor::from_log(log);

        assert_eq!(restored.reconstruct(t(15)), r.reconstruct(t(15)));
        assert_eq!(restored.reconstruct(t(30)), r.reconstruct(t(30)));
    }
}
