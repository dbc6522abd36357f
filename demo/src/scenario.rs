//! Reference scenario: discharge-pressure disagreement at pump station PS-3.
//!
//! Story told by the run (minutes after `SCENARIO_START`):
//!   0  simulation starts; PT-101, PT-102 and FT-201 report normally
//!   4  a drift fault is injected into PT-101
//!   5  PT-101 disagrees with its redundant peer PT-102; its trust drops,
//!      a contradiction and incident are raised, the station enters DECISION
//!   8  the operator acts; a decision receipt is fingerprinted and recorded
//!   9  PT-101 is recalibrated; the contradiction resolves, trust recovers,
//!      the station returns to OBSERVE
//!  10  simulation ends
//!
//! Telemetry, trust, contradictions and mode changes go to the replay
//! engine with scenario timestamps; audit events go to the ledger with
//! wall-clock timestamps.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use sator_audit::{create_decision_receipt, AuditLedger, DecisionContext};
use sator_contracts::{
    action::{AuditAction, IncidentCreated, OperatorActionTaken, StateTransition, SystemLifecycle, TrustUpdated},
    audit::DecisionReceipt,
    error::SatorResult,
    events::{Contradiction, OperationalMode, ReasonCode, SystemState, TrustUpdate},
    telemetry::TelemetryPoint,
    time::parse_timestamp,
    timeline::{EventSeverity, TimelineEvent, TimelineEventType},
};
use sator_replay::{
    timeline::{
        alarm_event, contradiction_detected_event, contradiction_resolved_event, mode_transition_event,
        operator_action_event, trust_drop_event, trust_recovery_event,
    },
    ReplayEngine,
};

pub const SCENARIO_START: &str = "2026-03-01T08:00:00Z";

/// Minutes at which the CLI prints a reconstructed state.
pub const CHECKPOINTS: [i64; 3] = [3, 6, 10];

pub const CONTRADICTION_ID: &str = "c-ps3-001";
pub const INCIDENT_ID: &str = "inc-ps3-001";
pub const OPERATOR_ID: &str = "op-017";

const PRIMARY_TAG: &str = "PT-101";
const PEER_TAG: &str = "PT-102";
const FLOW_TAG: &str = "FT-201";

pub struct ScenarioOutcome {
    pub start: DateTime<Utc>,
    pub receipt: DecisionReceipt,
}

/// The scenario instant `minute` minutes after `start`.
pub fn at(start: DateTime<Utc>, minute: i64) -> DateTime<Utc> {
    start + Duration::minutes(minute)
}

/// PT-101 reads 6.2 bar until the fault at minute 4, then drifts low until
/// it is recalibrated at minute 9.
fn primary_pressure(minute: i64) -> f64 {
    match minute {
        5..=8 => 6.2 - 0.6 * (minute - 4) as f64,
        _ => 6.2,
    }
}

fn marker(start: DateTime<Utc>, minute: i64, event_type: TimelineEventType, summary: &str) -> TimelineEvent {
    TimelineEvent {
        event_id: String::new(),
        timestamp: at(start, minute),
        event_type,
        severity: EventSeverity::Info,
        summary: summary.to_string(),
        details: Default::default(),
        related_tags: Vec::new(),
    }
}

/// Record a trust change in replay, the ledger and the timeline.
fn trust_change(
    ledger: &AuditLedger,
    replay: &ReplayEngine,
    when: DateTime<Utc>,
    old_score: f64,
    new_score: f64,
    reason_codes: Vec<ReasonCode>,
    explanation: &str,
) -> SatorResult<()> {
    let update = TrustUpdate {
        event_id: Uuid::new_v4().to_string(),
        tag_id: PRIMARY_TAG.to_string(),
        timestamp: when,
        previous_score: old_score,
        new_score,
        delta: new_score - old_score,
        reason_codes: reason_codes.clone(),
        evidence_refs: vec![CONTRADICTION_ID.to_string()],
        explanation: explanation.to_string(),
    };

    ledger.append(AuditAction::TrustUpdated(TrustUpdated {
        tag_id: update.tag_id.clone(),
        old_score,
        new_score,
        reason_codes: reason_codes.iter().map(|rc| rc.as_str().to_string()).collect(),
        evidence_refs: update.evidence_refs.clone(),
    }))?;

    let marker = if new_score < old_score {
        trust_drop_event(when, PRIMARY_TAG, old_score, new_score, &reason_codes)
    } else {
        trust_recovery_event(when, PRIMARY_TAG, old_score, new_score)
    };
    replay.index_event(marker)?;
    replay.record_trust_update(update)
}

/// Record a mode change in replay, the ledger and the timeline.
fn mode_change(
    ledger: &AuditLedger,
    replay: &ReplayEngine,
    when: DateTime<Utc>,
    from: OperationalMode,
    to: OperationalMode,
    trigger: &str,
) -> SatorResult<()> {
    ledger.append(AuditAction::StateTransition(StateTransition {
        old_mode: from.as_str().to_string(),
        new_mode: to.as_str().to_string(),
        trigger: trigger.to_string(),
    }))?;
    replay.index_event(mode_transition_event(when, to, Some(trigger)))?;
    replay.record_mode_transition(when, to, Some(trigger.to_string()))
}

/// Run the whole scenario against `ledger` and `replay`.
pub fn run(ledger: &AuditLedger, replay: &ReplayEngine) -> SatorResult<ScenarioOutcome> {
    let start = parse_timestamp(SCENARIO_START)?;
    let lifecycle = SystemLifecycle {
        component: "sator-demo".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    ledger.append(AuditAction::SystemStart(lifecycle.clone()))?;
    replay.index_event(marker(start, 0, TimelineEventType::SimulationStart, "PS-3 simulation started"))?;

    for minute in 0..=10 {
        let when = at(start, minute);
        replay.record_telemetry(TelemetryPoint::new(PRIMARY_TAG, when, Some(primary_pressure(minute))))?;
        replay.record_telemetry(TelemetryPoint::new(PEER_TAG, when, Some(6.2 + 0.01 * minute as f64)))?;
        replay.record_telemetry(TelemetryPoint::new(FLOW_TAG, when, Some(118.0)))?;
    }

    let mut fault = marker(start, 4, TimelineEventType::FailureInjected, "Drift fault injected into PT-101");
    fault.severity = EventSeverity::Warning;
    fault.related_tags = vec![PRIMARY_TAG.to_string()];
    replay.index_event(fault)?;

    // ── Minute 5: disagreement ────────────────────────────────────────────────

    let detected_at = at(start, 5);
    trust_change(
        ledger,
        replay,
        detected_at,
        0.95,
        0.35,
        vec![ReasonCode::RC09, ReasonCode::RC10],
        "PT-101 drifted away from its redundant peer PT-102",
    )?;

    let contradiction = Contradiction {
        contradiction_id: CONTRADICTION_ID.to_string(),
        timestamp: detected_at,
        primary_tag_id: PRIMARY_TAG.to_string(),
        secondary_tag_ids: vec![PEER_TAG.to_string()],
        reason_code: ReasonCode::RC10,
        description: "Redundant discharge pressure transmitters disagree".to_string(),
        values: [
            (PRIMARY_TAG.to_string(), Some(primary_pressure(5))),
            (PEER_TAG.to_string(), Some(6.25)),
        ]
        .into_iter()
        .collect(),
        expected_relationship: "PT-101 within 0.2 bar of PT-102".to_string(),
        resolved: false,
        resolved_at: None,
        resolution_method: None,
    };
    replay.index_event(contradiction_detected_event(&contradiction))?;
    replay.record_contradiction(contradiction)?;

    ledger.append(AuditAction::IncidentCreated(IncidentCreated {
        incident_id: INCIDENT_ID.to_string(),
        description: "Discharge pressure disagreement at PS-3".to_string(),
        triggered_by: CONTRADICTION_ID.to_string(),
        initial_confidence: 0.7,
    }))?;
    replay.index_event(alarm_event(
        detected_at,
        "Discharge pressure disagreement at PS-3",
        EventSeverity::Critical,
        Some(PRIMARY_TAG),
        [("incident_id".to_string(), json!(INCIDENT_ID))].into_iter().collect(),
    ))?;

    mode_change(
        ledger,
        replay,
        detected_at,
        OperationalMode::Observe,
        OperationalMode::Decision,
        CONTRADICTION_ID,
    )?;

    // ── Minute 8: operator decision ───────────────────────────────────────────

    let decided_at = at(start, 8);
    let known = replay.state_at_time(decided_at)?;
    let description = "Switch control to PT-102 and dispatch technician to PT-101";
    let rationale = "PT-101 trust below 0.4 and contradicted by its redundant peer";

    let mut receipt = create_decision_receipt(DecisionContext {
        operator_id: OPERATOR_ID.to_string(),
        action_type: "act".to_string(),
        action_description: description.to_string(),
        rationale: rationale.to_string(),
        uncertainty_snapshot: json!({
            "trust_scores": known.trust_scores,
            "active_reason_codes": known.active_reason_codes,
        }),
        active_contradictions: known.unresolved_contradictions.clone(),
        evidence_refs: vec![CONTRADICTION_ID.to_string()],
    })?;

    ledger.append(AuditAction::OperatorAction(OperatorActionTaken {
        operator_id: OPERATOR_ID.to_string(),
        action_type: "act".to_string(),
        action_description: description.to_string(),
        rationale: rationale.to_string(),
        incident_id: Some(INCIDENT_ID.to_string()),
    }))?;
    ledger.record_decision_receipt(&mut receipt)?;
    replay.index_event(operator_action_event(
        decided_at,
        OPERATOR_ID,
        "act",
        description,
        vec![PRIMARY_TAG.to_string(), PEER_TAG.to_string()],
    ))?;

    // ── Minute 9: recovery ────────────────────────────────────────────────────

    let recovered_at = at(start, 9);
    replay.resolve_contradiction(CONTRADICTION_ID, recovered_at)?;
    replay.index_event(contradiction_resolved_event(
        recovered_at,
        CONTRADICTION_ID,
        Some("PT-101 recalibrated"),
        vec![PRIMARY_TAG.to_string(), PEER_TAG.to_string()],
    ))?;
    trust_change(ledger, replay, recovered_at, 0.35, 0.9, Vec::new(), "PT-101 recalibrated")?;
    mode_change(
        ledger,
        replay,
        recovered_at,
        OperationalMode::Decision,
        OperationalMode::Observe,
        "contradiction resolved",
    )?;

    replay.index_event(marker(start, 10, TimelineEventType::SimulationEnd, "PS-3 simulation ended"))?;
    ledger.append(AuditAction::SystemStop(lifecycle))?;

    Ok(ScenarioOutcome { start, receipt })
}

// ── Output ────────────────────────────────────────────────────────────────────

pub fn print_state(state: &SystemState) {
    println!("  State at {}", state.timestamp.format("%H:%M:%S"));
    println!("    Mode:                   {}", state.operational_mode.as_str().to_uppercase());
    if let Some(clock) = state.decision_clock_started {
        let elapsed = state.timestamp - clock;
        println!("    Decision clock:         running {}s", elapsed.num_seconds());
    }
    for (tag, value) in &state.telemetry {
        let trust = state
            .trust_scores
            .get(tag)
            .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
        let value = value.map_or_else(|| "no data".to_string(), |v| format!("{v:.2}"));
        println!("    {tag:<8} value {value:<8} trust {trust}");
    }
    if state.unresolved_contradictions.is_empty() {
        println!("    Contradictions:         none");
    } else {
        println!("    Contradictions:         {}", state.unresolved_contradictions.join(", "));
    }
    println!();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
