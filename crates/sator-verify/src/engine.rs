//! Chain verifier for SATOR audit ledgers.
//!
//! `ChainVerifier` walks a chain in order and checks, for every event:
//!
//! 1. **Presence**: both `prev_hash` and `current_hash` are recorded.
//! 2. **Linkage**: `prev_hash` equals the expected genesis for the first
//!    event and the previous event's `current_hash` for every later one. No
//!    gaps or reordering are tolerated.
//! 3. **Content**: the hash recomputed over the event's hashable fields,
//!    chained with its recorded `prev_hash`, equals `current_hash`.
//!
//! The first failure is recorded and the scan continues so pass/fail counts
//! are exact. Integrity problems are never returned as `Err`; they are
//! reported in the `VerificationResult`.
//!
//! Persisted chains are verified from their raw records (`verify_stored`),
//! never from a typed reload: decoding into `AuditEvent` would reject
//! schema edits outright and normalize others before hashing.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use sator_audit::{
    chain::{chained_hash, hashable_fields, hashable_record, GENESIS_HASH},
    receipt::receipt_content_hash,
    AuditLedger,
};
use sator_contracts::{
    audit::{AuditChainSnapshot, AuditEvent, DecisionReceipt},
    error::SatorResult,
    verify::{AuditVerdict, AuditVerification, VerificationResult, VerificationStatus},
};
use sator_core::traits::ChainStore;

/// The parts of one record the verifier looks at.
struct RecordView<'a> {
    event_id: Option<&'a str>,
    prev_hash: Option<&'a str>,
    current_hash: Option<&'a str>,
    hashable: SatorResult<Value>,
}

impl<'a> RecordView<'a> {
    fn from_event(event: &'a AuditEvent) -> Self {
        Self {
            event_id: Some(event.event_id.as_str()),
            prev_hash: non_empty(&event.prev_hash),
            current_hash: non_empty(&event.current_hash),
            hashable: hashable_fields(event),
        }
    }

    fn from_record(record: &'a Value) -> Self {
        let field = |name: &str| record.get(name).and_then(Value::as_str).and_then(non_empty);
        Self {
            event_id: field("event_id"),
            prev_hash: field("prev_hash"),
            current_hash: field("current_hash"),
            hashable: Ok(hashable_record(record)),
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

/// Verifies hash chains produced by `AuditLedger`.
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    /// Expected `prev_hash` of the first event when none is passed in.
    genesis_hash: String,
}

impl ChainVerifier {
    /// A verifier expecting the standard all-zero genesis.
    pub fn new() -> Self {
        Self::with_genesis(GENESIS_HASH)
    }

    pub fn with_genesis(genesis_hash: impl Into<String>) -> Self {
        Self {
            genesis_hash: genesis_hash.into(),
        }
    }

    /// Verify a chain of typed events.
    ///
    /// `genesis_hash` overrides the expected `prev_hash` of the first event,
    /// which is how a sub-range starting mid-chain is checked.
    pub fn verify_chain(&self, events: &[AuditEvent], genesis_hash: Option<&str>) -> VerificationResult {
        let views: Vec<RecordView<'_>> = events.iter().map(RecordView::from_event).collect();
        self.scan(&views, genesis_hash)
    }

    /// Verify raw persisted records, where hash fields may be absent or the
    /// record may not match the current event schema at all.
    pub fn verify_records(&self, records: &[Value], genesis_hash: Option<&str>) -> VerificationResult {
        let views: Vec<RecordView<'_>> = records.iter().map(RecordView::from_record).collect();
        self.scan(&views, genesis_hash)
    }

    /// Verify the chain a store holds, read as raw records.
    ///
    /// Selection follows `ChainStore::load_records`. Returns the chain id
    /// with its verdict, or `None` when no such chain exists.
    pub fn verify_stored(
        &self,
        store: &dyn ChainStore,
        chain_id: Option<&str>,
    ) -> SatorResult<Option<(String, VerificationResult)>> {
        let Some(stored) = store.load_records(chain_id)? else {
            return Ok(None);
        };
        let result = self.verify_records(&stored.records, None);
        info!(
            chain_id = %stored.chain_id,
            verdict = %result.summary_message(),
            "stored chain verified"
        );
        Ok(Some((stored.chain_id, result)))
    }

    /// Check one hash against `data` chained with `prev_hash`.
    pub fn verify_single_hash<T: Serialize + ?Sized>(
        &self,
        event_data: &T,
        expected_hash: &str,
        prev_hash: &str,
    ) -> bool {
        chained_hash(event_data, prev_hash).is_ok_and(|computed| computed == expected_hash)
    }

    /// Constant-time sanity check over snapshot metadata.
    ///
    /// Compares the event count and the first/last hashes against the
    /// snapshot's recorded fields. Not a substitute for `verify_chain`: an
    /// edit to any middle event goes unnoticed here.
    pub fn quick_verify(&self, snapshot: &AuditChainSnapshot) -> bool {
        let (Some(first), Some(last)) = (snapshot.events.first(), snapshot.events.last()) else {
            return snapshot.event_count == 0;
        };
        snapshot.events.len() == snapshot.event_count
            && first.prev_hash == self.genesis_hash
            && first.current_hash == snapshot.genesis_hash
            && last.current_hash == snapshot.latest_hash
    }

    /// Answer "is the trail between these two events intact?".
    ///
    /// Bounds are inclusive event ids; an id not found in `events` leaves
    /// that side unbounded. A range that starts mid-chain is checked against
    /// the preceding event's `current_hash` as its genesis.
    pub fn verify_range(
        &self,
        events: &[AuditEvent],
        start_event_id: Option<&str>,
        end_event_id: Option<&str>,
    ) -> AuditVerification {
        let views: Vec<RecordView<'_>> = events.iter().map(RecordView::from_event).collect();
        self.range(&views, start_event_id, end_event_id)
    }

    /// `verify_range` over raw persisted records.
    pub fn verify_records_range(
        &self,
        records: &[Value],
        start_event_id: Option<&str>,
        end_event_id: Option<&str>,
    ) -> AuditVerification {
        let views: Vec<RecordView<'_>> = records.iter().map(RecordView::from_record).collect();
        self.range(&views, start_event_id, end_event_id)
    }

    /// Verify a live ledger and record the outcome in it as a
    /// `chain_verified` event.
    ///
    /// Returns `Err` only when the outcome cannot be recorded.
    pub fn verify_ledger(&self, ledger: &AuditLedger) -> SatorResult<VerificationResult> {
        let snapshot = ledger.export_chain()?;
        let result = self.verify_chain(&snapshot.events, None);
        ledger.record_verification(
            result.is_valid,
            result.events_checked,
            result.error_message.clone(),
            result.verified_at,
        )?;
        info!(
            chain_id = %snapshot.chain_id,
            verdict = %result.summary_message(),
            "ledger verification recorded"
        );
        Ok(result)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn range(
        &self,
        views: &[RecordView<'_>],
        start_event_id: Option<&str>,
        end_event_id: Option<&str>,
    ) -> AuditVerification {
        let position = |id: Option<&str>| id.and_then(|id| views.iter().position(|v| v.event_id == Some(id)));
        let start = position(start_event_id).unwrap_or(0);
        let end = position(end_event_id).map_or(views.len(), |i| i + 1);

        let range: &[RecordView<'_>] = if start < end { &views[start..end] } else { &[] };
        let genesis = match start {
            0 => Some(self.genesis_hash.as_str()),
            i => views[i - 1].current_hash,
        };

        // A predecessor without a hash fails the range's first link.
        let result = self.scan(range, Some(genesis.unwrap_or_default()));
        AuditVerification {
            status: if result.is_valid {
                AuditVerdict::Pass
            } else {
                AuditVerdict::Fail
            },
            is_valid: result.is_valid,
            events_checked: result.events_checked,
            root_hash: result.genesis_hash,
        }
    }

    fn scan(&self, records: &[RecordView<'_>], genesis_hash: Option<&str>) -> VerificationResult {
        let verified_at = Utc::now();
        let genesis = genesis_hash.unwrap_or(&self.genesis_hash);

        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            debug!("empty chain verified");
            return VerificationResult {
                status: VerificationStatus::Pass,
                is_valid: true,
                events_checked: 0,
                events_passed: 0,
                events_failed: 0,
                first_failure_index: None,
                error_message: None,
                genesis_hash: GENESIS_HASH.to_string(),
                latest_hash: GENESIS_HASH.to_string(),
                verified_at,
            };
        };

        let mut events_passed = 0;
        let mut first_failure: Option<(usize, String)> = None;

        for (index, record) in records.iter().enumerate() {
            let expected_prev = match index {
                0 => Some(genesis),
                i => records[i - 1].current_hash,
            };
            match check_record(index, record, expected_prev) {
                Ok(()) => events_passed += 1,
                Err(message) => {
                    debug!(index, %message, "audit event failed verification");
                    if first_failure.is_none() {
                        first_failure = Some((index, message));
                    }
                }
            }
        }

        let events_checked = records.len();
        let events_failed = events_checked - events_passed;
        let is_valid = events_failed == 0;
        let status = if is_valid {
            VerificationStatus::Pass
        } else if events_passed > 0 {
            VerificationStatus::Partial
        } else {
            VerificationStatus::Fail
        };
        let (first_failure_index, error_message) = first_failure.unzip();

        if is_valid {
            debug!(events_checked, "hash chain verified");
        } else {
            warn!(
                events_checked,
                events_failed,
                first_failure_index = ?first_failure_index,
                error = ?error_message,
                "hash chain verification failed"
            );
        }

        VerificationResult {
            status,
            is_valid,
            events_checked,
            events_passed,
            events_failed,
            first_failure_index,
            error_message,
            genesis_hash: first.current_hash.unwrap_or_default().to_string(),
            latest_hash: last.current_hash.unwrap_or_default().to_string(),
            verified_at,
        }
    }
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

fn check_record(index: usize, record: &RecordView<'_>, expected_prev: Option<&str>) -> Result<(), String> {
    let (Some(prev_hash), Some(current_hash)) = (record.prev_hash, record.current_hash) else {
        return Err(format!("Event {index} missing hash fields"));
    };

    if expected_prev != Some(prev_hash) {
        return Err(if index == 0 {
            "Event 0 prev_hash doesn't match genesis".to_string()
        } else {
            format!("Event {index} prev_hash doesn't match previous current_hash")
        });
    }

    let hashable = record
        .hashable
        .as_ref()
        .map_err(|e| format!("Event {index} could not be canonicalized: {e}"))?;
    let computed = chained_hash(hashable, prev_hash)
        .map_err(|e| format!("Event {index} could not be canonicalized: {e}"))?;
    if computed != current_hash {
        return Err(format!("Event {index} hash mismatch"));
    }
    Ok(())
}

/// Whether a decision receipt still matches its recorded content hash.
pub fn verify_decision_receipt(receipt: &DecisionReceipt) -> bool {
    receipt_content_hash(receipt).is_ok_and(|computed| computed == receipt.content_hash)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use chrono::Duration;
    use serde_json::{json, Value};

    use sator_audit::{create_decision_receipt, AuditLedger, DecisionContext, JsonlChainStore, MemoryChainStore};
    use sator_core::traits::ChainStore;
    use sator_contracts::{
        action::{AuditAction, StateTransition, TrustUpdated},
        audit::{Actor, AuditEvent},
        verify::{AuditVerdict, VerificationStatus},
    };

    use super::{verify_decision_receipt, ChainVerifier, GENESIS_HASH};

    // ── Builder helpers ───────────────────────────────────────────────────────

    fn ledger_with(n: usize) -> AuditLedger {
        let ledger = AuditLedger::new(Arc::new(MemoryChainStore::new()));
        for i in 0..n {
            let action = if i % 2 == 0 {
                AuditAction::TrustUpdated(TrustUpdated {
                    tag_id: format!("PT-{}", 100 + i),
                    old_score: 1.0,
                    new_score: 0.1 * i as f64,
                    reason_codes: vec!["RC05".to_string(), "RC10".to_string()],
                    evidence_refs: vec![format!("ev-{i}")],
                })
            } else {
                AuditAction::StateTransition(StateTransition {
                    old_mode: "observe".to_string(),
                    new_mode: "decision".to_string(),
                    trigger: format!("step {i}"),
                })
            };
            ledger.append(action).unwrap();
        }
        ledger
    }

    fn chain(n: usize) -> Vec<AuditEvent> {
        ledger_with(n).get_events(0, None, None).unwrap()
    }

    fn as_records(events: &[AuditEvent]) -> Vec<Value> {
        events
            .iter()
            .map(|e| {
                let line = serde_json::to_string(e).unwrap();
                serde_json::from_str(&line).unwrap()
            })
            .collect()
    }

    // ── Full verification ─────────────────────────────────────────────────────

    /// An untouched chain passes with exact counts and boundary hashes.
    #[test]
    fn test_valid_chain_passes() {
        let events = chain(5);
        let result = ChainVerifier::new().verify_chain(&events, None);

        assert!(result.is_valid);
        assert_eq!(result.status, VerificationStatus::Pass);
        assert_eq!(result.events_checked, 5);
        assert_eq!(result.events_passed, 5);
        assert_eq!(result.events_failed, 0);
        assert_eq!(result.first_failure_index, None);
        assert_eq!(result.genesis_hash, events[0].current_hash);
        assert_eq!(result.latest_hash, events[4].current_hash);
        assert_eq!(result.summary_message(), "Chain Verified: PASS");
    }

    #[test]
    fn test_empty_chain_is_valid() {
        let result = ChainVerifier::new().verify_chain(&[], None);
        assert!(result.is_valid);
        assert_eq!(result.status, VerificationStatus::Pass);
        assert_eq!(result.events_checked, 0);
        assert_eq!(result.genesis_hash, GENESIS_HASH);
        assert_eq!(result.latest_hash, GENESIS_HASH);
    }

    /// Editing any hashed field of one event fails exactly that event.
    #[test]
    fn test_tamper_detected_at_exact_index() {
        let tampers: Vec<fn(&mut AuditEvent)> = vec![
            |e: &mut AuditEvent| e.payload["tampered"] = json!(true),
            |e: &mut AuditEvent| e.actor = Actor::Agent,
            |e: &mut AuditEvent| e.timestamp = e.timestamp + Duration::microseconds(1),
            |e: &mut AuditEvent| e.data_ref = Some("inc-forged".to_string()),
            |e: &mut AuditEvent| e.action = "incident_created".to_string(),
        ];

        let original = chain(4);
        for tamper in &tampers {
            for index in 0..original.len() {
                let mut events = original.clone();
                tamper(&mut events[index]);

                let result = ChainVerifier::new().verify_chain(&events, None);
                assert!(!result.is_valid);
                assert_eq!(result.first_failure_index, Some(index));
                assert_eq!(result.events_failed, 1);
                assert_eq!(result.status, VerificationStatus::Partial);
                assert_eq!(
                    result.error_message.as_deref(),
                    Some(format!("Event {index} hash mismatch").as_str())
                );
            }
        }
    }

    /// The anchor signature is outside the hash.
    #[test]
    fn test_anchor_signature_edit_is_not_tampering() {
        let mut events = chain(3);
        events[1].anchor_tx_sig = Some("5VERYREALSIG".to_string());
        assert!(ChainVerifier::new().verify_chain(&events, None).is_valid);
    }

    #[test]
    fn test_reordering_is_rejected() {
        let mut events = chain(4);
        events.swap(1, 2);
        let result = ChainVerifier::new().verify_chain(&events, None);
        assert!(!result.is_valid);
        assert_eq!(result.first_failure_index, Some(1));
        assert_eq!(
            result.error_message.as_deref(),
            Some("Event 1 prev_hash doesn't match previous current_hash")
        );
    }

    #[test]
    fn test_deleted_event_is_rejected() {
        let mut events = chain(4);
        events.remove(1);
        let result = ChainVerifier::new().verify_chain(&events, None);
        assert_eq!(result.first_failure_index, Some(1));
        assert_eq!(result.events_failed, 1);
        assert!(result
            .summary_message()
            .starts_with("Chain Verified: FAIL - Event 1"));
    }

    #[test]
    fn test_single_bad_event_is_fail_not_partial() {
        let mut events = chain(1);
        events[0].payload = json!({});
        let result = ChainVerifier::new().verify_chain(&events, None);
        assert_eq!(result.status, VerificationStatus::Fail);
        assert_eq!(result.events_passed, 0);
    }

    #[test]
    fn test_wrong_genesis_fails_first_event() {
        let events = chain(2);
        let other = "f".repeat(64);

        let result = ChainVerifier::new().verify_chain(&events, Some(&other));
        assert_eq!(result.first_failure_index, Some(0));
        assert_eq!(
            result.error_message.as_deref(),
            Some("Event 0 prev_hash doesn't match genesis")
        );

        let result = ChainVerifier::with_genesis(other).verify_chain(&events, None);
        assert_eq!(result.first_failure_index, Some(0));
    }

    /// Verification is a pure read: repeating it gives the same verdict.
    #[test]
    fn test_reverification_is_idempotent() {
        let mut events = chain(5);
        events[3].payload["new_score"] = json!(0.99);
        let verifier = ChainVerifier::new();

        let first = verifier.verify_chain(&events, None);
        let mut second = verifier.verify_chain(&events, None);
        second.verified_at = first.verified_at;
        assert_eq!(first, second);
    }

    // ── Raw records ───────────────────────────────────────────────────────────

    /// Records read back from JSON lines verify exactly like the typed events.
    #[test]
    fn test_persisted_records_verify() {
        let events = chain(4);
        let records = as_records(&events);
        let result = ChainVerifier::new().verify_records(&records, None);
        assert!(result.is_valid, "{:?}", result.error_message);
        assert_eq!(result.latest_hash, events[3].current_hash);
    }

    #[test]
    fn test_missing_hash_fields_fail_the_event() {
        let mut records = as_records(&chain(3));
        records[1].as_object_mut().unwrap().remove("current_hash");

        let result = ChainVerifier::new().verify_records(&records, None);
        assert!(!result.is_valid);
        assert_eq!(result.first_failure_index, Some(1));
        assert_eq!(
            result.error_message.as_deref(),
            Some("Event 1 missing hash fields")
        );
        // The successor can no longer link to it either.
        assert_eq!(result.events_failed, 2);

        let mut events = chain(2);
        events[0].prev_hash.clear();
        let result = ChainVerifier::new().verify_chain(&events, None);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Event 0 missing hash fields")
        );
    }

    #[test]
    fn test_verify_single_hash() {
        let events = chain(2);
        let verifier = ChainVerifier::new();
        let data = sator_audit::chain::hashable_fields(&events[1]).unwrap();

        assert!(verifier.verify_single_hash(&data, &events[1].current_hash, &events[1].prev_hash));
        assert!(!verifier.verify_single_hash(&data, &events[1].current_hash, GENESIS_HASH));
    }

    // ── Quick verify ──────────────────────────────────────────────────────────

    #[test]
    fn test_quick_verify_checks_metadata() {
        let ledger = ledger_with(3);
        let verifier = ChainVerifier::new();

        let snapshot = ledger.export_chain().unwrap();
        assert!(verifier.quick_verify(&snapshot));

        let mut wrong_count = snapshot.clone();
        wrong_count.event_count = 4;
        assert!(!verifier.quick_verify(&wrong_count));

        let mut wrong_latest = snapshot.clone();
        wrong_latest.latest_hash = GENESIS_HASH.to_string();
        assert!(!verifier.quick_verify(&wrong_latest));

        // Middle edits are invisible to the quick check.
        let mut edited = snapshot;
        edited.events[1].payload = json!({});
        assert!(verifier.quick_verify(&edited));
        assert!(!verifier.verify_chain(&edited.events, None).is_valid);

        let empty = ledger_with(0).export_chain().unwrap();
        assert!(verifier.quick_verify(&empty));
    }

    // ── Range queries ─────────────────────────────────────────────────────────

    #[test]
    fn test_verify_range_bounds() {
        let events = chain(6);
        let verifier = ChainVerifier::new();

        let full = verifier.verify_range(&events, None, None);
        assert_eq!(full.status, AuditVerdict::Pass);
        assert_eq!(full.events_checked, 6);
        assert_eq!(full.root_hash, events[0].current_hash);

        let middle = verifier.verify_range(&events, Some(&events[2].event_id), Some(&events[4].event_id));
        assert!(middle.is_valid);
        assert_eq!(middle.events_checked, 3);
        assert_eq!(middle.root_hash, events[2].current_hash);

        let unknown = verifier.verify_range(&events, Some("nope"), Some("nope"));
        assert_eq!(unknown.events_checked, 6);

        let inverted = verifier.verify_range(&events, Some(&events[4].event_id), Some(&events[1].event_id));
        assert!(inverted.is_valid);
        assert_eq!(inverted.events_checked, 0);
    }

    #[test]
    fn test_verify_range_only_sees_its_events() {
        let mut events = chain(6);
        events[0].payload["forged"] = json!(1);
        let verifier = ChainVerifier::new();

        let tail = verifier.verify_range(&events, Some(&events[3].event_id), None);
        assert_eq!(tail.status, AuditVerdict::Pass);

        let head = verifier.verify_range(&events, None, Some(&events[2].event_id));
        assert_eq!(head.status, AuditVerdict::Fail);
        assert!(!head.is_valid);
    }

    // ── Stored chains ─────────────────────────────────────────────────────────

    /// A JSON-lines chain with `n` events plus its store and chain id.
    fn persisted_chain(n: usize) -> (tempfile::TempDir, JsonlChainStore, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = AuditLedger::new(Arc::new(JsonlChainStore::new(dir.path())));
        for i in 0..n {
            ledger
                .append(AuditAction::StateTransition(StateTransition {
                    old_mode: "observe".to_string(),
                    new_mode: "decision".to_string(),
                    trigger: format!("step {i}"),
                }))
                .unwrap();
        }
        let chain_id = ledger.chain_id().unwrap();
        let store = JsonlChainStore::new(dir.path());
        (dir, store, chain_id)
    }

    /// Rewrite line `index` of the chain file with `edit`.
    fn edit_line(store: &JsonlChainStore, chain_id: &str, index: usize, edit: impl Fn(&str) -> String) {
        let path = store.chain_path(chain_id);
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<String> = contents
            .lines()
            .enumerate()
            .map(|(i, line)| if i == index { edit(line) } else { line.to_string() })
            .collect();
        fs::write(&path, lines.join("\n") + "\n").unwrap();
    }

    #[test]
    fn test_untouched_stored_chain_passes() {
        let (_dir, store, chain_id) = persisted_chain(3);
        let (id, result) = ChainVerifier::new().verify_stored(&store, None).unwrap().unwrap();
        assert_eq!(id, chain_id);
        assert!(result.is_valid, "{:?}", result.error_message);
        assert_eq!(result.events_checked, 3);

        assert!(ChainVerifier::new().verify_stored(&store, Some("missing")).unwrap().is_none());
    }

    /// An edit that no longer decodes as an event is still a verdict, not an
    /// error.
    #[test]
    fn test_stored_schema_edit_reported_as_failure() {
        let (_dir, store, chain_id) = persisted_chain(3);
        edit_line(&store, &chain_id, 1, |line| line.replacen("\"actor\":\"system\"", "\"actor\":\"root\"", 1));

        assert!(store.load(Some(&chain_id)).is_err());

        let (_, result) = ChainVerifier::new()
            .verify_stored(&store, Some(&chain_id))
            .unwrap()
            .unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.first_failure_index, Some(1));
        assert_eq!(result.error_message.as_deref(), Some("Event 1 hash mismatch"));
    }

    /// Extra sub-microsecond digits change the stored bytes and are caught
    /// even though a typed decode would round them away.
    #[test]
    fn test_stored_timestamp_precision_edit_detected() {
        let (_dir, store, chain_id) = persisted_chain(3);
        edit_line(&store, &chain_id, 1, |line| line.replacen("Z\"", "999Z\"", 1));

        let raw = store.load_records(Some(&chain_id)).unwrap().unwrap();
        let result = ChainVerifier::new().verify_records(&raw.records, None);
        assert!(!result.is_valid);
        assert_eq!(result.first_failure_index, Some(1));
        assert_eq!(result.events_failed, 1);
    }

    #[test]
    fn test_stored_garbage_line_is_missing_hash_fields() {
        let (_dir, store, chain_id) = persisted_chain(2);
        edit_line(&store, &chain_id, 0, |_| "{not json".to_string());

        let (_, result) = ChainVerifier::new()
            .verify_stored(&store, Some(&chain_id))
            .unwrap()
            .unwrap();
        assert_eq!(result.first_failure_index, Some(0));
        assert_eq!(result.error_message.as_deref(), Some("Event 0 missing hash fields"));
    }

    #[test]
    fn test_records_range_matches_typed_range() {
        let events = chain(5);
        let records = as_records(&events);
        let verifier = ChainVerifier::new();

        let typed = verifier.verify_range(&events, Some(&events[1].event_id), Some(&events[3].event_id));
        let raw = verifier.verify_records_range(&records, Some(&events[1].event_id), Some(&events[3].event_id));
        assert_eq!(raw, typed);
        assert_eq!(raw.events_checked, 3);

        let mut tampered = records;
        tampered[2]["payload"]["forged"] = json!(true);
        let raw = verifier.verify_records_range(&tampered, Some(&events[1].event_id), None);
        assert_eq!(raw.status, AuditVerdict::Fail);
    }

    // ── Ledger + receipts ─────────────────────────────────────────────────────

    /// Verifying a ledger leaves a verifiable `chain_verified` record behind.
    #[test]
    fn test_verify_ledger_records_outcome() {
        let ledger = ledger_with(3);
        let verifier = ChainVerifier::new();

        let result = verifier.verify_ledger(&ledger).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.events_checked, 3);

        let events = ledger.get_events(0, None, None).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].action, "chain_verified");
        assert_eq!(events[3].payload["events_checked"], json!(3));

        let snapshot = ledger.export_chain().unwrap();
        assert_eq!(snapshot.last_verified_at, Some(result.verified_at));
        assert!(verifier.verify_chain(&events, None).is_valid);
    }

    #[test]
    fn test_decision_receipt_verification() {
        let mut receipt = create_decision_receipt(DecisionContext {
            operator_id: "op-1".to_string(),
            action_type: "escalate".to_string(),
            action_description: "page shift supervisor".to_string(),
            rationale: "two sensors disagree".to_string(),
            uncertainty_snapshot: json!({ "PT-101": 0.42 }),
            active_contradictions: vec!["c-7".to_string()],
            evidence_refs: vec![],
        })
        .unwrap();
        assert!(verify_decision_receipt(&receipt));

        receipt.audit_event_id = Some("evt-1".to_string());
        assert!(verify_decision_receipt(&receipt));

        receipt.action_type = "act".to_string();
        assert!(!verify_decision_receipt(&receipt));
    }
}
