//! The append-only, hash-chained audit ledger.
//!
//! `AuditLedger` owns the chain tail, the ordered event list, and a
//! `ChainStore`. An append hashes, persists and records the event under one
//! mutex, so two concurrent appends can never chain from the same
//! `prev_hash` and the persisted order is always the chain order.
//!
//! Anchoring is optional and runs through an `AnchorOutbox`; its outcome
//! never affects whether an append succeeds.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sator_contracts::{
    action::{AuditAction, ChainVerified, DecisionReceiptLogged},
    audit::{
        Actor, AnchorReceipt, AnchorRequest, AuditChainSnapshot, AuditEvent, ChainInfo, DecisionReceipt,
    },
    error::{SatorError, SatorResult},
    time::now_micros,
};
use sator_core::traits::{AuditAnchor, ChainStore};

use crate::{
    anchor::AnchorOutbox,
    chain::{hashable_fields, HashChain, GENESIS_HASH},
};

/// Everything needed to append one event.
///
/// Built from a typed `AuditAction` with `EventDraft::from_action`, or
/// directly for producer-defined actions.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub action: String,
    pub actor: Actor,
    pub payload: Value,
    pub actor_id: Option<String>,
    pub data_ref: Option<String>,
    pub anchor_on_chain: bool,
}

impl EventDraft {
    /// A draft for `action` with the actor, references and anchoring policy
    /// its kind implies.
    ///
    /// Fails with `PayloadMismatch` when a custom action's payload is not a
    /// JSON object.
    pub fn from_action(action: &AuditAction) -> SatorResult<Self> {
        let payload = action.payload_value()?;
        require_object_payload(action.action(), &payload)?;
        Ok(Self {
            action: action.action().to_string(),
            actor: action.default_actor(),
            payload,
            actor_id: action.default_actor_id(),
            data_ref: action.default_data_ref(),
            anchor_on_chain: action.anchors_by_default(),
        })
    }

    pub fn actor(mut self, actor: Actor, actor_id: Option<String>) -> Self {
        self.actor = actor;
        self.actor_id = actor_id;
        self
    }

    pub fn data_ref(mut self, data_ref: Option<String>) -> Self {
        self.data_ref = data_ref;
        self
    }

    pub fn anchored(mut self, anchor_on_chain: bool) -> Self {
        self.anchor_on_chain = anchor_on_chain;
        self
    }
}

/// Event payloads are always JSON objects.
fn require_object_payload(action: &str, payload: &Value) -> SatorResult<()> {
    if payload.is_object() {
        return Ok(());
    }
    Err(SatorError::PayloadMismatch {
        action: action.to_string(),
        reason: format!("payload must be a JSON object, got {}", json_kind(payload)),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct LedgerState {
    chain: HashChain,
    events: Vec<AuditEvent>,
    chain_id: String,
    created_at: DateTime<Utc>,
    last_verified_at: Option<DateTime<Utc>>,
    last_verified_valid: bool,
}

impl LedgerState {
    fn fresh() -> Self {
        Self {
            chain: HashChain::new(),
            events: Vec::new(),
            chain_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            last_verified_at: None,
            last_verified_valid: true,
        }
    }

    fn genesis_hash(&self) -> String {
        self.events
            .first()
            .map(|e| e.current_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }
}

/// Anchor signatures by event id, filled in by the outbox worker.
type AnchorTable = Arc<Mutex<HashMap<String, String>>>;

pub struct AuditLedger {
    state: Mutex<LedgerState>,
    store: Arc<dyn ChainStore>,
    anchors: AnchorTable,
    outbox: Option<AnchorOutbox>,
}

impl AuditLedger {
    /// A new, empty chain with a fresh chain id, persisted to `store`.
    pub fn new(store: Arc<dyn ChainStore>) -> Self {
        Self {
            state: Mutex::new(LedgerState::fresh()),
            store,
            anchors: Arc::new(Mutex::new(HashMap::new())),
            outbox: None,
        }
    }

    /// Attach an external anchor. Calls are bounded by `timeout`.
    pub fn with_anchor(mut self, anchor: Arc<dyn AuditAnchor>, timeout: Duration) -> Self {
        let table = Arc::clone(&self.anchors);
        let store = Arc::clone(&self.store);
        let sink = Box::new(move |request: &AnchorRequest, receipt: AnchorReceipt| {
            if let Ok(mut table) = table.lock() {
                table.insert(request.event_id.clone(), receipt.tx_signature.clone());
            }
            if let Err(e) = store.append_anchor(&request.chain_id, &receipt) {
                warn!(event_id = %request.event_id, error = %e, "failed to persist anchor receipt");
            }
        });
        self.outbox = Some(AnchorOutbox::spawn(anchor, timeout, sink));
        self
    }

    fn lock(&self) -> SatorResult<MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|e| SatorError::LockPoisoned {
            reason: format!("audit ledger state lock poisoned: {}", e),
        })
    }

    // ── Append ────────────────────────────────────────────────────────────────

    /// Append a typed action using the defaults its kind implies.
    pub fn append(&self, action: AuditAction) -> SatorResult<AuditEvent> {
        self.append_draft(EventDraft::from_action(&action)?)
    }

    /// Append one event.
    ///
    /// Generates the event id and timestamp, chains the hashable fields onto
    /// the tail, and persists the event before returning it. If persistence
    /// fails the tail is rolled back and `PersistenceFailed` is returned, so
    /// the caller can retry without leaving a gap in the chain.
    ///
    /// When `anchor_on_chain` is set and an anchor is attached, the new hash
    /// is queued for notarization after the event is durable.
    pub fn append_draft(&self, draft: EventDraft) -> SatorResult<AuditEvent> {
        require_object_payload(&draft.action, &draft.payload)?;
        let mut state = self.lock()?;

        let mut event = AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            timestamp: now_micros(),
            actor: draft.actor,
            actor_id: draft.actor_id,
            action: draft.action,
            payload: draft.payload,
            data_ref: draft.data_ref,
            prev_hash: String::new(),
            current_hash: String::new(),
            anchor_tx_sig: None,
        };

        let checkpoint = state.chain.clone();
        let (prev_hash, current_hash) = state.chain.add_event(&hashable_fields(&event)?)?;
        event.prev_hash = prev_hash;
        event.current_hash = current_hash;

        if let Err(e) = self.store.append(&state.chain_id, &event) {
            state.chain = checkpoint;
            warn!(
                chain_id = %state.chain_id,
                event_id = %event.event_id,
                error = %e,
                "audit event not persisted; chain tail rolled back"
            );
            return Err(e);
        }

        state.events.push(event.clone());
        let chain_id = state.chain_id.clone();
        let sequence = state.chain.chain_length();
        drop(state);

        debug!(
            chain_id = %chain_id,
            sequence,
            event_id = %event.event_id,
            action = %event.action,
            current_hash = %event.current_hash,
            "audit event appended"
        );

        if draft.anchor_on_chain {
            match &self.outbox {
                Some(outbox) => outbox.submit(AnchorRequest {
                    chain_id,
                    event_id: event.event_id.clone(),
                    action: event.action.clone(),
                    anchored_hash: event.current_hash.clone(),
                }),
                None => debug!(event_id = %event.event_id, "anchoring requested but no anchor attached"),
            }
        }

        Ok(event)
    }

    /// Record a decision receipt in the chain and link the receipt to it.
    pub fn record_decision_receipt(&self, receipt: &mut DecisionReceipt) -> SatorResult<AuditEvent> {
        let event = self.append(AuditAction::DecisionReceipt(DecisionReceiptLogged {
            receipt_id: receipt.receipt_id.clone(),
            content_hash: receipt.content_hash.clone(),
            operator_id: receipt.operator_id.clone(),
            action_type: receipt.action_type.clone(),
        }))?;
        receipt.audit_event_id = Some(event.event_id.clone());
        Ok(event)
    }

    /// Record the outcome of a verification run, both as a `chain_verified`
    /// event and in the snapshot metadata.
    ///
    /// The metadata only changes once the event is persisted; a failed append
    /// leaves the snapshot as it was.
    pub fn record_verification(
        &self,
        is_valid: bool,
        events_checked: usize,
        error_message: Option<String>,
        verified_at: DateTime<Utc>,
    ) -> SatorResult<AuditEvent> {
        let event = self.append(AuditAction::ChainVerified(ChainVerified {
            is_valid,
            events_checked,
            error_message,
        }))?;

        let mut state = self.lock()?;
        state.last_verified_at = Some(verified_at);
        state.last_verified_valid = is_valid;
        Ok(event)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    fn with_anchor_sig(&self, mut event: AuditEvent) -> AuditEvent {
        if event.anchor_tx_sig.is_none() {
            if let Ok(table) = self.anchors.lock() {
                event.anchor_tx_sig = table.get(&event.event_id).cloned();
            }
        }
        event
    }

    /// Events from `start_index`, optionally filtered by action, then capped
    /// at `limit`.
    pub fn get_events(
        &self,
        start_index: usize,
        limit: Option<usize>,
        action_filter: Option<&str>,
    ) -> SatorResult<Vec<AuditEvent>> {
        let state = self.lock()?;
        let events = state
            .events
            .iter()
            .skip(start_index)
            .filter(|e| action_filter.map_or(true, |a| e.action == a))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect::<Vec<_>>();
        drop(state);
        Ok(events.into_iter().map(|e| self.with_anchor_sig(e)).collect())
    }

    pub fn get_event_by_id(&self, event_id: &str) -> SatorResult<Option<AuditEvent>> {
        let state = self.lock()?;
        let found = state.events.iter().find(|e| e.event_id == event_id).cloned();
        drop(state);
        Ok(found.map(|e| self.with_anchor_sig(e)))
    }

    /// The anchor transaction signature for `event_id`, once anchored.
    pub fn anchor_signature(&self, event_id: &str) -> Option<String> {
        self.anchors.lock().ok()?.get(event_id).cloned()
    }

    /// Wait for queued anchor calls to finish. Returns `true` when drained
    /// or when no anchor is attached.
    pub fn flush_anchors(&self, max_wait: Duration) -> bool {
        self.outbox.as_ref().map_or(true, |o| o.flush(max_wait))
    }

    pub fn event_count(&self) -> SatorResult<usize> {
        Ok(self.lock()?.events.len())
    }

    pub fn chain_id(&self) -> SatorResult<String> {
        Ok(self.lock()?.chain_id.clone())
    }

    pub fn latest_hash(&self) -> SatorResult<String> {
        Ok(self.lock()?.chain.latest_hash().to_string())
    }

    pub fn chain_info(&self) -> SatorResult<ChainInfo> {
        let state = self.lock()?;
        Ok(ChainInfo {
            chain_id: state.chain_id.clone(),
            created_at: state.created_at,
            event_count: state.events.len(),
            genesis_hash: state.genesis_hash(),
            latest_hash: state.chain.latest_hash().to_string(),
        })
    }

    /// A full copy of the chain, with known anchor signatures filled in.
    pub fn export_chain(&self) -> SatorResult<AuditChainSnapshot> {
        let state = self.lock()?;
        let mut snapshot = AuditChainSnapshot {
            chain_id: state.chain_id.clone(),
            created_at: state.created_at,
            genesis_hash: state.genesis_hash(),
            latest_hash: state.chain.latest_hash().to_string(),
            event_count: state.events.len(),
            last_verified_at: state.last_verified_at,
            is_valid: state.last_verified_valid,
            events: state.events.clone(),
        };
        drop(state);
        snapshot.events = snapshot
            .events
            .into_iter()
            .map(|e| self.with_anchor_sig(e))
            .collect();
        Ok(snapshot)
    }

    // ── Reload ────────────────────────────────────────────────────────────────

    /// Replace in-memory state with a persisted chain.
    ///
    /// With no id, the most recently modified chain is loaded. The tail is
    /// restored from the last persisted `current_hash` and the event count;
    /// nothing is recomputed here, verification is the verifier's job.
    ///
    /// Returns `Ok(false)` when no matching chain exists.
    pub fn load_from_storage(&self, chain_id: Option<&str>) -> SatorResult<bool> {
        let Some(stored) = self.store.load(chain_id)? else {
            info!(chain_id = ?chain_id, "no persisted audit chain to load");
            return Ok(false);
        };

        let mut state = self.lock()?;
        match stored.events.last() {
            Some(last) => state
                .chain
                .set_state(last.current_hash.clone(), stored.events.len() as u64),
            None => state.chain.reset(),
        }
        state.created_at = stored
            .events
            .first()
            .map(|e| e.timestamp)
            .unwrap_or_else(Utc::now);
        state.chain_id = stored.chain_id;
        state.events = stored.events;
        state.last_verified_at = None;
        state.last_verified_valid = true;

        if let Ok(mut table) = self.anchors.lock() {
            table.clear();
            for receipt in &stored.anchors {
                table.insert(receipt.audit_event_id.clone(), receipt.tx_signature.clone());
            }
        }

        info!(
            chain_id = %state.chain_id,
            event_count = state.events.len(),
            latest_hash = %state.chain.latest_hash(),
            "audit chain loaded from storage"
        );
        Ok(true)
    }
}
