//! Audit event, chain snapshot, and receipt types.
//!
//! `AuditEvent` is a single entry in the hash chain. Its `current_hash`
//! commits to every field except the two hash fields and the optional
//! anchor signature, chained with `prev_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::micros;

/// Who or what caused an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    System,
    User,
    Agent,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::System => "system",
            Actor::User => "user",
            Actor::Agent => "agent",
        }
    }
}

/// A single, immutable entry in the hash-chained audit ledger.
///
/// Modifying any hashed field invalidates `current_hash` and therefore the
/// `prev_hash` of every later event, which the chain verifier detects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Opaque unique identifier (UUID v4).
    pub event_id: String,

    /// Creation instant, microsecond precision, fixed wire format.
    #[serde(with = "micros")]
    pub timestamp: DateTime<Utc>,

    pub actor: Actor,

    #[serde(default)]
    pub actor_id: Option<String>,

    /// Action tag, e.g. `trust_updated`. Treated as opaque for hashing.
    pub action: String,

    /// Action-specific structured data.
    #[serde(default = "empty_object")]
    pub payload: Value,

    /// Reference to a related artifact (incident, receipt, ...).
    #[serde(default)]
    pub data_ref: Option<String>,

    /// Hash of the previous event, or `GENESIS_HASH` for the first event.
    #[serde(default)]
    pub prev_hash: String,

    /// SHA-256 (hex) over the canonical hashable fields chained with
    /// `prev_hash`.
    #[serde(default)]
    pub current_hash: String,

    /// External anchor transaction reference. Never hashed.
    #[serde(default)]
    pub anchor_tx_sig: Option<String>,
}

impl AuditEvent {
    /// The sentinel `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// Fields excluded from the hash input.
    pub const UNHASHED_FIELDS: [&'static str; 3] = ["prev_hash", "current_hash", "anchor_tx_sig"];
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Chain metadata returned by `AuditLedger::chain_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: String,
    pub created_at: DateTime<Utc>,
    pub event_count: usize,
    /// `current_hash` of the first event, or `GENESIS_HASH` when empty.
    pub genesis_hash: String,
    pub latest_hash: String,
}

/// A full export of an audit chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChainSnapshot {
    pub chain_id: String,
    pub created_at: DateTime<Utc>,
    pub genesis_hash: String,
    pub latest_hash: String,
    pub event_count: usize,
    #[serde(default)]
    pub last_verified_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_valid: bool,
    pub events: Vec<AuditEvent>,
}

fn default_true() -> bool {
    true
}

/// What the anchor collaborator is told about the hash it notarizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRequest {
    pub chain_id: String,
    pub event_id: String,
    pub action: String,
    pub anchored_hash: String,
}

/// Proof returned by an external anchor that a hash existed at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorReceipt {
    pub receipt_id: String,
    pub timestamp: DateTime<Utc>,
    pub audit_event_id: String,
    pub anchored_hash: String,
    pub tx_signature: String,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<DateTime<Utc>>,
}

/// Immutable record of an operator decision, fingerprinted independently of
/// the audit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReceipt {
    pub receipt_id: String,
    #[serde(with = "micros")]
    pub timestamp: DateTime<Utc>,
    pub operator_id: String,
    /// `act`, `escalate` or `defer`.
    pub action_type: String,
    pub action_description: String,
    pub rationale: String,
    /// Trust scores and reason codes at decision time.
    pub uncertainty_snapshot: Value,
    #[serde(default)]
    pub active_contradictions: Vec<String>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    /// SHA-256 over every other field except `audit_event_id`.
    pub content_hash: String,
    #[serde(default)]
    pub audit_event_id: Option<String>,
}

impl DecisionReceipt {
    /// Fields excluded from the receipt's content hash.
    pub const UNHASHED_FIELDS: [&'static str; 2] = ["content_hash", "audit_event_id"];
}
