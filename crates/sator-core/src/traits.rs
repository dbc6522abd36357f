//! Trait seams between the audit core and its collaborators.
//!
//! - `ChainStore`: durable, append-only home of a chain's events
//! - `AuditAnchor`: optional external notary (sidecar; failures never gate
//!   an append)

use serde_json::Value;

use sator_contracts::{
    audit::{AnchorReceipt, AnchorRequest, AuditEvent},
    error::SatorResult,
};

/// A chain read back from storage.
#[derive(Debug, Clone)]
pub struct StoredChain {
    pub chain_id: String,
    /// Events in creation order.
    pub events: Vec<AuditEvent>,
    /// Anchor receipts recorded after the events were written.
    pub anchors: Vec<AnchorReceipt>,
}

/// A chain's persisted lines, exactly as stored.
///
/// Nothing is decoded into `AuditEvent`, so a record that no longer fits the
/// event schema is still returned and a reformatting decoder cannot hide an
/// edit. A line that is not JSON at all comes back as a JSON string holding
/// the raw text.
#[derive(Debug, Clone)]
pub struct StoredRecords {
    pub chain_id: String,
    /// Records in persisted order.
    pub records: Vec<Value>,
}

/// Append-only persistence for audit chains.
///
/// Implementations must never rewrite an event once `append` has returned
/// `Ok`, and must return events from `load` in the order they were appended.
pub trait ChainStore: Send + Sync {
    /// Durably append one event to the chain `chain_id`.
    ///
    /// An `Err` means the event was not persisted; the ledger treats this as
    /// fatal for the append.
    fn append(&self, chain_id: &str, event: &AuditEvent) -> SatorResult<()>;

    /// Record an anchor receipt for an already persisted event.
    fn append_anchor(&self, chain_id: &str, receipt: &AnchorReceipt) -> SatorResult<()>;

    /// Load a chain. With no id, loads the most recently modified chain.
    ///
    /// Returns `Ok(None)` when no matching chain exists.
    fn load(&self, chain_id: Option<&str>) -> SatorResult<Option<StoredChain>>;

    /// Load a chain's raw records for integrity checking, with the same
    /// chain selection as `load`.
    fn load_records(&self, chain_id: Option<&str>) -> SatorResult<Option<StoredRecords>>;
}

/// External notarization of audit hashes (e.g. an on-chain program).
///
/// Calls are made off the append path; implementations may block, and the
/// outbox bounds how long it waits for them.
pub trait AuditAnchor: Send + Sync {
    fn anchor_hash(&self, request: &AnchorRequest) -> SatorResult<AnchorReceipt>;
}
