//! # sator-audit
//!
//! Tamper-evident, append-only, SHA-256 hash-chained audit ledger.
//!
//! ## Overview
//!
//! Every critical system event (incident creation, trust updates, mode
//! transitions, operator actions, decision receipts, verification runs) is
//! appended as an `AuditEvent` whose hash is chained to the previous one.
//! Editing any hashed field of any stored event breaks the chain, which the
//! verifier in `sator-verify` detects.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sator_audit::{AuditLedger, JsonlChainStore};
//! use sator_contracts::action::{AuditAction, StateTransition};
//!
//! let ledger = AuditLedger::new(Arc::new(JsonlChainStore::new("./data/audit")));
//! let event = ledger.append(AuditAction::StateTransition(StateTransition {
//!     old_mode: "observe".into(),
//!     new_mode: "decision".into(),
//!     trigger: "contradiction c-1".into(),
//! }))?;
//! ```

pub mod anchor;
pub mod chain;
pub mod ledger;
pub mod memory;
pub mod receipt;
pub mod store;

pub use chain::{canonicalize, hash_event, standalone_hash, HashChain, GENESIS_HASH};
pub use ledger::{AuditLedger, EventDraft};
pub use memory::MemoryChainStore;
pub use receipt::{create_decision_receipt, receipt_content_hash, DecisionContext};
pub use store::JsonlChainStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
