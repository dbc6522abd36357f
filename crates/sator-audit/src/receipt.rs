//! Decision receipts: the defensible record created the moment an operator
//! acts.
//!
//! A receipt is fingerprinted with `standalone_hash` over its content, so
//! it can be checked on its own, independent of the audit stream it is
//! later recorded in.

use serde_json::Value;
use uuid::Uuid;

use sator_contracts::{audit::DecisionReceipt, error::SatorResult, time::now_micros};

use crate::chain::standalone_hash;

/// What the operator decided and the context they decided in.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionContext {
    pub operator_id: String,
    pub action_type: String,
    pub action_description: String,
    pub rationale: String,
    pub uncertainty_snapshot: Value,
    pub active_contradictions: Vec<String>,
    pub evidence_refs: Vec<String>,
}

/// Create a receipt with a fresh id and timestamp and its content hash.
pub fn create_decision_receipt(context: DecisionContext) -> SatorResult<DecisionReceipt> {
    let mut receipt = DecisionReceipt {
        receipt_id: Uuid::new_v4().to_string(),
        timestamp: now_micros(),
        operator_id: context.operator_id,
        action_type: context.action_type,
        action_description: context.action_description,
        rationale: context.rationale,
        uncertainty_snapshot: context.uncertainty_snapshot,
        active_contradictions: context.active_contradictions,
        evidence_refs: context.evidence_refs,
        content_hash: String::new(),
        audit_event_id: None,
    };
    receipt.content_hash = receipt_content_hash(&receipt)?;
    Ok(receipt)
}

/// Hash of every receipt field except `content_hash` and `audit_event_id`.
pub fn receipt_content_hash(receipt: &DecisionReceipt) -> SatorResult<String> {
    let mut content = serde_json::to_value(receipt)?;
    if let Value::Object(map) = &mut content {
        for field in DecisionReceipt::UNHASHED_FIELDS {
            map.remove(field);
        }
    }
    standalone_hash(&content)
}
