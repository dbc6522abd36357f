//! Typed audit actions.
//!
//! Producers build an `AuditAction`; the ledger stores its wire tag in
//! `AuditEvent::action` and its payload as a JSON map in
//! `AuditEvent::payload`. `AuditAction::decode` recovers the typed form from
//! a stored event.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    audit::Actor,
    error::{SatorError, SatorResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentCreated {
    pub incident_id: String,
    pub description: String,
    pub triggered_by: String,
    pub initial_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustUpdated {
    pub tag_id: String,
    pub old_score: f64,
    pub new_score: f64,
    pub reason_codes: Vec<String>,
    pub evidence_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub old_mode: String,
    pub new_mode: String,
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorActionTaken {
    /// The operator who acted; recorded as the event's `actor_id`.
    #[serde(skip)]
    pub operator_id: String,
    pub action_type: String,
    pub action_description: String,
    pub rationale: String,
    pub incident_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReceiptLogged {
    pub receipt_id: String,
    pub content_hash: String,
    pub operator_id: String,
    pub action_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainVerified {
    pub is_valid: bool,
    pub events_checked: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemLifecycle {
    pub component: String,
    pub version: String,
}

/// The closed vocabulary of audit actions, one payload shape per kind.
///
/// `Custom` carries producer-defined actions outside the core vocabulary;
/// the ledger and verifier treat every action tag as opaque.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditAction {
    IncidentCreated(IncidentCreated),
    TrustUpdated(TrustUpdated),
    StateTransition(StateTransition),
    OperatorAction(OperatorActionTaken),
    DecisionReceipt(DecisionReceiptLogged),
    ChainVerified(ChainVerified),
    SystemStart(SystemLifecycle),
    SystemStop(SystemLifecycle),
    Custom { action: String, payload: Value },
}

impl AuditAction {
    pub const INCIDENT_CREATED: &'static str = "incident_created";
    pub const TRUST_UPDATED: &'static str = "trust_updated";
    pub const STATE_TRANSITION: &'static str = "state_transition";
    pub const OPERATOR_ACTION: &'static str = "operator_action";
    pub const DECISION_RECEIPT: &'static str = "decision_receipt";
    pub const CHAIN_VERIFIED: &'static str = "chain_verified";
    pub const SYSTEM_START: &'static str = "system_start";
    pub const SYSTEM_STOP: &'static str = "system_stop";

    /// The wire tag stored in `AuditEvent::action`.
    pub fn action(&self) -> &str {
        match self {
            AuditAction::IncidentCreated(_) => Self::INCIDENT_CREATED,
            AuditAction::TrustUpdated(_) => Self::TRUST_UPDATED,
            AuditAction::StateTransition(_) => Self::STATE_TRANSITION,
            AuditAction::OperatorAction(_) => Self::OPERATOR_ACTION,
            AuditAction::DecisionReceipt(_) => Self::DECISION_RECEIPT,
            AuditAction::ChainVerified(_) => Self::CHAIN_VERIFIED,
            AuditAction::SystemStart(_) => Self::SYSTEM_START,
            AuditAction::SystemStop(_) => Self::SYSTEM_STOP,
            AuditAction::Custom { action, .. } => action,
        }
    }

    /// The payload as the JSON map stored in `AuditEvent::payload`.
    pub fn payload_value(&self) -> SatorResult<Value> {
        let value = match self {
            AuditAction::IncidentCreated(p) => serde_json::to_value(p)?,
            AuditAction::TrustUpdated(p) => serde_json::to_value(p)?,
            AuditAction::StateTransition(p) => serde_json::to_value(p)?,
            AuditAction::OperatorAction(p) => serde_json::to_value(p)?,
            AuditAction::DecisionReceipt(p) => serde_json::to_value(p)?,
            AuditAction::ChainVerified(p) => serde_json::to_value(p)?,
            AuditAction::SystemStart(p) | AuditAction::SystemStop(p) => serde_json::to_value(p)?,
            AuditAction::Custom { payload, .. } => payload.clone(),
        };
        Ok(value)
    }

    /// The actor recorded for this kind of action.
    ///
    /// Operator actions are attributed to a user; everything else the core
    /// emits is attributed to the system. Custom actions default to system
    /// and can be overridden at append time.
    pub fn default_actor(&self) -> Actor {
        match self {
            AuditAction::OperatorAction(_) => Actor::User,
            _ => Actor::System,
        }
    }

    /// The actor identifier implied by the payload, if any.
    pub fn default_actor_id(&self) -> Option<String> {
        match self {
            AuditAction::OperatorAction(p) => Some(p.operator_id.clone()),
            _ => None,
        }
    }

    /// The artifact reference implied by the payload, if any.
    pub fn default_data_ref(&self) -> Option<String> {
        match self {
            AuditAction::IncidentCreated(p) => Some(p.incident_id.clone()),
            AuditAction::OperatorAction(p) => p.incident_id.clone(),
            AuditAction::DecisionReceipt(p) => Some(p.receipt_id.clone()),
            _ => None,
        }
    }

    /// Whether this kind of action is notarized with the external anchor.
    ///
    /// Operator decisions and decision receipts are anchored.
    pub fn anchors_by_default(&self) -> bool {
        matches!(
            self,
            AuditAction::OperatorAction(_) | AuditAction::DecisionReceipt(_)
        )
    }

    /// Recover the typed action from a stored tag and payload.
    ///
    /// Unknown tags decode as `Custom`. `actor_id` restores the operator of
    /// an `operator_action` event, which is not part of its payload.
    pub fn decode(action: &str, payload: &Value, actor_id: Option<&str>) -> SatorResult<Self> {
        let decoded = match action {
            Self::INCIDENT_CREATED => AuditAction::IncidentCreated(typed(action, payload)?),
            Self::TRUST_UPDATED => AuditAction::TrustUpdated(typed(action, payload)?),
            Self::STATE_TRANSITION => AuditAction::StateTransition(typed(action, payload)?),
            Self::OPERATOR_ACTION => {
                let mut p: OperatorActionTaken = typed(action, payload)?;
                p.operator_id = actor_id.unwrap_or_default().to_string();
                AuditAction::OperatorAction(p)
            }
            Self::DECISION_RECEIPT => AuditAction::DecisionReceipt(typed(action, payload)?),
            Self::CHAIN_VERIFIED => AuditAction::ChainVerified(typed(action, payload)?),
            Self::SYSTEM_START => AuditAction::SystemStart(typed(action, payload)?),
            Self::SYSTEM_STOP => AuditAction::SystemStop(typed(action, payload)?),
            other => AuditAction::Custom {
                action: other.to_string(),
                payload: payload.clone(),
            },
        };
        Ok(decoded)
    }
}

fn typed<T: DeserializeOwned>(action: &str, payload: &Value) -> SatorResult<T> {
    serde_json::from_value(payload.clone()).map_err(|e| SatorError::PayloadMismatch {
        action: action.to_string(),
        reason: e.to_string(),
    })
}
