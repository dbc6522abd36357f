//! Simulated external notary for the demo.
//!
//! Stands in for an on-chain anchoring program. No network is contacted;
//! receipts are fabricated locally with a monotonically increasing slot.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use sator_contracts::{
    audit::{AnchorReceipt, AnchorRequest},
    error::{SatorError, SatorResult},
};
use sator_core::traits::AuditAnchor;

pub struct MockAnchor {
    slot: AtomicU64,
}

impl MockAnchor {
    pub fn new(start_slot: u64) -> Self {
        Self {
            slot: AtomicU64::new(start_slot),
        }
    }
}

impl AuditAnchor for MockAnchor {
    fn anchor_hash(&self, request: &AnchorRequest) -> SatorResult<AnchorReceipt> {
        let prefix = request
            .anchored_hash
            .get(..16)
            .ok_or_else(|| SatorError::AnchorFailed {
                reason: format!("hash too short to anchor: '{}'", request.anchored_hash),
            })?;
        let slot = self.slot.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        debug!(event_id = %request.event_id, slot, "mock anchor notarized hash");

        Ok(AnchorReceipt {
            receipt_id: Uuid::new_v4().to_string(),
            timestamp: now,
            audit_event_id: request.event_id.clone(),
            anchored_hash: request.anchored_hash.clone(),
            tx_signature: format!("mock{slot}x{prefix}"),
            slot,
            block_time: Some(now),
        })
    }
}
