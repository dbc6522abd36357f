//! Chain verification verdict types.
//!
//! A `VerificationResult` is produced fresh by every verification run and
//! describes the first point of failure, if any. Verification never errors
//! on integrity problems; it reports them here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// Every event verified.
    Pass,
    /// No event verified.
    Fail,
    /// Some events verified, some did not.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub is_valid: bool,
    pub events_checked: usize,
    pub events_passed: usize,
    pub events_failed: usize,
    pub first_failure_index: Option<usize>,
    pub error_message: Option<String>,
    /// `current_hash` of the first checked event.
    pub genesis_hash: String,
    /// `current_hash` of the last checked event.
    pub latest_hash: String,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    /// One-line verdict for operators.
    pub fn summary_message(&self) -> String {
        if self.is_valid {
            "Chain Verified: PASS".to_string()
        } else {
            format!(
                "Chain Verified: FAIL - {}",
                self.error_message.as_deref().unwrap_or("unknown failure")
            )
        }
    }
}

/// Binary verdict of a range-bounded verification query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditVerdict {
    Pass,
    Fail,
}

/// Answer to "is the audit trail between these two events intact?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditVerification {
    pub status: AuditVerdict,
    pub is_valid: bool,
    pub events_checked: usize,
    /// Genesis hash of the checked subsequence.
    pub root_hash: String,
}
