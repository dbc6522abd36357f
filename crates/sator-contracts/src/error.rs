//! Runtime error types for the SATOR audit and replay pipeline.
//!
//! All fallible operations return `SatorResult<T>`. Integrity failures found
//! by the chain verifier are NOT errors: they are reported through a
//! `VerificationResult`.

use thiserror::Error;

/// The unified error type for the SATOR crates.
#[derive(Debug, Error)]
pub enum SatorError {
    /// A caller-supplied timestamp could not be parsed.
    ///
    /// Surfaces as a client input error (HTTP 400 equivalent).
    #[error("invalid timestamp '{input}': {reason}")]
    InvalidTimestamp { input: String, reason: String },

    /// An audit event could not be written to durable storage.
    ///
    /// This is fatal for the append: an acknowledged event that was never
    /// persisted would break the tamper-evidence guarantee.
    #[error("persistence failed: {reason}")]
    PersistenceFailed { reason: String },

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The external anchor collaborator rejected or failed a request.
    ///
    /// Only ever logged; never propagated out of an append.
    #[error("anchor failed: {reason}")]
    AnchorFailed { reason: String },

    /// An internal lock was poisoned by a panicking thread.
    #[error("lock poisoned: {reason}")]
    LockPoisoned { reason: String },

    /// An event payload does not match the shape its action tag declares.
    #[error("payload for action '{action}' does not match its schema: {reason}")]
    PayloadMismatch { action: String, reason: String },
}

impl From<serde_json::Error> for SatorError {
    fn from(e: serde_json::Error) -> Self {
        SatorError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used throughout the SATOR crates.
pub type SatorResult<T> = Result<T, SatorError>;
