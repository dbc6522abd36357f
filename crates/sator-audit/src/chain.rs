//! Hash-chain primitives: canonicalization, chained hashing, chain state.
//!
//! Hash formula:
//!
//!   H_n = SHA256( canonical(E_n) ++ H_{n-1} )
//!
//! where `canonical(E_n)` is the compact JSON of the event's hashable fields
//! with object keys sorted at every nesting level, `++` is byte
//! concatenation, and `H_{n-1}` is the previous event's hash as 64 ASCII hex
//! characters (`GENESIS_HASH` for the first event).
//!
//! The hashable fields are everything in `AuditEvent` except `prev_hash`,
//! `current_hash` and `anchor_tx_sig`.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use sator_contracts::{audit::AuditEvent, error::SatorResult};

/// The `prev_hash` of the first event in every chain: 64 hex zeros.
pub const GENESIS_HASH: &str = AuditEvent::GENESIS_HASH;

/// Serialize `data` to canonical JSON.
///
/// Keys are sorted lexicographically at every level and no insignificant
/// whitespace is emitted, so two values that differ only in key insertion
/// order canonicalize identically.
pub fn canonicalize<T: Serialize + ?Sized>(data: &T) -> SatorResult<String> {
    let value = serde_json::to_value(data)?;
    Ok(serde_json::to_string(&sort_keys(value))?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn digest_hex(bytes: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for chunk in bytes {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}

/// Hash `data` chained with `prev_hash`. Pure function of its inputs.
pub fn chained_hash<T: Serialize + ?Sized>(data: &T, prev_hash: &str) -> SatorResult<String> {
    let canonical = canonicalize(data)?;
    Ok(digest_hex(&[canonical.as_bytes(), prev_hash.as_bytes()]))
}

/// Hash `data` on its own, with no chaining.
///
/// Used to fingerprint standalone artifacts such as decision receipts. The
/// result depends only on the content, never on any chain state.
pub fn standalone_hash<T: Serialize + ?Sized>(data: &T) -> SatorResult<String> {
    let canonical = canonicalize(data)?;
    Ok(digest_hex(&[canonical.as_bytes()]))
}

/// Strip the non-hashed fields from a raw event object.
///
/// Non-object values are returned unchanged.
pub fn hashable_record(record: &Value) -> Value {
    match record {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !AuditEvent::UNHASHED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// The hashable fields of a typed event as a JSON object.
pub fn hashable_fields(event: &AuditEvent) -> SatorResult<Value> {
    let value = serde_json::to_value(event)?;
    Ok(hashable_record(&value))
}

/// Recompute an event's hash from its own fields and recorded `prev_hash`.
pub fn hash_event(event: &AuditEvent) -> SatorResult<String> {
    chained_hash(&hashable_fields(event)?, &event.prev_hash)
}

/// Tail state of a hash chain.
///
/// `latest_hash` is always the `current_hash` of the most recently added
/// event, or `GENESIS_HASH` when the chain is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashChain {
    latest_hash: String,
    chain_length: u64,
}

impl HashChain {
    pub fn new() -> Self {
        Self {
            latest_hash: GENESIS_HASH.to_string(),
            chain_length: 0,
        }
    }

    pub fn latest_hash(&self) -> &str {
        &self.latest_hash
    }

    pub fn chain_length(&self) -> u64 {
        self.chain_length
    }

    /// Hash `event_data` chained with `prev_hash`, defaulting to the
    /// current tail.
    pub fn compute_hash<T: Serialize + ?Sized>(
        &self,
        event_data: &T,
        prev_hash: Option<&str>,
    ) -> SatorResult<String> {
        chained_hash(event_data, prev_hash.unwrap_or(&self.latest_hash))
    }

    /// Chain `event_data` onto the tail.
    ///
    /// Returns `(prev_hash, current_hash)` and advances the tail. Takes
    /// `&mut self`, so callers sharing a chain must serialize access; the
    /// ledger does this under its state mutex.
    pub fn add_event<T: Serialize + ?Sized>(
        &mut self,
        event_data: &T,
    ) -> SatorResult<(String, String)> {
        let current_hash = chained_hash(event_data, &self.latest_hash)?;
        let prev_hash = std::mem::replace(&mut self.latest_hash, current_hash.clone());
        self.chain_length += 1;
        Ok((prev_hash, current_hash))
    }

    /// Whether `event_data` chained with `prev_hash` hashes to `expected_hash`.
    pub fn verify_event<T: Serialize + ?Sized>(
        &self,
        event_data: &T,
        expected_hash: &str,
        prev_hash: &str,
    ) -> SatorResult<bool> {
        Ok(chained_hash(event_data, prev_hash)? == expected_hash)
    }

    pub fn reset(&mut self) {
        self.latest_hash = GENESIS_HASH.to_string();
        self.chain_length = 0;
    }

    /// Restore the tail from persisted state without recomputing anything.
    pub fn set_state(&mut self, latest_hash: impl Into<String>, chain_length: u64) {
        self.latest_hash = latest_hash.into();
        self.chain_length = chain_length;
    }
}

impl Default for HashChain {
    fn default() -> Self {
        Self::new()
    }
}
