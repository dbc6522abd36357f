//! In-memory implementation of `ChainStore`.
//!
//! `MemoryChainStore` keeps every chain in a `HashMap` behind a `Mutex`.
//! Used for tests and for ephemeral runs where nothing should touch disk.
//! "Most recently modified" is tracked with a monotonic write counter.

use std::{collections::HashMap, sync::Mutex};

use sator_contracts::{
    audit::{AnchorReceipt, AuditEvent},
    error::{SatorError, SatorResult},
};
use sator_core::traits::{ChainStore, StoredChain, StoredRecords};

#[derive(Default)]
struct MemoryChain {
    events: Vec<AuditEvent>,
    anchors: Vec<AnchorReceipt>,
    last_write: u64,
}

#[derive(Default)]
struct MemoryState {
    chains: HashMap<String, MemoryChain>,
    writes: u64,
}

#[derive(Default)]
pub struct MemoryChainStore {
    state: Mutex<MemoryState>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events stored for `chain_id`.
    pub fn event_count(&self, chain_id: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.chains.get(chain_id).map_or(0, |c| c.events.len()))
            .unwrap_or(0)
    }

    fn with_chain<F>(&self, chain_id: &str, f: F) -> SatorResult<()>
    where
        F: FnOnce(&mut MemoryChain),
    {
        let mut state = self.state.lock().map_err(|e| SatorError::PersistenceFailed {
            reason: format!("memory store lock poisoned: {}", e),
        })?;
        state.writes += 1;
        let write = state.writes;
        let chain = state.chains.entry(chain_id.to_string()).or_default();
        f(chain);
        chain.last_write = write;
        Ok(())
    }
}

impl ChainStore for MemoryChainStore {
    fn append(&self, chain_id: &str, event: &AuditEvent) -> SatorResult<()> {
        self.with_chain(chain_id, |chain| chain.events.push(event.clone()))
    }

    fn append_anchor(&self, chain_id: &str, receipt: &AnchorReceipt) -> SatorResult<()> {
        self.with_chain(chain_id, |chain| chain.anchors.push(receipt.clone()))
    }

    fn load(&self, chain_id: Option<&str>) -> SatorResult<Option<StoredChain>> {
        let state = self.state.lock().map_err(|e| SatorError::LockPoisoned {
            reason: format!("memory store lock poisoned: {}", e),
        })?;

        let found = match chain_id {
            Some(id) => state.chains.get_key_value(id),
            None => state.chains.iter().max_by_key(|(_, c)| c.last_write),
        };

        Ok(found.map(|(id, chain)| StoredChain {
            chain_id: id.clone(),
            events: chain.events.clone(),
            anchors: chain.anchors.clone(),
        }))
    }

    fn load_records(&self, chain_id: Option<&str>) -> SatorResult<Option<StoredRecords>> {
        let Some(chain) = self.load(chain_id)? else {
            return Ok(None);
        };
        let records = chain
            .events
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(StoredRecords {
            chain_id: chain.chain_id,
            records,
        }))
    }
}
