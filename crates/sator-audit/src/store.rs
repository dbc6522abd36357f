//! JSON-lines chain storage.
//!
//! Layout under the configured audit directory:
//!
//!   chain_<chain_id>.jsonl    one serialized `AuditEvent` per line, creation order
//!   anchors_<chain_id>.jsonl  one `AnchorReceipt` per line, arrival order
//!
//! Both files are only ever opened in append mode and every line is synced
//! before `append` returns. A write or sync that fails truncates the file
//! back to its previous length, so a rejected append leaves no partial line.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Mutex,
    time::SystemTime,
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use sator_contracts::{
    audit::{AnchorReceipt, AuditEvent},
    error::{SatorError, SatorResult},
};
use sator_core::traits::{ChainStore, StoredChain, StoredRecords};

const CHAIN_PREFIX: &str = "chain_";
const ANCHOR_PREFIX: &str = "anchors_";
const EXTENSION: &str = ".jsonl";

/// File-backed `ChainStore` writing one JSON document per line.
pub struct JsonlChainStore {
    dir: PathBuf,
    /// Serializes writers within this process so lines never interleave.
    write_lock: Mutex<()>,
}

impl JsonlChainStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chain_path(&self, chain_id: &str) -> PathBuf {
        self.dir.join(format!("{CHAIN_PREFIX}{chain_id}{EXTENSION}"))
    }

    fn anchor_path(&self, chain_id: &str) -> PathBuf {
        self.dir.join(format!("{ANCHOR_PREFIX}{chain_id}{EXTENSION}"))
    }

    fn append_line<T: Serialize>(&self, path: &Path, record: &T) -> SatorResult<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().map_err(|e| SatorError::LockPoisoned {
            reason: format!("chain store write lock poisoned: {}", e),
        })?;

        let persist = || -> io::Result<()> {
            fs::create_dir_all(&self.dir)?;
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            write_record(&mut file, line.as_bytes())
        };
        persist().map_err(|e| SatorError::PersistenceFailed {
            reason: format!("failed to append to '{}': {}", path.display(), e),
        })
    }

    /// Resolve which chain a load refers to. `None` when nothing matches.
    fn resolve_chain(&self, chain_id: Option<&str>) -> SatorResult<Option<String>> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let chain_id = match chain_id {
            Some(id) if is_valid_chain_id(id) => id.to_string(),
            Some(id) => {
                warn!(chain_id = %id, "refusing to load chain with invalid id");
                return Ok(None);
            }
            None => match self.most_recent_chain()? {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        if !self.chain_path(&chain_id).exists() {
            return Ok(None);
        }
        Ok(Some(chain_id))
    }

    /// The chain file with the newest modification time.
    fn most_recent_chain(&self) -> SatorResult<Option<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| SatorError::PersistenceFailed {
            reason: format!("failed to list '{}': {}", self.dir.display(), e),
        })?;

        let mut newest: Option<(SystemTime, String)> = None;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(chain_id) = name
                .strip_prefix(CHAIN_PREFIX)
                .and_then(|rest| rest.strip_suffix(EXTENSION))
            else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, chain_id.to_string()));
            }
        }
        Ok(newest.map(|(_, id)| id))
    }
}

/// Chain ids become file names; only allow characters that cannot escape
/// the audit directory.
fn is_valid_chain_id(chain_id: &str) -> bool {
    !chain_id.is_empty()
        && chain_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Destination of one appended line.
trait AppendTarget: Write {
    fn current_len(&self) -> io::Result<u64>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl AppendTarget for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Write `line` plus a newline and sync. On failure the target is cut back
/// to the length it had before the call.
fn write_record<W: AppendTarget>(target: &mut W, line: &[u8]) -> io::Result<()> {
    let before = target.current_len()?;
    let result = target
        .write_all(line)
        .and_then(|_| target.write_all(b"\n"))
        .and_then(|_| target.flush())
        .and_then(|_| target.sync());

    if let Err(e) = result {
        if let Err(rollback) = target.truncate_to(before) {
            warn!(error = %rollback, "failed to roll back partial append");
        }
        return Err(e);
    }
    Ok(())
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> SatorResult<Vec<T>> {
    let file = fs::File::open(path).map_err(|e| SatorError::PersistenceFailed {
        reason: format!("failed to open '{}': {}", path.display(), e),
    })?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| SatorError::PersistenceFailed {
            reason: format!("failed to read '{}': {}", path.display(), e),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| SatorError::Serialization {
            reason: format!("{}:{}: {}", path.display(), idx + 1, e),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Raw records of a chain file. Lines that are not JSON are kept as JSON
/// strings so the verifier reports them instead of the load failing.
fn read_raw_lines(path: &Path) -> SatorResult<Vec<Value>> {
    let file = fs::File::open(path).map_err(|e| SatorError::PersistenceFailed {
        reason: format!("failed to open '{}': {}", path.display(), e),
    })?;

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| SatorError::PersistenceFailed {
            reason: format!("failed to read '{}': {}", path.display(), e),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<Value>(&line) {
            Ok(value) => value,
            Err(_) => Value::String(line),
        };
        records.push(record);
    }
    Ok(records)
}

impl ChainStore for JsonlChainStore {
    fn append(&self, chain_id: &str, event: &AuditEvent) -> SatorResult<()> {
        if !is_valid_chain_id(chain_id) {
            return Err(SatorError::PersistenceFailed {
                reason: format!("invalid chain id '{}'", chain_id),
            });
        }
        self.append_line(&self.chain_path(chain_id), event)?;
        debug!(chain_id = %chain_id, event_id = %event.event_id, "event persisted");
        Ok(())
    }

    fn append_anchor(&self, chain_id: &str, receipt: &AnchorReceipt) -> SatorResult<()> {
        if !is_valid_chain_id(chain_id) {
            return Err(SatorError::PersistenceFailed {
                reason: format!("invalid chain id '{}'", chain_id),
            });
        }
        self.append_line(&self.anchor_path(chain_id), receipt)
    }

    fn load(&self, chain_id: Option<&str>) -> SatorResult<Option<StoredChain>> {
        let Some(chain_id) = self.resolve_chain(chain_id)? else {
            return Ok(None);
        };

        let path = self.chain_path(&chain_id);
        let events: Vec<AuditEvent> = read_lines(&path)?;
        let anchor_path = self.anchor_path(&chain_id);
        let anchors: Vec<AnchorReceipt> = if anchor_path.exists() {
            read_lines(&anchor_path)?
        } else {
            Vec::new()
        };

        debug!(
            chain_id = %chain_id,
            event_count = events.len(),
            anchor_count = anchors.len(),
            "chain loaded from disk"
        );

        Ok(Some(StoredChain {
            chain_id,
            events,
            anchors,
        }))
    }

    fn load_records(&self, chain_id: Option<&str>) -> SatorResult<Option<StoredRecords>> {
        let Some(chain_id) = self.resolve_chain(chain_id)? else {
            return Ok(None);
        };

        let records = read_raw_lines(&self.chain_path(&chain_id))?;
        debug!(chain_id = %chain_id, record_count = records.len(), "raw chain records loaded");
        Ok(Some(StoredRecords { chain_id, records }))
    }
}
