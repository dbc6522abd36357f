//! TOML runtime configuration.
//!
//! Every field has a default, so an empty document (or a missing file at
//! the CLI) yields a working configuration.
//!
//! ```toml
//! data_dir = "./data"
//!
//! [anchor]
//! enabled = true
//! timeout_ms = 5000
//!
//! [log]
//! filter = "sator=info"
//!
//! [replay]
//! default_limit = 100
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use sator_contracts::error::{SatorError, SatorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatorConfig {
    /// Root directory for persisted chains (`<data_dir>/audit`) and the
    /// replay snapshot (`<data_dir>/replay`).
    pub data_dir: PathBuf,
    pub anchor: AnchorConfig,
    pub log: LogConfig,
    pub replay: ReplayConfig,
}

impl Default for SatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            anchor: AnchorConfig::default(),
            log: LogConfig::default(),
            replay: ReplayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub enabled: bool,
    /// Upper bound on a single anchor call.
    pub timeout_ms: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 5_000,
        }
    }
}

impl AnchorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Page size for timeline queries that do not set a limit.
    pub default_limit: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { default_limit: 100 }
    }
}

impl SatorConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `SatorError::ConfigError` if the TOML is malformed or a field
    /// has the wrong type.
    pub fn from_toml_str(s: &str) -> SatorResult<Self> {
        let config: SatorConfig = toml::from_str(s).map_err(|e| SatorError::ConfigError {
            reason: format!("failed to parse config TOML: {}", e),
        })?;
        if config.anchor.enabled && config.anchor.timeout_ms == 0 {
            return Err(SatorError::ConfigError {
                reason: "anchor.timeout_ms must be greater than zero when anchoring is enabled"
                    .to_string(),
            });
        }
        Ok(config)
    }

    /// Read and parse the file at `path`.
    pub fn from_file(path: &Path) -> SatorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| SatorError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&contents)
    }

    /// Like `from_file`, but a missing file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> SatorResult<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            Some(p) => {
                debug!(path = %p.display(), "config file not found; using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Directory holding persisted audit chains.
    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join("audit")
    }

    /// Directory holding the saved replay snapshot.
    pub fn replay_dir(&self) -> PathBuf {
        self.data_dir.join("replay")
    }
}
