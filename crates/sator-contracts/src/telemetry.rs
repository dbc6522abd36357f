//! Sensor telemetry types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Quality flag reported by the upstream source for a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityFlag {
    #[default]
    Good,
    Bad,
    Uncertain,
}

/// A single timestamped reading from one sensor tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
    /// `None` when the source reported no value.
    pub value: Option<f64>,
    #[serde(default)]
    pub quality: QualityFlag,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl TelemetryPoint {
    /// A `GOOD` reading with no metadata.
    pub fn new(tag_id: impl Into<String>, timestamp: DateTime<Utc>, value: Option<f64>) -> Self {
        Self {
            tag_id: tag_id.into(),
            timestamp,
            value,
            quality: QualityFlag::Good,
            metadata: BTreeMap::new(),
        }
    }
}
