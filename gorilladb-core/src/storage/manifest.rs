//! Series export metadata

use crate::compression::WindowStrategy;
use crate::{Result, Timestamp};
use serde::{Deserialize, Serialize};

/// Metadata of one exported block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub start_timestamp: Timestamp,
    pub count: usize,
    pub size_bytes: usize,
}

/// Everything needed to decode a series' sealed block buffers.
///
/// Block buffers carry no schema or point count, so they are only readable
/// together with this manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesManifest {
    pub variable_names: Vec<String>,
    pub block_duration: i64,
    #[serde(default)]
    pub window_strategy: WindowStrategy,
    pub total_points: usize,
    pub compressed_bytes: usize,
    pub blocks: Vec<BlockMeta>,
}

impl SeriesManifest {
    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
