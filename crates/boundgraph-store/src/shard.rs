//! Content-addressed shard assignment and graph configuration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// How pages describe the shards they touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardReporting {
    /// Distinct shard names per page (the executor counts them across pages).
    #[default]
    Ids,
    /// Only the per-page count of distinct shards (the executor sums them).
    Count,
}

/// Configuration for a [`MemoryGraph`](crate::MemoryGraph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Number of logical shards entities are spread over.
    pub shard_count: u64,
    pub shard_reporting: ShardReporting,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            shard_count: 64,
            shard_reporting: ShardReporting::Ids,
        }
    }
}

/// Shard index of `entity_id`: the first 8 bytes of its SHA-256 digest, read
/// big-endian, modulo `shard_count`.
pub fn shard_index(entity_id: &str, shard_count: u64) -> u64 {
    let digest = Sha256::digest(entity_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % shard_count.max(1)
}

pub fn shard_name(index: u64) -> String {
    format!("shard-{index:04}")
}

/// Per-page shard report in the shape `ScanPage`/`NeighborPage` carry.
pub(crate) fn report<'a>(
    ids: impl IntoIterator<Item = &'a str>,
    config: &GraphConfig,
) -> (u64, Option<Vec<String>>) {
    let touched: BTreeSet<u64> = ids
        .into_iter()
        .map(|id| shard_index(id, config.shard_count))
        .collect();
    match config.shard_reporting {
        ShardReporting::Ids => (
            touched.len() as u64,
            Some(touched.into_iter().map(shard_name).collect()),
        ),
        ShardReporting::Count => (touched.len() as u64, None),
    }
}
