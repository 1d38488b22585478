//! What a successful execution returns.

use serde::Serialize;
use serde_json::{Map, Value};

/// One output row: requested field name -> header value (`null` when absent),
/// in the order the fields were projected.
pub type Row = Map<String, Value>;

/// Flat statistics record. Field names are stable; outer layers serialize it
/// as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub elapsed_ms: u64,
    pub nodes_visited: u64,
    pub edges_scanned: u64,
    pub shards_touched: u64,
    pub depth: u32,
    pub backend_calls: u64,
    pub seed_probes: u64,
    pub scan_pages: u64,
    pub neighbor_pages: u64,
    pub header_batches: u64,
    pub output_bytes: u64,
    pub returned: usize,
    /// Only present when the backend reported shard ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touched_shard_ids: Option<Vec<String>>,
}

impl ExecutionStats {
    pub fn to_json(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    /// Convenience: the `id` column of every row, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.get("id").and_then(Value::as_str))
            .collect()
    }
}
