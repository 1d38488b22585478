//! Execution budgets: the numeric ceilings one query execution runs under.
//!
//! Callers normally start from a named preset and override a few fields:
//!
//! ```
//! use boundgraph_exec::budgets::{budgets_from_preset, BudgetOverrides};
//!
//! let overrides = BudgetOverrides {
//!     max_depth: Some(1),
//!     ..BudgetOverrides::default()
//! };
//! let budgets = budgets_from_preset(Some("strict"), Some(10), &overrides).unwrap();
//! assert_eq!(budgets.max_results, 10);
//! assert_eq!(budgets.max_depth, 1);
//! ```
//!
//! Overrides are a typed struct rather than a loose key/value map. When they
//! arrive as JSON, unknown keys are rejected by name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Header batch size used when the budgets carry no `header_batch_size` hint.
pub const DEFAULT_HEADER_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    #[error("unknown budget preset `{name}` (expected one of: default, safe, strict, debug)")]
    UnknownPreset { name: String },

    #[error("invalid budget overrides: {0}")]
    Overrides(String),

    #[error("invalid budget `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

// ============================================================================
// Budgets
// ============================================================================

/// Ceilings for a single execution. Read-only while a query runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionBudgets {
    /// Wall-clock timeout, checked at the top of every internal loop.
    pub timeout_ms: u64,
    pub max_results: usize,
    /// Cumulative serialized size of output rows. 0 = unlimited.
    pub max_output_bytes: usize,
    /// Number of `Expand` steps.
    pub max_depth: u32,
    pub max_nodes_visited: u64,
    pub max_edges_scanned: u64,
    pub max_working_set: usize,
    /// Edges explored per source node, whatever `Expand.max_per_node` says.
    pub max_degree_per_node: usize,
    pub max_shards_touched: u64,
    /// Allow `ScanType` without a scope.
    pub allow_unanchored_scan: bool,

    #[serde(default)]
    pub scan_page_size: Option<usize>,
    #[serde(default)]
    pub neighbor_page_size: Option<usize>,
    #[serde(default)]
    pub header_batch_size: Option<usize>,

    /// Combined cap over every backend call kind.
    #[serde(default)]
    pub max_backend_calls: Option<u64>,
    #[serde(default)]
    pub max_scan_pages: Option<u64>,
    #[serde(default)]
    pub max_neighbor_pages: Option<u64>,
    #[serde(default)]
    pub max_header_batches: Option<u64>,

    /// Reject the final working set outright if it is larger than this,
    /// before any header is fetched.
    #[serde(default)]
    pub max_header_lookup: Option<usize>,
}

impl ExecutionBudgets {
    /// Conservative defaults for general use.
    pub fn safe() -> Self {
        Self {
            timeout_ms: 5_000,
            max_results: 100,
            max_output_bytes: 0,
            max_depth: 4,
            max_nodes_visited: 10_000,
            max_edges_scanned: 50_000,
            max_working_set: 10_000,
            max_degree_per_node: 1_000,
            max_shards_touched: 256,
            allow_unanchored_scan: false,
            scan_page_size: None,
            neighbor_page_size: None,
            header_batch_size: None,
            max_backend_calls: None,
            max_scan_pages: None,
            max_neighbor_pages: None,
            max_header_batches: None,
            max_header_lookup: None,
        }
    }

    /// Tight ceilings for untrusted callers.
    pub fn strict() -> Self {
        Self {
            timeout_ms: 1_000,
            max_results: 50,
            max_output_bytes: 256 * 1024,
            max_depth: 2,
            max_nodes_visited: 1_000,
            max_edges_scanned: 5_000,
            max_working_set: 1_000,
            max_degree_per_node: 100,
            max_shards_touched: 16,
            allow_unanchored_scan: false,
            scan_page_size: Some(100),
            neighbor_page_size: Some(50),
            header_batch_size: Some(50),
            max_backend_calls: Some(200),
            max_scan_pages: Some(20),
            max_neighbor_pages: Some(150),
            max_header_batches: Some(20),
            max_header_lookup: Some(1_000),
        }
    }

    /// Relaxed ceilings for controlled environments (small graphs, local debugging).
    pub fn debug() -> Self {
        Self {
            timeout_ms: 60_000,
            max_results: 10_000,
            max_output_bytes: 0,
            max_depth: 16,
            max_nodes_visited: 1_000_000,
            max_edges_scanned: 10_000_000,
            max_working_set: 1_000_000,
            max_degree_per_node: 100_000,
            max_shards_touched: 65_536,
            allow_unanchored_scan: true,
            scan_page_size: None,
            neighbor_page_size: None,
            header_batch_size: None,
            max_backend_calls: None,
            max_scan_pages: None,
            max_neighbor_pages: None,
            max_header_batches: None,
            max_header_lookup: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Per-source neighbor cap for an `Expand` that asked for `max_per_node`.
    pub fn degree_cap(&self, max_per_node: Option<usize>) -> usize {
        match max_per_node {
            Some(n) => n.min(self.max_degree_per_node),
            None => self.max_degree_per_node,
        }
    }

    /// Never 0, even for budgets built by hand that skipped [`Self::validate`].
    pub fn header_batch(&self) -> usize {
        self.header_batch_size
            .unwrap_or(DEFAULT_HEADER_BATCH_SIZE)
            .max(1)
    }

    /// Internal consistency checks. Every constructor path in this module
    /// calls this before handing budgets out, and the executor calls it again
    /// because every field is public.
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.timeout_ms == 0 {
            return Err(BudgetError::Invalid {
                field: "timeout_ms",
                message: "must be greater than 0".to_string(),
            });
        }
        let hints = [
            ("scan_page_size", self.scan_page_size),
            ("neighbor_page_size", self.neighbor_page_size),
            ("header_batch_size", self.header_batch_size),
        ];
        for (field, hint) in hints {
            if hint == Some(0) {
                return Err(BudgetError::Invalid {
                    field,
                    message: "page size hint must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Parse a full budget record from JSON (unknown keys rejected).
    pub fn from_json_str(text: &str) -> Result<Self, BudgetError> {
        let budgets: Self =
            serde_json::from_str(text).map_err(|e| BudgetError::Overrides(e.to_string()))?;
        budgets.validate()?;
        Ok(budgets)
    }
}

impl Default for ExecutionBudgets {
    fn default() -> Self {
        Self::safe()
    }
}

// ============================================================================
// Presets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    #[default]
    Safe,
    Strict,
    Debug,
}

impl Preset {
    pub fn budgets(self) -> ExecutionBudgets {
        match self {
            Preset::Safe => ExecutionBudgets::safe(),
            Preset::Strict => ExecutionBudgets::strict(),
            Preset::Debug => ExecutionBudgets::debug(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Safe => "safe",
            Preset::Strict => "strict",
            Preset::Debug => "debug",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "safe" => Ok(Preset::Safe),
            "strict" => Ok(Preset::Strict),
            "debug" => Ok(Preset::Debug),
            _ => Err(BudgetError::UnknownPreset {
                name: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Overrides
// ============================================================================

/// Field-by-field substitutions applied on top of a preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetOverrides {
    pub timeout_ms: Option<u64>,
    pub max_results: Option<usize>,
    pub max_output_bytes: Option<usize>,
    pub max_depth: Option<u32>,
    pub max_nodes_visited: Option<u64>,
    pub max_edges_scanned: Option<u64>,
    pub max_working_set: Option<usize>,
    pub max_degree_per_node: Option<usize>,
    pub max_shards_touched: Option<u64>,
    pub allow_unanchored_scan: Option<bool>,
    pub scan_page_size: Option<usize>,
    pub neighbor_page_size: Option<usize>,
    pub header_batch_size: Option<usize>,
    pub max_backend_calls: Option<u64>,
    pub max_scan_pages: Option<u64>,
    pub max_neighbor_pages: Option<u64>,
    pub max_header_batches: Option<u64>,
    pub max_header_lookup: Option<usize>,
}

impl BudgetOverrides {
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, BudgetError> {
        serde_json::from_value(value.clone()).map_err(|e| BudgetError::Overrides(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self, BudgetError> {
        serde_json::from_str(text).map_err(|e| BudgetError::Overrides(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, b: &mut ExecutionBudgets) {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn set_opt<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut b.timeout_ms, self.timeout_ms);
        set(&mut b.max_results, self.max_results);
        set(&mut b.max_output_bytes, self.max_output_bytes);
        set(&mut b.max_depth, self.max_depth);
        set(&mut b.max_nodes_visited, self.max_nodes_visited);
        set(&mut b.max_edges_scanned, self.max_edges_scanned);
        set(&mut b.max_working_set, self.max_working_set);
        set(&mut b.max_degree_per_node, self.max_degree_per_node);
        set(&mut b.max_shards_touched, self.max_shards_touched);
        set(&mut b.allow_unanchored_scan, self.allow_unanchored_scan);
        set_opt(&mut b.scan_page_size, self.scan_page_size);
        set_opt(&mut b.neighbor_page_size, self.neighbor_page_size);
        set_opt(&mut b.header_batch_size, self.header_batch_size);
        set_opt(&mut b.max_backend_calls, self.max_backend_calls);
        set_opt(&mut b.max_scan_pages, self.max_scan_pages);
        set_opt(&mut b.max_neighbor_pages, self.max_neighbor_pages);
        set_opt(&mut b.max_header_batches, self.max_header_batches);
        set_opt(&mut b.max_header_lookup, self.max_header_lookup);
    }
}

/// Build budgets from a named preset.
///
/// - `name`: `None`, `"default"`, `"safe"`, `"strict"` or `"debug"`.
/// - `max_results`: replaces the preset's row cap when given.
/// - `overrides`: applied last, after `max_results`.
pub fn budgets_from_preset(
    name: Option<&str>,
    max_results: Option<usize>,
    overrides: &BudgetOverrides,
) -> Result<ExecutionBudgets, BudgetError> {
    let preset = match name {
        Some(name) => name.parse::<Preset>()?,
        None => Preset::default(),
    };
    let mut budgets = preset.budgets();
    if let Some(n) = max_results {
        budgets.max_results = n;
    }
    overrides.apply(&mut budgets);
    budgets.validate()?;
    Ok(budgets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_and_safe_are_the_same_preset() {
        let none = budgets_from_preset(None, None, &BudgetOverrides::default()).unwrap();
        let default = budgets_from_preset(Some("default"), None, &BudgetOverrides::default()).unwrap();
        let safe = budgets_from_preset(Some(" Safe "), None, &BudgetOverrides::default()).unwrap();
        assert_eq!(none, default);
        assert_eq!(none, safe);
        assert_eq!(none, ExecutionBudgets::default());
        assert!(!none.allow_unanchored_scan);
    }

    #[test]
    fn strict_is_tighter_than_safe() {
        let safe = ExecutionBudgets::safe();
        let strict = ExecutionBudgets::strict();
        assert!(strict.max_nodes_visited < safe.max_nodes_visited);
        assert!(strict.max_edges_scanned < safe.max_edges_scanned);
        assert!(strict.max_degree_per_node < safe.max_degree_per_node);
        assert!(strict.max_shards_touched < safe.max_shards_touched);
        assert!(strict.scan_page_size.is_some());
        assert!(strict.max_backend_calls.is_some());
        strict.validate().unwrap();
    }

    #[test]
    fn debug_allows_unanchored_scans() {
        let debug = budgets_from_preset(Some("debug"), Some(7), &BudgetOverrides::default()).unwrap();
        assert!(debug.allow_unanchored_scan);
        assert_eq!(debug.max_results, 7);
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let err = budgets_from_preset(Some("yolo"), None, &BudgetOverrides::default()).unwrap_err();
        assert_eq!(
            err,
            BudgetError::UnknownPreset {
                name: "yolo".to_string()
            }
        );
        assert!(err.to_string().contains("yolo"));
    }

    #[test]
    fn overrides_apply_after_max_results() {
        let overrides = BudgetOverrides {
            max_results: Some(3),
            max_backend_calls: Some(9),
            allow_unanchored_scan: Some(true),
            ..BudgetOverrides::default()
        };
        let b = budgets_from_preset(Some("safe"), Some(50), &overrides).unwrap();
        assert_eq!(b.max_results, 3);
        assert_eq!(b.max_backend_calls, Some(9));
        assert!(b.allow_unanchored_scan);
        assert!(!overrides.is_empty());
    }

    #[test]
    fn override_json_rejects_unknown_keys() {
        let err = BudgetOverrides::from_json_value(&json!({"max_nodez_visited": 5})).unwrap_err();
        assert!(matches!(err, BudgetError::Overrides(_)));
        assert!(err.to_string().contains("max_nodez_visited"), "{err}");

        let ok = BudgetOverrides::from_json_value(&json!({"max_nodes_visited": 5})).unwrap();
        assert_eq!(ok.max_nodes_visited, Some(5));
    }

    #[test]
    fn validation_rejects_zero_page_hints_and_timeout() {
        let overrides = BudgetOverrides {
            neighbor_page_size: Some(0),
            ..BudgetOverrides::default()
        };
        let err = budgets_from_preset(None, None, &overrides).unwrap_err();
        assert!(matches!(
            err,
            BudgetError::Invalid {
                field: "neighbor_page_size",
                ..
            }
        ));

        let overrides = BudgetOverrides {
            timeout_ms: Some(0),
            ..BudgetOverrides::default()
        };
        assert!(budgets_from_preset(None, None, &overrides).is_err());
    }

    #[test]
    fn degree_cap_takes_the_smaller_bound() {
        let mut b = ExecutionBudgets::safe();
        b.max_degree_per_node = 10;
        assert_eq!(b.degree_cap(Some(1000)), 10);
        assert_eq!(b.degree_cap(Some(3)), 3);
        assert_eq!(b.degree_cap(None), 10);
    }

    #[test]
    fn full_budgets_round_trip_through_json() {
        let strict = ExecutionBudgets::strict();
        let text = serde_json::to_string(&strict).unwrap();
        assert_eq!(ExecutionBudgets::from_json_str(&text).unwrap(), strict);
        assert!(ExecutionBudgets::from_json_str(r#"{"timeout_ms": 1}"#).is_err());
    }
}
