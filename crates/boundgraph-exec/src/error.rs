//! Structured execution errors.
//!
//! Two kinds are raised by the engine itself:
//!
//! - **policy rejection**: the query shape is disallowed regardless of cost
//!   (today: an unanchored `ScanType` when the budgets forbid it);
//! - **budget exceeded**: a ceiling was crossed. Cursor loops are reported as
//!   the synthetic `cursor_loop` budget so callers see a single shape.
//!
//! Backend failures are passed through untouched as [`ExecError::Backend`].
//! Budgets that fail [`ExecutionBudgets::validate`] are refused before any
//! backend call as [`ExecError::InvalidBudgets`].
//!
//! [`ExecutionBudgets::validate`]: crate::budgets::ExecutionBudgets::validate

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

use crate::budgets::BudgetError;

/// Names of every budget the executor enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    TimeoutMs,
    MaxOutputBytes,
    MaxDepth,
    MaxNodesVisited,
    MaxEdgesScanned,
    MaxWorkingSet,
    MaxShardsTouched,
    MaxBackendCalls,
    MaxScanPages,
    MaxNeighborPages,
    MaxHeaderBatches,
    MaxHeaderLookup,
    CursorLoop,
}

impl Budget {
    pub fn as_str(self) -> &'static str {
        match self {
            Budget::TimeoutMs => "timeout_ms",
            Budget::MaxOutputBytes => "max_output_bytes",
            Budget::MaxDepth => "max_depth",
            Budget::MaxNodesVisited => "max_nodes_visited",
            Budget::MaxEdgesScanned => "max_edges_scanned",
            Budget::MaxWorkingSet => "max_working_set",
            Budget::MaxShardsTouched => "max_shards_touched",
            Budget::MaxBackendCalls => "max_backend_calls",
            Budget::MaxScanPages => "max_scan_pages",
            Budget::MaxNeighborPages => "max_neighbor_pages",
            Budget::MaxHeaderBatches => "max_header_batches",
            Budget::MaxHeaderLookup => "max_header_lookup",
            Budget::CursorLoop => "cursor_loop",
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A crossed ceiling: which one, what we observed, what was allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetExceeded {
    pub budget: Budget,
    pub actual: u64,
    pub limit: u64,
    /// Free-form context, usually the pipeline phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BudgetExceeded {
    pub fn new(budget: Budget, actual: u64, limit: u64) -> Self {
        Self {
            budget,
            actual,
            limit,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "budget `{}` exceeded: actual {} > limit {}",
            self.budget, self.actual, self.limit
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl std::error::Error for BudgetExceeded {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    UnanchoredScan,
}

impl Policy {
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::UnanchoredScan => "unanchored_scan",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub policy: Policy,
    pub detail: String,
}

impl PolicyViolation {
    pub fn unanchored_scan(entity_type: &str) -> Self {
        Self {
            policy: Policy::UnanchoredScan,
            detail: format!(
                "ScanType `{entity_type}` has no scope and unanchored scans are disabled; \
                 pass a scope or set allow_unanchored_scan"
            ),
        }
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.policy, self.detail)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("query rejected by policy {0}")]
    PolicyRejected(PolicyViolation),

    #[error(transparent)]
    BudgetExceeded(#[from] BudgetExceeded),

    #[error("invalid execution budgets: {0}")]
    InvalidBudgets(#[from] BudgetError),

    /// Raised by the backend; not wrapped or reinterpreted.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl ExecError {
    pub fn budget_exceeded(&self) -> Option<&BudgetExceeded> {
        match self {
            ExecError::BudgetExceeded(b) => Some(b),
            _ => None,
        }
    }

    pub fn policy_violation(&self) -> Option<&PolicyViolation> {
        match self {
            ExecError::PolicyRejected(p) => Some(p),
            _ => None,
        }
    }

    /// Machine-readable payload for an outer API layer.
    pub fn to_json(&self) -> Value {
        match self {
            ExecError::PolicyRejected(p) => json!({
                "kind": "policy_rejected",
                "policy": p.policy,
                "detail": p.detail,
            }),
            ExecError::BudgetExceeded(b) => json!({
                "kind": "budget_exceeded",
                "budget": b.budget,
                "actual": b.actual,
                "limit": b.limit,
                "detail": b.detail,
            }),
            ExecError::InvalidBudgets(e) => json!({
                "kind": "invalid_budgets",
                "detail": e.to_string(),
            }),
            ExecError::Backend(e) => json!({
                "kind": "backend",
                "detail": format!("{e:#}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_names_match_serde_names() {
        let all = [
            Budget::TimeoutMs,
            Budget::MaxOutputBytes,
            Budget::MaxDepth,
            Budget::MaxNodesVisited,
            Budget::MaxEdgesScanned,
            Budget::MaxWorkingSet,
            Budget::MaxShardsTouched,
            Budget::MaxBackendCalls,
            Budget::MaxScanPages,
            Budget::MaxNeighborPages,
            Budget::MaxHeaderBatches,
            Budget::MaxHeaderLookup,
            Budget::CursorLoop,
        ];
        for b in all {
            assert_eq!(serde_json::to_value(b).unwrap(), Value::from(b.as_str()));
        }
    }

    #[test]
    fn budget_exceeded_payload() {
        let err: ExecError = BudgetExceeded::new(Budget::MaxNodesVisited, 3, 2)
            .with_detail("scan_type")
            .into();
        assert_eq!(
            err.to_string(),
            "budget `max_nodes_visited` exceeded: actual 3 > limit 2 (scan_type)"
        );
        let v = err.to_json();
        assert_eq!(v["kind"], "budget_exceeded");
        assert_eq!(v["budget"], "max_nodes_visited");
        assert_eq!(v["actual"], 3);
        assert_eq!(v["limit"], 2);
    }

    #[test]
    fn backend_errors_pass_through_unchanged() {
        let err: ExecError = anyhow::anyhow!("shard 7 unreachable").into();
        assert_eq!(err.to_string(), "shard 7 unreachable");
        assert!(err.budget_exceeded().is_none());
        assert_eq!(err.to_json()["kind"], "backend");
    }

    #[test]
    fn invalid_budgets_payload_names_the_field() {
        let err: ExecError = BudgetError::Invalid {
            field: "header_batch_size",
            message: "must be at least 1".into(),
        }
        .into();
        assert!(err.budget_exceeded().is_none());
        let v = err.to_json();
        assert_eq!(v["kind"], "invalid_budgets");
        assert!(v["detail"].as_str().unwrap().contains("header_batch_size"));
    }

    #[test]
    fn policy_payload_names_the_policy() {
        let err = ExecError::PolicyRejected(PolicyViolation::unanchored_scan("Person"));
        assert_eq!(err.to_json()["policy"], "unanchored_scan");
        assert!(err.to_string().contains("Person"));
    }
}
