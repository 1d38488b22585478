//! Boundgraph execution engine.
//!
//! Interprets a [`QueryIr`] against a [`GraphBackend`] while enforcing a set of
//! [`ExecutionBudgets`]: wall clock, rows, output bytes, depth, nodes, edges,
//! working-set size, per-node degree, shards, and backend calls (combined and
//! per call kind).
//!
//! ```text
//!   QueryIr ──► Executor ──► GraphBackend (scan_type / neighbors / headers)
//!                 │
//!                 ├── BudgetTracker   (counters + checks, one per execute)
//!                 │
//!                 ▼
//!   ExecutionResult { rows, stats }   or   ExecError (policy | budget | backend)
//! ```
//!
//! An execution is a single synchronous control flow. The executor only holds
//! a shared reference to the backend, so independent executions can run on as
//! many threads as the backend tolerates.

pub mod backend;
pub mod budgets;
pub mod counters;
pub mod error;
pub mod executor;
pub mod result;

pub use backend::{Edge, EntityHeader, GraphBackend, NeighborPage, ScanPage};
pub use budgets::{budgets_from_preset, BudgetError, BudgetOverrides, ExecutionBudgets, Preset};
pub use counters::{BudgetTracker, CallKind, ExecutionCounters};
pub use error::{Budget, BudgetExceeded, ExecError, Policy, PolicyViolation};
pub use executor::{execute, Executor};
pub use result::{ExecutionResult, ExecutionStats, Row};

pub use boundgraph_ir::{Direction, IrError, Operator, QueryIr};
