//! Per-execution counters and the budget checks that guard them.
//!
//! One [`BudgetTracker`] is created per `execute` call and threaded through
//! the interpreter by `&mut`. Counters only ever grow. Every check returns
//! `Err(BudgetExceeded)` with the first violating value.

use std::collections::BTreeSet;
use std::time::Instant;

use crate::budgets::ExecutionBudgets;
use crate::error::{Budget, BudgetExceeded};
use crate::result::ExecutionStats;

/// Raw tallies for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCounters {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    SeedProbe,
    ScanPage,
    NeighborPage,
    HeaderBatch,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::SeedProbe => "seed_exists",
            CallKind::ScanPage => "scan_type",
            CallKind::NeighborPage => "neighbors",
            CallKind::HeaderBatch => "get_entity_headers",
        }
    }
}

pub struct BudgetTracker<'b> {
    budgets: &'b ExecutionBudgets,
    started: Instant,
    counters: ExecutionCounters,
    /// Sum of scalar shard reports.
    scalar_shards: u64,
    /// Distinct shard ids, when the backend reports them.
    shard_ids: Option<BTreeSet<String>>,
}

fn check(budget: Budget, actual: u64, limit: u64, phase: &str) -> Result<(), BudgetExceeded> {
    if actual > limit {
        return Err(BudgetExceeded::new(budget, actual, limit).with_detail(phase));
    }
    Ok(())
}

impl<'b> BudgetTracker<'b> {
    pub fn new(budgets: &'b ExecutionBudgets) -> Self {
        Self {
            budgets,
            started: Instant::now(),
            counters: ExecutionCounters::default(),
            scalar_shards: 0,
            shard_ids: None,
        }
    }

    pub fn budgets(&self) -> &'b ExecutionBudgets {
        self.budgets
    }

    pub fn counters(&self) -> &ExecutionCounters {
        &self.counters
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn check_timeout(&self, phase: &str) -> Result<(), BudgetExceeded> {
        if self.started.elapsed() > self.budgets.timeout() {
            return Err(
                BudgetExceeded::new(Budget::TimeoutMs, self.elapsed_ms(), self.budgets.timeout_ms)
                    .with_detail(phase),
            );
        }
        Ok(())
    }

    /// Account for a backend call that is about to be issued.
    ///
    /// A cap of `n` admits exactly `n` calls; call `n + 1` fails before it is made.
    ///
    /// Every kind, seed probes included, counts toward `max_backend_calls`
    /// and the `backend_calls` stat. Seed probes have no per-kind cap of
    /// their own.
    pub fn before_call(&mut self, kind: CallKind) -> Result<(), BudgetExceeded> {
        let phase = kind.as_str();
        let total = self.counters.backend_calls + 1;
        if let Some(cap) = self.budgets.max_backend_calls {
            check(Budget::MaxBackendCalls, total, cap, phase)?;
        }

        let (slot, cap, budget) = match kind {
            CallKind::SeedProbe => (&mut self.counters.seed_probes, None, None),
            CallKind::ScanPage => (
                &mut self.counters.scan_pages,
                self.budgets.max_scan_pages,
                Some(Budget::MaxScanPages),
            ),
            CallKind::NeighborPage => (
                &mut self.counters.neighbor_pages,
                self.budgets.max_neighbor_pages,
                Some(Budget::MaxNeighborPages),
            ),
            CallKind::HeaderBatch => (
                &mut self.counters.header_batches,
                self.budgets.max_header_batches,
                Some(Budget::MaxHeaderBatches),
            ),
        };
        let next = *slot + 1;
        if let (Some(cap), Some(budget)) = (cap, budget) {
            check(budget, next, cap, phase)?;
        }
        *slot = next;
        self.counters.backend_calls = total;
        Ok(())
    }

    pub fn visit_node(&mut self, phase: &str) -> Result<(), BudgetExceeded> {
        self.counters.nodes_visited += 1;
        check(
            Budget::MaxNodesVisited,
            self.counters.nodes_visited,
            self.budgets.max_nodes_visited,
            phase,
        )
    }

    pub fn scan_edges(&mut self, n: usize, phase: &str) -> Result<(), BudgetExceeded> {
        self.counters.edges_scanned += n as u64;
        check(
            Budget::MaxEdgesScanned,
            self.counters.edges_scanned,
            self.budgets.max_edges_scanned,
            phase,
        )
    }

    /// Fold one page's shard report into the running total.
    pub fn touch_shards(
        &mut self,
        count: u64,
        ids: Option<&[String]>,
        phase: &str,
    ) -> Result<(), BudgetExceeded> {
        match ids {
            Some(ids) => {
                self.shard_ids
                    .get_or_insert_with(BTreeSet::new)
                    .extend(ids.iter().cloned());
            }
            None => self.scalar_shards += count,
        }
        let distinct = self.shard_ids.as_ref().map_or(0, |s| s.len() as u64);
        self.counters.shards_touched = self.scalar_shards + distinct;
        check(
            Budget::MaxShardsTouched,
            self.counters.shards_touched,
            self.budgets.max_shards_touched,
            phase,
        )
    }

    pub fn enter_depth(&mut self) -> Result<(), BudgetExceeded> {
        self.counters.depth += 1;
        check(
            Budget::MaxDepth,
            u64::from(self.counters.depth),
            u64::from(self.budgets.max_depth),
            "expand",
        )
    }

    pub fn check_working_set(&self, len: usize, phase: &str) -> Result<(), BudgetExceeded> {
        check(
            Budget::MaxWorkingSet,
            len as u64,
            self.budgets.max_working_set as u64,
            phase,
        )
    }

    /// Enforced only when `max_output_bytes > 0`; always tallied.
    pub fn add_output_bytes(&mut self, n: usize) -> Result<(), BudgetExceeded> {
        self.counters.output_bytes += n as u64;
        if self.budgets.max_output_bytes == 0 {
            return Ok(());
        }
        check(
            Budget::MaxOutputBytes,
            self.counters.output_bytes,
            self.budgets.max_output_bytes as u64,
            "materialize",
        )
    }

    pub fn finish(self, returned: usize) -> ExecutionStats {
        let elapsed_ms = self.elapsed_ms();
        let c = self.counters;
        ExecutionStats {
            elapsed_ms,
            nodes_visited: c.nodes_visited,
            edges_scanned: c.edges_scanned,
            shards_touched: c.shards_touched,
            depth: c.depth,
            backend_calls: c.backend_calls,
            seed_probes: c.seed_probes,
            scan_pages: c.scan_pages,
            neighbor_pages: c.neighbor_pages,
            header_batches: c.header_batches,
            output_bytes: c.output_bytes,
            returned,
            touched_shard_ids: self.shard_ids.map(|s| s.into_iter().collect()),
        }
    }
}
