//! The IR interpreter.
//!
//! ```text
//!   for op in ir:                  working set: ordered, duplicate-free ids
//!     SeedEntities  -> probe each id, keep existing
//!     ScanType      -> policy gate, then page scan_type   (pushdown: next Limit)
//!     Expand        -> depth+1, page neighbors per source (pushdown: next Limit)
//!     Limit         -> truncate
//!     Project       -> recorded for output
//!   materialize     -> header batches -> rows, bounded by max_results / bytes
//! ```
//!
//! Every backend call is counted before it is issued, and the wall clock is
//! checked at the top of every loop, so a single operator with many pages
//! cannot run past the timeout unnoticed (a backend call that never returns
//! still can; bounding that is the backend's job).

use ahash::AHashSet;
use boundgraph_ir::{Direction, Operator, QueryIr};
use serde_json::Value;

use crate::backend::{GraphBackend, NeighborPage, ScanPage};
use crate::budgets::ExecutionBudgets;
use crate::counters::{BudgetTracker, CallKind};
use crate::error::{Budget, BudgetExceeded, ExecError, PolicyViolation};
use crate::result::{ExecutionResult, Row};

/// Ordered, duplicate-free list of entity ids.
#[derive(Debug, Default)]
struct WorkingSet {
    ids: Vec<String>,
    seen: AHashSet<String>,
}

impl WorkingSet {
    fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if `id` was not present before.
    fn insert(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.ids.push(id.to_string());
        true
    }

    fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

/// Continuation tokens seen by one paging loop.
#[derive(Debug, Default)]
struct CursorTrail {
    seen: AHashSet<String>,
    pages: u64,
}

impl CursorTrail {
    /// Record `next` and fail if it was returned before in this loop.
    fn advance(&mut self, next: &str, phase: &str) -> Result<(), BudgetExceeded> {
        self.pages += 1;
        if !self.seen.insert(next.to_string()) {
            return Err(BudgetExceeded::new(Budget::CursorLoop, 1, 0).with_detail(format!(
                "{phase}: cursor `{next}` repeated after {} pages",
                self.pages
            )));
        }
        Ok(())
    }
}

pub struct Executor<'a, B: GraphBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: GraphBackend + ?Sized> Executor<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Run `ir` to completion, or fail with the first violated budget/policy.
    ///
    /// There is no partial result: on error no rows are returned. Budgets
    /// that fail [`ExecutionBudgets::validate`] are refused before the first
    /// backend call.
    pub fn execute(
        &self,
        ir: &QueryIr,
        budgets: &ExecutionBudgets,
    ) -> Result<ExecutionResult, ExecError> {
        let span = tracing::info_span!("execute", ops = ir.len());
        let _guard = span.enter();

        let mut tracker = BudgetTracker::new(budgets);
        let outcome = budgets
            .validate()
            .map_err(ExecError::from)
            .and_then(|()| self.run(ir, &mut tracker));
        match outcome {
            Ok(rows) => {
                let stats = tracker.finish(rows.len());
                tracing::debug!(
                    returned = stats.returned,
                    nodes_visited = stats.nodes_visited,
                    edges_scanned = stats.edges_scanned,
                    backend_calls = stats.backend_calls,
                    elapsed_ms = stats.elapsed_ms,
                    "query finished"
                );
                Ok(ExecutionResult { rows, stats })
            }
            Err(err) => {
                match &err {
                    ExecError::PolicyRejected(p) => {
                        tracing::warn!(policy = %p.policy, detail = %p.detail, "query rejected");
                    }
                    ExecError::BudgetExceeded(b) => {
                        tracing::warn!(
                            budget = %b.budget,
                            actual = b.actual,
                            limit = b.limit,
                            detail = b.detail.as_deref().unwrap_or(""),
                            "budget exceeded"
                        );
                    }
                    ExecError::InvalidBudgets(e) => {
                        tracing::warn!(error = %e, "budgets rejected");
                    }
                    ExecError::Backend(e) => {
                        tracing::warn!(error = %e, "backend call failed");
                    }
                }
                Err(err)
            }
        }
    }

    fn run(&self, ir: &QueryIr, t: &mut BudgetTracker<'_>) -> Result<Vec<Row>, ExecError> {
        let mut working: Vec<String> = Vec::new();

        for (index, op) in ir.ops().iter().enumerate() {
            t.check_timeout(op.name())?;
            let pending_limit = ir.limit_after(index);

            match op {
                Operator::SeedEntities { entity_ids } => {
                    working = self.seed(entity_ids, t)?;
                }
                Operator::ScanType { entity_type, scope } => {
                    working = self.scan(entity_type, scope.as_deref(), pending_limit, t)?;
                }
                Operator::Expand {
                    relationship_types,
                    direction,
                    max_per_node,
                } => {
                    working = self.expand(
                        &working,
                        relationship_types.as_deref(),
                        *direction,
                        *max_per_node,
                        pending_limit,
                        t,
                    )?;
                }
                Operator::Limit { n } => working.truncate(*n),
                Operator::Project { .. } => {}
            }

            tracing::debug!(
                index,
                op = op.name(),
                working_set = working.len(),
                nodes_visited = t.counters().nodes_visited,
                "operator applied"
            );
        }

        self.materialize(&working, &ir.output_fields(), t)
    }

    fn seed(&self, ids: &[String], t: &mut BudgetTracker<'_>) -> Result<Vec<String>, ExecError> {
        let mut out = WorkingSet::default();
        for id in ids {
            t.check_timeout("seed_entities")?;
            if out.seen.contains(id.as_str()) {
                continue;
            }
            t.before_call(CallKind::SeedProbe)?;
            if !self.backend.seed_exists(id)? {
                continue;
            }
            out.insert(id);
            t.visit_node("seed_entities")?;
        }
        t.check_working_set(out.len(), "seed_entities")?;
        Ok(out.into_vec())
    }

    fn scan(
        &self,
        entity_type: &str,
        scope: Option<&[String]>,
        pending_limit: Option<usize>,
        t: &mut BudgetTracker<'_>,
    ) -> Result<Vec<String>, ExecError> {
        let budgets = t.budgets();
        let scope = scope.filter(|s| !s.is_empty());
        if scope.is_none() && !budgets.allow_unanchored_scan {
            return Err(ExecError::PolicyRejected(PolicyViolation::unanchored_scan(
                entity_type,
            )));
        }

        let target = match pending_limit {
            Some(n) => n.min(budgets.max_results),
            None => budgets.max_results,
        };

        let mut out = WorkingSet::default();
        let mut trail = CursorTrail::default();
        let mut cursor: Option<String> = None;

        while out.len() < target {
            t.check_timeout("scan_type")?;
            let remaining = target - out.len();
            let page_limit = budgets
                .scan_page_size
                .map_or(remaining, |p| p.clamp(1, remaining));

            t.before_call(CallKind::ScanPage)?;
            let ScanPage {
                entity_ids,
                next_cursor,
                shards_touched,
                shards_touched_ids,
            } = self
                .backend
                .scan_type(entity_type, scope, page_limit, cursor.as_deref())?;
            tracing::debug!(
                entity_type,
                requested = page_limit,
                received = entity_ids.len(),
                has_more = next_cursor.is_some(),
                "scan page"
            );

            t.touch_shards(shards_touched, shards_touched_ids.as_deref(), "scan_type")?;
            for id in entity_ids.iter().take(page_limit) {
                if out.insert(id) {
                    t.visit_node("scan_type")?;
                    if out.len() >= target {
                        break;
                    }
                }
            }
            t.check_working_set(out.len(), "scan_type")?;

            if out.len() >= target {
                break;
            }
            match next_cursor {
                Some(next) => {
                    trail.advance(&next, "scan_type")?;
                    cursor = Some(next);
                }
                None => break,
            }
        }

        Ok(out.into_vec())
    }

    fn expand(
        &self,
        sources: &[String],
        relationship_types: Option<&[String]>,
        direction: Direction,
        max_per_node: Option<usize>,
        pending_limit: Option<usize>,
        t: &mut BudgetTracker<'_>,
    ) -> Result<Vec<String>, ExecError> {
        t.enter_depth()?;
        let budgets = t.budgets();
        let cap = budgets.degree_cap(max_per_node);
        let done = |out: &WorkingSet| pending_limit.is_some_and(|n| out.len() >= n);

        let mut out = WorkingSet::default();

        'sources: for source in sources {
            if done(&out) {
                break;
            }

            let mut trail = CursorTrail::default();
            let mut cursor: Option<String> = None;
            let mut fetched = 0usize;

            while fetched < cap {
                t.check_timeout("expand")?;
                let remaining = cap - fetched;
                let page_limit = budgets
                    .neighbor_page_size
                    .map_or(remaining, |p| p.clamp(1, remaining));

                t.before_call(CallKind::NeighborPage)?;
                let NeighborPage {
                    edges,
                    next_cursor,
                    shards_touched,
                    shards_touched_ids,
                } = self.backend.neighbors(
                    source,
                    relationship_types,
                    direction,
                    page_limit,
                    cursor.as_deref(),
                )?;

                t.touch_shards(shards_touched, shards_touched_ids.as_deref(), "expand")?;
                let page = &edges[..edges.len().min(page_limit)];
                t.scan_edges(page.len(), "expand")?;
                fetched += page.len();

                for edge in page {
                    if out.insert(edge.other_end(source)) {
                        t.visit_node("expand")?;
                        if done(&out) {
                            break 'sources;
                        }
                    }
                }

                match next_cursor {
                    Some(next) => {
                        trail.advance(&next, "expand")?;
                        cursor = Some(next);
                    }
                    None => break,
                }
            }

            t.check_working_set(out.len(), "expand")?;
        }

        t.check_working_set(out.len(), "expand")?;
        Ok(out.into_vec())
    }

    fn materialize(
        &self,
        working: &[String],
        fields: &[String],
        t: &mut BudgetTracker<'_>,
    ) -> Result<Vec<Row>, ExecError> {
        let budgets = t.budgets();
        if let Some(cap) = budgets.max_header_lookup {
            if working.len() > cap {
                return Err(BudgetExceeded::new(
                    Budget::MaxHeaderLookup,
                    working.len() as u64,
                    cap as u64,
                )
                .with_detail("materialize")
                .into());
            }
        }

        let mut rows: Vec<Row> = Vec::new();
        if budgets.max_results == 0 {
            return Ok(rows);
        }

        for batch in working.chunks(budgets.header_batch()) {
            t.check_timeout("materialize")?;
            t.before_call(CallKind::HeaderBatch)?;
            let headers = self.backend.get_entity_headers(batch)?;

            for id in batch {
                let Some(header) = headers.get(id) else {
                    continue;
                };
                let row: Row = fields
                    .iter()
                    .map(|f| (f.clone(), header.get(f).cloned().unwrap_or(Value::Null)))
                    .collect();
                let size = serde_json::to_vec(&row).map_or(0, |bytes| bytes.len());
                t.add_output_bytes(size)?;
                rows.push(row);
                if rows.len() >= budgets.max_results {
                    return Ok(rows);
                }
            }
        }

        Ok(rows)
    }
}

/// Shorthand for `Executor::new(backend).execute(ir, budgets)`.
pub fn execute<B: GraphBackend + ?Sized>(
    backend: &B,
    ir: &QueryIr,
    budgets: &ExecutionBudgets,
) -> Result<ExecutionResult, ExecError> {
    Executor::new(backend).execute(ir, budgets)
}
