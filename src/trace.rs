//! # Plan Trace
//!
//! Captures a query's journey through the engine: the plan as built, the
//! plan after optimization, the cardinality estimates for both, and how
//! many rows actually came out. Backs `rowmill explain` and before/after
//! timing harnesses.

use std::fmt::Write as _;

use crate::catalog::Catalog;
use crate::executor::{self, ExecResult, ExecutionSummary};
use crate::optimizer::{estimate_cardinality, Optimizer};
use crate::plan::PlanNode;

/// Trace of one optimize-and-execute round.
#[derive(Debug, Clone)]
pub struct PlanTrace {
    /// Plan as built by the fluent API
    pub plan_before: Option<PlanNode>,
    /// Plan after optimization
    pub plan_after: Option<PlanNode>,
    /// Estimated output rows of the built plan
    pub estimate_before: u64,
    /// Estimated output rows of the optimized plan
    pub estimate_after: u64,
    /// Rows the execution actually produced
    pub rows: Option<u64>,
}

impl PlanTrace {
    pub fn new() -> Self {
        PlanTrace {
            plan_before: None,
            plan_after: None,
            estimate_before: 0,
            estimate_after: 0,
            rows: None,
        }
    }

    pub fn record_before(&mut self, plan: PlanNode, estimate: u64) {
        self.estimate_before = estimate;
        self.plan_before = Some(plan);
    }

    pub fn record_after(&mut self, plan: PlanNode, estimate: u64) {
        self.estimate_after = estimate;
        self.plan_after = Some(plan);
    }

    pub fn record_rows(&mut self, rows: u64) {
        self.rows = Some(rows);
    }

    /// Render the trace for terminal display.
    pub fn format_trace(&self) -> String {
        let mut out = String::new();
        if let Some(plan) = &self.plan_before {
            let _ = writeln!(out, "plan as built (estimated rows: {}):", self.estimate_before);
            let _ = writeln!(out, "{}", plan.pretty_print(1));
        }
        if let Some(plan) = &self.plan_after {
            let _ = writeln!(out, "plan after optimization (estimated rows: {}):", self.estimate_after);
            let _ = writeln!(out, "{}", plan.pretty_print(1));
        }
        if let Some(rows) = self.rows {
            let _ = writeln!(out, "rows produced: {rows}");
        }
        out
    }
}

impl Default for PlanTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Optimize, execute and return the summary together with the full trace.
pub fn execute_with_trace(
    plan: &PlanNode,
    catalog: &Catalog,
    optimizer: &Optimizer,
) -> ExecResult<(ExecutionSummary, PlanTrace)> {
    let mut trace = PlanTrace::new();
    trace.record_before(plan.clone(), estimate_cardinality(plan, catalog));

    let optimized = optimizer.optimize(plan, catalog);
    trace.record_after(optimized.clone(), estimate_cardinality(&optimized, catalog));

    let summary = executor::execute(&optimized)?;
    trace.record_rows(summary.rows);
    Ok((summary, trace))
}
