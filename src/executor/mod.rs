//! # Query Execution
//!
//! The pull-based operator pipeline and its driver.
//!
//! Every operator implements the `Operator` contract: `open` acquires
//! resources and prepares state, `next` returns rows one at a time until
//! it settles on `None`, `close` releases resources. All three propagate
//! to children. Execution is single-threaded and synchronous; nothing
//! suspends and nothing is shared between tree positions.
//!
//! The driver compiles a plan tree into a fresh operator tree (the plan
//! stays valid and re-executable), opens the root, pulls it dry and
//! closes it on every exit path, including errors mid-stream. Executable
//! plans are rooted at a sink; the driver pulls *through* the sink, which
//! writes each row as it forwards it.
//!
//! ## Example
//!
//! ```rust,ignore
//! let summary = Executor::new().execute(&plan)?;
//! println!("{} rows written", summary.rows);
//! ```

mod filter;
mod hash_join;
mod project;
mod scan;
mod sink;

pub use filter::FilterOperator;
pub use hash_join::HashJoinOperator;
pub use project::ProjectOperator;
pub use scan::ScanOperator;
pub use sink::SinkOperator;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, trace};

use crate::plan::PlanNode;
use crate::storage::StorageError;
use crate::value::{Schema, Tuple};

/// Errors raised during execution.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Reading or writing CSV failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Lifecycle misuse: next before open, next after close, double close
    #[error("{operator} operator: {call} called while {state}")]
    InvalidState {
        operator: &'static str,
        call: &'static str,
        state: &'static str,
    },

    /// A scanned file's header no longer matches the schema captured at
    /// plan-build time
    #[error("schema of '{path}' changed since the plan was built")]
    SchemaChanged { path: PathBuf },
}

/// Result type for execution
pub type ExecResult<T> = Result<T, ExecutorError>;

/// Lifecycle state shared by all operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    Open,
    Closed,
}

impl Lifecycle {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Lifecycle::Created => "not yet open",
            Lifecycle::Open => "open",
            Lifecycle::Closed => "closed",
        }
    }

    /// Guard for calls that require the operator to be open.
    pub(crate) fn expect_open(
        self,
        operator: &'static str,
        call: &'static str,
    ) -> ExecResult<()> {
        if self == Lifecycle::Open {
            Ok(())
        } else {
            Err(ExecutorError::InvalidState {
                operator,
                call,
                state: self.name(),
            })
        }
    }
}

/// The open/next/close pull contract.
///
/// `next` keeps returning `None` once the stream is exhausted. Operators
/// are not thread-safe and must not be aliased across tree positions.
pub trait Operator {
    /// Schema of the rows this operator produces. Available before open.
    fn schema(&self) -> &Arc<Schema>;

    /// Acquire resources and prepare to produce rows.
    fn open(&mut self) -> ExecResult<()>;

    /// The next row in output order, or `None` at end of stream.
    fn next(&mut self) -> ExecResult<Option<Tuple>>;

    /// Release resources. Legal in any state except after a prior close;
    /// closing a never-opened operator is a no-op that still closes
    /// children.
    fn close(&mut self) -> ExecResult<()>;
}

/// Compile a plan tree into a fresh operator tree.
///
/// Each call builds new operators, so the same plan can be executed any
/// number of times (before/after optimization, for instance).
pub fn compile(plan: &PlanNode) -> Box<dyn Operator> {
    match plan {
        PlanNode::Scan { path, schema } => {
            Box::new(ScanOperator::new(path.clone(), schema.clone()))
        }
        PlanNode::Filter { input, predicate } => {
            Box::new(FilterOperator::new(compile(input), predicate.clone()))
        }
        PlanNode::Project {
            input,
            columns,
            distinct,
        } => Box::new(ProjectOperator::new(compile(input), columns.clone(), *distinct)),
        PlanNode::Join {
            left,
            right,
            predicate,
        } => Box::new(HashJoinOperator::new(
            compile(left),
            compile(right),
            predicate.clone(),
        )),
        PlanNode::Sink { input, path } => Box::new(SinkOperator::new(compile(input), path.clone())),
    }
}

/// What one execution produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Rows pulled out of the root (for a sink root, rows written)
    pub rows: u64,
    /// True when the stop flag ended the drive loop early
    pub cancelled: bool,
}

/// Drives a plan to completion.
#[derive(Default)]
pub struct Executor {
    stop: Option<Arc<AtomicBool>>,
}

impl Executor {
    pub fn new() -> Self {
        Executor { stop: None }
    }

    /// Install a cooperative stop flag, checked between rows. When the
    /// flag is raised the drive loop ends cleanly at the next row
    /// boundary and the tree is closed as usual.
    pub fn with_stop_flag(stop: Arc<AtomicBool>) -> Self {
        Executor { stop: Some(stop) }
    }

    /// Compile, open, drain and close the plan. Close runs on every exit
    /// path, so file handles and join tables are released even when a
    /// row-level error surfaces mid-stream.
    pub fn execute(&self, plan: &PlanNode) -> ExecResult<ExecutionSummary> {
        let mut root = compile(plan);

        if let Err(err) = root.open() {
            let _ = root.close();
            return Err(err);
        }

        let mut rows = 0u64;
        let mut cancelled = false;
        loop {
            if let Some(stop) = &self.stop {
                if stop.load(Ordering::Relaxed) {
                    trace!("stop flag raised, ending drive loop");
                    cancelled = true;
                    break;
                }
            }
            match root.next() {
                Ok(Some(_)) => rows += 1,
                Ok(None) => break,
                Err(err) => {
                    let _ = root.close();
                    return Err(err);
                }
            }
        }

        root.close()?;
        info!(rows, cancelled, "execution finished");
        Ok(ExecutionSummary { rows, cancelled })
    }
}

/// Execute a plan with the default driver.
pub fn execute(plan: &PlanNode) -> ExecResult<ExecutionSummary> {
    Executor::new().execute(plan)
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory operator for unit-testing the streaming operators
    //! without touching the filesystem.

    use super::*;

    pub(crate) struct RowsOperator {
        schema: Arc<Schema>,
        rows: Vec<Tuple>,
        cursor: usize,
        state: Lifecycle,
    }

    impl RowsOperator {
        pub(crate) fn new(schema: Arc<Schema>, rows: Vec<Tuple>) -> Self {
            RowsOperator {
                schema,
                rows,
                cursor: 0,
                state: Lifecycle::Created,
            }
        }
    }

    impl Operator for RowsOperator {
        fn schema(&self) -> &Arc<Schema> {
            &self.schema
        }

        fn open(&mut self) -> ExecResult<()> {
            self.state = Lifecycle::Open;
            self.cursor = 0;
            Ok(())
        }

        fn next(&mut self) -> ExecResult<Option<Tuple>> {
            self.state.expect_open("Rows", "next")?;
            let row = self.rows.get(self.cursor).cloned();
            if row.is_some() {
                self.cursor += 1;
            }
            Ok(row)
        }

        fn close(&mut self) -> ExecResult<()> {
            if self.state == Lifecycle::Closed {
                return Err(ExecutorError::InvalidState {
                    operator: "Rows",
                    call: "close",
                    state: self.state.name(),
                });
            }
            self.state = Lifecycle::Closed;
            Ok(())
        }
    }
}
