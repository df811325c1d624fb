//! Project operator: reorders and restricts columns by name, with an
//! optional exact distinct.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::executor::{ExecResult, ExecutorError, Lifecycle, Operator};
use crate::value::{Schema, Tuple, Value};

/// Produces rows over exactly the requested columns, values looked up by
/// name in the child row. A name absent from the child schema surfaces as
/// null rather than failing the query.
///
/// With `distinct` set, every emitted value vector is remembered and
/// duplicates are suppressed; the first occurrence wins, so output order
/// is first-seen order. The seen-set holds projected rows only, which are
/// usually far narrower than the input.
pub struct ProjectOperator {
    child: Box<dyn Operator>,
    columns: Vec<String>,
    distinct: bool,
    schema: Arc<Schema>,
    seen: HashSet<Vec<Value>>,
    state: Lifecycle,
}

impl ProjectOperator {
    pub fn new(child: Box<dyn Operator>, columns: Vec<String>, distinct: bool) -> Self {
        let schema = Arc::new(child.schema().project(&columns));
        ProjectOperator {
            child,
            columns,
            distinct,
            schema,
            seen: HashSet::new(),
            state: Lifecycle::Created,
        }
    }
}

impl Operator for ProjectOperator {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn open(&mut self) -> ExecResult<()> {
        trace!(operator = "Project", columns = ?self.columns, distinct = self.distinct, "open");
        self.child.open()?;
        self.seen.clear();
        self.state = Lifecycle::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        self.state.expect_open("Project", "next")?;
        loop {
            let Some(row) = self.child.next()? else {
                trace!(operator = "Project", produced = false, "next");
                return Ok(None);
            };
            let values: Vec<Value> = self.columns.iter().map(|name| row.get(name)).collect();
            if self.distinct && !self.seen.insert(values.clone()) {
                continue;
            }
            trace!(operator = "Project", produced = true, "next");
            return Ok(Some(Tuple::new(Arc::clone(&self.schema), values)));
        }
    }

    fn close(&mut self) -> ExecResult<()> {
        if self.state == Lifecycle::Closed {
            return Err(ExecutorError::InvalidState {
                operator: "Project",
                call: "close",
                state: self.state.name(),
            });
        }
        trace!(operator = "Project", "close");
        self.seen.clear();
        self.state = Lifecycle::Closed;
        self.child.close()
    }
}
