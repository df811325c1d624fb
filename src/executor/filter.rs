//! Filter operator: forwards rows satisfying a predicate, in input order.

use std::sync::Arc;

use tracing::trace;

use crate::executor::{ExecResult, ExecutorError, Lifecycle, Operator};
use crate::plan::Predicate;
use crate::value::{Schema, Tuple};

pub struct FilterOperator {
    child: Box<dyn Operator>,
    predicate: Predicate,
    state: Lifecycle,
}

impl FilterOperator {
    pub fn new(child: Box<dyn Operator>, predicate: Predicate) -> Self {
        FilterOperator {
            child,
            predicate,
            state: Lifecycle::Created,
        }
    }
}

impl Operator for FilterOperator {
    fn schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }

    fn open(&mut self) -> ExecResult<()> {
        trace!(operator = "Filter", predicate = %self.predicate, "open");
        self.child.open()?;
        self.state = Lifecycle::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        self.state.expect_open("Filter", "next")?;
        loop {
            let Some(row) = self.child.next()? else {
                trace!(operator = "Filter", produced = false, "next");
                return Ok(None);
            };
            if self.predicate.evaluate(&row) {
                trace!(operator = "Filter", produced = true, "next");
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self) -> ExecResult<()> {
        if self.state == Lifecycle::Closed {
            return Err(ExecutorError::InvalidState {
                operator: "Filter",
                call: "close",
                state: self.state.name(),
            });
        }
        trace!(operator = "Filter", "close");
        self.state = Lifecycle::Closed;
        self.child.close()
    }
}
