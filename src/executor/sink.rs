//! Sink operator: writes the child's rows to a CSV file.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::trace;

use crate::executor::{ExecResult, ExecutorError, Lifecycle, Operator};
use crate::storage::CsvWriter;
use crate::value::{Schema, Tuple};

/// Root of an executable plan.
///
/// Open creates the output file and writes the header line (column names
/// only, no type annotations). Each next() pulls one child row, writes it
/// and forwards it, so the executor drives the pull loop *through* the
/// sink rather than calling a separate write loop. Close flushes, which
/// also happens on error paths because the driver closes the root
/// unconditionally.
pub struct SinkOperator {
    child: Box<dyn Operator>,
    path: PathBuf,
    writer: Option<CsvWriter>,
    state: Lifecycle,
}

impl SinkOperator {
    pub fn new(child: Box<dyn Operator>, path: PathBuf) -> Self {
        SinkOperator {
            child,
            path,
            writer: None,
            state: Lifecycle::Created,
        }
    }
}

impl Operator for SinkOperator {
    fn schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }

    fn open(&mut self) -> ExecResult<()> {
        trace!(operator = "Sink", path = %self.path.display(), "open");
        self.child.open()?;
        let writer = CsvWriter::create(&self.path, self.child.schema())?;
        self.writer = Some(writer);
        self.state = Lifecycle::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        self.state.expect_open("Sink", "next")?;
        let Some(row) = self.child.next()? else {
            trace!(operator = "Sink", produced = false, "next");
            return Ok(None);
        };
        let writer = self.writer.as_mut().ok_or(ExecutorError::InvalidState {
            operator: "Sink",
            call: "next",
            state: "open without a writer",
        })?;
        writer.write_row(&row)?;
        trace!(operator = "Sink", produced = true, "next");
        Ok(Some(row))
    }

    fn close(&mut self) -> ExecResult<()> {
        if self.state == Lifecycle::Closed {
            return Err(ExecutorError::InvalidState {
                operator: "Sink",
                call: "close",
                state: self.state.name(),
            });
        }
        trace!(operator = "Sink", path = %self.path.display(), "close");
        self.state = Lifecycle::Closed;
        let flushed = match self.writer.as_mut() {
            Some(writer) => writer.flush().map_err(ExecutorError::from),
            None => Ok(()),
        };
        self.writer = None;
        let child = self.child.close();
        flushed.and(child)
    }
}
