//! Scan operator: streams a schema-headed CSV file in file order.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::trace;

use crate::executor::{ExecResult, ExecutorError, Lifecycle, Operator};
use crate::storage::CsvReader;
use crate::value::{Schema, Tuple};

/// Leaf operator reading one CSV table.
///
/// The output schema was captured from the file header when the plan was
/// built; open re-reads the header and refuses to proceed if the file has
/// changed shape since.
pub struct ScanOperator {
    path: PathBuf,
    schema: Arc<Schema>,
    reader: Option<CsvReader>,
    state: Lifecycle,
}

impl ScanOperator {
    pub fn new(path: PathBuf, schema: Schema) -> Self {
        ScanOperator {
            path,
            schema: Arc::new(schema),
            reader: None,
            state: Lifecycle::Created,
        }
    }
}

impl Operator for ScanOperator {
    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn open(&mut self) -> ExecResult<()> {
        trace!(operator = "Scan", path = %self.path.display(), "open");
        let reader = CsvReader::open(&self.path)?;
        if reader.schema().as_ref() != self.schema.as_ref() {
            return Err(ExecutorError::SchemaChanged {
                path: self.path.clone(),
            });
        }
        self.reader = Some(reader);
        self.state = Lifecycle::Open;
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<Tuple>> {
        self.state.expect_open("Scan", "next")?;
        let reader = self.reader.as_mut().ok_or(ExecutorError::InvalidState {
            operator: "Scan",
            call: "next",
            state: "open without a reader",
        })?;
        let row = reader.next_row()?;
        trace!(operator = "Scan", produced = row.is_some(), "next");
        Ok(row)
    }

    fn close(&mut self) -> ExecResult<()> {
        if self.state == Lifecycle::Closed {
            return Err(ExecutorError::InvalidState {
                operator: "Scan",
                call: "close",
                state: self.state.name(),
            });
        }
        trace!(operator = "Scan", path = %self.path.display(), "close");
        self.reader = None;
        self.state = Lifecycle::Closed;
        Ok(())
    }
}
