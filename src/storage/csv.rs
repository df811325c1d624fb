//! CSV Storage Module
//!
//! Streaming reader and writer for the engine's schema-headed CSV
//! convention:
//!
//! - Row 1 is the schema: comma-separated `name:type` fields with
//!   `type ∈ {integer, string, double}`.
//! - Subsequent rows are data. Cells are parsed into their declared type;
//!   empty or unparseable cells become null.
//! - Output files carry a header of column names only, and null values
//!   serialize to empty fields.
//!
//! Fields are split on bare commas. Quoting and escaping are not part of
//! the format.
//!
//! Output is canonical, not verbatim: cells are written from their parsed
//! values, so a double spelled `5.00` in the input comes back as `5`.
//! The value itself survives exactly (doubles render in shortest
//! round-trip form); only the spelling is normalized. Identity plans
//! therefore copy a file verbatim up to the header's type annotations and
//! this float respelling.
//!
//! ## Example
//!
//! ```csv
//! id:integer,name:string,age:integer
//! 1,Ann,25
//! 2,Bob,40
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;
use std::sync::Arc;

use crate::storage::error::{StorageError, StorageResult};
use crate::value::{DataType, Schema, Tuple, Value};

/// Parse the schema row of a CSV file.
///
/// Rejects duplicate column names within the table; global uniqueness
/// across tables is the caller's invariant.
pub fn parse_header(line: &str) -> StorageResult<Schema> {
    let mut fields = Vec::new();
    for token in line.split(',') {
        let token = token.trim();
        let (name, keyword) = token
            .split_once(':')
            .ok_or_else(|| StorageError::MalformedHeader(token.to_string()))?;
        let name = name.trim();
        let keyword = keyword.trim();
        if name.is_empty() {
            return Err(StorageError::MalformedHeader(token.to_string()));
        }
        let dtype = DataType::from_keyword(keyword).ok_or_else(|| StorageError::UnknownType {
            column: name.to_string(),
            keyword: keyword.to_string(),
        })?;
        if fields.iter().any(|(n, _)| n == name) {
            return Err(StorageError::DuplicateColumn(name.to_string()));
        }
        fields.push((name.to_string(), dtype));
    }
    Ok(Schema::new(fields))
}

/// Parse one cell into its declared type. Empty and unparseable cells
/// yield null.
pub fn parse_cell(text: &str, dtype: DataType) -> Value {
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    match dtype {
        DataType::Int64 => text.parse::<i64>().map_or(Value::Null, Value::Int64),
        DataType::Float64 => text.parse::<f64>().map_or(Value::Null, Value::Float64),
        DataType::String => Value::string(text),
    }
}

/// Read only the schema header of a file, without touching the data.
pub fn read_schema(path: impl AsRef<Path>) -> StorageResult<Schema> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();
    match lines.next() {
        Some(line) => parse_header(&line?),
        None => Err(StorageError::MissingHeader(path.display().to_string())),
    }
}

/// Streaming reader over a schema-headed CSV file.
///
/// The header is parsed at open; `next_row` then yields one typed tuple
/// per data line in file order.
pub struct CsvReader {
    schema: Arc<Schema>,
    lines: Lines<BufReader<File>>,
    /// 1-based line number of the last line handed out, for diagnostics
    line: usize,
}

impl CsvReader {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();
        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(StorageError::MissingHeader(path.display().to_string())),
        };
        let schema = Arc::new(parse_header(&header)?);
        Ok(CsvReader {
            schema,
            lines,
            line: 1,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Next data row, or `None` at end of file. Blank lines are skipped.
    pub fn next_row(&mut self) -> StorageResult<Option<Tuple>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            self.line += 1;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != self.schema.arity() {
                return Err(StorageError::RowArity {
                    line: self.line,
                    expected: self.schema.arity(),
                    got: fields.len(),
                });
            }

            let values = fields
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let dtype = self.schema.field_type(i).unwrap_or(DataType::String);
                    parse_cell(cell, dtype)
                })
                .collect();
            return Ok(Some(Tuple::new(Arc::clone(&self.schema), values)));
        }
    }
}

/// Buffered writer producing the engine's output convention: a header of
/// column names (no type annotations), then one comma-joined row per
/// tuple, nulls as empty fields.
pub struct CsvWriter {
    writer: BufWriter<File>,
}

impl CsvWriter {
    pub fn create(path: impl AsRef<Path>, schema: &Schema) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let header = schema.field_names().collect::<Vec<_>>().join(",");
        writeln!(writer, "{header}")?;
        Ok(CsvWriter { writer })
    }

    pub fn write_row(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let row = tuple
            .values()
            .iter()
            .map(Value::canonical_text)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.writer, "{row}")?;
        Ok(())
    }

    pub fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
