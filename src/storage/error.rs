//! Storage Error Types

use std::io;
use thiserror::Error;

/// Errors raised while reading or writing schema-headed CSV files.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header field is not of the form `name:type`
    #[error("malformed schema header field '{0}'")]
    MalformedHeader(String),

    /// Header declared a type keyword outside {integer, string, double}
    #[error("unknown type keyword '{keyword}' for column '{column}'")]
    UnknownType { column: String, keyword: String },

    /// The same column name appears twice in one table
    #[error("duplicate column name '{0}' in schema header")]
    DuplicateColumn(String),

    /// File has no header row
    #[error("missing schema header in '{0}'")]
    MissingHeader(String),

    /// Data row whose field count disagrees with the schema
    #[error("row {line} has {got} fields, expected {expected}")]
    RowArity {
        line: usize,
        expected: usize,
        got: usize,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
