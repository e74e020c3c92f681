use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the tabular data layer.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: file has no header row")]
    MissingHeader { path: PathBuf },

    #[error("line {line}: expected {expected} fields, got {got}")]
    FieldCount {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("row width {got} does not match table width {expected}")]
    RowWidth { expected: usize, got: usize },

    #[error("column {0:?} not found")]
    MissingColumn(String),
}
