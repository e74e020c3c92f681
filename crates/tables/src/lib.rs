//! Churnkit tabular data layer
//!
//! Provides the in-memory table model shared by the feature builder,
//! trainer, and recommenders, plus CSV ingestion with column-name
//! normalization.

pub mod errors;
pub mod ingest;
pub mod table;

pub use errors::TableError;
pub use ingest::{canonical_column_name, load_tables, read_csv, SourceTables};
pub use table::{Table, Value};
