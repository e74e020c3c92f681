//! CSV ingestion and column-name normalization
//!
//! The four source sheets name their identifier columns inconsistently
//! ("User Id", "User ID", "Subscription id", ...). All headers are
//! normalized to one canonical snake_case form here, once, so the rest of
//! the pipeline never sees the inconsistency.

use std::path::Path;

use crate::errors::TableError;
use crate::table::{Table, Value};

/// File names of the four source sheets.
pub const USER_DATA_FILE: &str = "User_Data.csv";
pub const SUBSCRIPTIONS_FILE: &str = "Subscriptions.csv";
pub const SUBSCRIPTION_LOGS_FILE: &str = "Subscription_Logs.csv";
pub const BILLING_FILE: &str = "Billing_Information.csv";

/// The four raw source tables, column-normalized.
#[derive(Clone, Debug)]
pub struct SourceTables {
    pub users: Table,
    pub subscriptions: Table,
    pub logs: Table,
    pub billing: Table,
}

/// Load the four source sheets from a directory of CSV files.
pub fn load_tables<P: AsRef<Path>>(dir: P) -> Result<SourceTables, TableError> {
    let dir = dir.as_ref();
    let users = read_csv(dir.join(USER_DATA_FILE))?;
    let subscriptions = read_csv(dir.join(SUBSCRIPTIONS_FILE))?;
    let logs = read_csv(dir.join(SUBSCRIPTION_LOGS_FILE))?;
    let billing = read_csv(dir.join(BILLING_FILE))?;

    tracing::info!(
        users = users.len(),
        subscriptions = subscriptions.len(),
        logs = logs.len(),
        billing = billing.len(),
        "loaded source tables"
    );

    Ok(SourceTables {
        users,
        subscriptions,
        logs,
        billing,
    })
}

/// Normalize a header to its canonical form: trimmed, lowercase, with
/// whitespace and hyphens collapsed to single underscores. This maps every
/// observed spelling of the identifier columns ("User Id", "User ID",
/// "Subscription id", "subscription_id") to one name.
pub fn canonical_column_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Read one CSV file into a `Table` with normalized headers. Cells that
/// parse as numbers become `Value::Number`; everything else is text.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Table, TableError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| TableError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| TableError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    let columns: Vec<String> = split_csv_line(header)
        .iter()
        .map(|h| canonical_column_name(h))
        .collect();

    let mut table = Table::new(columns);
    for (line_idx, line) in lines {
        let fields = split_csv_line(line);
        if fields.len() != table.columns().len() {
            return Err(TableError::FieldCount {
                line: line_idx + 1,
                expected: table.columns().len(),
                got: fields.len(),
            });
        }
        let row = fields.into_iter().map(parse_cell).collect();
        table.push_row(row)?;
    }

    Ok(table)
}

fn parse_cell(field: String) -> Value {
    let trimmed = field.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Text(trimmed.to_string()),
    }
}

/// Split one CSV line into fields, honoring double-quoted fields with
/// doubled-quote escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
