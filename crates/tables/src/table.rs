//! In-memory table model
//!
//! A `Table` is a header plus uniform-width rows of loosely typed cells.
//! Cells are either numeric or text; ingestion decides per cell, not per
//! column, so a column is treated as categorical as soon as any cell in it
//! is text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::errors::TableError;

/// A single cell value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Number(_) => None,
            Value::Text(t) => Some(t),
        }
    }

    /// Stringified form used for categorical encoding and identifier keys.
    /// Whole numbers render without a fractional part so that `10.0` and
    /// `"10"` key the same row.
    pub fn category(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(t) => t.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(t) => write!(f, "{t}"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A header plus uniform-width rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a column; `values` must cover every existing row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), TableError> {
        if values.len() != self.rows.len() {
            return Err(TableError::RowWidth {
                expected: self.rows.len(),
                got: values.len(),
            });
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Concatenate tables row-wise over the union of their columns.
    /// Columns keep first-seen order; cells absent from a source table
    /// become empty text, matching the similarity pipeline's blank fill.
    pub fn concat(tables: &[&Table]) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for table in tables {
            for col in &table.columns {
                if !columns.contains(col) {
                    columns.push(col.clone());
                }
            }
        }

        let mut unified = Table::new(columns);
        for table in tables {
            for row in &table.rows {
                let cells = unified
                    .columns
                    .iter()
                    .map(|col| match table.column_index(col) {
                        Some(idx) => row[idx].clone(),
                        None => Value::Text(String::new()),
                    })
                    .collect();
                unified.rows.push(cells);
            }
        }
        unified
    }

    /// Render as CSV with a header row.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&join_csv_row(self.columns.iter().map(|c| c.as_str())));
        out.push('\n');
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            out.push_str(&join_csv_row(fields.iter().map(|f| f.as_str())));
            out.push('\n');
        }
        out
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_csv_string()).map_err(|source| TableError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn join_csv_row<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    fields
        .map(escape_csv_field)
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(vec!["a".into(), "b".into()]);
        assert!(table.push_row(vec![Value::Number(1.0)]).is_err());
        assert!(table
            .push_row(vec![Value::Number(1.0), text("x")])
            .is_ok());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_value_lookup() {
        let mut table = Table::new(vec!["id".into(), "plan".into()]);
        table
            .push_row(vec![Value::Number(7.0), text("Premium")])
            .unwrap();

        assert_eq!(table.value(0, "plan"), Some(&text("Premium")));
        assert_eq!(table.value(0, "missing"), None);
        assert_eq!(table.value(3, "plan"), None);
    }

    #[test]
    fn test_concat_unions_columns_with_blank_fill() {
        let mut a = Table::new(vec!["id".into(), "name".into()]);
        a.push_row(vec![Value::Number(1.0), text("Basic")]).unwrap();
        let mut b = Table::new(vec!["id".into(), "amount".into()]);
        b.push_row(vec![Value::Number(2.0), Value::Number(9.5)])
            .unwrap();

        let unified = Table::concat(&[&a, &b]);
        assert_eq!(unified.columns(), &["id", "name", "amount"]);
        assert_eq!(unified.len(), 2);
        assert_eq!(unified.value(0, "amount"), Some(&text("")));
        assert_eq!(unified.value(1, "name"), Some(&text("")));
        assert_eq!(unified.value(1, "amount"), Some(&Value::Number(9.5)));
    }

    #[test]
    fn test_csv_output_escapes_fields() {
        let mut table = Table::new(vec!["name".into()]);
        table.push_row(vec![text("Premium, Annual")]).unwrap();
        let csv = table.to_csv_string();
        assert_eq!(csv, "name\n\"Premium, Annual\"\n");
    }

    #[test]
    fn test_whole_numbers_render_without_fraction() {
        assert_eq!(Value::Number(150.0).to_string(), "150");
        assert_eq!(Value::Number(0.517).to_string(), "0.517");
        assert_eq!(Value::Number(10.0).category(), "10");
    }
}
