//! The fitted transform: per-column encoders plus the numeric scaler
//!
//! Created once at training time and applied read-only at scoring time, in
//! the exact column order it was fitted with. Unseen categorical values and
//! column mismatches are explicit errors, never silent coercions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use churnkit_tables::{Table, Value};

use crate::encode::LabelEncoder;
use crate::scale::StandardScaler;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("unseen category {value:?} in column {column:?}")]
    UnseenCategory { column: String, value: String },

    #[error("expected {expected} feature columns, got {got}")]
    ColumnCount { expected: usize, got: usize },

    #[error("column {0:?} missing from input table")]
    MissingColumn(String),

    #[error("column {column:?} holds non-numeric value {value:?} but has no encoder")]
    NotNumeric { column: String, value: String },

    #[error("row index {0} out of range")]
    RowOutOfRange(usize),

    #[error("cannot fit a transform on an empty table")]
    EmptyTrainingSet,
}

/// Encoders and scaler fitted together over one training table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    feature_columns: Vec<String>,
    encoders: BTreeMap<String, LabelEncoder>,
    scaler: StandardScaler,
}

impl FittedTransform {
    /// Fit over a training table, skipping the columns in `exclude`
    /// (label and identifiers). A column is categorical as soon as any of
    /// its cells is text; each categorical column gets its own encoder.
    pub fn fit(table: &Table, exclude: &[&str]) -> Result<Self, TransformError> {
        if table.is_empty() {
            return Err(TransformError::EmptyTrainingSet);
        }

        let feature_columns: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !exclude.contains(&c.as_str()))
            .cloned()
            .collect();

        let mut encoders = BTreeMap::new();
        for column in &feature_columns {
            let idx = column_index(table, column)?;
            let is_categorical = table
                .rows()
                .iter()
                .any(|row| matches!(row[idx], Value::Text(_)));
            if is_categorical {
                let encoder =
                    LabelEncoder::fit(table.rows().iter().map(|row| row[idx].category()));
                encoders.insert(column.clone(), encoder);
            }
        }

        // Encode the full table, then fit the scaler over the encoded matrix.
        let raw: Vec<Vec<f64>> = (0..table.len())
            .map(|row| encode_row(&feature_columns, &encoders, table, row))
            .collect::<Result<_, _>>()?;
        let scaler = StandardScaler::fit(&raw)?;

        Ok(Self {
            feature_columns,
            encoders,
            scaler,
        })
    }

    /// Encode and scale one row of `table` into the model's feature vector.
    pub fn transform_row(&self, table: &Table, row: usize) -> Result<Vec<f64>, TransformError> {
        let mut encoded = encode_row(&self.feature_columns, &self.encoders, table, row)?;
        self.scaler.transform_row(&mut encoded)?;
        Ok(encoded)
    }

    /// Encode and scale every row of `table`, in order.
    pub fn transform_table(&self, table: &Table) -> Result<Vec<Vec<f64>>, TransformError> {
        (0..table.len())
            .map(|row| self.transform_row(table, row))
            .collect()
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn encoders(&self) -> &BTreeMap<String, LabelEncoder> {
        &self.encoders
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Reassemble a transform from independently persisted parts.
    pub fn from_parts(
        feature_columns: Vec<String>,
        encoders: BTreeMap<String, LabelEncoder>,
        scaler: StandardScaler,
    ) -> Self {
        Self {
            feature_columns,
            encoders,
            scaler,
        }
    }
}

fn encode_row(
    feature_columns: &[String],
    encoders: &BTreeMap<String, LabelEncoder>,
    table: &Table,
    row: usize,
) -> Result<Vec<f64>, TransformError> {
    if row >= table.len() {
        return Err(TransformError::RowOutOfRange(row));
    }
    let mut out = Vec::with_capacity(feature_columns.len());
    for column in feature_columns {
        let idx = column_index(table, column)?;
        let value = &table.rows()[row][idx];
        let encoded = match encoders.get(column) {
            Some(encoder) => {
                let category = value.category();
                encoder
                    .encode(&category)
                    .ok_or_else(|| TransformError::UnseenCategory {
                        column: column.clone(),
                        value: category.clone(),
                    })? as f64
            }
            None => value.as_number().ok_or_else(|| TransformError::NotNumeric {
                column: column.clone(),
                value: value.category(),
            })?,
        };
        out.push(encoded);
    }
    Ok(out)
}

fn column_index(table: &Table, column: &str) -> Result<usize, TransformError> {
    table
        .column_index(column)
        .ok_or_else(|| TransformError::MissingColumn(column.to_string()))
}
