//! Feature table assembly
//!
//! Left-joins subscriptions with users on `user_id`, folds billing and log
//! aggregates onto each subscription, zero-fills unmatched joins, and
//! derives the churn label from the subscription status.

use std::collections::BTreeMap;

use churnkit_tables::{SourceTables, Table, TableError, Value};
use thiserror::Error;

use crate::{
    ACTION_COLUMN, AMOUNT_COLUMN, CANCEL_COUNT_COLUMN, CHURN_COLUMN, STATUS_COLUMN,
    SUBSCRIPTION_ID_COLUMN, TOTAL_ACTIONS_COLUMN, TOTAL_BILLING_COLUMN, USER_ID_COLUMN,
};

/// Columns excluded from the model's feature set: the label and the
/// identifier columns.
pub const NON_FEATURE_COLUMNS: &[&str] =
    &[CHURN_COLUMN, USER_ID_COLUMN, SUBSCRIPTION_ID_COLUMN];

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("{table} table is missing column {column:?}")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Build the feature table: one row per subscription.
///
/// Aggregates are keyed by subscription identifier; subscriptions without
/// billing or log entries get zeroed aggregates. `cancel_count` counts every
/// historical cancel action, not just the most recent one.
pub fn build_feature_table(sources: &SourceTables) -> Result<Table, FeatureError> {
    let subs = &sources.subscriptions;
    let user_id_idx = require(subs, "subscriptions", USER_ID_COLUMN)?;
    let sub_id_idx = require(subs, "subscriptions", SUBSCRIPTION_ID_COLUMN)?;
    let status_idx = require(subs, "subscriptions", STATUS_COLUMN)?;
    require(&sources.users, "users", USER_ID_COLUMN)?;
    require(&sources.billing, "billing", SUBSCRIPTION_ID_COLUMN)?;
    require(&sources.billing, "billing", AMOUNT_COLUMN)?;
    require(&sources.logs, "logs", SUBSCRIPTION_ID_COLUMN)?;
    require(&sources.logs, "logs", ACTION_COLUMN)?;

    let users_by_id = index_first_row(&sources.users, USER_ID_COLUMN);
    let billing_totals = sum_by_key(&sources.billing, SUBSCRIPTION_ID_COLUMN, AMOUNT_COLUMN);
    let (action_counts, cancel_counts) = count_actions(&sources.logs);

    // Output header: subscription columns, then user columns (minus the
    // duplicated join key), then aggregates, then the label.
    let user_extra_columns: Vec<String> = sources
        .users
        .columns()
        .iter()
        .filter(|c| c.as_str() != USER_ID_COLUMN)
        .cloned()
        .collect();

    let mut columns: Vec<String> = subs.columns().to_vec();
    columns.extend(user_extra_columns.iter().cloned());
    columns.push(TOTAL_BILLING_COLUMN.to_string());
    columns.push(TOTAL_ACTIONS_COLUMN.to_string());
    columns.push(CANCEL_COUNT_COLUMN.to_string());
    columns.push(CHURN_COLUMN.to_string());

    let mut features = Table::new(columns);

    for row in subs.rows() {
        let mut cells = row.clone();

        // Left-join the owning user; unmatched users zero-fill.
        let user_key = row[user_id_idx].category();
        match users_by_id.get(&user_key) {
            Some(&user_row) => {
                for col in &user_extra_columns {
                    let value = sources
                        .users
                        .value(user_row, col)
                        .cloned()
                        .unwrap_or(Value::Number(0.0));
                    cells.push(value);
                }
            }
            None => {
                cells.extend(
                    std::iter::repeat(Value::Number(0.0)).take(user_extra_columns.len()),
                );
            }
        }

        let sub_key = row[sub_id_idx].category();
        cells.push(Value::Number(
            billing_totals.get(&sub_key).copied().unwrap_or(0.0),
        ));
        cells.push(Value::Number(
            action_counts.get(&sub_key).copied().unwrap_or(0) as f64,
        ));
        cells.push(Value::Number(
            cancel_counts.get(&sub_key).copied().unwrap_or(0) as f64,
        ));
        cells.push(Value::Number(churn_label(&row[status_idx]) as f64));

        features.push_row(cells)?;
    }

    tracing::info!(
        rows = features.len(),
        columns = features.columns().len(),
        "built feature table"
    );

    Ok(features)
}

/// Extract the label column of a built feature table.
pub fn churn_labels(features: &Table) -> Result<Vec<u8>, FeatureError> {
    let idx = require(features, "features", CHURN_COLUMN)?;
    Ok(features
        .rows()
        .iter()
        .map(|row| u8::from(row[idx].as_number() == Some(1.0)))
        .collect())
}

/// Churn label: 1 iff the status normalizes (case-insensitive) to
/// "cancelled".
pub fn churn_label(status: &Value) -> u8 {
    if status.category().trim().eq_ignore_ascii_case("cancelled") {
        1
    } else {
        0
    }
}

fn require(
    table: &Table,
    name: &'static str,
    column: &'static str,
) -> Result<usize, FeatureError> {
    table
        .column_index(column)
        .ok_or(FeatureError::MissingColumn {
            table: name,
            column,
        })
}

/// Index of first row per key; later duplicates are ignored.
fn index_first_row(table: &Table, key_column: &str) -> BTreeMap<String, usize> {
    let mut index = BTreeMap::new();
    if let Some(key_idx) = table.column_index(key_column) {
        for (row_idx, row) in table.rows().iter().enumerate() {
            index.entry(row[key_idx].category()).or_insert(row_idx);
        }
    }
    index
}

fn sum_by_key(table: &Table, key_column: &str, value_column: &str) -> BTreeMap<String, f64> {
    let mut sums = BTreeMap::new();
    let (Some(key_idx), Some(value_idx)) = (
        table.column_index(key_column),
        table.column_index(value_column),
    ) else {
        return sums;
    };
    for row in table.rows() {
        let amount = row[value_idx].as_number().unwrap_or(0.0);
        *sums.entry(row[key_idx].category()).or_insert(0.0) += amount;
    }
    sums
}

/// Per-subscription counts of all log actions and of cancel actions.
fn count_actions(logs: &Table) -> (BTreeMap<String, u64>, BTreeMap<String, u64>) {
    let mut actions = BTreeMap::new();
    let mut cancels = BTreeMap::new();
    let (Some(key_idx), Some(action_idx)) = (
        logs.column_index(SUBSCRIPTION_ID_COLUMN),
        logs.column_index(ACTION_COLUMN),
    ) else {
        return (actions, cancels);
    };
    for row in logs.rows() {
        let key = row[key_idx].category();
        *actions.entry(key.clone()).or_insert(0) += 1;
        if row[action_idx].category().trim().eq_ignore_ascii_case("cancel") {
            *cancels.entry(key).or_insert(0) += 1;
        }
    }
    (actions, cancels)
}
