//! Churnkit feature store builder
//!
//! Flattens the four source tables into one feature table with exactly one
//! row per subscription: subscription attributes, joined user attributes,
//! billing and activity aggregates, and the churn label.

pub mod builder;

pub use builder::{
    build_feature_table, churn_label, churn_labels, FeatureError, NON_FEATURE_COLUMNS,
};

/// Canonical column names produced by the builder.
pub const USER_ID_COLUMN: &str = "user_id";
pub const SUBSCRIPTION_ID_COLUMN: &str = "subscription_id";
pub const STATUS_COLUMN: &str = "status";
pub const ACTION_COLUMN: &str = "action";
pub const AMOUNT_COLUMN: &str = "amount";
pub const TOTAL_BILLING_COLUMN: &str = "total_billing";
pub const TOTAL_ACTIONS_COLUMN: &str = "total_actions";
pub const CANCEL_COUNT_COLUMN: &str = "cancel_count";
pub const CHURN_COLUMN: &str = "churn";
