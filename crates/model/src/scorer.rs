//! Scoring over the feature table
//!
//! A `Scorer` owns the feature table, fitted transform, and model it was
//! constructed with; nothing global, nothing mutable after construction.
//! Single-user lookups surface missing identifiers as `NotFound`; batch
//! scoring emits one prediction per feature row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use churnkit_features::USER_ID_COLUMN;
use churnkit_tables::{Table, TableError, Value};

use crate::model::{Model, ModelError};
use crate::transform::{FittedTransform, TransformError};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output column names of the batch prediction table.
pub const CHURN_PROBABILITY_COLUMN: &str = "churn_probability";
pub const PREDICTION_COLUMN: &str = "prediction";
pub const DATE_RUN_COLUMN: &str = "date_run";

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("User Id {0} not found")]
    NotFound(i64),

    #[error("identifier value {0:?} is not a valid user id")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// One scored user.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub user_id: i64,
    pub churn_probability: f64,
    pub prediction: String,
    pub date_run: String,
}

/// Read-only scoring engine over injected artifacts.
pub struct Scorer {
    features: Table,
    transform: FittedTransform,
    model: Model,
}

impl Scorer {
    pub fn new(features: Table, transform: FittedTransform, model: Model) -> Self {
        Self {
            features,
            transform,
            model,
        }
    }

    pub fn feature_rows(&self) -> usize {
        self.features.len()
    }

    /// Score one user by identifier. The first feature row with a matching
    /// `user_id` is used; an absent identifier is `NotFound`.
    pub fn score_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Prediction, ScoreError> {
        let row = self
            .find_user_row(user_id)?
            .ok_or(ScoreError::NotFound(user_id))?;
        self.score_row(row, now)
    }

    /// Score every feature row. Output length always equals the feature
    /// table length.
    pub fn score_all(&self, now: DateTime<Utc>) -> Result<Vec<Prediction>, ScoreError> {
        (0..self.features.len())
            .map(|row| self.score_row(row, now))
            .collect()
    }

    /// Batch output table: {user_id, churn_probability, prediction, date_run}.
    pub fn predictions_table(predictions: &[Prediction]) -> Result<Table, ScoreError> {
        let mut table = Table::new(vec![
            USER_ID_COLUMN.to_string(),
            CHURN_PROBABILITY_COLUMN.to_string(),
            PREDICTION_COLUMN.to_string(),
            DATE_RUN_COLUMN.to_string(),
        ]);
        for p in predictions {
            table.push_row(vec![
                Value::Number(p.user_id as f64),
                Value::Number(p.churn_probability),
                Value::Text(p.prediction.clone()),
                Value::Text(p.date_run.clone()),
            ])?;
        }
        Ok(table)
    }

    fn score_row(&self, row: usize, now: DateTime<Utc>) -> Result<Prediction, ScoreError> {
        let user_id = self.user_id_at(row)?;
        let features = self.transform.transform_row(&self.features, row)?;
        let probability = self.model.predict_proba(&features)?;

        Ok(Prediction {
            user_id,
            churn_probability: round3(probability),
            prediction: if probability > 0.5 {
                "Churn".to_string()
            } else {
                "Not Churn".to_string()
            },
            date_run: now.format(TIMESTAMP_FORMAT).to_string(),
        })
    }

    fn find_user_row(&self, user_id: i64) -> Result<Option<usize>, ScoreError> {
        let idx = self
            .features
            .column_index(USER_ID_COLUMN)
            .ok_or_else(|| TransformError::MissingColumn(USER_ID_COLUMN.to_string()))?;
        Ok(self
            .features
            .rows()
            .iter()
            .position(|row| matches_id(&row[idx], user_id)))
    }

    fn user_id_at(&self, row: usize) -> Result<i64, ScoreError> {
        let value = self
            .features
            .value(row, USER_ID_COLUMN)
            .ok_or_else(|| TransformError::MissingColumn(USER_ID_COLUMN.to_string()))?;
        match value {
            Value::Number(n) if n.fract() == 0.0 => Ok(*n as i64),
            Value::Text(t) => t
                .parse::<i64>()
                .map_err(|_| ScoreError::InvalidIdentifier(t.clone())),
            other => Err(ScoreError::InvalidIdentifier(other.category())),
        }
    }
}

fn matches_id(value: &Value, user_id: i64) -> bool {
    match value {
        Value::Number(n) => *n == user_id as f64,
        Value::Text(t) => t.parse::<i64>() == Ok(user_id),
    }
}

fn round3(p: f64) -> f64 {
    (p * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::{GbdtConfig, GbdtTrainer};
    use chrono::TimeZone;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn fixture_scorer() -> Scorer {
        let mut table = Table::new(vec![
            "user_id".into(),
            "subscription_id".into(),
            "plan".into(),
            "total_billing".into(),
            "churn".into(),
        ]);
        let rows = [
            (10.0, 1.0, "Gold", 150.0, 1.0),
            (11.0, 2.0, "Silver", 20.0, 0.0),
            (12.0, 3.0, "Gold", 90.0, 0.0),
            (13.0, 4.0, "Silver", 10.0, 1.0),
        ];
        for (uid, sid, plan, billing, churn) in rows {
            table
                .push_row(vec![num(uid), num(sid), text(plan), num(billing), num(churn)])
                .unwrap();
        }

        let transform =
            FittedTransform::fit(&table, churnkit_features::NON_FEATURE_COLUMNS).unwrap();
        let matrix = transform.transform_table(&table).unwrap();
        let labels = vec![1, 0, 0, 1];
        let model = GbdtTrainer::new(GbdtConfig {
            num_trees: 5,
            min_samples_leaf: 1,
            ..GbdtConfig::default()
        })
        .train(&matrix, &labels)
        .unwrap();

        Scorer::new(table, transform, model)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_score_known_user() {
        let scorer = fixture_scorer();
        let prediction = scorer.score_user(10, fixed_now()).unwrap();

        assert_eq!(prediction.user_id, 10);
        assert!((0.0..=1.0).contains(&prediction.churn_probability));
        assert!(["Churn", "Not Churn"].contains(&prediction.prediction.as_str()));
        assert_eq!(prediction.date_run, "2024-06-01 12:00:00");
    }

    #[test]
    fn test_unknown_user_is_not_found() {
        let scorer = fixture_scorer();
        let err = scorer.score_user(999, fixed_now()).unwrap_err();
        assert!(matches!(err, ScoreError::NotFound(999)));
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let scorer = fixture_scorer();
        let a = scorer.score_user(11, fixed_now()).unwrap();
        let b = scorer.score_user(11, fixed_now()).unwrap();
        // Exact equality, not just rounded agreement.
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_row_count_matches_feature_rows() {
        let scorer = fixture_scorer();
        let predictions = scorer.score_all(fixed_now()).unwrap();
        assert_eq!(predictions.len(), scorer.feature_rows());

        let table = Scorer::predictions_table(&predictions).unwrap();
        assert_eq!(table.len(), predictions.len());
        assert_eq!(
            table.columns(),
            &["user_id", "churn_probability", "prediction", "date_run"]
        );
    }

    #[test]
    fn test_probability_is_rounded_to_three_decimals() {
        let scorer = fixture_scorer();
        for p in scorer.score_all(fixed_now()).unwrap() {
            let scaled = p.churn_probability * 1000.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.51749), 0.517);
        assert_eq!(round3(0.9999), 1.0);
        assert_eq!(round3(0.0004), 0.0);
    }
}
