//! Discount recommendation
//!
//! Trains a small 3-feature churn model (monthly fee, usage, tenure) over
//! the subscriptions table, then searches a fixed discount grid per user
//! for the discount that maximizes expected revenue over the horizon.
//! The grid is iterated ascending and only a strictly better revenue
//! replaces the incumbent, so ties keep the lowest discount.

use serde::Serialize;
use thiserror::Error;

use churnkit_features::{churn_label, STATUS_COLUMN, USER_ID_COLUMN};
use churnkit_model::{
    GbdtConfig, GbdtTrainer, LcgRng, ModelError, StandardScaler, TrainError, TransformError,
};
use churnkit_tables::{Table, TableError, Value};

/// Candidate discounts, ascending.
pub const DISCOUNT_GRID: [f64; 7] = [0.0, 0.05, 0.10, 0.15, 0.20, 0.25, 0.30];

/// Business feature columns the discount model is trained on.
pub const MONTHLY_FEE_COLUMN: &str = "monthly_fee";
pub const USAGE_COLUMN: &str = "usage";
pub const TENURE_COLUMN: &str = "tenure";

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("subscriptions table is missing column {0:?}")]
    MissingColumn(&'static str),

    #[error("no columns available for similarity computation")]
    NoSimilarityColumns,

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Clone, Debug)]
pub struct DiscountConfig {
    /// Linear sensitivity of churn probability to discount depth.
    pub elasticity: f64,
    /// Revenue horizon in months.
    pub horizon_months: f64,
    /// Seed for the split and for synthesized business features.
    pub seed: i64,
    pub trainer: GbdtConfig,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            elasticity: 0.5,
            horizon_months: 12.0,
            seed: 42,
            trainer: GbdtConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiscountRecommendation {
    pub user_id: i64,
    pub churn_probability: f64,
    pub recommended_discount: f64,
}

/// Churn probability after applying a discount, clipped at zero.
pub fn adjusted_churn(churn_probability: f64, discount: f64, elasticity: f64) -> f64 {
    (churn_probability - discount * elasticity).max(0.0)
}

/// Expected revenue for one user under a candidate discount.
pub fn expected_revenue(price: f64, discount: f64, adjusted_churn: f64, horizon: f64) -> f64 {
    price * (1.0 - discount) * (1.0 - adjusted_churn) * horizon
}

/// Grid-search the revenue-maximizing discount for one user.
pub fn best_discount(price: f64, churn_probability: f64, config: &DiscountConfig) -> f64 {
    let mut best = 0.0;
    let mut best_revenue = f64::NEG_INFINITY;
    for discount in DISCOUNT_GRID {
        let adjusted = adjusted_churn(churn_probability, discount, config.elasticity);
        let revenue = expected_revenue(price, discount, adjusted, config.horizon_months);
        if revenue > best_revenue {
            best_revenue = revenue;
            best = discount;
        }
    }
    best
}

/// Train the 3-feature model and recommend a discount per subscription row.
pub fn recommend_discounts(
    subscriptions: &Table,
    config: &DiscountConfig,
) -> Result<Vec<DiscountRecommendation>, RecommendError> {
    let mut table = subscriptions.clone();
    synthesize_business_columns(&mut table, config.seed)?;

    let user_idx = table
        .column_index(USER_ID_COLUMN)
        .ok_or(RecommendError::MissingColumn(USER_ID_COLUMN))?;
    let status_idx = table
        .column_index(STATUS_COLUMN)
        .ok_or(RecommendError::MissingColumn(STATUS_COLUMN))?;

    let matrix = business_matrix(&table)?;
    let labels: Vec<u8> = table
        .rows()
        .iter()
        .map(|row| churn_label(&row[status_idx]))
        .collect();

    let split = churnkit_model::stratified_split(&labels, 0.2, config.seed);
    let train_matrix: Vec<Vec<f64>> = split.train.iter().map(|&i| matrix[i].clone()).collect();
    let train_labels: Vec<u8> = split.train.iter().map(|&i| labels[i]).collect();

    let scaler = StandardScaler::fit(&train_matrix)?;
    let scaled_train: Vec<Vec<f64>> = train_matrix
        .into_iter()
        .map(|mut row| {
            scaler.transform_row(&mut row).map(|()| row)
        })
        .collect::<Result<_, _>>()?;

    let model = GbdtTrainer::new(config.trainer.clone()).train(&scaled_train, &train_labels)?;

    let mut recommendations = Vec::with_capacity(table.len());
    for (row_idx, row) in table.rows().iter().enumerate() {
        let mut features = matrix[row_idx].clone();
        scaler.transform_row(&mut features)?;
        let churn_probability = model.predict_proba(&features)?;

        let price = features_price(&matrix[row_idx]);
        let discount = best_discount(price, churn_probability, config);

        recommendations.push(DiscountRecommendation {
            user_id: id_as_i64(&row[user_idx]),
            churn_probability: round3(churn_probability),
            recommended_discount: discount,
        });
    }

    tracing::info!(
        users = recommendations.len(),
        "generated discount recommendations"
    );
    Ok(recommendations)
}

/// Report table: {user_id, churn_probability, recommended_discount}.
pub fn recommendations_table(
    recommendations: &[DiscountRecommendation],
) -> Result<Table, RecommendError> {
    let mut table = Table::new(vec![
        USER_ID_COLUMN.to_string(),
        "churn_probability".to_string(),
        "recommended_discount".to_string(),
    ]);
    for rec in recommendations {
        table.push_row(vec![
            Value::Number(rec.user_id as f64),
            Value::Number(rec.churn_probability),
            Value::Number(rec.recommended_discount),
        ])?;
    }
    Ok(table)
}

/// Ensure the business feature columns exist; synthesize them with the
/// seeded LCG when the source data lacks them.
fn synthesize_business_columns(table: &mut Table, seed: i64) -> Result<(), RecommendError> {
    const FEES: [f64; 4] = [100.0, 200.0, 300.0, 500.0];

    let mut rng = LcgRng::new(seed);
    if table.column_index(MONTHLY_FEE_COLUMN).is_none() {
        let values = (0..table.len())
            .map(|_| Value::Number(FEES[rng.next_range(FEES.len() as i64) as usize]))
            .collect();
        table.add_column(MONTHLY_FEE_COLUMN, values)?;
    }
    if table.column_index(USAGE_COLUMN).is_none() {
        let values = (0..table.len())
            .map(|_| Value::Number((10 + rng.next_range(90)) as f64))
            .collect();
        table.add_column(USAGE_COLUMN, values)?;
    }
    if table.column_index(TENURE_COLUMN).is_none() {
        let values = (0..table.len())
            .map(|_| Value::Number((1 + rng.next_range(35)) as f64))
            .collect();
        table.add_column(TENURE_COLUMN, values)?;
    }
    Ok(())
}

/// Raw [monthly_fee, usage, tenure] rows.
fn business_matrix(table: &Table) -> Result<Vec<Vec<f64>>, RecommendError> {
    let mut indices = Vec::new();
    for column in [MONTHLY_FEE_COLUMN, USAGE_COLUMN, TENURE_COLUMN] {
        indices.push(
            table
                .column_index(column)
                .ok_or(RecommendError::MissingColumn(column))?,
        );
    }
    Ok(table
        .rows()
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|&idx| row[idx].as_number().unwrap_or(0.0))
                .collect()
        })
        .collect())
}

fn features_price(business_row: &[f64]) -> f64 {
    business_row.first().copied().unwrap_or(0.0)
}

fn id_as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => *n as i64,
        Value::Text(t) => t.parse().unwrap_or(0),
    }
}

fn round3(p: f64) -> f64 {
    (p * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjusted_churn_clips_at_zero() {
        assert_eq!(adjusted_churn(0.1, 0.3, 0.5), 0.0);
        let adjusted = adjusted_churn(0.8, 0.2, 0.5);
        assert!((adjusted - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_best_discount_beats_every_grid_value() {
        let config = DiscountConfig::default();
        for &p in &[0.05, 0.3, 0.55, 0.9] {
            let price = 200.0;
            let best = best_discount(price, p, &config);
            let best_rev = expected_revenue(
                price,
                best,
                adjusted_churn(p, best, config.elasticity),
                config.horizon_months,
            );
            for d in DISCOUNT_GRID {
                let rev = expected_revenue(
                    price,
                    d,
                    adjusted_churn(p, d, config.elasticity),
                    config.horizon_months,
                );
                assert!(
                    best_rev >= rev,
                    "discount {best} (rev {best_rev}) beaten by {d} (rev {rev}) at p={p}"
                );
            }
        }
    }

    #[test]
    fn test_ties_keep_the_lowest_discount() {
        // With zero elasticity and churn probability 1.0 every candidate
        // yields exactly zero revenue; the first grid entry must win.
        let config = DiscountConfig {
            elasticity: 0.0,
            ..DiscountConfig::default()
        };
        assert_eq!(best_discount(100.0, 1.0, &config), 0.0);
    }

    #[test]
    fn test_low_risk_user_gets_no_discount() {
        let config = DiscountConfig::default();
        assert_eq!(best_discount(300.0, 0.0, &config), 0.0);
    }

    #[test]
    fn test_recommendations_cover_every_row() {
        let mut subs = Table::new(vec![
            "subscription_id".into(),
            "user_id".into(),
            "status".into(),
        ]);
        for i in 0..10 {
            subs.push_row(vec![
                Value::Number(i as f64),
                Value::Number(100.0 + i as f64),
                Value::Text(if i % 2 == 0 { "Cancelled" } else { "Active" }.to_string()),
            ])
            .unwrap();
        }

        let recs = recommend_discounts(&subs, &DiscountConfig::default()).unwrap();
        assert_eq!(recs.len(), 10);
        for rec in &recs {
            assert!((0.0..=1.0).contains(&rec.churn_probability));
            assert!(DISCOUNT_GRID.contains(&rec.recommended_discount));
        }
    }

    #[test]
    fn test_synthesized_columns_are_deterministic() {
        let mut a = Table::new(vec!["user_id".into()]);
        let mut b = Table::new(vec!["user_id".into()]);
        for i in 0..5 {
            a.push_row(vec![Value::Number(i as f64)]).unwrap();
            b.push_row(vec![Value::Number(i as f64)]).unwrap();
        }
        synthesize_business_columns(&mut a, 42).unwrap();
        synthesize_business_columns(&mut b, 42).unwrap();
        assert_eq!(a, b);

        for row in 0..5 {
            let fee = a.value(row, "monthly_fee").unwrap().as_number().unwrap();
            assert!([100.0, 200.0, 300.0, 500.0].contains(&fee));
            let usage = a.value(row, "usage").unwrap().as_number().unwrap();
            assert!((10.0..100.0).contains(&usage));
            let tenure = a.value(row, "tenure").unwrap().as_number().unwrap();
            assert!((1.0..36.0).contains(&tenure));
        }
    }
}
