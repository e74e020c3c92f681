//! Plan similarity recommendation
//!
//! Concatenates every source sheet into one table, encodes the remaining
//! categorical columns, and ranks rows by cosine similarity to the rows of
//! a queried plan name. Plan names are captured before encoding so queries
//! are always by the raw string.

use churnkit_model::LabelEncoder;
use churnkit_tables::{Table, Value};

use crate::discount::RecommendError;

/// Identifier, contact, and date columns carry no plan semantics and are
/// excluded from the similarity feature set.
pub const EXCLUDED_SIMILARITY_COLUMNS: &[&str] = &[
    "user_id",
    "subscription_id",
    "product_id",
    "phone",
    "email",
    "start_date",
    "last_billed_date",
    "last_renewed_date",
    "terminated_date",
    "action_date",
    "billing_date",
];

/// Column holding the plan name in the catalog sheet.
pub const PLAN_NAME_COLUMN: &str = "name";

/// Precomputed pairwise similarity over the unified table.
pub struct PlanRecommender {
    names: Vec<String>,
    similarity: Vec<Vec<f64>>,
}

impl PlanRecommender {
    /// Build from all source tables. Rows from sheets without a `name`
    /// column keep an empty name and are never returned as recommendations.
    pub fn build(tables: &[&Table]) -> Result<Self, RecommendError> {
        let unified = Table::concat(tables);

        let names: Vec<String> = (0..unified.len())
            .map(|row| {
                unified
                    .value(row, PLAN_NAME_COLUMN)
                    .map(|v| v.category())
                    .unwrap_or_default()
            })
            .collect();

        let feature_columns: Vec<usize> = unified
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !EXCLUDED_SIMILARITY_COLUMNS.contains(&c.as_str()))
            .map(|(idx, _)| idx)
            .collect();
        if feature_columns.is_empty() {
            return Err(RecommendError::NoSimilarityColumns);
        }

        // Per-column encoders over the unified table; every value was seen
        // at fit time, so encoding cannot fail here.
        let encoders: Vec<Option<LabelEncoder>> = feature_columns
            .iter()
            .map(|&idx| {
                let is_categorical = unified
                    .rows()
                    .iter()
                    .any(|row| matches!(row[idx], Value::Text(_)));
                is_categorical.then(|| {
                    LabelEncoder::fit(unified.rows().iter().map(|row| row[idx].category()))
                })
            })
            .collect();

        let matrix: Vec<Vec<f64>> = unified
            .rows()
            .iter()
            .map(|row| {
                feature_columns
                    .iter()
                    .zip(&encoders)
                    .map(|(&idx, encoder)| match encoder {
                        Some(enc) => {
                            enc.encode(&row[idx].category()).unwrap_or(0) as f64
                        }
                        None => row[idx].as_number().unwrap_or(0.0),
                    })
                    .collect()
            })
            .collect();

        let similarity = cosine_similarity_matrix(&matrix);

        tracing::info!(
            rows = unified.len(),
            features = feature_columns.len(),
            "built plan similarity matrix"
        );

        Ok(Self { names, similarity })
    }

    /// Distinct non-empty plan names, first-seen order.
    pub fn available_plans(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for name in &self.names {
            if !name.is_empty() && !seen.contains(name) {
                seen.push(name.clone());
            }
        }
        seen
    }

    /// Top-N plan names most similar to `plan`. Scores are averaged over
    /// every row of the queried plan; rows of the plan itself are excluded
    /// from the ranking. An unknown plan yields an empty result.
    pub fn recommend(&self, plan: &str, top_n: usize) -> Vec<String> {
        let query_rows: Vec<usize> = self
            .names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.as_str() == plan)
            .map(|(idx, _)| idx)
            .collect();

        if query_rows.is_empty() {
            tracing::warn!(plan, "plan not found in dataset");
            return Vec::new();
        }

        let n = self.names.len();
        let mut scores = vec![0.0; n];
        for &row in &query_rows {
            for (score, sim) in scores.iter_mut().zip(&self.similarity[row]) {
                *score += sim;
            }
        }
        for score in &mut scores {
            *score /= query_rows.len() as f64;
        }

        // Descending score; ties resolve by row index for determinism.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .total_cmp(&scores[a])
                .then_with(|| a.cmp(&b))
        });

        let mut recommended = Vec::new();
        for idx in order {
            let name = &self.names[idx];
            if name.is_empty() || name.as_str() == plan || recommended.contains(name) {
                continue;
            }
            recommended.push(name.clone());
            if recommended.len() == top_n {
                break;
            }
        }
        recommended
    }
}

/// Full pairwise cosine similarity; zero-norm rows score 0 against
/// everything.
fn cosine_similarity_matrix(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let norms: Vec<f64> = matrix
        .iter()
        .map(|row| row.iter().map(|v| v * v).sum::<f64>().sqrt())
        .collect();

    matrix
        .iter()
        .enumerate()
        .map(|(i, a)| {
            matrix
                .iter()
                .enumerate()
                .map(|(j, b)| {
                    if norms[i] == 0.0 || norms[j] == 0.0 {
                        0.0
                    } else {
                        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                        dot / (norms[i] * norms[j])
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    /// A small plan catalog: Gold and Premium are near-identical, Basic is
    /// far from both.
    fn catalog() -> Table {
        let mut plans = Table::new(vec![
            "product_id".into(),
            "name".into(),
            "price".into(),
            "data_gb".into(),
            "tier".into(),
        ]);
        plans
            .push_row(vec![num(1.0), text("Gold"), num(100.0), num(50.0), text("high")])
            .unwrap();
        plans
            .push_row(vec![num(2.0), text("Premium"), num(95.0), num(48.0), text("high")])
            .unwrap();
        plans
            .push_row(vec![num(3.0), text("Basic"), num(10.0), num(2.0), text("low")])
            .unwrap();
        plans
            .push_row(vec![num(4.0), text("Silver"), num(55.0), num(20.0), text("mid")])
            .unwrap();
        plans
    }

    #[test]
    fn test_recommends_nearest_plan_first() {
        let plans = catalog();
        let recommender = PlanRecommender::build(&[&plans]).unwrap();
        let recs = recommender.recommend("Gold", 2);

        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0], "Premium");
        assert!(!recs.contains(&"Gold".to_string()));
    }

    #[test]
    fn test_unknown_plan_returns_empty() {
        let plans = catalog();
        let recommender = PlanRecommender::build(&[&plans]).unwrap();
        assert!(recommender.recommend("Enterprise", 5).is_empty());
    }

    #[test]
    fn test_results_are_distinct_names() {
        let mut plans = catalog();
        // Duplicate Premium row: results must still list it once.
        plans
            .push_row(vec![num(5.0), text("Premium"), num(96.0), num(49.0), text("high")])
            .unwrap();

        let recommender = PlanRecommender::build(&[&plans]).unwrap();
        let recs = recommender.recommend("Gold", 5);
        let premium_count = recs.iter().filter(|n| n.as_str() == "Premium").count();
        assert_eq!(premium_count, 1);
    }

    #[test]
    fn test_rows_without_name_column_are_never_recommended() {
        let plans = catalog();
        let mut logs = Table::new(vec!["subscription_id".into(), "action".into()]);
        logs.push_row(vec![num(1.0), text("create")]).unwrap();

        let recommender = PlanRecommender::build(&[&plans, &logs]).unwrap();
        let recs = recommender.recommend("Gold", 10);
        assert!(recs.iter().all(|name| !name.is_empty()));
    }

    #[test]
    fn test_available_plans_lists_catalog() {
        let plans = catalog();
        let recommender = PlanRecommender::build(&[&plans]).unwrap();
        assert_eq!(
            recommender.available_plans(),
            vec!["Gold", "Premium", "Basic", "Silver"]
        );
    }

    #[test]
    fn test_cosine_identity_and_orthogonality() {
        let matrix = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![2.0, 0.0]];
        let sim = cosine_similarity_matrix(&matrix);
        assert!((sim[0][0] - 1.0).abs() < 1e-12);
        assert!(sim[0][1].abs() < 1e-12);
        assert!((sim[0][2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_rows_score_zero() {
        let matrix = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let sim = cosine_similarity_matrix(&matrix);
        assert_eq!(sim[0][1], 0.0);
        assert_eq!(sim[0][0], 0.0);
    }
}
