//! Numeric standardization
//!
//! Per-column zero-mean unit-variance scaling fitted on the training
//! matrix. Constant columns keep a divisor of 1.0 so they scale to zero
//! instead of dividing by zero.

use serde::{Deserialize, Serialize};

use crate::transform::TransformError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit per-column mean and population standard deviation.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, TransformError> {
        let Some(first) = rows.first() else {
            return Err(TransformError::EmptyTrainingSet);
        };
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            if row.len() != width {
                return Err(TransformError::ColumnCount {
                    expected: width,
                    got: row.len(),
                });
            }
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut stds = vec![0.0; width];
        for row in rows {
            for (i, value) in row.iter().enumerate() {
                let d = value - means[i];
                stds[i] += d * d;
            }
        }
        for std in &mut stds {
            *std = (*std / n).sqrt();
            if *std == 0.0 {
                *std = 1.0;
            }
        }

        Ok(Self { means, stds })
    }

    pub fn transform_row(&self, row: &mut [f64]) -> Result<(), TransformError> {
        if row.len() != self.means.len() {
            return Err(TransformError::ColumnCount {
                expected: self.means.len(),
                got: row.len(),
            });
        }
        for (i, value) in row.iter_mut().enumerate() {
            *value = (*value - self.means[i]) / self.stds[i];
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_mean_unit_variance() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        let mut scaled: Vec<Vec<f64>> = rows.clone();
        for row in &mut scaled {
            scaler.transform_row(row).unwrap();
        }

        for col in 0..2 {
            let mean: f64 = scaled.iter().map(|r| r[col]).sum::<f64>() / 3.0;
            let var: f64 = scaled.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_column_scales_to_zero() {
        let rows = vec![vec![5.0], vec![5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let mut row = vec![5.0];
        scaler.transform_row(&mut row).unwrap();
        assert_eq!(row[0], 0.0);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        let mut row = vec![1.0];
        assert!(matches!(
            scaler.transform_row(&mut row),
            Err(TransformError::ColumnCount {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        assert!(matches!(
            StandardScaler::fit(&[]),
            Err(TransformError::EmptyTrainingSet)
        ));
    }
}
