//! GBDT churn model
//!
//! An ensemble of array-indexed decision trees over a log-odds bias.
//! Leaf values already carry the learning rate, so inference is
//! `sigmoid(bias + sum of leaf values)`. A degenerate single-class fit is
//! recorded explicitly and short-circuits probability output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("expected {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },

    #[error("model validation failed: {0}")]
    ValidationFailed(String),
}

/// One tree node. Interior nodes route on `features[feature_index] <=
/// threshold`; leaves carry `value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub feature_index: u16,
    pub threshold: f64,
    pub left: u16,
    pub right: u16,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk from the root to a leaf; malformed indices fall out as 0.0.
    pub fn evaluate(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if let Some(value) = node.value {
                return value;
            }
            let Some(&feature) = features.get(node.feature_index as usize) else {
                return 0.0;
            };
            idx = if feature <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model format version (always 1 for now)
    pub version: u32,

    /// Width of the feature vector the model was trained on.
    pub feature_count: usize,

    /// Initial log-odds of the churn class.
    pub bias: f64,

    /// Boosted trees; leaf values are pre-scaled by the learning rate.
    pub trees: Vec<Tree>,

    /// Set when the training data held a single class: the constant churn
    /// probability (1.0 if that class was churned, else 0.0).
    pub single_class: Option<u8>,
}

impl Model {
    /// Raw decision value (log-odds) for a feature vector.
    pub fn decision_value(&self, features: &[f64]) -> f64 {
        let mut sum = self.bias;
        for tree in &self.trees {
            sum += tree.evaluate(features);
        }
        sum
    }

    /// Probability of churn in [0, 1]. Single-class fits return their
    /// recorded constant and never fail.
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.feature_count {
            return Err(ModelError::FeatureCount {
                expected: self.feature_count,
                got: features.len(),
            });
        }
        if let Some(class) = self.single_class {
            return Ok(if class == 1 { 1.0 } else { 0.0 });
        }
        Ok(sigmoid(self.decision_value(features)))
    }

    /// Binary churn prediction at the 0.5 threshold.
    pub fn predict(&self, features: &[f64]) -> Result<u8, ModelError> {
        Ok(if self.predict_proba(features)? > 0.5 { 1 } else { 0 })
    }

    /// Structural sanity check before persisting or serving.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.version != 1 {
            return Err(ModelError::ValidationFailed(format!(
                "unsupported model version: {}",
                self.version
            )));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::ValidationFailed(format!("tree {i} is empty")));
            }
            for (j, node) in tree.nodes.iter().enumerate() {
                if node.value.is_none()
                    && (node.left as usize >= tree.nodes.len()
                        || node.right as usize >= tree.nodes.len())
                {
                    return Err(ModelError::ValidationFailed(format!(
                        "tree {i} node {j} has out-of-range children"
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: f64) -> Node {
        Node {
            feature_index: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }

    fn stump(feature_index: u16, threshold: f64, left: f64, right: f64) -> Tree {
        Tree {
            nodes: vec![
                Node {
                    feature_index,
                    threshold,
                    left: 1,
                    right: 2,
                    value: None,
                },
                leaf(left),
                leaf(right),
            ],
        }
    }

    #[test]
    fn test_tree_routing() {
        let tree = stump(0, 0.5, -1.0, 1.0);
        assert_eq!(tree.evaluate(&[0.0]), -1.0);
        assert_eq!(tree.evaluate(&[0.5]), -1.0);
        assert_eq!(tree.evaluate(&[0.9]), 1.0);
    }

    #[test]
    fn test_probability_is_sigmoid_of_decision() {
        let model = Model {
            version: 1,
            feature_count: 1,
            bias: 0.0,
            trees: vec![stump(0, 0.0, -2.0, 2.0)],
            single_class: None,
        };
        let p = model.predict_proba(&[1.0]).unwrap();
        assert!((p - sigmoid(2.0)).abs() < 1e-12);
        assert_eq!(model.predict(&[1.0]).unwrap(), 1);
        assert_eq!(model.predict(&[-1.0]).unwrap(), 0);
    }

    #[test]
    fn test_single_class_constants() {
        let churned = Model {
            version: 1,
            feature_count: 2,
            bias: 0.0,
            trees: Vec::new(),
            single_class: Some(1),
        };
        let retained = Model {
            single_class: Some(0),
            ..churned.clone()
        };
        assert_eq!(churned.predict_proba(&[0.0, 0.0]).unwrap(), 1.0);
        assert_eq!(retained.predict_proba(&[9.0, 9.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let model = Model {
            version: 1,
            feature_count: 3,
            bias: 0.0,
            trees: Vec::new(),
            single_class: None,
        };
        assert!(matches!(
            model.predict_proba(&[1.0]),
            Err(ModelError::FeatureCount {
                expected: 3,
                got: 1
            })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_children() {
        let model = Model {
            version: 1,
            feature_count: 1,
            bias: 0.0,
            trees: vec![Tree {
                nodes: vec![Node {
                    feature_index: 0,
                    threshold: 0.0,
                    left: 7,
                    right: 8,
                    value: None,
                }],
            }],
            single_class: None,
        };
        assert!(model.validate().is_err());
    }
}
