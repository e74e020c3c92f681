//! GBDT trainer for the binary churn classifier
//!
//! Logistic-loss boosting over deterministic exact-greedy CART trees, with
//! a seeded stratified train/test split. Identical inputs and seed produce
//! an identical model on every run.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::cart::{CartBuilder, TreeConfig};
use crate::deterministic::LcgRng;
use crate::model::{sigmoid, Model, Tree};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("training set is empty")]
    EmptyDataset,

    #[error("feature matrix has {features} rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
}

/// GBDT training configuration
#[derive(Clone, Debug)]
pub struct GbdtConfig {
    pub num_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub learning_rate: f64,
    /// L2 regularization on leaf weights.
    pub lambda: f64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            num_trees: 50,
            max_depth: 4,
            min_samples_leaf: 2,
            learning_rate: 0.1,
            lambda: 1.0,
        }
    }
}

/// Row indices of a train/test partition, each sorted ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified split: each class is shuffled with the seeded LCG and
/// divided separately, so both partitions keep the class mix. Classes with
/// a single member stay in the training partition.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: i64) -> SplitIndices {
    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut rng = LcgRng::new(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (_, mut indices) in by_class {
        rng.shuffle(&mut indices);
        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1)
        };
        test.extend(indices.drain(..n_test));
        train.extend(indices);
    }

    train.sort_unstable();
    test.sort_unstable();
    SplitIndices { train, test }
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    /// Train on a scaled feature matrix and binary labels.
    pub fn train(&self, features: &[Vec<f64>], labels: &[u8]) -> Result<Model, TrainError> {
        if features.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        if features.len() != labels.len() {
            return Err(TrainError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }

        let feature_count = features[0].len();
        let positives = labels.iter().filter(|&&y| y == 1).count();

        // Single-class training data: record the constant probability and
        // skip boosting entirely.
        if positives == 0 || positives == labels.len() {
            let class = if positives == 0 { 0 } else { 1 };
            tracing::warn!(class, "training data holds a single class; model is constant");
            return Ok(Model {
                version: 1,
                feature_count,
                bias: 0.0,
                trees: Vec::new(),
                single_class: Some(class),
            });
        }

        // Initial score: log-odds of the positive rate.
        let p = positives as f64 / labels.len() as f64;
        let bias = (p / (1.0 - p)).ln();
        let mut scores = vec![bias; labels.len()];

        let mut trees = Vec::with_capacity(self.config.num_trees);
        for round in 0..self.config.num_trees {
            let (gradients, hessians) = logistic_gradients(labels, &scores);

            let tree_config = TreeConfig {
                max_depth: self.config.max_depth,
                min_samples_leaf: self.config.min_samples_leaf,
                lambda: self.config.lambda,
            };
            let mut tree =
                CartBuilder::new(features, &gradients, &hessians, tree_config).build();
            scale_leaves(&mut tree, self.config.learning_rate);

            for (score, feature_vec) in scores.iter_mut().zip(features) {
                *score += tree.evaluate(feature_vec);
            }

            tracing::debug!(round, nodes = tree.nodes.len(), "trained boosting round");
            trees.push(tree);
        }

        Ok(Model {
            version: 1,
            feature_count,
            bias,
            trees,
            single_class: None,
        })
    }
}

/// Logistic loss: gradient = p − y, hessian = p(1 − p) floored away from 0.
fn logistic_gradients(labels: &[u8], scores: &[f64]) -> (Vec<f64>, Vec<f64>) {
    const HESSIAN_FLOOR: f64 = 1e-6;

    let mut gradients = Vec::with_capacity(labels.len());
    let mut hessians = Vec::with_capacity(labels.len());
    for (&label, &score) in labels.iter().zip(scores) {
        let p = sigmoid(score);
        gradients.push(p - label as f64);
        hessians.push((p * (1.0 - p)).max(HESSIAN_FLOOR));
    }
    (gradients, hessians)
}

/// Fold the learning rate into the stored leaf weights.
fn scale_leaves(tree: &mut Tree, learning_rate: f64) {
    for node in &mut tree.nodes {
        if let Some(value) = &mut node.value {
            *value *= learning_rate;
        }
    }
}
