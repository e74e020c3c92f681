//! CART builder for boosted trees
//!
//! Deterministic exact-greedy construction: every unique feature value is a
//! candidate threshold, gain ties resolve through a total order on
//! (feature, threshold, node id).

use crate::deterministic::SplitTieBreaker;
use crate::model::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 regularization on leaf weights.
    pub lambda: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_samples_leaf: 2,
            lambda: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
struct Sample {
    features: Vec<f64>,
    gradient: f64,
    hessian: f64,
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: f64, gain: f64, node_id: usize) -> Self {
        Self {
            feature_idx,
            threshold,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold, node_id),
        }
    }
}

/// Build one regression tree over gradient/hessian targets.
pub struct CartBuilder {
    config: TreeConfig,
    samples: Vec<Sample>,
    feature_count: usize,
}

impl CartBuilder {
    pub fn new(
        features: &[Vec<f64>],
        gradients: &[f64],
        hessians: &[f64],
        config: TreeConfig,
    ) -> Self {
        assert_eq!(features.len(), gradients.len());
        assert_eq!(features.len(), hessians.len());

        let samples: Vec<Sample> = features
            .iter()
            .zip(gradients.iter().zip(hessians.iter()))
            .map(|(f, (&g, &h))| Sample {
                features: f.clone(),
                gradient: g,
                hessian: h,
            })
            .collect();

        let feature_count = samples.first().map_or(0, |s| s.features.len());

        Self {
            config,
            samples,
            feature_count,
        }
    }

    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.samples.len()).collect();
        self.build_node(&indices, 0, &mut nodes, 0);
        Tree { nodes }
    }

    fn build_node(
        &self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        node_id: usize,
    ) -> u16 {
        let current_idx = nodes.len() as u16;
        let leaf_value = self.leaf_value(indices);

        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf {
            nodes.push(leaf(leaf_value));
            return current_idx;
        }

        let Some(split) = self.find_best_split(indices, node_id) else {
            nodes.push(leaf(leaf_value));
            return current_idx;
        };

        let (left_indices, right_indices) =
            self.split_samples(indices, split.feature_idx, split.threshold);

        if left_indices.len() < self.config.min_samples_leaf
            || right_indices.len() < self.config.min_samples_leaf
        {
            nodes.push(leaf(leaf_value));
            return current_idx;
        }

        // Reserve the interior node, then fill child links after recursion.
        nodes.push(Node {
            feature_index: split.feature_idx as u16,
            threshold: split.threshold,
            left: 0,
            right: 0,
            value: None,
        });

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, node_id * 2 + 1);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, node_id * 2 + 2);

        nodes[current_idx as usize].left = left_idx;
        nodes[current_idx as usize].right = right_idx;

        current_idx
    }

    fn find_best_split(&self, indices: &[usize], node_id: usize) -> Option<SplitCandidate> {
        let mut best_split: Option<SplitCandidate> = None;

        for feature_idx in 0..self.feature_count {
            for threshold in self.candidate_thresholds(indices, feature_idx) {
                let (left_indices, right_indices) =
                    self.split_samples(indices, feature_idx, threshold);

                if left_indices.len() < self.config.min_samples_leaf
                    || right_indices.len() < self.config.min_samples_leaf
                {
                    continue;
                }

                let gain = self.split_gain(&left_indices, &right_indices, indices);
                let candidate = SplitCandidate::new(feature_idx, threshold, gain, node_id);

                best_split = match best_split {
                    None => Some(candidate),
                    Some(current) => {
                        if gain > current.gain
                            || (gain == current.gain && candidate.tie_breaker < current.tie_breaker)
                        {
                            Some(candidate)
                        } else {
                            Some(current)
                        }
                    }
                };
            }
        }

        best_split
    }

    /// Unique feature values in ascending order. The maximum is dropped:
    /// splitting at it would leave the right side empty.
    fn candidate_thresholds(&self, indices: &[usize], feature_idx: usize) -> Vec<f64> {
        let mut values: Vec<f64> = indices
            .iter()
            .map(|&idx| self.samples[idx].features[feature_idx])
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        values.pop();
        values
    }

    fn split_samples(
        &self,
        indices: &[usize],
        feature_idx: usize,
        threshold: f64,
    ) -> (Vec<usize>, Vec<usize>) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for &idx in indices {
            if self.samples[idx].features[feature_idx] <= threshold {
                left.push(idx);
            } else {
                right.push(idx);
            }
        }
        (left, right)
    }

    /// Gain = G_l²/(H_l+λ) + G_r²/(H_r+λ) − G_p²/(H_p+λ)
    fn split_gain(&self, left: &[usize], right: &[usize], parent: &[usize]) -> f64 {
        let lambda = self.config.lambda;
        let term = |indices: &[usize]| {
            let (g, h) = self.sum_gradients_hessians(indices);
            g * g / (h + lambda)
        };
        term(left) + term(right) - term(parent)
    }

    fn sum_gradients_hessians(&self, indices: &[usize]) -> (f64, f64) {
        let mut sum_g = 0.0;
        let mut sum_h = 0.0;
        for &idx in indices {
            sum_g += self.samples[idx].gradient;
            sum_h += self.samples[idx].hessian;
        }
        (sum_g, sum_h)
    }

    /// Optimal leaf weight: −G / (H + λ)
    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let (sum_g, sum_h) = self.sum_gradients_hessians(indices);
        -sum_g / (sum_h + self.config.lambda)
    }
}

fn leaf(value: f64) -> Node {
    Node {
        feature_index: 0,
        threshold: 0.0,
        left: 0,
        right: 0,
        value: Some(value),
    }
}
