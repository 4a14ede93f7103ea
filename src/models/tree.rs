//! CART regression tree with a squared-error split criterion.
//!
//! Nodes live in a flat arena so large forests serialise without deep nesting.
//! Leaves predict the mean target of the samples that reached them.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};
use crate::features::FeatureMatrix;

use super::check_width;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
        n_samples: usize,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    n_features: usize,
    nodes: Vec<TreeNode>,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_features: 0,
            nodes: Vec::new(),
        }
    }

    /// Root has depth 0; a tree of `max_depth` d has at most d split levels.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the fitted tree (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], idx: usize) -> usize {
            match &nodes[idx] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Fit on every row of `x`.
    pub fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> FleetResult<()> {
        let all: Vec<usize> = (0..x.n_rows()).collect();
        self.fit_indices(x, y, &all)
    }

    /// Fit on the listed rows; duplicates are allowed (bootstrap samples).
    pub fn fit_indices(&mut self, x: &FeatureMatrix, y: &[f64], indices: &[usize]) -> FleetResult<()> {
        if x.n_rows() != y.len() {
            return Err(FleetError::DimensionMismatch {
                context: "tree targets",
                expected: x.n_rows(),
                actual: y.len(),
            });
        }
        if indices.is_empty() {
            return Err(FleetError::invalid("cannot fit a tree with zero samples"));
        }

        self.n_features = x.n_cols();
        self.nodes.clear();
        let mut work = indices.to_vec();
        self.grow(x, y, &mut work, 0);
        Ok(())
    }

    pub fn predict_one(&self, features: &[f64]) -> FleetResult<f64> {
        check_width(self.n_features, features.len())?;
        if self.nodes.is_empty() {
            return Err(FleetError::estimator("decision tree is not fitted"));
        }

        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Grow the subtree for `samples` and return its arena index.
    fn grow(&mut self, x: &FeatureMatrix, y: &[f64], samples: &mut [usize], depth: usize) -> usize {
        let n = samples.len();
        let (sum, sum_sq) = samples
            .iter()
            .fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]));
        let mean = sum / n as f64;
        let sse = (sum_sq - sum * sum / n as f64).max(0.0);

        let stop = n < self.min_samples_split
            || self.max_depth.is_some_and(|d| depth >= d)
            || sse / (n as f64) < 1e-12;

        let split = if stop { None } else { self.best_split(x, y, samples, sse) };

        let Some((feature, threshold)) = split else {
            return self.push(TreeNode::Leaf {
                value: mean,
                n_samples: n,
            });
        };

        // Partition in place: rows with x <= threshold first.
        let mut boundary = 0;
        for i in 0..n {
            if x.get(samples[i], feature) <= threshold {
                samples.swap(i, boundary);
                boundary += 1;
            }
        }

        if boundary == 0 || boundary == n {
            return self.push(TreeNode::Leaf {
                value: mean,
                n_samples: n,
            });
        }

        let node_idx = self.push(TreeNode::Leaf {
            value: mean,
            n_samples: n,
        });
        let (left_samples, right_samples) = samples.split_at_mut(boundary);
        let left = self.grow(x, y, left_samples, depth + 1);
        let right = self.grow(x, y, right_samples, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_idx
    }

    /// Lowest combined squared error over all features and thresholds.
    fn best_split(&self, x: &FeatureMatrix, y: &[f64], samples: &[usize], parent_sse: f64) -> Option<(usize, f64)> {
        let n = samples.len();
        let mut best: Option<(usize, f64, f64)> = None;
        let mut order: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in 0..x.n_cols() {
            order.clear();
            order.extend(samples.iter().map(|&i| (x.get(i, feature), y[i])));
            order.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = order.iter().map(|(_, t)| t).sum();
            let total_sq: f64 = order.iter().map(|(_, t)| t * t).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for i in 0..n - 1 {
                let (xv, yv) = order[i];
                left_sum += yv;
                left_sq += yv * yv;

                let next = order[i + 1].0;
                // Equal or NaN neighbours cannot be separated by a threshold.
                if next.partial_cmp(&xv) != Some(Ordering::Greater) {
                    continue;
                }
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);

                if best.map_or(true, |(_, _, b)| sse < b) {
                    best = Some((feature, (xv + next) / 2.0, sse));
                }
            }
        }

        best.filter(|(_, _, sse)| *sse < parent_sse - 1e-12)
            .map(|(feature, threshold, _)| (feature, threshold))
    }

    fn push(&mut self, node: TreeNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> FeatureMatrix {
        let rows: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
        FeatureMatrix::from_rows(vec!["x".into()], &rows).expect("single column")
    }

    #[test]
    fn learns_a_step_function() {
        let x = column(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]);
        let y = [5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).expect("fit");

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_one(&[2.5]).expect("width 1"), 5.0);
        assert_eq!(tree.predict_one(&[11.5]).expect("width 1"), 20.0);
        assert_eq!(tree.predict_one(&[6.5]).expect("width 1"), 5.0);
        assert_eq!(tree.predict_one(&[7.0]).expect("width 1"), 20.0);
    }

    #[test]
    fn max_depth_bounds_growth() {
        let values: Vec<f64> = (0..64).map(f64::from).collect();
        let x = column(&values);
        let y: Vec<f64> = values.iter().map(|v| v * v).collect();

        let mut tree = DecisionTreeRegressor::new().with_max_depth(3);
        tree.fit(&x, &y).expect("fit");
        assert!(tree.depth() <= 3);
        assert!(tree.n_nodes() <= 15);
    }

    #[test]
    fn sample_minimums_keep_outliers_out_of_their_own_leaf() {
        let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = [0.0, 0.0, 0.0, 0.0, 0.0, 100.0];

        let mut free = DecisionTreeRegressor::new();
        free.fit(&x, &y).expect("fit");
        assert_eq!(free.predict_one(&[6.0]).expect("width 1"), 100.0);

        let mut leafy = DecisionTreeRegressor::new().with_min_samples_leaf(3);
        leafy.fit(&x, &y).expect("fit");
        assert_eq!(leafy.n_nodes(), 3);
        assert!((leafy.predict_one(&[6.0]).expect("width 1") - 100.0 / 3.0).abs() < 1e-9);

        let mut stump = DecisionTreeRegressor::new().with_min_samples_split(7);
        stump.fit(&x, &y).expect("fit");
        assert_eq!(stump.n_nodes(), 1);
    }

    #[test]
    fn constant_target_yields_single_leaf() {
        let x = column(&[1.0, 2.0, 3.0]);
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &[4.0, 4.0, 4.0]).expect("fit");
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_one(&[100.0]).expect("width 1"), 4.0);
    }

    #[test]
    fn picks_the_informative_feature() {
        let rows = vec![
            vec![0.3, 1.0],
            vec![0.1, 2.0],
            vec![0.4, 3.0],
            vec![0.2, 4.0],
        ];
        let x = FeatureMatrix::from_rows(vec!["noise".into(), "signal".into()], &rows).expect("rows");
        let mut tree = DecisionTreeRegressor::new().with_max_depth(1);
        tree.fit(&x, &[0.0, 0.0, 10.0, 10.0]).expect("fit");
        assert!(matches!(tree.nodes[0], TreeNode::Split { feature: 1, .. }));
    }

    #[test]
    fn unfitted_or_wrong_width_input_fails() {
        let tree = DecisionTreeRegressor::new();
        assert!(matches!(tree.predict_one(&[]), Err(FleetError::Estimator(_))));

        let mut fitted = DecisionTreeRegressor::new();
        fitted.fit(&column(&[1.0, 2.0]), &[1.0, 2.0]).expect("fit");
        assert!(matches!(
            fitted.predict_one(&[1.0, 2.0]),
            Err(FleetError::DimensionMismatch { .. })
        ));
    }
}
