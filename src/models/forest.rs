//! Random forest regressor: bootstrap-sampled trees with averaged predictions.
//!
//! Tree `i` draws its bootstrap sample from `StdRng::seed_from_u64(seed + i)`,
//! so a fit is reproducible regardless of how rayon schedules the trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};
use crate::features::FeatureMatrix;

use super::check_width;
use super::tree::DecisionTreeRegressor;

/// Hyperparameters shared by the training pipelines.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub random_state: u64,
}

impl ForestParams {
    pub fn new(n_estimators: usize, max_depth: usize) -> Self {
        Self {
            n_estimators,
            max_depth: Some(max_depth),
            random_state: 42,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTreeRegressor>,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> FleetResult<()> {
        let n_samples = x.n_rows();
        if n_samples != y.len() {
            return Err(FleetError::DimensionMismatch {
                context: "forest targets",
                expected: n_samples,
                actual: y.len(),
            });
        }
        if n_samples == 0 {
            return Err(FleetError::invalid("cannot fit a forest with zero samples"));
        }
        if self.params.n_estimators == 0 {
            return Err(FleetError::invalid("forest needs at least one tree"));
        }

        let params = self.params;
        let trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|i| -> FleetResult<DecisionTreeRegressor> {
                let sample = bootstrap_sample(n_samples, params.random_state.wrapping_add(i as u64));
                let mut tree = match params.max_depth {
                    Some(depth) => DecisionTreeRegressor::new().with_max_depth(depth),
                    None => DecisionTreeRegressor::new(),
                };
                tree.fit_indices(x, y, &sample)?;
                Ok(tree)
            })
            .collect::<FleetResult<Vec<_>>>()?;

        self.n_features = x.n_cols();
        self.trees = trees;
        Ok(())
    }

    /// Mean of the per-tree predictions.
    pub fn predict_one(&self, features: &[f64]) -> FleetResult<f64> {
        check_width(self.n_features, features.len())?;
        if self.trees.is_empty() {
            return Err(FleetError::estimator("random forest is not fitted"));
        }

        let mut total = 0.0;
        for tree in &self.trees {
            total += tree.predict_one(features)?;
        }
        Ok(total / self.trees.len() as f64)
    }
}

/// Indices drawn uniformly with replacement.
fn bootstrap_sample(n_samples: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (FeatureMatrix, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y = rows.iter().map(|r| 2.0 * r[0] + 1.0).collect();
        let x = FeatureMatrix::from_rows(vec!["a".into(), "b".into()], &rows).expect("rows");
        (x, y)
    }

    #[test]
    fn fits_requested_number_of_trees() {
        let (x, y) = linear_data(40);
        let mut rf = RandomForestRegressor::new(ForestParams::new(25, 6));
        rf.fit(&x, &y).expect("fit");
        assert_eq!(rf.n_trees(), 25);
        assert_eq!(rf.n_features(), 2);
    }

    #[test]
    fn predictions_track_the_target() {
        let (x, y) = linear_data(60);
        let mut rf = RandomForestRegressor::new(ForestParams::new(30, 8));
        rf.fit(&x, &y).expect("fit");

        let pred = rf.predict_one(&[30.0, 0.0]).expect("width 2");
        assert!((pred - 61.0).abs() < 6.0, "prediction {pred} too far from 61");
    }

    #[test]
    fn same_seed_gives_identical_forests() {
        let (x, y) = linear_data(50);
        let mut a = RandomForestRegressor::new(ForestParams::new(10, 5));
        let mut b = RandomForestRegressor::new(ForestParams::new(10, 5));
        a.fit(&x, &y).expect("fit a");
        b.fit(&x, &y).expect("fit b");

        for point in [[3.0, 1.0], [17.5, 2.0], [48.0, 0.0]] {
            assert_eq!(
                a.predict_one(&point).expect("a").to_bits(),
                b.predict_one(&point).expect("b").to_bits()
            );
        }
    }

    #[test]
    fn bootstrap_is_seeded_and_in_range() {
        let first = bootstrap_sample(100, 7);
        assert_eq!(first, bootstrap_sample(100, 7));
        assert_ne!(first, bootstrap_sample(100, 8));
        assert!(first.iter().all(|&i| i < 100));
    }

    #[test]
    fn unfitted_forest_reports_an_estimator_fault() {
        let rf = RandomForestRegressor::new(ForestParams::new(3, 2));
        assert!(matches!(rf.predict_one(&[]), Err(FleetError::Estimator(_))));
    }
}
