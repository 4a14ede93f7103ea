//! Regression estimators behind a single [`Regressor`] seam.
//!
//! The inference engine only sees the trait, which is also where tests plug in
//! failing or pathological estimators.

pub mod forest;
pub mod linear;
pub mod tree;

use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};
use crate::features::FeatureMatrix;

pub use forest::{ForestParams, RandomForestRegressor};
pub use linear::LinearRegression;
pub use tree::DecisionTreeRegressor;

/// A fitted function from a fixed-width feature vector to one value.
pub trait Regressor: Send + Sync {
    /// Width of the vectors this estimator was fitted on.
    fn n_features(&self) -> usize;

    /// Predict a single row. Callers validate the width beforehand.
    fn predict_one(&self, features: &[f64]) -> FleetResult<f64>;

    fn predict_matrix(&self, x: &FeatureMatrix) -> FleetResult<Vec<f64>> {
        if x.n_cols() != self.n_features() {
            return Err(FleetError::DimensionMismatch {
                context: "estimator input",
                expected: self.n_features(),
                actual: x.n_cols(),
            });
        }
        x.rows().map(|row| self.predict_one(row)).collect()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    RandomForest,
    Linear,
}

impl EstimatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimatorKind::RandomForest => "random_forest",
            EstimatorKind::Linear => "linear",
        }
    }
}

/// Persistable estimator produced by a training pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedEstimator {
    RandomForest(RandomForestRegressor),
    Linear(LinearRegression),
}

impl TrainedEstimator {
    pub fn kind(&self) -> EstimatorKind {
        match self {
            TrainedEstimator::RandomForest(_) => EstimatorKind::RandomForest,
            TrainedEstimator::Linear(_) => EstimatorKind::Linear,
        }
    }
}

impl Regressor for TrainedEstimator {
    fn n_features(&self) -> usize {
        match self {
            TrainedEstimator::RandomForest(m) => m.n_features(),
            TrainedEstimator::Linear(m) => m.n_features(),
        }
    }

    fn predict_one(&self, features: &[f64]) -> FleetResult<f64> {
        match self {
            TrainedEstimator::RandomForest(m) => m.predict_one(features),
            TrainedEstimator::Linear(m) => m.predict_one(features),
        }
    }
}

pub(crate) fn check_width(expected: usize, actual: usize) -> FleetResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(FleetError::DimensionMismatch {
            context: "estimator input",
            expected,
            actual,
        })
    }
}
