//! Per-feature standardisation: `z = (x - mean) / scale`.
//!
//! Uses the population standard deviation. A zero-variance column keeps
//! `scale = 1.0`, so it is only centred.

use ndarray::Axis;
use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};
use crate::features::FeatureMatrix;

/// Fitted scaler state. Immutable once built by [`StandardScaler::fit`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Compute column means and standard deviations.
    pub fn fit(matrix: &FeatureMatrix) -> FleetResult<Self> {
        let (n_rows, n_cols) = matrix.shape();
        if n_rows == 0 {
            return Err(FleetError::invalid("cannot fit scaler on an empty matrix"));
        }

        let view = matrix.view();
        let mean = view
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; n_cols]);
        let scale = view
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&std| if std.is_finite() && std > f64::EPSILON { std } else { 1.0 })
            .collect();

        Ok(Self {
            feature_names: matrix.names().to_vec(),
            mean,
            scale,
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Standardise one vector of the fitted width.
    pub fn transform(&self, values: &[f64]) -> FleetResult<Vec<f64>> {
        if values.len() != self.n_features() {
            return Err(FleetError::DimensionMismatch {
                context: "scaler transform",
                expected: self.n_features(),
                actual: values.len(),
            });
        }
        Ok(values
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform_matrix(&self, matrix: &FeatureMatrix) -> FleetResult<FeatureMatrix> {
        if matrix.n_cols() != self.n_features() {
            return Err(FleetError::DimensionMismatch {
                context: "scaler transform",
                expected: self.n_features(),
                actual: matrix.n_cols(),
            });
        }
        let mut data = Vec::with_capacity(matrix.n_rows() * matrix.n_cols());
        for row in matrix.rows() {
            data.extend(self.transform(row)?);
        }
        FeatureMatrix::new(matrix.names().to_vec(), matrix.n_rows(), data)
    }
}
