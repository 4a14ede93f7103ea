//! Ordinary least squares with an intercept, fitted by `linfa-linear`.
//!
//! Constant columns and exact copies of an earlier column are left out of the
//! solve and keep a zero coefficient; the normal equations are singular with
//! them in. Any remaining rank deficiency surfaces as an estimator error.

use linfa::prelude::*;
use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};
use crate::features::FeatureMatrix;

use super::check_width;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Vec<f64>,
    intercept: f64,
    fitted: bool,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn fit(&mut self, x: &FeatureMatrix, y: &[f64]) -> FleetResult<()> {
        let (n_samples, n_features) = x.shape();
        if n_samples != y.len() {
            return Err(FleetError::DimensionMismatch {
                context: "linear targets",
                expected: n_samples,
                actual: y.len(),
            });
        }
        if n_samples == 0 {
            return Err(FleetError::invalid("cannot fit a linear model with zero samples"));
        }

        let kept = informative_columns(x);
        let mut coefficients = vec![0.0; n_features];
        let intercept = if kept.is_empty() {
            y.iter().sum::<f64>() / n_samples as f64
        } else {
            let records = x.view().select(Axis(1), &kept);
            let dataset = Dataset::new(records, Array1::from(y.to_vec()));
            let fitted = linfa_linear::LinearRegression::new()
                .fit(&dataset)
                .map_err(|err| FleetError::estimator(format!("least squares failed: {err}")))?;
            for (&col, &beta) in kept.iter().zip(fitted.params()) {
                coefficients[col] = beta;
            }
            fitted.intercept()
        };

        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(FleetError::estimator("least squares produced non-finite parameters"));
        }
        self.coefficients = coefficients;
        self.intercept = intercept;
        self.fitted = true;
        Ok(())
    }

    pub fn predict_one(&self, features: &[f64]) -> FleetResult<f64> {
        if !self.fitted {
            return Err(FleetError::estimator("linear model is not fitted"));
        }
        check_width(self.coefficients.len(), features.len())?;
        let beta = ArrayView1::from(self.coefficients.as_slice());
        Ok(self.intercept + beta.dot(&ArrayView1::from(features)))
    }
}

/// Columns that vary and are not a verbatim copy of an earlier column.
fn informative_columns(x: &FeatureMatrix) -> Vec<usize> {
    let view = x.view();
    let mut kept: Vec<usize> = Vec::new();
    for (col, values) in view.axis_iter(Axis(1)).enumerate() {
        let first = values.get(0).copied().unwrap_or_default();
        if values.iter().all(|v| *v == first) {
            continue;
        }
        if kept.iter().any(|&k| view.column(k) == values) {
            continue;
        }
        kept.push(col);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_relationship() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = rows.iter().map(|r| 3.0 + 2.0 * r[0] - 0.5 * r[1]).collect();
        let x = FeatureMatrix::from_rows(vec!["a".into(), "b".into()], &rows).expect("rows");

        let mut model = LinearRegression::new();
        model.fit(&x, &y).expect("fit");

        assert!((model.intercept() - 3.0).abs() < 1e-6);
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-6);
        assert!((model.coefficients()[1] + 0.5).abs() < 1e-6);
        assert!((model.predict_one(&[4.0, 2.0]).expect("width 2") - 10.0).abs() < 1e-6);
    }

    #[test]
    fn constant_and_duplicate_columns_keep_zero_weight() {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64, 0.0, i as f64]).collect();
        let y: Vec<f64> = rows.iter().map(|r| 1.0 + r[0]).collect();
        let x = FeatureMatrix::from_rows(vec!["a".into(), "flag".into(), "a_copy".into()], &rows)
            .expect("rows");

        let mut model = LinearRegression::new();
        model.fit(&x, &y).expect("fit");
        assert_eq!(model.coefficients()[1], 0.0);
        assert_eq!(model.coefficients()[2], 0.0);
        assert!((model.predict_one(&[5.0, 0.0, 5.0]).expect("width 3") - 6.0).abs() < 1e-6);
    }

    #[test]
    fn all_constant_inputs_predict_the_mean() {
        let rows: Vec<Vec<f64>> = (0..4).map(|_| vec![2.0]).collect();
        let x = FeatureMatrix::from_rows(vec!["a".into()], &rows).expect("rows");
        let mut model = LinearRegression::new();
        model.fit(&x, &[1.0, 2.0, 3.0, 4.0]).expect("fit");
        assert_eq!(model.predict_one(&[9.0]).expect("width 1"), 2.5);
    }

    #[test]
    fn unfitted_model_is_an_estimator_fault() {
        let model = LinearRegression::new();
        assert!(matches!(model.predict_one(&[1.0]), Err(FleetError::Estimator(_))));
    }
}
