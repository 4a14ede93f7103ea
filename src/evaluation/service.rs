//! Metric computation for fitted estimators.

use crate::common::error::{FleetError, FleetResult};

use super::domain::EvalReport;

/// R², MAE and RMSE of `predicted` against `actual`.
///
/// R² is 0 when the held-out targets are constant.
pub fn evaluate(actual: &[f64], predicted: &[f64]) -> FleetResult<EvalReport> {
    if actual.len() != predicted.len() {
        return Err(FleetError::DimensionMismatch {
            context: "evaluation predictions",
            expected: actual.len(),
            actual: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(FleetError::invalid("cannot evaluate on an empty split"));
    }

    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut abs_err = 0.0;
    for (a, p) in actual.iter().zip(predicted) {
        let err = a - p;
        ss_res += err * err;
        ss_tot += (a - mean) * (a - mean);
        abs_err += err.abs();
    }

    let r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    Ok(EvalReport {
        r2,
        mae: abs_err / n,
        rmse: (ss_res / n).sqrt(),
        n_test: actual.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_score_one() {
        let report = evaluate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).expect("same length");
        assert_eq!(report.r2, 1.0);
        assert_eq!(report.mae, 0.0);
        assert_eq!(report.rmse, 0.0);
        assert_eq!(report.n_test, 3);
    }

    #[test]
    fn mean_prediction_scores_zero() {
        let report = evaluate(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).expect("same length");
        assert!(report.r2.abs() < 1e-12);
        assert!((report.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.rmse - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn constant_targets_and_bad_shapes() {
        assert_eq!(evaluate(&[4.0, 4.0], &[3.0, 5.0]).expect("same length").r2, 0.0);
        assert!(evaluate(&[1.0], &[1.0, 2.0]).is_err());
        assert!(evaluate(&[], &[]).is_err());
    }
}
