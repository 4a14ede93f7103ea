//! Prediction results returned by the inference engine.

use serde::{Deserialize, Serialize};

/// Trip risk derived from the predicted end-of-trip SOC.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Warning,
    Critical,
}

impl RiskLevel {
    pub const CRITICAL_BELOW: f64 = 15.0;
    pub const WARNING_BELOW: f64 = 30.0;

    /// Classify an unrounded end SOC percentage.
    pub fn from_end_soc(end_soc: f64) -> Self {
        if end_soc < Self::CRITICAL_BELOW {
            RiskLevel::Critical
        } else if end_soc < Self::WARNING_BELOW {
            RiskLevel::Warning
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Warning => "WARNING",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Whether a value came from the estimator or the documented fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Fallback { reason: String },
}

impl PredictionSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, PredictionSource::Fallback { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub distance: f64,
    pub soc: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripFeasibility {
    pub energy_consumed_pct: f64,
    pub predicted_end_soc: f64,
    pub energy_curve: Vec<CurvePoint>,
    pub risk_level: RiskLevel,
    pub source: PredictionSource,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SohForecast {
    pub predicted_soh: f64,
    pub source: PredictionSource,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_boundaries() {
        assert_eq!(RiskLevel::from_end_soc(10.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_end_soc(14.999), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_end_soc(15.0), RiskLevel::Warning);
        assert_eq!(RiskLevel::from_end_soc(29.99), RiskLevel::Warning);
        assert_eq!(RiskLevel::from_end_soc(30.0), RiskLevel::Low);
    }

    #[test]
    fn serialises_like_the_dashboard_expects() {
        let json = serde_json::to_string(&RiskLevel::Warning).expect("json");
        assert_eq!(json, "\"WARNING\"");

        let source = PredictionSource::Fallback {
            reason: "boom".into(),
        };
        let json = serde_json::to_value(&source).expect("json");
        assert_eq!(json["kind"], "fallback");
        assert_eq!(json["reason"], "boom");
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(12.345_67, 2), 12.35);
        assert_eq!(round_to(4.449, 1), 4.4);
    }
}
