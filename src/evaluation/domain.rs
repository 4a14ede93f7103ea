//! Held-out metrics and the persistence gate built on them.

use serde::{Deserialize, Serialize};

/// Regression metrics on the held-out split.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    pub n_test: usize,
}

/// Outcome of checking a report against the configured threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    /// No threshold configured; the model is persisted regardless.
    NotConfigured,
    Accepted { min_r2: f64 },
    Rejected { min_r2: f64 },
}

impl GateDecision {
    pub fn allows_persist(&self) -> bool {
        !matches!(self, GateDecision::Rejected { .. })
    }
}

/// Minimum held-out R² a model needs before it may be persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QualityGate {
    pub min_r2: Option<f64>,
}

impl QualityGate {
    pub fn new(min_r2: Option<f64>) -> Self {
        Self { min_r2 }
    }

    pub fn decide(&self, report: &EvalReport) -> GateDecision {
        match self.min_r2 {
            None => GateDecision::NotConfigured,
            Some(min_r2) if report.r2 >= min_r2 => GateDecision::Accepted { min_r2 },
            Some(min_r2) => GateDecision::Rejected { min_r2 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(r2: f64) -> EvalReport {
        EvalReport {
            r2,
            mae: 1.0,
            rmse: 1.0,
            n_test: 10,
        }
    }

    #[test]
    fn gate_decisions() {
        assert_eq!(QualityGate::default().decide(&report(-3.0)), GateDecision::NotConfigured);

        let gate = QualityGate::new(Some(0.6));
        assert_eq!(gate.decide(&report(0.6)), GateDecision::Accepted { min_r2: 0.6 });
        let rejected = gate.decide(&report(0.59));
        assert_eq!(rejected, GateDecision::Rejected { min_r2: 0.6 });
        assert!(!rejected.allows_persist());
        assert!(GateDecision::NotConfigured.allows_persist());
    }

    #[test]
    fn nan_score_never_passes_a_threshold() {
        let gate = QualityGate::new(Some(0.0));
        assert!(!gate.decide(&report(f64::NAN)).allows_persist());
    }
}
