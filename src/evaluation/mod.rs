//! Held-out evaluation and the quality gate.

pub mod domain;
pub mod service;

pub use domain::{EvalReport, GateDecision, QualityGate};
pub use service::evaluate;
