//! Online inference: engine, prediction results and the trip planner.

pub mod domain;
pub mod planner;
pub mod service;

pub use domain::{CurvePoint, PredictionSource, RiskLevel, SohForecast, TripFeasibility};
pub use planner::{plan_trip, TripPlan, TripRequest};
pub use service::{EngineParts, InferenceEngine};
