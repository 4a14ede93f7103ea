// lib.rs - central orchestrator
pub mod api;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod features;
pub mod fleet;
pub mod inference;
pub mod models;
pub mod preprocessing;
pub mod training;

pub use common::{AppCfg, FleetCode, FleetError, FleetResult};
pub use features::{FeatureContract, SohFeatures, TripFeatures};
pub use inference::{InferenceEngine, TripFeasibility};
