//! Data domain: telemetry CSV loading and per-pipeline dataset derivation.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{ChargingSet, TelemetryTable, TrainingSet};
pub use repo_fs::FsDataRepo;
