//! Feature contracts shared by training and inference.
//!
//! Both sides build their vectors through the same [`FeatureContract`], which is
//! the only thing keeping column order consistent between them.

pub mod contract;
pub mod domain;

pub use contract::FeatureContract;
pub use domain::{FeatureMatrix, FeatureSource, FeatureVector, SohFeatures, SohForecastFeatures, TripFeatures};
