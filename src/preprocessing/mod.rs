//! Feature preprocessing fitted at training time and replayed at inference.

pub mod scaler;

pub use scaler::StandardScaler;
