//! Error handling primitives shared across the core.
//!
//! Contract and shape errors always reach the caller. Estimator faults are
//! represented here too, but the inference engine converts them into a
//! documented fallback instead of returning them.

use thiserror::Error;

/// Stable error codes surfaced to the CLI and in structured logs.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FleetCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// A required named input was absent.
    MissingFeature = 1,
    /// Scaler or estimator shape did not match the feature vector.
    DimensionMismatch = 2,
    /// Artefact file missing, corrupt or of an unsupported version.
    ArtifactLoad = 3,
    /// Input failed validation.
    InvalidInput = 4,
    /// Training table lacks required columns.
    MissingColumn = 5,
    /// Trained model scored below the configured threshold.
    QualityGate = 6,
    /// Filesystem failure.
    Io = 7,
    /// Catch-all for estimator faults and encoding failures.
    Internal = 8,
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("missing features for contract '{contract}': {}", .missing.join(", "))]
    MissingFeature {
        contract: String,
        missing: Vec<String>,
    },

    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to load artifact '{name}': {reason}")]
    ArtifactLoad { name: String, reason: String },

    #[error("missing training columns: {}", .missing.join(", "))]
    MissingColumn { missing: Vec<String> },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model '{model}' rejected: r2 {r2:.4} below threshold {min_r2:.4}")]
    QualityGateRejected { model: String, r2: f64, min_r2: f64 },

    #[error("estimator fault: {0}")]
    Estimator(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type FleetResult<T> = Result<T, FleetError>;

impl FleetError {
    /// Machine parsable code for this error.
    pub fn code(&self) -> FleetCode {
        match self {
            FleetError::MissingFeature { .. } => FleetCode::MissingFeature,
            FleetError::DimensionMismatch { .. } => FleetCode::DimensionMismatch,
            FleetError::ArtifactLoad { .. } => FleetCode::ArtifactLoad,
            FleetError::MissingColumn { .. } => FleetCode::MissingColumn,
            FleetError::InvalidInput(_) => FleetCode::InvalidInput,
            FleetError::QualityGateRejected { .. } => FleetCode::QualityGate,
            FleetError::Io(_) => FleetCode::Io,
            FleetError::Estimator(_) | FleetError::Csv(_) | FleetError::Serialization(_) => {
                FleetCode::Internal
            }
        }
    }

    /// Validation helper.
    pub fn invalid(msg: impl Into<String>) -> Self {
        FleetError::InvalidInput(msg.into())
    }

    /// Artefact helper.
    pub fn artifact(name: impl Into<String>, reason: impl ToString) -> Self {
        FleetError::ArtifactLoad {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Estimator fault helper.
    pub fn estimator(msg: impl Into<String>) -> Self {
        FleetError::Estimator(msg.into())
    }
}
