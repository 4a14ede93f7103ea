//! Domain types for training runs and versioned artefacts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::common::error::{FleetError, FleetResult};
use crate::common::ids;
use crate::common::time;
use crate::evaluation::{EvalReport, GateDecision};
use crate::models::{EstimatorKind, Regressor, TrainedEstimator};
use crate::preprocessing::StandardScaler;

pub const ARTIFACT_FORMAT: &str = "evfleet-artifact";
pub const SCHEMA_VERSION: u32 = 1;

/// The three offline pipelines.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Trip,
    Soh,
    Charging,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Trip => "trip",
            PipelineKind::Soh => "soh",
            PipelineKind::Charging => "charging",
        }
    }
}

/// What an envelope carries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RandomForest,
    Linear,
    StandardScaler,
}

impl From<EstimatorKind> for ArtifactKind {
    fn from(kind: EstimatorKind) -> Self {
        match kind {
            EstimatorKind::RandomForest => ArtifactKind::RandomForest,
            EstimatorKind::Linear => ArtifactKind::Linear,
        }
    }
}

/// Versioned JSON wrapper around a persisted estimator or scaler.
///
/// `fingerprint` is SHA-256 over the exact payload bytes and is re-checked by
/// [`ArtifactEnvelope::verify`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub format: String,
    pub schema_version: u32,
    pub name: String,
    pub kind: ArtifactKind,
    pub feature_names: Vec<String>,
    pub fingerprint: String,
    pub created_ms: u64,
    pub payload: Box<RawValue>,
}

impl ArtifactEnvelope {
    pub fn seal<T: Serialize>(
        name: impl Into<String>,
        kind: ArtifactKind,
        feature_names: Vec<String>,
        payload: &T,
    ) -> FleetResult<Self> {
        let raw = serde_json::to_string(payload)?;
        let fingerprint = ids::fingerprint(raw.as_bytes());
        Ok(Self {
            format: ARTIFACT_FORMAT.to_string(),
            schema_version: SCHEMA_VERSION,
            name: name.into(),
            kind,
            feature_names,
            fingerprint,
            created_ms: u64::try_from(time::now_ms()).unwrap_or(u64::MAX),
            payload: RawValue::from_string(raw)?,
        })
    }

    pub fn for_estimator(
        name: impl Into<String>,
        feature_names: Vec<String>,
        estimator: &TrainedEstimator,
    ) -> FleetResult<Self> {
        Self::seal(name, estimator.kind().into(), feature_names, estimator)
    }

    pub fn for_scaler(name: impl Into<String>, scaler: &StandardScaler) -> FleetResult<Self> {
        Self::seal(
            name,
            ArtifactKind::StandardScaler,
            scaler.feature_names().to_vec(),
            scaler,
        )
    }

    /// Reject foreign files, other schema versions and altered payloads.
    pub fn verify(&self) -> FleetResult<()> {
        if self.format != ARTIFACT_FORMAT {
            return Err(FleetError::artifact(
                &self.name,
                format!("unexpected format '{}'", self.format),
            ));
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(FleetError::artifact(
                &self.name,
                format!(
                    "schema version {} is not supported (expected {SCHEMA_VERSION})",
                    self.schema_version
                ),
            ));
        }
        let actual = ids::fingerprint(self.payload.get().as_bytes());
        if actual != self.fingerprint {
            return Err(FleetError::artifact(
                &self.name,
                format!(
                    "fingerprint mismatch: recorded {}, computed {actual}",
                    self.fingerprint
                ),
            ));
        }
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self) -> FleetResult<T> {
        self.verify()?;
        serde_json::from_str(self.payload.get())
            .map_err(|err| FleetError::artifact(&self.name, format!("payload: {err}")))
    }

    pub fn into_estimator(self) -> FleetResult<TrainedEstimator> {
        if self.kind == ArtifactKind::StandardScaler {
            return Err(FleetError::artifact(&self.name, "expected an estimator, found a scaler"));
        }
        let estimator: TrainedEstimator = self.decode()?;
        if ArtifactKind::from(estimator.kind()) != self.kind {
            return Err(FleetError::artifact(&self.name, "payload kind disagrees with envelope"));
        }
        if estimator.n_features() != self.feature_names.len() {
            return Err(FleetError::artifact(
                &self.name,
                format!(
                    "estimator expects {} features, envelope lists {}",
                    estimator.n_features(),
                    self.feature_names.len()
                ),
            ));
        }
        Ok(estimator)
    }

    pub fn into_scaler(self) -> FleetResult<StandardScaler> {
        if self.kind != ArtifactKind::StandardScaler {
            return Err(FleetError::artifact(&self.name, "expected a scaler"));
        }
        self.decode()
    }
}

/// Storage contract for artefact envelopes, keyed by name.
pub trait ArtifactRepo {
    fn put(&self, envelope: &ArtifactEnvelope) -> FleetResult<()>;
    fn get(&self, name: &str) -> FleetResult<ArtifactEnvelope>;

    fn load_estimator(&self, name: &str) -> FleetResult<TrainedEstimator> {
        self.get(name)?.into_estimator()
    }

    fn load_scaler(&self, name: &str) -> FleetResult<StandardScaler> {
        self.get(name)?.into_scaler()
    }
}

/// One fitted estimator with its held-out score.
#[derive(Clone, Debug)]
pub struct TrainedModel {
    pub name: String,
    pub target: &'static str,
    pub estimator: TrainedEstimator,
    pub report: EvalReport,
}

/// Everything a pipeline produced before the gate and persistence.
#[derive(Clone, Debug)]
pub struct TrainingRun {
    pub pipeline: PipelineKind,
    pub feature_names: Vec<String>,
    pub scaler_name: String,
    pub scaler: StandardScaler,
    pub models: Vec<TrainedModel>,
    pub n_rows: usize,
    pub n_train: usize,
}

/// Per-model line of a [`TrainingReport`].
#[derive(Clone, Debug, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub target: &'static str,
    pub kind: EstimatorKind,
    pub metrics: EvalReport,
    pub gate: GateDecision,
}

/// JSON summary printed after a pipeline has been persisted.
#[derive(Clone, Debug, Serialize)]
pub struct TrainingReport {
    pub pipeline: PipelineKind,
    pub rows: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub scaler: String,
    pub models: Vec<ModelSummary>,
    pub persisted: Vec<String>,
    pub dur_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureMatrix;

    fn scaler() -> StandardScaler {
        let x = FeatureMatrix::from_rows(
            vec!["a".into(), "b".into()],
            &[vec![1.0, 10.0], vec![3.0, 10.0]],
        )
        .expect("rows");
        StandardScaler::fit(&x).expect("non-empty")
    }

    #[test]
    fn sealed_envelope_verifies_and_decodes() {
        let env = ArtifactEnvelope::for_scaler("trip_scaler", &scaler()).expect("seal");
        assert_eq!(env.format, ARTIFACT_FORMAT);
        assert_eq!(env.feature_names, vec!["a", "b"]);
        env.verify().expect("untouched");
        assert_eq!(env.into_scaler().expect("scaler"), scaler());
    }

    #[test]
    fn altered_payload_fails_the_fingerprint() {
        let env = ArtifactEnvelope::for_scaler("trip_scaler", &scaler()).expect("seal");
        let text = serde_json::to_string(&env).expect("json").replace("10.0", "11.0");
        let tampered: ArtifactEnvelope = serde_json::from_str(&text).expect("still json");
        let err = tampered.verify().unwrap_err();
        assert!(matches!(err, FleetError::ArtifactLoad { .. }));
        assert!(err.to_string().contains("fingerprint"));
    }

    #[test]
    fn other_schema_versions_are_rejected() {
        let mut env = ArtifactEnvelope::for_scaler("s", &scaler()).expect("seal");
        env.schema_version = 2;
        assert!(env.verify().is_err());
    }

    #[test]
    fn scaler_is_not_an_estimator() {
        let env = ArtifactEnvelope::for_scaler("s", &scaler()).expect("seal");
        assert!(matches!(env.into_estimator(), Err(FleetError::ArtifactLoad { .. })));
    }
}
