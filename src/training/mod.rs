//! Offline training pipelines and artefact persistence.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{ArtifactEnvelope, ArtifactKind, ArtifactRepo, PipelineKind, TrainingReport, TrainingRun};
pub use repo_fs::FsArtifactStore;
pub use service::{run_pipeline, train, TrainParams};
