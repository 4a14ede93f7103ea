//! Service layer running the offline pipelines: derive, scale, split, fit,
//! evaluate, gate and persist.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::common::error::{FleetError, FleetResult};
use crate::common::time;
use crate::data::service::{build_charging_dataset, build_soh_dataset, build_trip_dataset};
use crate::data::TelemetryTable;
use crate::evaluation::{evaluate, GateDecision, QualityGate};
use crate::features::FeatureMatrix;
use crate::models::{ForestParams, LinearRegression, RandomForestRegressor, Regressor, TrainedEstimator};
use crate::preprocessing::StandardScaler;

use super::domain::{
    ArtifactEnvelope, ArtifactRepo, ModelSummary, PipelineKind, TrainedModel, TrainingReport, TrainingRun,
};

pub const TRIP_MODEL: &str = "trip_feasibility";
pub const TRIP_SCALER: &str = "trip_scaler";
pub const SOH_MODEL: &str = "soh_forecast";
pub const SOH_SCALER: &str = "soh_scaler";
pub const CHARGING_SOC_MODEL: &str = "charging_soc";
pub const CHARGING_SOH_MODEL: &str = "charging_soh";
pub const CHARGING_SCALER: &str = "charging_scaler";

/// Hyperparameters for all pipelines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainParams {
    pub n_estimators: usize,
    pub trip_depth: usize,
    pub soh_depth: usize,
    pub charging_depth: usize,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            trip_depth: 12,
            soh_depth: 14,
            charging_depth: 12,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TrainParams {
    fn forest(&self, depth: usize) -> ForestParams {
        ForestParams {
            random_state: self.seed,
            ..ForestParams::new(self.n_estimators, depth)
        }
    }
}

/// Shuffle `0..n` with a seeded RNG and cut off `ceil(n * test_fraction)`
/// indices for the held-out split.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> FleetResult<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(FleetError::invalid(format!(
            "need at least 2 rows to split, got {n}"
        )));
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FleetError::invalid(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n - 1);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

struct Split {
    x_train: FeatureMatrix,
    x_test: FeatureMatrix,
    train_idx: Vec<usize>,
    test_idx: Vec<usize>,
}

impl Split {
    fn targets(&self, y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (
            self.train_idx.iter().map(|&i| y[i]).collect(),
            self.test_idx.iter().map(|&i| y[i]).collect(),
        )
    }
}

/// Scaler is fit on the full matrix, then the scaled rows are split.
fn scale_and_split(x: &FeatureMatrix, params: &TrainParams) -> FleetResult<(StandardScaler, Split)> {
    let scaler = StandardScaler::fit(x)?;
    let scaled = scaler.transform_matrix(x)?;
    let (train_idx, test_idx) = train_test_split(x.n_rows(), params.test_fraction, params.seed)?;
    let split = Split {
        x_train: scaled.select_rows(&train_idx),
        x_test: scaled.select_rows(&test_idx),
        train_idx,
        test_idx,
    };
    Ok((scaler, split))
}

fn fit_and_score(
    name: &str,
    target: &'static str,
    mut estimator: TrainedEstimator,
    split: &Split,
    y: &[f64],
) -> FleetResult<TrainedModel> {
    let (y_train, y_test) = split.targets(y);
    let start = time::now_ms();
    match &mut estimator {
        TrainedEstimator::RandomForest(m) => m.fit(&split.x_train, &y_train)?,
        TrainedEstimator::Linear(m) => m.fit(&split.x_train, &y_train)?,
    }
    let predicted = estimator.predict_matrix(&split.x_test)?;
    let report = evaluate(&y_test, &predicted)?;

    info!(
        ev = "train.fit",
        model = name,
        kind = estimator.kind().as_str(),
        r2 = report.r2,
        mae = report.mae,
        rmse = report.rmse,
        n_test = report.n_test,
        dur_ms = time::elapsed_ms(start) as u64
    );

    Ok(TrainedModel {
        name: name.to_string(),
        target,
        estimator,
        report,
    })
}

pub fn train_trip(table: &TelemetryTable, params: &TrainParams) -> FleetResult<TrainingRun> {
    let set = build_trip_dataset(table)?;
    let (scaler, split) = scale_and_split(&set.x, params)?;
    let forest = RandomForestRegressor::new(params.forest(params.trip_depth));
    let model = fit_and_score(
        TRIP_MODEL,
        "energy_consumed_pct",
        TrainedEstimator::RandomForest(forest),
        &split,
        &set.y,
    )?;

    Ok(TrainingRun {
        pipeline: PipelineKind::Trip,
        feature_names: set.x.names().to_vec(),
        scaler_name: TRIP_SCALER.to_string(),
        scaler,
        models: vec![model],
        n_rows: set.x.n_rows(),
        n_train: split.train_idx.len(),
    })
}

pub fn train_soh(table: &TelemetryTable, params: &TrainParams) -> FleetResult<TrainingRun> {
    let set = build_soh_dataset(table)?;
    let (scaler, split) = scale_and_split(&set.x, params)?;
    let forest = RandomForestRegressor::new(params.forest(params.soh_depth));
    let model = fit_and_score(
        SOH_MODEL,
        "SOH",
        TrainedEstimator::RandomForest(forest),
        &split,
        &set.y,
    )?;

    Ok(TrainingRun {
        pipeline: PipelineKind::Soh,
        feature_names: set.x.names().to_vec(),
        scaler_name: SOH_SCALER.to_string(),
        scaler,
        models: vec![model],
        n_rows: set.x.n_rows(),
        n_train: split.train_idx.len(),
    })
}

/// SOC forest and SOH linear model over one shared scaler and split.
pub fn train_charging(table: &TelemetryTable, params: &TrainParams) -> FleetResult<TrainingRun> {
    let set = build_charging_dataset(table)?;
    let (scaler, split) = scale_and_split(&set.x, params)?;

    let forest = RandomForestRegressor::new(params.forest(params.charging_depth));
    let soc_model = fit_and_score(
        CHARGING_SOC_MODEL,
        "SOC",
        TrainedEstimator::RandomForest(forest),
        &split,
        &set.soc,
    )?;
    let soh_model = fit_and_score(
        CHARGING_SOH_MODEL,
        "SOH",
        TrainedEstimator::Linear(LinearRegression::new()),
        &split,
        &set.soh,
    )?;

    Ok(TrainingRun {
        pipeline: PipelineKind::Charging,
        feature_names: set.x.names().to_vec(),
        scaler_name: CHARGING_SCALER.to_string(),
        scaler,
        models: vec![soc_model, soh_model],
        n_rows: set.x.n_rows(),
        n_train: split.train_idx.len(),
    })
}

pub fn train(kind: PipelineKind, table: &TelemetryTable, params: &TrainParams) -> FleetResult<TrainingRun> {
    info!(ev = "train.start", pipeline = kind.as_str(), raw_rows = table.n_rows());
    match kind {
        PipelineKind::Trip => train_trip(table, params),
        PipelineKind::Soh => train_soh(table, params),
        PipelineKind::Charging => train_charging(table, params),
    }
}

/// Gate every model of the run; persist estimators and scaler only when none
/// is rejected.
pub fn persist(run: &TrainingRun, gate: &QualityGate, repo: &dyn ArtifactRepo) -> FleetResult<Vec<GateDecision>> {
    let decisions: Vec<GateDecision> = run.models.iter().map(|m| gate.decide(&m.report)).collect();

    for (model, decision) in run.models.iter().zip(&decisions) {
        match decision {
            GateDecision::Rejected { min_r2 } => {
                warn!(
                    ev = "train.rejected",
                    model = %model.name,
                    r2 = model.report.r2,
                    min_r2 = *min_r2
                );
                return Err(FleetError::QualityGateRejected {
                    model: model.name.clone(),
                    r2: model.report.r2,
                    min_r2: *min_r2,
                });
            }
            GateDecision::NotConfigured => {
                warn!(
                    ev = "train.gate_unset",
                    model = %model.name,
                    r2 = model.report.r2,
                    "no quality threshold configured; persisting"
                );
            }
            GateDecision::Accepted { .. } => {}
        }
    }

    for model in &run.models {
        repo.put(&ArtifactEnvelope::for_estimator(
            &model.name,
            run.feature_names.clone(),
            &model.estimator,
        )?)?;
    }
    repo.put(&ArtifactEnvelope::for_scaler(&run.scaler_name, &run.scaler)?)?;

    Ok(decisions)
}

/// Full pipeline: derive, fit, gate and persist, returning the summary.
pub fn run_pipeline(
    kind: PipelineKind,
    table: &TelemetryTable,
    params: &TrainParams,
    gate: &QualityGate,
    repo: &dyn ArtifactRepo,
) -> FleetResult<TrainingReport> {
    let start = time::now_ms();
    let run = train(kind, table, params)?;
    let decisions = persist(&run, gate, repo)?;

    let mut persisted: Vec<String> = run.models.iter().map(|m| m.name.clone()).collect();
    persisted.push(run.scaler_name.clone());

    let report = TrainingReport {
        pipeline: run.pipeline,
        rows: run.n_rows,
        n_train: run.n_train,
        n_test: run.n_rows - run.n_train,
        scaler: run.scaler_name.clone(),
        models: run
            .models
            .iter()
            .zip(decisions)
            .map(|(m, gate)| ModelSummary {
                name: m.name.clone(),
                target: m.target,
                kind: m.estimator.kind(),
                metrics: m.report,
                gate,
            })
            .collect(),
        persisted,
        dur_ms: time::elapsed_ms(start) as u64,
    };

    info!(
        ev = "train.done",
        pipeline = kind.as_str(),
        rows = report.rows,
        artifacts = report.persisted.len(),
        dur_ms = report.dur_ms
    );
    Ok(report)
}
