//! Online inference over the persisted trip and SOH models.
//!
//! The engine is built once, holds only immutable state and is shared across
//! callers without locking. Contract and shape errors reach the caller;
//! estimator faults are replaced by fixed fallbacks and logged at warn.

use tracing::{debug, warn};

use crate::common::config::ArtifactNames;
use crate::common::error::{FleetError, FleetResult};
use crate::common::time;
use crate::features::{
    FeatureContract, FeatureSource, FeatureVector, SohFeatures, SohForecastFeatures, TripFeatures,
};
use crate::models::Regressor;
use crate::preprocessing::StandardScaler;
use crate::training::ArtifactRepo;

use super::domain::{round_to, CurvePoint, PredictionSource, RiskLevel, SohForecast, TripFeasibility};

pub const ENERGY_MIN_PCT: f64 = 2.0;
pub const ENERGY_MAX_PCT: f64 = 100.0;
pub const FALLBACK_KWH_PER_KM: f64 = 0.3;
pub const FALLBACK_PER_PASSENGER: f64 = 0.05;
pub const FALLBACK_SOH: f64 = 98.2;
pub const CURVE_STEPS: usize = 10;

/// Estimator plus optional scaler, with the contract padded to the estimator width.
struct ModelSlot {
    name: String,
    contract: FeatureContract,
    estimator: Box<dyn Regressor>,
    scaler: Option<StandardScaler>,
}

impl ModelSlot {
    fn new(
        name: &str,
        contract: FeatureContract,
        estimator: Box<dyn Regressor>,
        scaler: Option<StandardScaler>,
    ) -> FleetResult<Self> {
        let contract = contract.padded(estimator.n_features())?;
        match &scaler {
            Some(s) if s.n_features() != contract.width() => warn!(
                ev = "infer.scaler_width",
                model = name,
                scaler_width = s.n_features(),
                model_width = contract.width(),
                "scaler does not match estimator; predictions will fail"
            ),
            None => warn!(ev = "infer.unscaled", model = name, "running without a scaler"),
            _ => {}
        }
        if contract.padding() > 0 {
            debug!(
                ev = "infer.padded",
                model = name,
                named = contract.features().len(),
                width = contract.width()
            );
        }
        Ok(Self {
            name: name.to_string(),
            contract,
            estimator,
            scaler,
        })
    }

    /// Assembled raw vector plus the (scaled) estimator input.
    fn prepare(&self, source: &dyn FeatureSource) -> FleetResult<(FeatureVector, Vec<f64>)> {
        self.prepare_with(&self.contract, source)
    }

    fn prepare_with(
        &self,
        contract: &FeatureContract,
        source: &dyn FeatureSource,
    ) -> FleetResult<(FeatureVector, Vec<f64>)> {
        let raw = contract.assemble(source)?;
        if let Some(name) = raw
            .names()
            .iter()
            .zip(raw.values())
            .find_map(|(n, v)| (!v.is_finite()).then_some(n))
        {
            return Err(FleetError::invalid(format!("feature '{name}' is not finite")));
        }
        let input = match &self.scaler {
            Some(scaler) => scaler.transform(raw.values())?,
            None => raw.values().to_vec(),
        };
        Ok((raw, input))
    }

    /// Raw estimator output; an error or non-finite value is a fault.
    fn estimate(&self, input: &[f64]) -> Result<f64, String> {
        match self.estimator.predict_one(input) {
            Ok(value) if value.is_finite() => Ok(value),
            Ok(value) => Err(format!("non-finite output {value}")),
            Err(err) => Err(err.to_string()),
        }
    }
}

/// Pieces for [`InferenceEngine::new`]; tests supply their own estimators.
pub struct EngineParts {
    pub trip_model: Box<dyn Regressor>,
    pub trip_scaler: Option<StandardScaler>,
    pub soh_model: Box<dyn Regressor>,
    pub soh_scaler: Option<StandardScaler>,
}

pub struct InferenceEngine {
    trip: ModelSlot,
    soh: ModelSlot,
    /// Engineered SOH inputs; absent when the SOH estimator is narrower.
    soh_forecast: Option<FeatureContract>,
}

impl InferenceEngine {
    pub fn new(parts: EngineParts) -> FleetResult<Self> {
        let trip = ModelSlot::new("trip", FeatureContract::trip(), parts.trip_model, parts.trip_scaler)?;
        let soh = ModelSlot::new("soh", FeatureContract::soh_ui(), parts.soh_model, parts.soh_scaler)?;
        Ok(Self::assemble(trip, soh))
    }

    fn assemble(trip: ModelSlot, soh: ModelSlot) -> Self {
        let soh_forecast = FeatureContract::soh_forecast()
            .padded(soh.estimator.n_features())
            .map_err(|err| debug!(ev = "infer.no_forecast_contract", model = %soh.name, error = %err))
            .ok();
        Self {
            trip,
            soh,
            soh_forecast,
        }
    }

    /// Load both estimators (fatal when absent) and their scalers (optional).
    pub fn load(store: &dyn ArtifactRepo, names: &ArtifactNames) -> FleetResult<Self> {
        let start = time::now_ms();
        let trip_model = load_estimator(store, &names.trip_model)?;
        let soh_model = load_estimator(store, &names.soh_model)?;

        let trip = ModelSlot::new(
            &names.trip_model,
            FeatureContract::trip(),
            trip_model,
            load_scaler(store, &names.trip_scaler),
        )?;
        let soh = ModelSlot::new(
            &names.soh_model,
            FeatureContract::soh_ui(),
            soh_model,
            load_scaler(store, &names.soh_scaler),
        )?;

        debug!(
            ev = "infer.loaded",
            trip_model = %names.trip_model,
            soh_model = %names.soh_model,
            dur_ms = time::elapsed_ms(start) as u64
        );
        Ok(Self::assemble(trip, soh))
    }

    pub fn trip_contract(&self) -> &FeatureContract {
        &self.trip.contract
    }

    pub fn soh_contract(&self) -> &FeatureContract {
        &self.soh.contract
    }

    pub fn predict_trip_feasibility(&self, input: &TripFeatures) -> FleetResult<TripFeasibility> {
        let (raw, x) = self.trip.prepare(input)?;
        // Present after a successful assemble.
        let start_soc = raw.get("start_soc").unwrap_or_default();
        let distance = raw.get("route_distance_km").unwrap_or_default();
        let load = raw.get("passenger_load").unwrap_or_default();

        let (energy, source) = match self.trip.estimate(&x) {
            Ok(value) => (value, PredictionSource::Model),
            Err(reason) => {
                warn!(ev = "infer.fallback", model = %self.trip.name, reason = %reason);
                let fallback = distance * FALLBACK_KWH_PER_KM + load * FALLBACK_PER_PASSENGER;
                (fallback, PredictionSource::Fallback { reason })
            }
        };
        let energy = clamp_energy(energy);
        let end_soc = (start_soc - energy).max(0.0);

        Ok(TripFeasibility {
            energy_consumed_pct: round_to(energy, 2),
            predicted_end_soc: round_to(end_soc, 2),
            energy_curve: energy_curve(start_soc, distance, energy),
            risk_level: RiskLevel::from_end_soc(end_soc),
            source,
        })
    }

    pub fn predict_soh(&self, input: &SohFeatures) -> FleetResult<SohForecast> {
        let (_, x) = self.soh.prepare(input)?;
        let (soh, source) = match self.soh.estimate(&x) {
            Ok(value) => (value, PredictionSource::Model),
            Err(reason) => {
                warn!(ev = "infer.fallback", model = %self.soh.name, reason = %reason);
                (FALLBACK_SOH, PredictionSource::Fallback { reason })
            }
        };
        Ok(SohForecast {
            predicted_soh: round_to(soh, 2),
            source,
        })
    }

    /// SOH model run on engineered battery features. The value is unrounded;
    /// a fault yields [`FALLBACK_SOH`] marked as a fallback.
    pub fn forecast_soh(&self, input: &SohForecastFeatures) -> FleetResult<SohForecast> {
        let contract = self.soh_forecast.as_ref().ok_or_else(|| FleetError::DimensionMismatch {
            context: "soh forecast contract",
            expected: FeatureContract::soh_forecast().width(),
            actual: self.soh.estimator.n_features(),
        })?;
        let (_, x) = self.soh.prepare_with(contract, input)?;
        let (soh, source) = match self.soh.estimate(&x) {
            Ok(value) => (value, PredictionSource::Model),
            Err(reason) => {
                warn!(ev = "infer.fallback", model = %self.soh.name, reason = %reason);
                (FALLBACK_SOH, PredictionSource::Fallback { reason })
            }
        };
        Ok(SohForecast {
            predicted_soh: soh,
            source,
        })
    }

    /// Stops at the first request whose error surfaces.
    pub fn predict_trip_batch(&self, inputs: &[TripFeatures]) -> FleetResult<Vec<TripFeasibility>> {
        inputs.iter().map(|input| self.predict_trip_feasibility(input)).collect()
    }
}

fn load_estimator(store: &dyn ArtifactRepo, name: &str) -> FleetResult<Box<dyn Regressor>> {
    match store.load_estimator(name) {
        Ok(estimator) => Ok(Box::new(estimator) as Box<dyn Regressor>),
        Err(err @ FleetError::ArtifactLoad { .. }) => Err(err),
        Err(other) => Err(FleetError::artifact(name, other)),
    }
}

fn load_scaler(store: &dyn ArtifactRepo, name: &str) -> Option<StandardScaler> {
    store
        .load_scaler(name)
        .map_err(|err| {
            warn!(
                ev = "infer.scaler_missing",
                scaler = name,
                code = err.code() as u32,
                error = %err
            );
        })
        .ok()
}

/// Clamp into the plausible range; NaN maps to the floor.
fn clamp_energy(energy: f64) -> f64 {
    if energy.is_nan() {
        return ENERGY_MIN_PCT;
    }
    energy.clamp(ENERGY_MIN_PCT, ENERGY_MAX_PCT)
}

fn energy_curve(start_soc: f64, distance: f64, energy: f64) -> Vec<CurvePoint> {
    (0..=CURVE_STEPS)
        .map(|i| {
            let frac = i as f64 / CURVE_STEPS as f64;
            CurvePoint {
                distance: round_to(distance * frac, 1),
                soc: round_to((start_soc - energy * frac).max(0.0), 2),
            }
        })
        .collect()
}
