//! Turns a dispatcher's trip request into model inputs and a trip plan.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::error::{FleetError, FleetResult};
use crate::common::time;
use crate::features::{SohFeatures, TripFeatures};

use super::domain::{CurvePoint, PredictionSource, RiskLevel};
use super::service::InferenceEngine;

pub const DEFAULT_BUS_ID: &str = "EV-COMMANDER-01";
pub const DEFAULT_START_SOC: f64 = 95.0;
pub const ROUTE_DISTANCE_KM: f64 = 45.0;
pub const CRUISE_SPEED_KMPH: f64 = 55.0;
pub const ADVERSE_SPEED_KMPH: f64 = 42.0;
pub const SIMULATED_CYCLES: f64 = 120.0;

const ADVERSE_WEATHER: [&str; 5] = ["hot", "cold", "extreme heat", "extreme cold", "rainy"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    pub route_id: String,
    pub passenger_load: f64,
    pub weather: String,
    #[serde(default = "default_start_soc")]
    pub current_soc: f64,
    #[serde(default)]
    pub bus_id: Option<String>,
}

fn default_start_soc() -> f64 {
    DEFAULT_START_SOC
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripPlan {
    pub bus_id: String,
    pub route_id: String,
    pub weather: String,
    pub route_distance_km: f64,
    pub avg_speed_kmph: f64,
    pub energy_consumed_pct: f64,
    pub predicted_end_soc: f64,
    pub predicted_soh: f64,
    pub risk_level: RiskLevel,
    pub recommended_speed: u32,
    pub energy_curve: Vec<CurvePoint>,
    pub trip_source: PredictionSource,
    pub soh_source: PredictionSource,
    pub timestamp: String,
}

/// Request with its defaults applied and its bounds checked.
#[derive(Clone, Debug, PartialEq)]
struct ValidRequest {
    route_id: String,
    passenger_load: f64,
    weather: String,
    current_soc: f64,
    bus_id: String,
}

impl TripRequest {
    fn validate(&self) -> FleetResult<ValidRequest> {
        let route_id = self.route_id.trim();
        let weather = self.weather.trim().to_lowercase();
        if route_id.is_empty() {
            return Err(FleetError::invalid("route_id is required"));
        }
        if weather.is_empty() {
            return Err(FleetError::invalid("weather is required"));
        }
        if !(0.0..=100.0).contains(&self.passenger_load) {
            return Err(FleetError::invalid("passenger_load must be between 0 and 100"));
        }
        if !(0.0..=100.0).contains(&self.current_soc) {
            return Err(FleetError::invalid("current_soc must be between 0 and 100"));
        }

        let bus_id = match self.bus_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => DEFAULT_BUS_ID.to_string(),
        };

        Ok(ValidRequest {
            route_id: route_id.to_string(),
            passenger_load: self.passenger_load,
            weather,
            current_soc: self.current_soc,
            bus_id,
        })
    }
}

pub fn is_adverse(weather: &str) -> bool {
    ADVERSE_WEATHER.contains(&weather)
}

pub fn cruise_speed(weather: &str) -> f64 {
    if is_adverse(weather) {
        ADVERSE_SPEED_KMPH
    } else {
        CRUISE_SPEED_KMPH
    }
}

pub fn temperature_variance(weather: &str) -> f64 {
    if weather == "normal" {
        4.0
    } else {
        12.0
    }
}

pub fn recommended_speed(risk: RiskLevel) -> u32 {
    if risk == RiskLevel::Critical {
        40
    } else {
        60
    }
}

/// Run both models for one dispatch request.
pub fn plan_trip(engine: &InferenceEngine, request: &TripRequest) -> FleetResult<TripPlan> {
    let req = request.validate()?;
    let speed = cruise_speed(&req.weather);

    let trip = engine.predict_trip_feasibility(&TripFeatures::new(
        req.current_soc,
        ROUTE_DISTANCE_KM,
        speed,
        req.passenger_load,
    ))?;

    let depth_of_discharge = req.current_soc - trip.predicted_end_soc;
    let soh = engine.predict_soh(&SohFeatures::new(
        SIMULATED_CYCLES,
        depth_of_discharge,
        temperature_variance(&req.weather),
    ))?;

    info!(
        ev = "plan.trip",
        bus_id = %req.bus_id,
        route_id = %req.route_id,
        risk = trip.risk_level.as_str(),
        end_soc = trip.predicted_end_soc,
        fallback = trip.source.is_fallback() || soh.source.is_fallback()
    );

    Ok(TripPlan {
        bus_id: req.bus_id,
        route_id: req.route_id,
        weather: req.weather,
        route_distance_km: ROUTE_DISTANCE_KM,
        avg_speed_kmph: speed,
        energy_consumed_pct: trip.energy_consumed_pct,
        predicted_end_soc: trip.predicted_end_soc,
        predicted_soh: soh.predicted_soh,
        risk_level: trip.risk_level,
        recommended_speed: recommended_speed(trip.risk_level),
        energy_curve: trip.energy_curve,
        trip_source: trip.source,
        soh_source: soh.source,
        timestamp: time::now_rfc3339(),
    })
}
