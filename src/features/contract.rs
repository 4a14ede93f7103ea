//! Ordered feature contracts.
//!
//! A contract lists the K named inputs a caller must supply and the width L of
//! the vector the estimator consumes. When `K < L` the trailing `L - K` slots
//! are zero-filled. That padding is an approximation, not imputation: it lets a
//! model trained on L engineered columns accept the K raw values a UI collects,
//! at the cost of prediction fidelity.

use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};

use super::domain::{FeatureMatrix, FeatureSource, FeatureVector};

pub const TRIP_FEATURES: [&str; 4] = [
    "start_soc",
    "route_distance_km",
    "avg_speed_kmph",
    "passenger_load",
];

pub const SOH_UI_FEATURES: [&str; 3] = [
    "battery_cycles",
    "avg_depth_of_discharge",
    "temperature_variance",
];

pub const SOH_FORECAST_FEATURES: [&str; 4] = [
    "cycle_count",
    "internal_resistance",
    "resistance_growth",
    "thermal_avg_50",
];

/// Charging-telemetry columns in model order. Do not reorder.
pub const CHARGING_FEATURES: [&str; 20] = [
    "terminal_voltage",
    "battery_current",
    "battery_temp",
    "ambient_temp",
    "internal_resistance",
    "action_current",
    "action_voltage",
    "dT_dt",
    "dV_dt",
    "soc_delta",
    "thermal_stress_index",
    "aging_indicator",
    "charging_efficiency",
    "charging_time",
    "cycle_degradation",
    "over_temp_flag",
    "over_voltage_flag",
    "balancing_time",
    "hour",
    "dayofweek",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureContract {
    name: String,
    features: Vec<String>,
    width: usize,
}

impl FeatureContract {
    /// Contract whose width equals the number of named features.
    pub fn new(name: impl Into<String>, features: &[&str]) -> Self {
        Self {
            name: name.into(),
            features: features.iter().map(|f| f.to_string()).collect(),
            width: features.len(),
        }
    }

    pub fn trip() -> Self {
        Self::new("trip", &TRIP_FEATURES)
    }

    pub fn soh_ui() -> Self {
        Self::new("soh_ui", &SOH_UI_FEATURES)
    }

    pub fn soh_forecast() -> Self {
        Self::new("soh_forecast", &SOH_FORECAST_FEATURES)
    }

    pub fn charging() -> Self {
        Self::new("charging", &CHARGING_FEATURES)
    }

    /// Same named inputs, zero-padded up to `width` positions.
    pub fn padded(mut self, width: usize) -> FleetResult<Self> {
        if width < self.features.len() {
            return Err(FleetError::DimensionMismatch {
                context: "feature contract padding",
                expected: self.features.len(),
                actual: width,
            });
        }
        self.width = width;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn padding(&self) -> usize {
        self.width - self.features.len()
    }

    /// Position names of the assembled vector; padded slots are `pad_<i>`.
    pub fn slot_names(&self) -> Vec<String> {
        let mut names = self.features.clone();
        names.extend((self.features.len()..self.width).map(|i| format!("pad_{i}")));
        names
    }

    /// Build the fixed-order vector, naming every absent input on failure.
    pub fn assemble(&self, source: &dyn FeatureSource) -> FleetResult<FeatureVector> {
        let mut values = Vec::with_capacity(self.width);
        let mut missing = Vec::new();

        for name in &self.features {
            match source.feature(name) {
                Some(value) => values.push(value),
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(FleetError::MissingFeature {
                contract: self.name.clone(),
                missing,
            });
        }

        values.resize(self.width, 0.0);
        FeatureVector::new(self.slot_names(), values)
    }

    /// Assemble a training matrix from per-row sources.
    pub fn assemble_rows<S: FeatureSource>(&self, rows: &[S]) -> FleetResult<FeatureMatrix> {
        let mut data = Vec::with_capacity(rows.len() * self.width);
        for row in rows {
            let vector = self.assemble(row)?;
            data.extend_from_slice(vector.values());
        }
        FeatureMatrix::new(self.slot_names(), rows.len(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::domain::TripFeatures;
    use std::collections::BTreeMap;

    #[test]
    fn assembles_in_contract_order() {
        let mut input = BTreeMap::new();
        input.insert("passenger_load".to_string(), 20.0);
        input.insert("avg_speed_kmph".to_string(), 55.0);
        input.insert("route_distance_km".to_string(), 40.0);
        input.insert("start_soc".to_string(), 95.0);
        input.insert("weather_bias".to_string(), 7.0);

        let vector = FeatureContract::trip().assemble(&input).expect("complete input");
        assert_eq!(vector.values(), &[95.0, 40.0, 55.0, 20.0]);
        assert_eq!(vector.get("weather_bias"), None);
    }

    #[test]
    fn every_missing_key_is_reported() {
        let input = TripFeatures {
            avg_speed_kmph: Some(55.0),
            ..Default::default()
        };
        let err = FeatureContract::trip().assemble(&input).unwrap_err();
        match err {
            FleetError::MissingFeature { contract, missing } => {
                assert_eq!(contract, "trip");
                assert_eq!(missing, vec!["start_soc", "route_distance_km", "passenger_load"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn padding_fills_trailing_slots_with_zero() {
        let contract = FeatureContract::trip().padded(20).expect("wider");
        assert_eq!(contract.padding(), 16);

        let vector = contract
            .assemble(&TripFeatures::new(95.0, 40.0, 55.0, 20.0))
            .expect("complete input");
        assert_eq!(vector.len(), 20);
        assert_eq!(&vector.values()[..4], &[95.0, 40.0, 55.0, 20.0]);
        assert!(vector.values()[4..].iter().all(|v| *v == 0.0));
        assert_eq!(vector.names()[4], "pad_4");
    }

    #[test]
    fn cannot_pad_below_named_inputs() {
        let err = FeatureContract::charging().padded(4).unwrap_err();
        assert!(matches!(err, FleetError::DimensionMismatch { expected: 20, actual: 4, .. }));
    }
}
