//! Feature containers and the structured inputs the UI layer supplies.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::common::error::{FleetError, FleetResult};

/// Fixed-order numeric vector tagged with the names of its positions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(names: Vec<String>, values: Vec<f64>) -> FleetResult<Self> {
        if names.len() != values.len() {
            return Err(FleetError::DimensionMismatch {
                context: "feature vector",
                expected: names.len(),
                actual: values.len(),
            });
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at the named position, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }
}

/// Named `[rows, cols]` matrix used on the training side.
///
/// Always held in standard (row-major) layout, so rows are contiguous slices.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    data: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, rows: usize, data: Vec<f64>) -> FleetResult<Self> {
        if data.len() != rows * names.len() {
            return Err(FleetError::DimensionMismatch {
                context: "feature matrix",
                expected: rows * names.len(),
                actual: data.len(),
            });
        }
        let data = Array2::from_shape_vec((rows, names.len()), data)
            .map_err(|err| FleetError::invalid(format!("feature matrix shape: {err}")))?;
        Ok(Self { names, data })
    }

    /// Build from per-row slices; every row must have `names.len()` entries.
    pub fn from_rows(names: Vec<String>, rows: &[Vec<f64>]) -> FleetResult<Self> {
        let cols = names.len();
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(FleetError::DimensionMismatch {
                    context: "feature matrix row",
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::new(names, rows.len(), data)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        self.data.row(row).to_slice().unwrap_or_default()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data
            .outer_iter()
            .map(|row| row.to_slice().unwrap_or_default())
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Copy of the listed rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            data: self.data.select(Axis(0), indices),
        }
    }
}

/// Anything that can answer "what is the value of feature `name`".
pub trait FeatureSource {
    fn feature(&self, name: &str) -> Option<f64>;
}

impl FeatureSource for BTreeMap<String, f64> {
    fn feature(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl FeatureSource for HashMap<String, f64> {
    fn feature(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// Inputs for the trip-feasibility model as collected by the UI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TripFeatures {
    pub start_soc: Option<f64>,
    pub route_distance_km: Option<f64>,
    pub avg_speed_kmph: Option<f64>,
    pub passenger_load: Option<f64>,
}

impl TripFeatures {
    /// Fully populated input.
    pub fn new(start_soc: f64, route_distance_km: f64, avg_speed_kmph: f64, passenger_load: f64) -> Self {
        Self {
            start_soc: Some(start_soc),
            route_distance_km: Some(route_distance_km),
            avg_speed_kmph: Some(avg_speed_kmph),
            passenger_load: Some(passenger_load),
        }
    }
}

impl FeatureSource for TripFeatures {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "start_soc" => self.start_soc,
            "route_distance_km" => self.route_distance_km,
            "avg_speed_kmph" => self.avg_speed_kmph,
            "passenger_load" => self.passenger_load,
            _ => None,
        }
    }
}

/// Inputs for the state-of-health model as collected by the UI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SohFeatures {
    pub battery_cycles: Option<f64>,
    pub avg_depth_of_discharge: Option<f64>,
    pub temperature_variance: Option<f64>,
}

impl SohFeatures {
    pub fn new(battery_cycles: f64, avg_depth_of_discharge: f64, temperature_variance: f64) -> Self {
        Self {
            battery_cycles: Some(battery_cycles),
            avg_depth_of_discharge: Some(avg_depth_of_discharge),
            temperature_variance: Some(temperature_variance),
        }
    }
}

impl FeatureSource for SohFeatures {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "battery_cycles" => self.battery_cycles,
            "avg_depth_of_discharge" => self.avg_depth_of_discharge,
            "temperature_variance" => self.temperature_variance,
            _ => None,
        }
    }
}

/// Engineered battery features, in the shape the SOH model was trained on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SohForecastFeatures {
    pub cycle_count: Option<f64>,
    pub internal_resistance: Option<f64>,
    pub resistance_growth: Option<f64>,
    pub thermal_avg_50: Option<f64>,
}

impl SohForecastFeatures {
    pub fn new(cycle_count: f64, internal_resistance: f64, resistance_growth: f64, thermal_avg_50: f64) -> Self {
        Self {
            cycle_count: Some(cycle_count),
            internal_resistance: Some(internal_resistance),
            resistance_growth: Some(resistance_growth),
            thermal_avg_50: Some(thermal_avg_50),
        }
    }
}

impl FeatureSource for SohForecastFeatures {
    fn feature(&self, name: &str) -> Option<f64> {
        match name {
            "cycle_count" => self.cycle_count,
            "internal_resistance" => self.internal_resistance,
            "resistance_growth" => self.resistance_growth,
            "thermal_avg_50" => self.thermal_avg_50,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matrix_rows_and_selection() {
        let m = FeatureMatrix::from_rows(
            names(&["a", "b"]),
            &[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
        )
        .expect("valid rows");
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.rows().count(), 3);

        let picked = m.select_rows(&[2, 0]);
        assert_eq!(picked.row(0), &[5.0, 6.0]);
        assert_eq!(picked.row(1), &[1.0, 2.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = FeatureMatrix::from_rows(names(&["a", "b"]), &[vec![1.0]]).unwrap_err();
        assert!(matches!(err, FleetError::DimensionMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn structured_inputs_answer_by_name() {
        let trip = TripFeatures {
            start_soc: Some(80.0),
            ..Default::default()
        };
        assert_eq!(trip.feature("start_soc"), Some(80.0));
        assert_eq!(trip.feature("route_distance_km"), None);
        assert_eq!(trip.feature("unknown"), None);

        let soh = SohFeatures::new(120.0, 13.0, 4.0);
        assert_eq!(soh.feature("avg_depth_of_discharge"), Some(13.0));
    }
}
