//! Derivation of per-pipeline training sets from raw telemetry tables.

use chrono::{Datelike, Timelike};
use tracing::{debug, info};

use crate::common::error::{FleetError, FleetResult};
use crate::common::time;
use crate::features::{FeatureContract, FeatureMatrix, TripFeatures};

use super::domain::{group_rows, ChargingSet, TelemetryTable, TrainingSet};

pub const TRIP_COLUMNS: [&str; 5] = ["trip_id", "SOC", "distance_km", "speed_kmph", "passenger_count"];

pub const SOH_COLUMNS: [&str; 5] = [
    "battery_id",
    "cycle_count",
    "internal_resistance",
    "thermal_stress_index",
    "SOH",
];

/// Raw charging-telemetry columns; `hour` and `dayofweek` are derived.
pub const CHARGING_RAW_COLUMNS: [&str; 18] = [
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
];

const THERMAL_WINDOW: usize = 50;

/// One row per trip: start SOC, route distance, mean speed and load, with
/// `energy_consumed_pct = first SOC - last SOC` as the target.
pub fn build_trip_dataset(table: &TelemetryTable) -> FleetResult<TrainingSet> {
    table.require(&TRIP_COLUMNS)?;

    let soc = table.numeric("SOC")?;
    let distance = table.numeric("distance_km")?;
    let speed = table.numeric("speed_kmph")?;
    let passengers = table.numeric("passenger_count")?;

    let groups = group_rows(&table.keys("trip_id")?);
    let mut features = Vec::with_capacity(groups.len());
    let mut targets = Vec::with_capacity(groups.len());

    for (_, rows) in &groups {
        let first = rows.iter().map(|&r| soc[r]).find(|v| !v.is_nan());
        let last = rows.iter().rev().map(|&r| soc[r]).find(|v| !v.is_nan());
        let (Some(first), Some(last)) = (first, last) else {
            continue;
        };
        let max_distance = rows
            .iter()
            .map(|&r| distance[r])
            .filter(|v| !v.is_nan())
            .fold(f64::NAN, f64::max);
        let row = TripFeatures::new(
            first,
            max_distance,
            nan_mean(rows.iter().map(|&r| speed[r])),
            nan_mean(rows.iter().map(|&r| passengers[r])),
        );
        if [row.start_soc, row.route_distance_km, row.avg_speed_kmph, row.passenger_load]
            .iter()
            .any(|v| v.map_or(true, f64::is_nan))
        {
            continue;
        }
        features.push(row);
        targets.push(first - last);
    }

    if features.is_empty() {
        return Err(FleetError::invalid("no complete trips in telemetry"));
    }

    info!(
        ev = "data.trip_dataset",
        raw_rows = table.n_rows(),
        trips = features.len(),
        dropped = groups.len() - features.len()
    );

    Ok(TrainingSet {
        x: FeatureContract::trip().assemble_rows(&features)?,
        y: targets,
    })
}

/// Battery-history rows with resistance growth and a trailing thermal mean.
pub fn build_soh_dataset(table: &TelemetryTable) -> FleetResult<TrainingSet> {
    table.require(&SOH_COLUMNS)?;

    let cycles = table.numeric("cycle_count")?;
    let resistance = table.numeric("internal_resistance")?;
    let thermal = table.numeric("thermal_stress_index")?;
    let soh = table.numeric("SOH")?;

    let contract = FeatureContract::soh_forecast();
    let mut rows = Vec::new();
    let mut targets = Vec::new();

    for (_, mut members) in group_rows(&table.keys("battery_id")?) {
        members.sort_by(|&a, &b| cycles[a].total_cmp(&cycles[b]));

        for (pos, &r) in members.iter().enumerate() {
            let growth = if pos == 0 {
                0.0
            } else {
                let diff = resistance[r] - resistance[members[pos - 1]];
                if diff.is_nan() {
                    0.0
                } else {
                    diff
                }
            };
            let thermal_avg = trailing_mean(&members[..=pos], thermal).unwrap_or(thermal[r]);

            let features = [cycles[r], resistance[r], growth, thermal_avg];
            if features.iter().any(|v| v.is_nan()) || soh[r].is_nan() {
                continue;
            }
            rows.push(features.to_vec());
            targets.push(soh[r]);
        }
    }

    if rows.is_empty() {
        return Err(FleetError::invalid("no complete battery history rows"));
    }

    info!(
        ev = "data.soh_dataset",
        raw_rows = table.n_rows(),
        rows = rows.len()
    );

    Ok(TrainingSet {
        x: FeatureMatrix::from_rows(contract.slot_names(), &rows)?,
        y: targets,
    })
}

/// Deduplicated, gap-filled charging telemetry with calendar features.
pub fn build_charging_dataset(table: &TelemetryTable) -> FleetResult<ChargingSet> {
    let mut required: Vec<&str> = CHARGING_RAW_COLUMNS.to_vec();
    required.extend(["timestamp", "SOC", "SOH"]);
    table.require(&required)?;

    let mut table = table.drop_duplicates();
    table.fill_gaps();

    let mut hours = Vec::with_capacity(table.n_rows());
    let mut weekdays = Vec::with_capacity(table.n_rows());
    for (row, raw) in table.keys("timestamp")?.iter().enumerate() {
        let ts = time::parse_timestamp(raw).ok_or_else(|| {
            FleetError::invalid(format!("row {}: unparsable timestamp '{raw}'", row + 1))
        })?;
        hours.push(f64::from(ts.hour()));
        weekdays.push(f64::from(ts.weekday().num_days_from_monday()));
    }

    let raw: Vec<&[f64]> = CHARGING_RAW_COLUMNS
        .iter()
        .map(|name| table.numeric(name))
        .collect::<FleetResult<_>>()?;
    let soc = table.numeric("SOC")?;
    let soh = table.numeric("SOH")?;

    let contract = FeatureContract::charging();
    let mut rows = Vec::with_capacity(table.n_rows());
    let mut soc_targets = Vec::with_capacity(table.n_rows());
    let mut soh_targets = Vec::with_capacity(table.n_rows());

    for r in 0..table.n_rows() {
        let mut features: Vec<f64> = raw.iter().map(|col| col[r]).collect();
        features.push(hours[r]);
        features.push(weekdays[r]);
        if features.iter().any(|v| v.is_nan()) || soc[r].is_nan() || soh[r].is_nan() {
            continue;
        }
        rows.push(features);
        soc_targets.push(soc[r]);
        soh_targets.push(soh[r]);
    }

    if rows.is_empty() {
        return Err(FleetError::invalid("no complete charging telemetry rows"));
    }
    if rows.len() < table.n_rows() {
        debug!(
            ev = "data.charging_dropped",
            dropped = table.n_rows() - rows.len()
        );
    }

    info!(
        ev = "data.charging_dataset",
        rows = rows.len(),
        cols = contract.width()
    );

    Ok(ChargingSet {
        x: FeatureMatrix::from_rows(contract.slot_names(), &rows)?,
        soc: soc_targets,
        soh: soh_targets,
    })
}

fn nan_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Mean of the last `THERMAL_WINDOW` rows of `history`, or `None` while the
/// window is short or holds a missing value.
fn trailing_mean(history: &[usize], values: &[f64]) -> Option<f64> {
    if history.len() < THERMAL_WINDOW {
        return None;
    }
    let window = &history[history.len() - THERMAL_WINDOW..];
    let mut sum = 0.0;
    for &r in window {
        if values[r].is_nan() {
            return None;
        }
        sum += values[r];
    }
    Some(sum / THERMAL_WINDOW as f64)
}
