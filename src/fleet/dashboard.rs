//! Fleet dashboard KPIs from the latest telemetry row of every bus.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::common::error::FleetResult;
use crate::common::time;
use crate::data::domain::{group_rows, TelemetryTable};
use crate::inference::domain::round_to;

pub const DASHBOARD_COLUMNS: [&str; 5] = ["bus_id", "timestamp", "SOC", "SOH", "terminal_voltage"];

pub const MIN_HEALTHY_SOH: f64 = 0.7;
pub const MIN_READY_SOC_PCT: f64 = 20.0;
pub const KWH_PER_KM: f64 = 1.2;
pub const CO2_SAVED_KG_PER_KM: f64 = 0.8;
pub const HISTORY_POINTS: usize = 12;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeBand {
    Critical,
    Mediocre,
    Good,
}

impl ChargeBand {
    pub fn from_soc_pct(soc_pct: f64) -> Self {
        if soc_pct < 25.0 {
            ChargeBand::Critical
        } else if soc_pct < 50.0 {
            ChargeBand::Mediocre
        } else {
            ChargeBand::Good
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Critical,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alert {
    pub bus_id: String,
    pub issue: String,
    pub level: AlertLevel,
}

/// Latest reading of one bus.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BusSnapshot {
    pub bus_id: String,
    pub timestamp: NaiveDateTime,
    pub soc_pct: f64,
    pub soh: f64,
    pub energy: f64,
    pub charge_band: ChargeBand,
    pub ready: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub charging: usize,
    pub idle: usize,
    pub critical: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnergyPoint {
    pub timestamp: String,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub avg_soc: f64,
    pub avg_soh: f64,
    pub total_energy: f64,
    pub co2_savings: f64,
    pub fleet_readiness: u32,
    pub status_counts: StatusCounts,
    pub alerts: Vec<Alert>,
    pub buses: Vec<BusSnapshot>,
    pub energy_history: Vec<EnergyPoint>,
}

struct Reading {
    row: usize,
    timestamp: NaiveDateTime,
}

fn value_or_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

fn readings(table: &TelemetryTable) -> FleetResult<Vec<Option<NaiveDateTime>>> {
    let stamps = table.keys("timestamp")?;
    let parsed: Vec<Option<NaiveDateTime>> = stamps.iter().map(|s| time::parse_timestamp(s)).collect();
    let skipped = parsed.iter().filter(|p| p.is_none()).count();
    if skipped > 0 {
        debug!(ev = "dashboard.bad_timestamps", skipped);
    }
    Ok(parsed)
}

/// Most recent row per bus; equal timestamps resolve to the later row.
pub fn latest_per_bus(table: &TelemetryTable) -> FleetResult<Vec<BusSnapshot>> {
    table.require(&DASHBOARD_COLUMNS)?;
    let stamps = readings(table)?;
    let soc = table.numeric("SOC")?;
    let soh = table.numeric("SOH")?;
    let energy = table.numeric("terminal_voltage")?;

    let mut buses = Vec::new();
    for (bus_id, rows) in group_rows(&table.keys("bus_id")?) {
        let latest = rows
            .iter()
            .filter_map(|&row| stamps[row].map(|timestamp| Reading { row, timestamp }))
            .reduce(|best, next| if next.timestamp >= best.timestamp { next } else { best });
        let Some(Reading { row, timestamp }) = latest else {
            continue;
        };

        let soc_pct = value_or_zero(soc[row]) * 100.0;
        let soh = value_or_zero(soh[row]);
        buses.push(BusSnapshot {
            bus_id,
            timestamp,
            soc_pct,
            soh,
            energy: value_or_zero(energy[row]),
            charge_band: ChargeBand::from_soc_pct(soc_pct),
            ready: soh >= MIN_HEALTHY_SOH && soc_pct >= MIN_READY_SOC_PCT,
        });
    }
    Ok(buses)
}

fn alert_for(bus: &BusSnapshot) -> Alert {
    if bus.soh < MIN_HEALTHY_SOH {
        Alert {
            bus_id: bus.bus_id.clone(),
            issue: format!("Battery Degradation ({:.0}% SOH)", (bus.soh * 100.0).round()),
            level: AlertLevel::Critical,
        }
    } else {
        Alert {
            bus_id: bus.bus_id.clone(),
            issue: format!("Low Charge ({:.1}% SOC)", bus.soc_pct),
            level: AlertLevel::Warning,
        }
    }
}

/// The last `HISTORY_POINTS` readings in time order, labelled `HH:MM`.
fn energy_history(table: &TelemetryTable, stamps: &[Option<NaiveDateTime>]) -> FleetResult<Vec<EnergyPoint>> {
    let energy = table.numeric("terminal_voltage")?;
    let mut dated: Vec<(NaiveDateTime, usize)> = stamps
        .iter()
        .enumerate()
        .filter_map(|(row, ts)| ts.map(|ts| (ts, row)))
        .collect();
    dated.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let skip = dated.len().saturating_sub(HISTORY_POINTS);
    Ok(dated[skip..]
        .iter()
        .map(|(ts, row)| EnergyPoint {
            timestamp: ts.format("%H:%M").to_string(),
            value: round_to(value_or_zero(energy[*row]), 2),
        })
        .collect())
}

pub fn dashboard_metrics(table: &TelemetryTable) -> FleetResult<DashboardMetrics> {
    let buses = latest_per_bus(table)?;
    let stamps = readings(table)?;
    let mut metrics = DashboardMetrics {
        energy_history: energy_history(table, &stamps)?,
        ..DashboardMetrics::default()
    };
    if buses.is_empty() {
        return Ok(metrics);
    }

    let n = buses.len() as f64;
    let mut soc_total = 0.0;
    let mut soh_total = 0.0;
    let mut energy_total = 0.0;
    let mut ready = 0usize;

    for bus in &buses {
        soc_total += bus.soc_pct;
        soh_total += bus.soh;
        energy_total += bus.energy;
        if bus.ready {
            ready += 1;
            metrics.status_counts.active += 1;
        } else {
            metrics.status_counts.critical += 1;
            metrics.alerts.push(alert_for(bus));
        }
    }

    metrics.avg_soc = round_to(soc_total / n, 1);
    metrics.avg_soh = round_to(soh_total / n * 100.0, 1);
    metrics.total_energy = round_to(energy_total, 2);
    metrics.co2_savings = round_to(energy_total / KWH_PER_KM * CO2_SAVED_KG_PER_KM, 2);
    metrics.fleet_readiness = (ready as f64 / n * 100.0).trunc() as u32;
    metrics.buses = buses;
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::repo_fs::read_table;

    const CSV: &str = "bus_id,timestamp,SOC,SOH,terminal_voltage\n\
        BUS-1,2024-03-05 08:00:00,0.90,0.95,300\n\
        BUS-1,2024-03-05 09:30:00,0.80,0.95,310\n\
        BUS-2,2024-03-05 09:00:00,0.10,0.90,290\n\
        BUS-3,2024-03-05 07:00:00,0.60,0.65,305\n\
        BUS-3,not-a-time,0.99,0.99,999\n";

    #[test]
    fn picks_the_latest_row_per_bus() {
        let table = read_table(CSV.as_bytes()).expect("csv");
        let buses = latest_per_bus(&table).expect("buses");
        assert_eq!(buses.len(), 3);
        assert_eq!(buses[0].bus_id, "BUS-1");
        assert_eq!(buses[0].energy, 310.0);
        assert_eq!(buses[0].charge_band, ChargeBand::Good);
        assert!(buses[0].ready);
        assert_eq!(buses[1].charge_band, ChargeBand::Critical);
        assert!(!buses[1].ready);
        // The unparsable row never wins.
        assert_eq!(buses[2].energy, 305.0);
    }

    #[test]
    fn kpis_and_alerts() {
        let table = read_table(CSV.as_bytes()).expect("csv");
        let m = dashboard_metrics(&table).expect("metrics");

        assert_eq!(m.avg_soc, 50.0);
        assert_eq!(m.avg_soh, 83.3);
        assert_eq!(m.total_energy, 905.0);
        assert_eq!(m.co2_savings, 603.33);
        assert_eq!(m.fleet_readiness, 33);
        assert_eq!(m.status_counts.active, 1);
        assert_eq!(m.status_counts.critical, 2);

        assert_eq!(m.alerts.len(), 2);
        assert_eq!(m.alerts[0].issue, "Low Charge (10.0% SOC)");
        assert_eq!(m.alerts[0].level, AlertLevel::Warning);
        assert_eq!(m.alerts[1].issue, "Battery Degradation (65% SOH)");
        assert_eq!(m.alerts[1].level, AlertLevel::Critical);

        let labels: Vec<&str> = m.energy_history.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(labels, vec!["07:00", "08:00", "09:00", "09:30"]);
    }

    #[test]
    fn charge_bands() {
        assert_eq!(ChargeBand::from_soc_pct(24.9), ChargeBand::Critical);
        assert_eq!(ChargeBand::from_soc_pct(25.0), ChargeBand::Mediocre);
        assert_eq!(ChargeBand::from_soc_pct(50.0), ChargeBand::Good);
    }

    #[test]
    fn empty_fleet_reports_zeroes() {
        let table = read_table("bus_id,timestamp,SOC,SOH,terminal_voltage\n".as_bytes()).expect("csv");
        let m = dashboard_metrics(&table).expect("metrics");
        assert_eq!(m.fleet_readiness, 0);
        assert!(m.buses.is_empty());
    }
}
