//! Maintenance status and service scheduling from battery state of health.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::error::{FleetError, FleetResult};
use crate::features::SohForecastFeatures;
use crate::inference::domain::{round_to, PredictionSource};
use crate::inference::service::FALLBACK_SOH;
use crate::inference::InferenceEngine;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MaintenanceStatus {
    Healthy,
    Warning,
    Critical,
}

impl MaintenanceStatus {
    /// Status for a SOH percentage.
    pub fn from_soh_pct(soh_pct: f64) -> Self {
        if soh_pct < 60.0 {
            MaintenanceStatus::Critical
        } else if soh_pct < 80.0 {
            MaintenanceStatus::Warning
        } else {
            MaintenanceStatus::Healthy
        }
    }

    pub fn service_interval_days(&self) -> i64 {
        match self {
            MaintenanceStatus::Critical => 7,
            MaintenanceStatus::Warning => 30,
            MaintenanceStatus::Healthy => 90,
        }
    }

    pub fn needs_service(&self) -> bool {
        !matches!(self, MaintenanceStatus::Healthy)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub bus_id: String,
    pub current_soh: f64,
    pub degradation_score: f64,
    pub predicted_rul: i64,
    pub status: MaintenanceStatus,
    pub last_service: String,
    pub next_service: String,
    pub updated_at: String,
    /// Set when the SOH came from the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soh_source: Option<PredictionSource>,
}

/// Run the engine's SOH model on the battery features and build the record.
///
/// The model output is read as a fraction and clamped to [0, 1]. An estimator
/// fault falls back to [`FALLBACK_SOH`] percent and the record says so.
pub fn predict_maintenance(
    engine: &InferenceEngine,
    bus_id: &str,
    features: &SohForecastFeatures,
    last_service: Option<&str>,
    now: DateTime<Utc>,
) -> FleetResult<MaintenanceRecord> {
    let forecast = engine.forecast_soh(features)?;
    let soh = match forecast.source {
        PredictionSource::Model => forecast.predicted_soh,
        PredictionSource::Fallback { .. } => FALLBACK_SOH / 100.0,
    };
    debug!(
        ev = "fleet.maintenance",
        bus_id = bus_id.trim(),
        soh,
        fallback = forecast.source.is_fallback()
    );
    let mut record = maintenance_record(bus_id, soh, last_service, now)?;
    record.soh_source = Some(forecast.source);
    Ok(record)
}

/// Build a record from a known SOH fraction; out-of-range values are clamped to [0, 1].
pub fn maintenance_record(
    bus_id: &str,
    soh: f64,
    last_service: Option<&str>,
    now: DateTime<Utc>,
) -> FleetResult<MaintenanceRecord> {
    let bus_id = bus_id.trim();
    if bus_id.is_empty() {
        return Err(FleetError::invalid("bus_id is required"));
    }
    if !soh.is_finite() {
        return Err(FleetError::invalid(format!("soh must be finite, got {soh}")));
    }

    let soh = soh.clamp(0.0, 1.0);
    let soh_pct = round_to(soh * 100.0, 2);
    let status = MaintenanceStatus::from_soh_pct(soh_pct);
    let next_service = now + Duration::days(status.service_interval_days());

    Ok(MaintenanceRecord {
        bus_id: bus_id.to_string(),
        current_soh: soh_pct,
        degradation_score: round_to(1.0 - soh, 4),
        predicted_rul: (soh_pct * 1.2).trunc() as i64,
        status,
        last_service: last_service
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown")
            .to_string(),
        next_service: next_service.format("%Y-%m-%d").to_string(),
        updated_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        soh_source: None,
    })
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MaintenanceAnalytics {
    pub upcoming_services: usize,
    pub active_alerts: usize,
    pub avg_battery_health: Option<f64>,
    pub records: Vec<MaintenanceRecord>,
}

/// Fleet-level counts; status is recomputed from each record's SOH.
pub fn analytics(records: &[MaintenanceRecord]) -> MaintenanceAnalytics {
    let mut upcoming = 0;
    let mut alerts = 0;
    let mut soh_sum = 0.0;
    let mut normalized = Vec::with_capacity(records.len());

    for record in records {
        let status = MaintenanceStatus::from_soh_pct(record.current_soh);
        if status.needs_service() {
            upcoming += 1;
        }
        if status == MaintenanceStatus::Critical {
            alerts += 1;
        }
        soh_sum += record.current_soh;
        normalized.push(MaintenanceRecord {
            status,
            ..record.clone()
        });
    }

    let avg_battery_health =
        (!records.is_empty()).then(|| round_to(soh_sum / records.len() as f64, 2));

    MaintenanceAnalytics {
        upcoming_services: upcoming,
        active_alerts: alerts,
        avg_battery_health,
        records: normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::inference::EngineParts;
    use crate::models::Regressor;

    struct Constant(f64);

    impl Regressor for Constant {
        fn n_features(&self) -> usize {
            4
        }

        fn predict_one(&self, _: &[f64]) -> FleetResult<f64> {
            Ok(self.0)
        }
    }

    struct Offline;

    impl Regressor for Offline {
        fn n_features(&self) -> usize {
            4
        }

        fn predict_one(&self, _: &[f64]) -> FleetResult<f64> {
            Err(FleetError::estimator("model offline"))
        }
    }

    fn engine(soh: Box<dyn Regressor>) -> InferenceEngine {
        InferenceEngine::new(EngineParts {
            trip_model: Box::new(Offline),
            trip_scaler: None,
            soh_model: soh,
            soh_scaler: None,
        })
        .expect("4-wide estimators")
    }

    fn battery() -> SohForecastFeatures {
        SohForecastFeatures::new(820.0, 0.071, 0.0004, 33.2)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("valid date")
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(MaintenanceStatus::from_soh_pct(59.99), MaintenanceStatus::Critical);
        assert_eq!(MaintenanceStatus::from_soh_pct(60.0), MaintenanceStatus::Warning);
        assert_eq!(MaintenanceStatus::from_soh_pct(79.99), MaintenanceStatus::Warning);
        assert_eq!(MaintenanceStatus::from_soh_pct(80.0), MaintenanceStatus::Healthy);
    }

    #[test]
    fn record_from_soh_fraction() {
        let r = maintenance_record("BUS-1", 0.75, None, now()).expect("valid");
        assert_eq!(r.current_soh, 75.0);
        assert_eq!(r.degradation_score, 0.25);
        assert_eq!(r.predicted_rul, 90);
        assert_eq!(r.status, MaintenanceStatus::Warning);
        assert_eq!(r.last_service, "Unknown");
        assert_eq!(r.next_service, "2024-03-31");
        assert_eq!(r.updated_at, "2024-03-01T12:00:00Z");
    }

    #[test]
    fn soh_is_clamped_and_validated() {
        let r = maintenance_record("BUS-1", 1.7, Some("2024-01-10"), now()).expect("valid");
        assert_eq!(r.current_soh, 100.0);
        assert_eq!(r.predicted_rul, 120);
        assert_eq!(r.next_service, "2024-05-30");
        assert_eq!(r.last_service, "2024-01-10");

        assert!(maintenance_record("", 0.9, None, now()).is_err());
        assert!(maintenance_record("BUS-1", f64::NAN, None, now()).is_err());
    }

    #[test]
    fn engine_soh_drives_the_record() {
        let r = predict_maintenance(&engine(Box::new(Constant(0.55))), "BUS-7", &battery(), None, now())
            .expect("model");
        assert_eq!(r.current_soh, 55.0);
        assert_eq!(r.status, MaintenanceStatus::Critical);
        assert_eq!(r.next_service, "2024-03-08");
        assert_eq!(r.soh_source, Some(PredictionSource::Model));

        let r = predict_maintenance(&engine(Box::new(Constant(1.4))), "BUS-7", &battery(), None, now())
            .expect("model");
        assert_eq!(r.current_soh, 100.0);
    }

    #[test]
    fn estimator_fault_uses_the_fallback_soh() {
        let r = predict_maintenance(&engine(Box::new(Offline)), "BUS-7", &battery(), Some("2024-02-01"), now())
            .expect("fallback");
        assert_eq!(r.current_soh, 98.2);
        assert_eq!(r.status, MaintenanceStatus::Healthy);
        assert_eq!(r.predicted_rul, 117);
        assert!(r.soh_source.as_ref().is_some_and(PredictionSource::is_fallback));
    }

    #[test]
    fn incomplete_battery_features_are_an_error() {
        let features = SohForecastFeatures {
            thermal_avg_50: None,
            ..battery()
        };
        let err = predict_maintenance(&engine(Box::new(Constant(0.9))), "BUS-7", &features, None, now())
            .unwrap_err();
        assert!(matches!(err, FleetError::MissingFeature { .. }));
    }

    #[test]
    fn analytics_counts_and_averages() {
        let records: Vec<MaintenanceRecord> = [0.95, 0.7, 0.5]
            .iter()
            .enumerate()
            .map(|(i, soh)| maintenance_record(&format!("B{i}"), *soh, None, now()).expect("valid"))
            .collect();
        let a = analytics(&records);
        assert_eq!(a.upcoming_services, 2);
        assert_eq!(a.active_alerts, 1);
        assert_eq!(a.avg_battery_health, Some(71.67));
        assert_eq!(a.records.len(), 3);

        let empty = analytics(&[]);
        assert_eq!(empty.avg_battery_health, None);
        assert_eq!(empty.upcoming_services, 0);
    }
}
