//! Train on synthetic telemetry, persist to a temporary artifact directory,
//! reload through the engine and predict.

use std::fs;
use std::path::Path;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use evfleet::common::config::ArtifactNames;
use evfleet::evaluation::QualityGate;
use evfleet::features::SohForecastFeatures;
use evfleet::fleet::predict_maintenance;
use evfleet::inference::{plan_trip, PredictionSource, TripRequest};
use evfleet::training::service::{CHARGING_SCALER, CHARGING_SOC_MODEL, CHARGING_SOH_MODEL};
use evfleet::training::{run_pipeline, ArtifactRepo, FsArtifactStore, PipelineKind, TrainParams};
use evfleet::{FleetError, InferenceEngine, SohFeatures, TripFeatures};

fn params() -> TrainParams {
    TrainParams {
        n_estimators: 12,
        ..TrainParams::default()
    }
}

fn trip_table() -> evfleet::data::TelemetryTable {
    let mut csv = String::from("trip_id,SOC,distance_km,speed_kmph,passenger_count\n");
    for t in 0..60 {
        let dist = 10.0 + (t % 30) as f64;
        let load = (t % 9) as f64 * 8.0;
        let energy = dist * 0.3 + load * 0.05;
        csv.push_str(&format!("{t},95,0,{},{load}\n", 40 + t % 20));
        csv.push_str(&format!("{t},{},{dist},{},{load}\n", 95.0 - energy, 40 + t % 20));
    }
    evfleet::data::repo_fs::read_table(csv.as_bytes()).expect("csv")
}

fn soh_table() -> evfleet::data::TelemetryTable {
    let mut csv = String::from("battery_id,cycle_count,internal_resistance,thermal_stress_index,SOH\n");
    for battery in ["A", "B", "C"] {
        for cycle in 1..=40 {
            let c = f64::from(cycle);
            csv.push_str(&format!(
                "{battery},{cycle},{},{},{}\n",
                0.05 + c * 0.001,
                1.0 + (c % 5.0),
                100.0 - c * 0.2
            ));
        }
    }
    evfleet::data::repo_fs::read_table(csv.as_bytes()).expect("csv")
}

fn train_online_models(dir: &Path) -> FsArtifactStore {
    let store = FsArtifactStore::at(dir);
    let gate = QualityGate::default();
    run_pipeline(PipelineKind::Trip, &trip_table(), &params(), &gate, &store).expect("trip");
    run_pipeline(PipelineKind::Soh, &soh_table(), &params(), &gate, &store).expect("soh");
    store
}

#[test]
fn trained_models_reload_and_predict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = train_online_models(dir.path());

    for name in ["trip_feasibility", "trip_scaler", "soh_forecast", "soh_scaler"] {
        assert!(store.path_for(name).exists(), "{name} persisted");
    }

    let engine = InferenceEngine::load(&store, &ArtifactNames::default()).expect("load");
    assert_eq!(engine.trip_contract().width(), 4);
    assert_eq!(engine.soh_contract().width(), 4);

    let trip = engine
        .predict_trip_feasibility(&TripFeatures::new(95.0, 30.0, 50.0, 16.0))
        .expect("trip");
    assert_eq!(trip.source, PredictionSource::Model);
    assert!((2.0..=100.0).contains(&trip.energy_consumed_pct));
    assert_eq!(trip.energy_curve.len(), 11);

    let soh = engine.predict_soh(&SohFeatures::new(120.0, 15.0, 4.0)).expect("soh");
    assert_eq!(soh.source, PredictionSource::Model);
    assert!(soh.predicted_soh.is_finite());

    let record = predict_maintenance(
        &engine,
        "BUS-4",
        &SohForecastFeatures::new(30.0, 0.08, 0.001, 3.0),
        None,
        Utc::now(),
    )
    .expect("maintenance");
    assert_eq!(record.soh_source, Some(PredictionSource::Model));
    assert!((0.0..=100.0).contains(&record.current_soh));

    let plan = plan_trip(
        &engine,
        &TripRequest {
            route_id: "R-1".into(),
            passenger_load: 30.0,
            weather: "normal".into(),
            current_soc: 90.0,
            bus_id: Some("BUS-4".into()),
        },
    )
    .expect("plan");
    assert_eq!(plan.bus_id, "BUS-4");
    assert_eq!(plan.avg_speed_kmph, 55.0);
}

#[test]
fn reloaded_predictions_are_reproducible() {
    let a = tempfile::tempdir().expect("tempdir");
    let b = tempfile::tempdir().expect("tempdir");
    let first = InferenceEngine::load(&train_online_models(a.path()), &ArtifactNames::default()).expect("load");
    let second = InferenceEngine::load(&train_online_models(b.path()), &ArtifactNames::default()).expect("load");

    let input = TripFeatures::new(80.0, 22.0, 45.0, 40.0);
    assert_eq!(
        first.predict_trip_feasibility(&input).expect("trip"),
        second.predict_trip_feasibility(&input).expect("trip")
    );
}

#[test]
fn missing_estimator_is_fatal_but_missing_scaler_is_not() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = train_online_models(dir.path());

    fs::remove_file(store.path_for("trip_scaler")).expect("remove scaler");
    let engine = InferenceEngine::load(&store, &ArtifactNames::default()).expect("runs unscaled");
    engine
        .predict_trip_feasibility(&TripFeatures::new(95.0, 40.0, 55.0, 20.0))
        .expect("unscaled prediction");

    fs::remove_file(store.path_for("soh_forecast")).expect("remove model");
    let err = InferenceEngine::load(&store, &ArtifactNames::default()).err().expect("fatal");
    assert!(matches!(err, FleetError::ArtifactLoad { ref name, .. } if name == "soh_forecast"));
}

#[test]
fn tampered_artifact_is_rejected_on_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = train_online_models(dir.path());

    let path = store.path_for("trip_feasibility");
    let text = fs::read_to_string(&path).expect("read");
    let marker = "\"threshold\":";
    let mut at = text.find(marker).expect("forest has a split") + marker.len();
    if text[at..].starts_with('-') {
        at += 1;
    }
    // Still valid JSON, different number.
    let tampered = format!("{}9{}", &text[..at], &text[at..]);
    fs::write(&path, tampered).expect("write");

    let err = InferenceEngine::load(&store, &ArtifactNames::default()).err().expect("rejected");
    assert!(matches!(err, FleetError::ArtifactLoad { .. }));
    assert!(err.to_string().contains("fingerprint"));
}

#[test]
fn charging_pipeline_persists_both_targets() {
    let mut header: Vec<&str> = evfleet::data::service::CHARGING_RAW_COLUMNS.to_vec();
    header.extend(["timestamp", "SOC", "SOH"]);
    let mut csv = header.join(",");
    csv.push('\n');
    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..50 {
        let v = f64::from(i);
        let mut cells: Vec<String> = (0..18).map(|_| format!("{:.3}", rng.gen_range(0.0..10.0))).collect();
        cells.push(format!("2024-03-{:02} {:02}:15:00", 1 + i % 28, i % 24));
        cells.push(format!("{}", 0.2 + v * 0.01));
        cells.push(format!("{}", 0.99 - v * 0.002));
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    let table = evfleet::data::repo_fs::read_table(csv.as_bytes()).expect("csv");

    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsArtifactStore::at(dir.path());
    let report = run_pipeline(
        PipelineKind::Charging,
        &table,
        &params(),
        &QualityGate::default(),
        &store,
    )
    .expect("charging");

    assert_eq!(report.models.len(), 2);
    assert_eq!(report.persisted, vec![CHARGING_SOC_MODEL, CHARGING_SOH_MODEL, CHARGING_SCALER]);
    assert_eq!(store.load_scaler(CHARGING_SCALER).expect("scaler").n_features(), 20);
    assert_eq!(
        store
            .load_estimator(CHARGING_SOH_MODEL)
            .expect("linear")
            .kind(),
        evfleet::models::EstimatorKind::Linear
    );
}
