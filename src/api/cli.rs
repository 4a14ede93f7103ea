//! Command-line surface. Every command prints one JSON document on stdout;
//! logs go to stderr and the exit status is the error's [`FleetCode`].

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::common::config::AppCfg;
use crate::common::error::{FleetCode, FleetError, FleetResult};
use crate::data::{FsDataRepo, TelemetryTable};
use crate::evaluation::QualityGate;
use crate::features::{SohFeatures, SohForecastFeatures, TripFeatures};
use crate::fleet::{dashboard_metrics, maintenance_record, predict_maintenance};
use crate::inference::{plan_trip, InferenceEngine, TripRequest};
use crate::training::{run_pipeline, FsArtifactStore, PipelineKind, TrainParams};

/// EV bus fleet telemetry: offline training and online trip and battery predictions.
#[derive(Debug, Parser)]
#[command(name = "evfleet", author, version, about)]
pub struct Cli {
    /// Artifact directory (overrides EVFLEET_MODELS_DIR)
    #[arg(long, global = true)]
    pub models_dir: Option<PathBuf>,

    /// Minimum held-out R² required to persist a model (overrides EVFLEET_MIN_R2)
    #[arg(long, global = true)]
    pub min_r2: Option<f64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit, evaluate and persist one pipeline from a telemetry CSV
    Train {
        #[arg(value_enum)]
        pipeline: PipelineArg,

        /// Telemetry CSV; relative paths resolve against EVFLEET_DATA_ROOT
        #[arg(long)]
        data: PathBuf,

        /// Trees per forest
        #[arg(long, default_value_t = 300)]
        trees: usize,
    },
    /// Run the online models
    Predict {
        #[command(subcommand)]
        target: PredictCommand,
    },
    /// Fleet-level views
    Fleet {
        #[command(subcommand)]
        view: FleetCommand,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum PipelineArg {
    Trip,
    Soh,
    Charging,
}

impl From<PipelineArg> for PipelineKind {
    fn from(arg: PipelineArg) -> Self {
        match arg {
            PipelineArg::Trip => PipelineKind::Trip,
            PipelineArg::Soh => PipelineKind::Soh,
            PipelineArg::Charging => PipelineKind::Charging,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum PredictCommand {
    /// Plan a trip: energy use, end-of-trip SOC, risk and battery impact
    Trip {
        #[arg(long)]
        route_id: String,
        #[arg(long)]
        passenger_load: f64,
        #[arg(long)]
        weather: String,
        #[arg(long, default_value_t = 95.0)]
        current_soc: f64,
        #[arg(long)]
        bus_id: Option<String>,
    },
    /// Trip feasibility for every row of a CSV with the four trip feature columns
    TripBatch {
        /// Relative paths resolve against EVFLEET_DATA_ROOT
        #[arg(long)]
        data: PathBuf,
    },
    /// Forecast battery state of health
    Soh {
        #[arg(long)]
        battery_cycles: f64,
        #[arg(long)]
        depth_of_discharge: f64,
        #[arg(long)]
        temperature_variance: f64,
    },
}

#[derive(Debug, Subcommand)]
pub enum FleetCommand {
    /// KPIs and alerts from the latest telemetry row of every bus
    Dashboard {
        #[arg(long)]
        data: PathBuf,
    },
    /// Maintenance record for one bus, from the SOH model or a known SOH fraction
    Maintenance {
        #[arg(long)]
        bus_id: String,
        #[arg(long, required_unless_present = "soh")]
        cycle_count: Option<f64>,
        #[arg(long, required_unless_present = "soh")]
        internal_resistance: Option<f64>,
        #[arg(long, required_unless_present = "soh")]
        resistance_growth: Option<f64>,
        /// Mean thermal stress over the last 50 cycles
        #[arg(long, required_unless_present = "soh")]
        thermal_avg_50: Option<f64>,
        /// Known state of health as a fraction in [0, 1]; skips the model
        #[arg(
            long,
            conflicts_with_all = ["cycle_count", "internal_resistance", "resistance_growth", "thermal_avg_50"]
        )]
        soh: Option<f64>,
        #[arg(long)]
        last_service: Option<String>,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the environment snapshot.
    pub fn apply(&self, mut cfg: AppCfg) -> AppCfg {
        if let Some(dir) = &self.models_dir {
            cfg.models_dir = dir.clone();
        }
        if self.min_r2.is_some() {
            cfg.min_r2 = self.min_r2;
        }
        cfg
    }
}

fn to_json<T: Serialize>(value: &T) -> FleetResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn load_engine(cfg: &AppCfg) -> FleetResult<InferenceEngine> {
    InferenceEngine::load(&FsArtifactStore::new(cfg), &cfg.artifacts)
}

/// One request per row. Absent columns and blank cells stay unset so the
/// engine reports them as missing features.
fn trip_batch_inputs(table: &TelemetryTable) -> Vec<TripFeatures> {
    let column = |name: &str| table.numeric(name).ok();
    let start_soc = column("start_soc");
    let distance = column("route_distance_km");
    let speed = column("avg_speed_kmph");
    let load = column("passenger_load");
    let cell = |values: Option<&[f64]>, row: usize| {
        values.and_then(|v| v.get(row)).copied().filter(|v| !v.is_nan())
    };

    (0..table.n_rows())
        .map(|row| TripFeatures {
            start_soc: cell(start_soc, row),
            route_distance_km: cell(distance, row),
            avg_speed_kmph: cell(speed, row),
            passenger_load: cell(load, row),
        })
        .collect()
}

/// Execute a parsed command and return its JSON result.
pub fn execute(command: &Command, cfg: &AppCfg) -> FleetResult<Value> {
    match command {
        Command::Train {
            pipeline,
            data,
            trees,
        } => {
            let table = FsDataRepo::new(cfg).load_table(data)?;
            let params = TrainParams {
                n_estimators: *trees,
                ..TrainParams::default()
            };
            let report = run_pipeline(
                (*pipeline).into(),
                &table,
                &params,
                &QualityGate::new(cfg.min_r2),
                &FsArtifactStore::new(cfg),
            )?;
            to_json(&report)
        }
        Command::Predict {
            target:
                PredictCommand::Trip {
                    route_id,
                    passenger_load,
                    weather,
                    current_soc,
                    bus_id,
                },
        } => {
            let engine = load_engine(cfg)?;
            let plan = plan_trip(
                &engine,
                &TripRequest {
                    route_id: route_id.clone(),
                    passenger_load: *passenger_load,
                    weather: weather.clone(),
                    current_soc: *current_soc,
                    bus_id: bus_id.clone(),
                },
            )?;
            to_json(&plan)
        }
        Command::Predict {
            target: PredictCommand::TripBatch { data },
        } => {
            let table = FsDataRepo::new(cfg).load_table(data)?;
            let engine = load_engine(cfg)?;
            to_json(&engine.predict_trip_batch(&trip_batch_inputs(&table))?)
        }
        Command::Predict {
            target:
                PredictCommand::Soh {
                    battery_cycles,
                    depth_of_discharge,
                    temperature_variance,
                },
        } => {
            let engine = load_engine(cfg)?;
            let forecast = engine.predict_soh(&SohFeatures::new(
                *battery_cycles,
                *depth_of_discharge,
                *temperature_variance,
            ))?;
            to_json(&forecast)
        }
        Command::Fleet {
            view: FleetCommand::Dashboard { data },
        } => {
            let table = FsDataRepo::new(cfg).load_table(data)?;
            to_json(&dashboard_metrics(&table)?)
        }
        Command::Fleet {
            view:
                FleetCommand::Maintenance {
                    bus_id,
                    cycle_count,
                    internal_resistance,
                    resistance_growth,
                    thermal_avg_50,
                    soh,
                    last_service,
                },
        } => {
            let last_service = last_service.as_deref();
            let record = match soh {
                Some(soh) => maintenance_record(bus_id, *soh, last_service, Utc::now())?,
                None => {
                    let features = SohForecastFeatures {
                        cycle_count: *cycle_count,
                        internal_resistance: *internal_resistance,
                        resistance_growth: *resistance_growth,
                        thermal_avg_50: *thermal_avg_50,
                    };
                    predict_maintenance(&load_engine(cfg)?, bus_id, &features, last_service, Utc::now())?
                }
            };
            to_json(&record)
        }
    }
}

fn exit_code(code: FleetCode) -> ExitCode {
    ExitCode::from(u8::try_from(code as u32).unwrap_or(u8::MAX))
}

fn write_document<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    writeln!(out, "{rendered}")?;
    out.flush()
}

/// Write the document; a failed write overrides `code` with [`FleetCode::Io`].
fn emit<W: Write>(out: &mut W, value: &Value, code: FleetCode) -> FleetCode {
    match write_document(out, value) {
        Ok(()) => code,
        Err(err) => {
            let err = FleetError::from(err);
            error!(ev = "cli.write_failed", code = err.code() as u32, error = %err);
            err.code()
        }
    }
}

fn error_document(err: &FleetError) -> Value {
    json!({
        "ok": false,
        "code": err.code() as u32,
        "error": err.to_string(),
    })
}

/// Run the command, print its JSON result or error document, and map the exit status.
pub fn run(cli: &Cli, cfg: &AppCfg) -> ExitCode {
    let mut stdout = io::stdout().lock();
    let code = match execute(&cli.command, cfg) {
        Ok(value) => emit(&mut stdout, &value, FleetCode::Ok),
        Err(err) => {
            error!(ev = "cli.failed", code = err.code() as u32, error = %err);
            emit(&mut stdout, &error_document(&err), err.code())
        }
    };
    exit_code(code)
}
