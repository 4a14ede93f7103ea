//! Runtime configuration loaded from the process environment.

use std::env;
use std::path::PathBuf;

/// Artefact names the inference engine pairs at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactNames {
    pub trip_model: String,
    pub trip_scaler: String,
    pub soh_model: String,
    pub soh_scaler: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            trip_model: "trip_feasibility".to_string(),
            trip_scaler: "trip_scaler".to_string(),
            soh_model: "soh_forecast".to_string(),
            soh_scaler: "soh_scaler".to_string(),
        }
    }
}

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub data_root: PathBuf,
    pub models_dir: PathBuf,
    pub log_level: String,
    pub log_json: bool,
    /// Minimum held-out R² a trained model must reach before it is persisted.
    pub min_r2: Option<f64>,
    pub artifacts: ArtifactNames,
}

impl AppCfg {
    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a snapshot from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let data_root = PathBuf::from(env_or("EVFLEET_DATA_ROOT", "./data"));
        let models_dir = lookup("EVFLEET_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("models"));

        let log_json = lookup("EVFLEET_LOG_JSON")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);

        let min_r2 = lookup("EVFLEET_MIN_R2").and_then(|v| v.trim().parse::<f64>().ok());

        let defaults = ArtifactNames::default();
        let artifacts = ArtifactNames {
            trip_model: env_or("EVFLEET_TRIP_MODEL", &defaults.trip_model),
            trip_scaler: env_or("EVFLEET_TRIP_SCALER", &defaults.trip_scaler),
            soh_model: env_or("EVFLEET_SOH_MODEL", &defaults.soh_model),
            soh_scaler: env_or("EVFLEET_SOH_SCALER", &defaults.soh_scaler),
        };

        Self {
            data_root,
            models_dir,
            log_level: env_or("EVFLEET_LOG_LEVEL", "info"),
            log_json,
            min_r2,
            artifacts,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
