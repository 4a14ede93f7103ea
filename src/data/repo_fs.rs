//! Filesystem-backed loading of telemetry CSV files.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use tracing::debug;

use crate::common::config::AppCfg;
use crate::common::error::{FleetError, FleetResult};

use super::domain::TelemetryTable;

/// Repository rooted at `cfg.data_root`; relative paths resolve against it.
pub struct FsDataRepo {
    root: PathBuf,
}

impl FsDataRepo {
    pub fn new(cfg: &AppCfg) -> Self {
        Self {
            root: cfg.data_root.clone(),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Load a CSV with a header row into a typed table.
    pub fn load_table(&self, path: &Path) -> FleetResult<TelemetryTable> {
        let full = self.resolve(path);
        let file = File::open(&full).map_err(|err| {
            FleetError::Io(std::io::Error::new(
                err.kind(),
                format!("{}: {err}", full.display()),
            ))
        })?;
        let table = read_table(file)?;
        debug!(
            ev = "data.load",
            path = %full.display(),
            rows = table.n_rows(),
            cols = table.headers().len()
        );
        Ok(table)
    }
}

/// Parse CSV from any reader; header names and cells are trimmed.
pub fn read_table<R: Read>(reader: R) -> FleetResult<TelemetryTable> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(FleetError::invalid("csv has no header row"));
    }

    let mut records = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }

    TelemetryTable::from_records(headers, records)
}
