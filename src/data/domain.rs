//! Telemetry tables and the training sets derived from them.

use std::collections::HashSet;

use crate::common::error::{FleetError, FleetResult};
use crate::features::FeatureMatrix;

/// One CSV column. A column is numeric when every non-empty cell parses as a
/// number; empty and `NaN`/`NA` cells become `f64::NAN`.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    fn from_cells(cells: Vec<String>) -> Self {
        let mut numbers = Vec::with_capacity(cells.len());
        for cell in &cells {
            let cell = cell.trim();
            if is_missing(cell) {
                numbers.push(f64::NAN);
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) => numbers.push(v),
                Err(_) => return Column::Text(cells),
            }
        }
        Column::Numeric(numbers)
    }

    fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    fn cell_key(&self, row: usize) -> String {
        match self {
            Column::Numeric(v) => format_key(v[row]),
            Column::Text(v) => v[row].trim().to_string(),
        }
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            Column::Numeric(v) => Column::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || matches!(cell, "NaN" | "nan" | "NA" | "N/A" | "null")
}

fn format_key(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Column-oriented view of a telemetry CSV.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryTable {
    headers: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

impl TelemetryTable {
    /// Build from a header row and string records; ragged records are rejected.
    pub fn from_records(headers: Vec<String>, records: Vec<Vec<String>>) -> FleetResult<Self> {
        let n_rows = records.len();
        let mut cells: Vec<Vec<String>> = vec![Vec::with_capacity(n_rows); headers.len()];
        for (line, record) in records.into_iter().enumerate() {
            if record.len() != headers.len() {
                return Err(FleetError::invalid(format!(
                    "row {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    headers.len()
                )));
            }
            for (col, cell) in record.into_iter().enumerate() {
                cells[col].push(cell);
            }
        }

        Ok(Self {
            headers,
            columns: cells.into_iter().map(Column::from_cells).collect(),
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Every name in `required` that the table lacks, in the given order.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// Fail with the full list of absent columns.
    pub fn require(&self, required: &[&str]) -> FleetResult<()> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FleetError::MissingColumn { missing })
        }
    }

    fn column(&self, name: &str) -> FleetResult<&Column> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| FleetError::MissingColumn {
                missing: vec![name.to_string()],
            })
    }

    pub fn numeric(&self, name: &str) -> FleetResult<&[f64]> {
        match self.column(name)? {
            Column::Numeric(values) => Ok(values),
            Column::Text(_) => Err(FleetError::invalid(format!(
                "column '{name}' is not numeric"
            ))),
        }
    }

    /// Cell values as strings, suitable for grouping or timestamp parsing.
    pub fn keys(&self, name: &str) -> FleetResult<Vec<String>> {
        let column = self.column(name)?;
        Ok((0..column.len()).map(|row| column.cell_key(row)).collect())
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            headers: self.headers.clone(),
            columns: self.columns.iter().map(|c| c.select(indices)).collect(),
            n_rows: indices.len(),
        }
    }

    /// Drop rows identical to an earlier row in every column.
    pub fn drop_duplicates(&self) -> Self {
        let mut seen = HashSet::with_capacity(self.n_rows);
        let keep: Vec<usize> = (0..self.n_rows)
            .filter(|&row| {
                let key: Vec<String> = self.columns.iter().map(|c| c.cell_key(row)).collect();
                seen.insert(key)
            })
            .collect();
        self.select_rows(&keep)
    }

    /// Forward-fill then back-fill missing cells in every numeric column.
    pub fn fill_gaps(&mut self) {
        for column in &mut self.columns {
            let Column::Numeric(values) = column else {
                continue;
            };
            let mut last = f64::NAN;
            for v in values.iter_mut() {
                if v.is_nan() {
                    *v = last;
                } else {
                    last = *v;
                }
            }
            let mut next = f64::NAN;
            for v in values.iter_mut().rev() {
                if v.is_nan() {
                    *v = next;
                } else {
                    next = *v;
                }
            }
        }
    }
}

/// Group row indices by key. Empty keys are dropped. Groups are ordered
/// numerically when every key parses as a number, otherwise lexically; the
/// choice is made once for the whole key set. Rows keep their table order
/// inside a group.
pub fn group_rows(keys: &[String]) -> Vec<(String, Vec<usize>)> {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut index: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for (row, key) in keys.iter().enumerate() {
        if key.is_empty() {
            continue;
        }
        match index.get(key.as_str()) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                index.insert(key.as_str(), groups.len());
                groups.push((key.clone(), vec![row]));
            }
        }
    }

    let numeric: Option<Vec<f64>> = groups.iter().map(|(k, _)| k.parse::<f64>().ok()).collect();
    match numeric {
        Some(values) => {
            let mut keyed: Vec<(f64, (String, Vec<usize>))> = values.into_iter().zip(groups).collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1 .0.cmp(&b.1 .0)));
            keyed.into_iter().map(|(_, group)| group).collect()
        }
        None => {
            groups.sort_by(|a, b| a.0.cmp(&b.0));
            groups
        }
    }
}

/// Feature matrix with one target per row.
#[derive(Clone, Debug)]
pub struct TrainingSet {
    pub x: FeatureMatrix,
    pub y: Vec<f64>,
}

/// Charging-telemetry matrix with both SOC and SOH targets.
#[derive(Clone, Debug)]
pub struct ChargingSet {
    pub x: FeatureMatrix,
    pub soc: Vec<f64>,
    pub soh: Vec<f64>,
}
