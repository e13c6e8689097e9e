//! CSV ingestion and schema checks.
//!
//! Column names are normalized on load so that every analysis sees
//! `Air_temperature_K` rather than `Air temperature [K]`.

use crate::analysis::columns::{find_column, ColumnRole};
use crate::analysis::stats;
use crate::data::Dataset;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Fragments that mark a dataset as production data.
const SCHEMA_FRAGMENTS: &[&str] = &["target", "failure", "product", "type"];

/// Load a CSV file from disk.
pub fn load_csv_from_path(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open data file: {}", path.display()))?;

    read_csv(file).with_context(|| format!("Failed to parse CSV: {}", path.display()))
}

/// Load a CSV document held in memory (e.g. an uploaded file).
pub fn load_csv_from_bytes(content: &[u8]) -> Result<Dataset> {
    read_csv(content).context("Failed to parse uploaded CSV")
}

fn read_csv<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Missing CSV header row")?
        .iter()
        .map(|h| normalize_column_name(h.trim_start_matches('\u{feff}')))
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.context("Malformed CSV record")?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    debug!("Read {} rows x {} columns", rows.len(), headers.len());

    Ok(Dataset::from_records(headers, rows)?)
}

/// Normalize a column name.
///
/// Brackets, parentheses and spaces become underscores, runs of underscores
/// collapse to one, and leading/trailing underscores are trimmed.
pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());

    for c in name.chars() {
        let c = match c {
            '[' | ']' | '(' | ')' | ' ' => '_',
            other => other,
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    out.trim_matches('_').to_string()
}

/// Check that the dataset looks like production data.
///
/// This is deliberately loose: two of the expected name fragments are
/// enough. Callers treat a failure as a warning, not a rejection.
pub fn validate_production_data(dataset: &Dataset) -> Result<(), String> {
    let names: Vec<String> = dataset
        .column_names()
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    let found = SCHEMA_FRAGMENTS
        .iter()
        .filter(|p| names.iter().any(|c| c.contains(*p)))
        .count();

    if found >= 2 {
        Ok(())
    } else {
        Err(format!(
            "Expected production data columns. Found: {:?}",
            dataset.column_names()
        ))
    }
}

/// Basic dataset statistics, computed without the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_failures: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_machines: Option<usize>,
}

pub fn get_summary_stats(dataset: &Dataset) -> SummaryStats {
    let mut summary = SummaryStats {
        total_records: dataset.len(),
        columns: dataset.column_names(),
        numeric_columns: dataset.numeric_column_names(),
        failure_rate: None,
        total_failures: None,
        unique_machines: None,
    };

    if let Some(values) = find_column(dataset, ColumnRole::Indicator).and_then(|c| c.as_numeric()) {
        if let Some(rate) = stats::mean(values) {
            summary.failure_rate = Some(rate);
            summary.total_failures = Some(stats::sum(values).round() as u64);
        }
    }

    if let Some(entity) = find_column(dataset, ColumnRole::Entity) {
        let unique: std::collections::HashSet<String> =
            (0..dataset.len()).filter_map(|row| entity.key_at(row)).collect();
        summary.unique_machines = Some(unique.len());
    }

    summary
}
