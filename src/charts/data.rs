//! Chart data preparation.
//!
//! Pure functions that turn a dataset (or cached risk factors) into the
//! series a renderer draws. Each returns `None` when the columns it needs
//! are missing.

use crate::analysis::columns::{find_column, ColumnRole};
use crate::analysis::stats;
use crate::analysis::{Findings, RiskFactor};
use crate::data::Dataset;

pub const GREEN: &str = "#2ecc71";
pub const AMBER: &str = "#f39c12";
pub const RED: &str = "#e74c3c";
pub const BLUE: &str = "#3498db";

/// Qualitative palette for pie slices.
pub const PALETTE: &[&str] = &[
    "#8dd3c7", "#ffffb3", "#bebada", "#fb8072", "#80b1d3", "#fdb462", "#b3de69", "#fccde5",
    "#d9d9d9", "#bc80bd", "#ccebc5", "#ffed6f",
];

/// Number of factors shown on the risk chart.
pub const MAX_RISK_BARS: usize = 8;

/// Longest factor label before truncation.
const MAX_LABEL_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceLine {
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub bars: Vec<Bar>,
    pub reference: Option<ReferenceLine>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieSlice {
    pub label: String,
    pub count: usize,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieChart {
    pub title: String,
    pub slices: Vec<PieSlice>,
}

/// Failure rate (%) per product type.
pub fn failure_by_type(dataset: &Dataset) -> Option<BarChart> {
    let values = find_column(dataset, ColumnRole::Indicator)?.as_numeric()?;
    let type_col = find_column(dataset, ColumnRole::Category)?;

    let bars: Vec<Bar> = stats::group_by(type_col, values)
        .into_iter()
        .filter_map(|g| {
            let pct = g.mean? * 100.0;
            let color = if pct < 3.0 {
                GREEN
            } else if pct < 5.0 {
                AMBER
            } else {
                RED
            };
            Some(Bar {
                label: g.key,
                value: pct,
                color,
            })
        })
        .collect();

    if bars.is_empty() {
        return None;
    }

    Some(BarChart {
        title: "Failure Rate by Product Type".to_string(),
        x_label: "Product Type".to_string(),
        y_label: "Failure Rate (%)".to_string(),
        bars,
        reference: None,
    })
}

/// Top correlations with failure, as horizontal bars.
pub fn risk_factors(factors: &Findings<Vec<RiskFactor>>) -> Option<BarChart> {
    let factors = factors.found()?;
    if factors.is_empty() {
        return None;
    }

    let bars = factors
        .iter()
        .take(MAX_RISK_BARS)
        .map(|f| Bar {
            label: f.factor.replace('_', " ").chars().take(MAX_LABEL_CHARS).collect(),
            value: f.correlation,
            color: if f.correlation > 0.0 { RED } else { BLUE },
        })
        .collect();

    Some(BarChart {
        title: "Risk Factors: Correlation with Machine Failure".to_string(),
        x_label: "Correlation with Failure".to_string(),
        y_label: String::new(),
        bars,
        reference: None,
    })
}

/// Share of each failure type among failing records.
///
/// When an indicator column exists only rows where it equals 1 are counted.
pub fn failure_distribution(dataset: &Dataset) -> Option<PieChart> {
    let type_col = find_column(dataset, ColumnRole::FailureType)?;

    let rows: Vec<usize> = match find_column(dataset, ColumnRole::Indicator) {
        Some(target) => match target.as_numeric() {
            Some(values) => (0..dataset.len())
                .filter(|&row| values[row] == Some(1.0))
                .collect(),
            None => Vec::new(),
        },
        None => (0..dataset.len()).collect(),
    };

    if rows.is_empty() {
        return None;
    }

    let slices: Vec<PieSlice> = stats::value_counts(type_col, rows)
        .into_iter()
        .enumerate()
        .map(|(i, (label, count))| PieSlice {
            label,
            count,
            color: PALETTE[i % PALETTE.len()],
        })
        .collect();

    if slices.is_empty() {
        return None;
    }

    Some(PieChart {
        title: "Distribution of Failure Types".to_string(),
        slices,
    })
}

/// The `top_n` machines by failure rate (%), with the overall average.
pub fn machine_comparison(dataset: &Dataset, top_n: usize) -> Option<BarChart> {
    let values = find_column(dataset, ColumnRole::Indicator)?.as_numeric()?;
    let machine_col = find_column(dataset, ColumnRole::Entity)?;
    let overall = stats::mean(values)? * 100.0;

    let mut rates: Vec<(String, f64)> = stats::group_by(machine_col, values)
        .into_iter()
        .filter_map(|g| Some((g.key, g.mean? * 100.0)))
        .collect();
    rates.sort_by(|a, b| b.1.total_cmp(&a.1));
    rates.truncate(top_n);

    if rates.is_empty() {
        return None;
    }

    let bars = rates
        .into_iter()
        .map(|(label, pct)| {
            let color = if pct > overall * 1.5 {
                RED
            } else if pct > overall {
                AMBER
            } else {
                GREEN
            };
            Bar {
                label,
                value: pct,
                color,
            }
        })
        .collect();

    Some(BarChart {
        title: format!("Top {} Machines by Failure Rate", top_n),
        x_label: "Machine ID".to_string(),
        y_label: "Failure Rate (%)".to_string(),
        bars,
        reference: Some(ReferenceLine {
            value: overall,
            label: format!("Overall Avg: {:.1}%", overall),
        }),
    })
}
