//! Data models for the health report.
//!
//! These are the structures handed from the CLI run to the report
//! generators.

use crate::agent::StopReason;
use crate::data::SummaryStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall line health, banded by failure rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Failure rate below 3%.
    Healthy,
    /// Failure rate between 3% and 5%.
    Watch,
    /// Failure rate of 5% or more.
    Critical,
}

impl HealthStatus {
    pub fn from_failure_rate(rate: f64) -> Self {
        if rate < 0.03 {
            HealthStatus::Healthy
        } else if rate < 0.05 {
            HealthStatus::Watch
        } else {
            HealthStatus::Critical
        }
    }

    /// Returns an emoji representation of the status.
    pub fn emoji(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "🟢",
            HealthStatus::Watch => "🟡",
            HealthStatus::Critical => "🔴",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Watch => write!(f, "Watch"),
            HealthStatus::Critical => write!(f, "Critical"),
        }
    }
}

/// Metadata about the health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the analyzed CSV file.
    pub data_file: String,
    pub session_id: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Name of the LLM model used.
    pub model_used: String,
    pub records_analyzed: usize,
    /// Agent rounds used for the initial analysis.
    pub rounds: usize,
    pub stop_reason: StopReason,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
}

/// The complete production health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    /// The agent's written assessment.
    pub summary: String,
    /// Statistics computed directly from the data.
    pub stats: SummaryStats,
    /// Set when the data did not look like production data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_warning: Option<String>,
    /// Chart files, relative to the report.
    #[serde(default)]
    pub charts: Vec<String>,
}

impl AnalysisReport {
    /// Health band for the dataset, when a failure rate is known.
    pub fn health(&self) -> Option<HealthStatus> {
        self.stats.failure_rate.map(HealthStatus::from_failure_rate)
    }
}
