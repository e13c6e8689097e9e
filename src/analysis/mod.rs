//! Statistical analysis of production data.
//!
//! Column discovery, failure-rate aggregation, correlation-based risk
//! factors, high-risk machine ranking and the failure-type tally, plus the
//! per-session cache of their results.

pub mod columns;
pub mod production;
pub mod stats;

pub use production::{
    analyze_failure_rates, analyze_failure_types, get_high_risk_machines, identify_risk_factors,
    FailureRateAnalysis, FailureTypeCount, Findings, MachineStats, RiskFactor,
    DEFAULT_HIGH_RISK_THRESHOLD,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised by an analysis on data it cannot process.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("indicator column '{column}' is not numeric")]
    NonNumericIndicator { column: String },

    #[error("indicator column '{column}' has no values")]
    EmptyIndicator { column: String },
}

/// The analyses the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    FailureRates,
    RiskFactors,
    HighRiskMachines,
    FailureTypes,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::FailureRates,
        AnalysisKind::RiskFactors,
        AnalysisKind::HighRiskMachines,
        AnalysisKind::FailureTypes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::FailureRates => "failure_rates",
            AnalysisKind::RiskFactors => "risk_factors",
            AnalysisKind::HighRiskMachines => "high_risk_machines",
            AnalysisKind::FailureTypes => "failure_types",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown analysis type: {}", s))
    }
}

/// A computed analysis, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutput {
    FailureRates(FailureRateAnalysis),
    RiskFactors(Findings<Vec<RiskFactor>>),
    HighRiskMachines(Findings<Vec<MachineStats>>),
    FailureTypes(Findings<Vec<FailureTypeCount>>),
}

impl AnalysisOutput {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisOutput::FailureRates(_) => AnalysisKind::FailureRates,
            AnalysisOutput::RiskFactors(_) => AnalysisKind::RiskFactors,
            AnalysisOutput::HighRiskMachines(_) => AnalysisKind::HighRiskMachines,
            AnalysisOutput::FailureTypes(_) => AnalysisKind::FailureTypes,
        }
    }
}

/// Run one analysis against `dataset`.
///
/// `threshold` only applies to the high-risk machine ranking.
pub fn run_analysis(
    kind: AnalysisKind,
    dataset: &crate::data::Dataset,
    threshold: f64,
) -> Result<AnalysisOutput, AnalysisError> {
    Ok(match kind {
        AnalysisKind::FailureRates => AnalysisOutput::FailureRates(analyze_failure_rates(dataset)?),
        AnalysisKind::RiskFactors => AnalysisOutput::RiskFactors(identify_risk_factors(dataset)?),
        AnalysisKind::HighRiskMachines => {
            AnalysisOutput::HighRiskMachines(get_high_risk_machines(dataset, threshold)?)
        }
        AnalysisKind::FailureTypes => AnalysisOutput::FailureTypes(analyze_failure_types(dataset)),
    })
}

/// Last computed result per analysis kind, scoped to one session.
#[derive(Debug, Clone, Default)]
pub struct AnalysisCache {
    entries: HashMap<AnalysisKind, AnalysisOutput>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: AnalysisKind) -> Option<&AnalysisOutput> {
        self.entries.get(&kind)
    }

    /// Store `output` under its own kind, replacing any previous result.
    pub fn insert(&mut self, output: AnalysisOutput) {
        self.entries.insert(output.kind(), output);
    }

    /// Cached risk factors, if a risk-factor analysis has been run.
    pub fn risk_factors(&self) -> Option<&Findings<Vec<RiskFactor>>> {
        match self.entries.get(&AnalysisKind::RiskFactors) {
            Some(AnalysisOutput::RiskFactors(factors)) => Some(factors),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
