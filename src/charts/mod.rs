//! Chart rendering.
//!
//! Charts are produced as opaque encoded-image payloads (data URIs) so they
//! can travel through tool results and reports unchanged.

pub mod data;
pub mod svg;

pub use svg::SvgChartRenderer;

use crate::analysis::{Findings, RiskFactor};
use crate::data::Dataset;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("failed to render chart: {0}")]
    Render(#[from] fmt::Error),
}

/// The charts a session can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    FailureByType,
    RiskFactors,
    FailureDistribution,
    MachineComparison,
}

impl ChartKind {
    pub const ALL: [ChartKind; 4] = [
        ChartKind::FailureByType,
        ChartKind::RiskFactors,
        ChartKind::FailureDistribution,
        ChartKind::MachineComparison,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::FailureByType => "failure_by_type",
            ChartKind::RiskFactors => "risk_factors",
            ChartKind::FailureDistribution => "failure_distribution",
            ChartKind::MachineComparison => "machine_comparison",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown chart type: {}", s))
    }
}

/// Renders charts to encoded image payloads.
///
/// Every method returns `Ok(None)` when the columns it needs are missing.
pub trait ChartRenderer: Send + Sync {
    fn failure_rate_by_type(&self, dataset: &Dataset) -> Result<Option<String>, ChartError>;

    fn risk_factors(&self, factors: &Findings<Vec<RiskFactor>>)
        -> Result<Option<String>, ChartError>;

    fn failure_distribution(&self, dataset: &Dataset) -> Result<Option<String>, ChartError>;

    fn machine_comparison(&self, dataset: &Dataset) -> Result<Option<String>, ChartError>;
}

/// A decoded `data:` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// File extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/svg+xml" => "svg",
            "image/png" => "png",
            "image/jpeg" => "jpg",
            _ => "bin",
        }
    }
}

/// Wrap raw bytes in a base64 `data:` URI.
pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URI. Returns `None` for anything else.
pub fn decode_data_uri(uri: &str) -> Option<DecodedImage> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    let bytes = STANDARD.decode(payload).ok()?;
    Some(DecodedImage {
        mime: mime.to_string(),
        bytes,
    })
}
