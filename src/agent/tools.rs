//! Tool definitions and dispatch for the production analyst.
//!
//! The model can call exactly two tools, `analyze_data` and `create_chart`.
//! Dispatch never fails: anything that goes wrong becomes a tagged error
//! outcome that is folded back into the conversation.

use crate::agent::llm::ToolCallFunction;
use crate::analysis::{run_analysis, AnalysisCache, AnalysisError, AnalysisKind, AnalysisOutput};
use crate::charts::{ChartKind, ChartRenderer};
use crate::data::Dataset;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ANALYZE_DATA: &str = "analyze_data";
pub const CREATE_CHART: &str = "create_chart";

/// Tool definition for Ollama's tool-calling API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Get all tool definitions for the LLM.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    let analysis_types: Vec<&str> = AnalysisKind::ALL
        .iter()
        .map(|k| k.as_str())
        .chain(["all"])
        .collect();
    let chart_types: Vec<&str> = ChartKind::ALL.iter().map(|k| k.as_str()).collect();

    vec![
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: ANALYZE_DATA.to_string(),
                description: "Run statistical analysis on the production dataset. Use this to get failure rates, identify risk factors, find high-risk machines, or tally failure types.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "analysis_type": {
                            "type": "string",
                            "enum": analysis_types,
                            "description": "Type of analysis to run. Use 'all' for a comprehensive analysis."
                        }
                    },
                    "required": ["analysis_type"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: CREATE_CHART.to_string(),
                description: "Generate a chart that visualizes the production data.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "chart_type": {
                            "type": "string",
                            "enum": chart_types,
                            "description": "Type of chart to generate"
                        }
                    },
                    "required": ["chart_type"]
                }),
            },
        },
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalyzeDataArgs {
    #[serde(default)]
    pub analysis_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateChartArgs {
    #[serde(default)]
    pub chart_type: Option<String>,
}

/// A decoded tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    AnalyzeData(AnalyzeDataArgs),
    CreateChart(CreateChartArgs),
    Unknown(String),
}

impl ToolRequest {
    pub fn decode(call: &ToolCallFunction) -> Self {
        match call.name.as_str() {
            ANALYZE_DATA => ToolRequest::AnalyzeData(decode_arguments(&call.name, &call.arguments)),
            CREATE_CHART => ToolRequest::CreateChart(decode_arguments(&call.name, &call.arguments)),
            other => ToolRequest::Unknown(other.to_string()),
        }
    }
}

/// Decode a loosely typed argument payload.
///
/// Accepts an object or a JSON-encoded string of one. Anything that does not
/// decode yields the empty argument set.
pub fn decode_arguments<T: DeserializeOwned + Default>(tool: &str, raw: &Value) -> T {
    let value = match raw {
        Value::Null => return T::default(),
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not decode {} arguments {:?}: {}", tool, encoded, e);
                return T::default();
            }
        },
        other => other.clone(),
    };

    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Ignoring malformed {} arguments: {}", tool, e);
        T::default()
    })
}

/// Which analyses `analyze_data` should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSelection {
    All,
    One(AnalysisKind),
}

impl FromStr for AnalysisSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(AnalysisSelection::All)
        } else {
            s.parse().map(AnalysisSelection::One)
        }
    }
}

/// Payload of an `analysis` outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisData {
    Single(AnalysisOutput),
    /// Every analysis, keyed by kind name.
    All(BTreeMap<&'static str, AnalysisOutput>),
}

/// Result of executing a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolOutcome {
    Analysis { data: AnalysisData },
    Chart { chart_type: ChartKind, image: String },
    Error { message: String },
}

impl ToolOutcome {
    pub fn error(message: impl fmt::Display) -> Self {
        ToolOutcome::Error {
            message: message.to_string(),
        }
    }

    pub fn chart_image(&self) -> Option<&str> {
        match self {
            ToolOutcome::Chart { image, .. } => Some(image),
            _ => None,
        }
    }

    /// Text folded into the conversation as the tool-result message.
    ///
    /// Chart images are replaced by a short note; the encoded payload is
    /// returned to the caller separately.
    pub fn history_content(&self) -> String {
        let rendered = match self {
            ToolOutcome::Chart { chart_type, image } => serde_json::to_string(&json!({
                "type": "chart",
                "chart_type": chart_type,
                "image": format!("[{} chart rendered, {} bytes, shown to the user]", chart_type, image.len()),
            })),
            other => serde_json::to_string(other),
        };
        rendered.unwrap_or_else(|e| {
            json!({"type": "error", "message": format!("Failed to encode tool result: {}", e)})
                .to_string()
        })
    }
}

/// Routes decoded tool calls to the analysis engine and chart renderer.
#[derive(Clone)]
pub struct ToolDispatcher {
    renderer: Arc<dyn ChartRenderer>,
    high_risk_threshold: f64,
}

impl ToolDispatcher {
    pub fn new(renderer: Arc<dyn ChartRenderer>, high_risk_threshold: f64) -> Self {
        Self {
            renderer,
            high_risk_threshold,
        }
    }

    /// Execute one tool call against the session's dataset and cache.
    pub fn dispatch(
        &self,
        call: &ToolCallFunction,
        dataset: &Dataset,
        cache: &mut AnalysisCache,
    ) -> ToolOutcome {
        info!("Executing tool: {}", call.name);
        debug!("Tool arguments: {}", call.arguments);

        let outcome = match ToolRequest::decode(call) {
            ToolRequest::AnalyzeData(args) => self.analyze(args, dataset, cache),
            ToolRequest::CreateChart(args) => self.chart(args, dataset, cache),
            ToolRequest::Unknown(name) => ToolOutcome::error(format!("Unknown tool: {}", name)),
        };

        if let ToolOutcome::Error { message } = &outcome {
            warn!("Tool {} failed: {}", call.name, message);
        }
        outcome
    }

    /// Return the cached result for `kind`, computing and caching it if absent.
    fn cached_or_run(
        &self,
        kind: AnalysisKind,
        dataset: &Dataset,
        cache: &mut AnalysisCache,
    ) -> Result<AnalysisOutput, AnalysisError> {
        if let Some(output) = cache.get(kind) {
            debug!("Reusing cached {} analysis", kind);
            return Ok(output.clone());
        }
        let output = run_analysis(kind, dataset, self.high_risk_threshold)?;
        cache.insert(output.clone());
        Ok(output)
    }

    fn analyze(
        &self,
        args: AnalyzeDataArgs,
        dataset: &Dataset,
        cache: &mut AnalysisCache,
    ) -> ToolOutcome {
        let requested = args.analysis_type.as_deref().unwrap_or("all");
        let selection = match requested.parse::<AnalysisSelection>() {
            Ok(selection) => selection,
            Err(message) => return ToolOutcome::error(message),
        };

        let data = match selection {
            AnalysisSelection::One(kind) => self
                .cached_or_run(kind, dataset, cache)
                .map(AnalysisData::Single),
            AnalysisSelection::All => AnalysisKind::ALL
                .into_iter()
                .map(|kind| -> Result<_, AnalysisError> {
                    Ok((kind.as_str(), self.cached_or_run(kind, dataset, cache)?))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(AnalysisData::All),
        };

        match data {
            Ok(data) => ToolOutcome::Analysis { data },
            Err(e) => ToolOutcome::error(e),
        }
    }

    fn chart(&self, args: CreateChartArgs, dataset: &Dataset, cache: &mut AnalysisCache) -> ToolOutcome {
        let Some(requested) = args.chart_type else {
            return ToolOutcome::error("Missing required parameter: chart_type");
        };
        let kind = match requested.parse::<ChartKind>() {
            Ok(kind) => kind,
            Err(message) => return ToolOutcome::error(message),
        };

        let rendered = match kind {
            ChartKind::FailureByType => self.renderer.failure_rate_by_type(dataset),
            ChartKind::FailureDistribution => self.renderer.failure_distribution(dataset),
            ChartKind::MachineComparison => self.renderer.machine_comparison(dataset),
            ChartKind::RiskFactors => {
                if let Err(e) = self.cached_or_run(AnalysisKind::RiskFactors, dataset, cache) {
                    return ToolOutcome::error(e);
                }
                match cache.risk_factors() {
                    Some(factors) => self.renderer.risk_factors(factors),
                    None => Ok(None),
                }
            }
        };

        match rendered {
            Ok(Some(image)) => ToolOutcome::Chart {
                chart_type: kind,
                image,
            },
            Ok(None) => ToolOutcome::error(format!(
                "Could not generate {} chart - required columns not found",
                kind
            )),
            Err(e) => ToolOutcome::error(e),
        }
    }
}
