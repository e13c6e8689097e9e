//! Production-line analyses.
//!
//! Every function here reads a [`Dataset`] and never mutates it. A missing
//! column does not fail an analysis; it yields a result carrying an explicit
//! "not found" marker so the conversation can continue. Genuine data
//! problems (e.g. a text indicator column) are returned as [`AnalysisError`].

use super::columns::{find_column, ColumnRole};
use super::stats::{self, GroupStats};
use super::AnalysisError;
use crate::data::{Column, Dataset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Multiple of the overall rate above which an entity is flagged.
pub const HIGH_RISK_MULTIPLIER: f64 = 1.5;

/// Default failure-rate threshold for [`get_high_risk_machines`].
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 0.05;

/// Maximum number of entities reported in any ranking.
pub const MAX_RANKED_MACHINES: usize = 10;

/// Correlation above which a factor is "strong".
pub const STRONG_CORRELATION: f64 = 0.3;

/// Correlation above which a factor is "moderate".
pub const MODERATE_CORRELATION: f64 = 0.1;

/// Result that may be unavailable because a required column is missing.
///
/// Serializes either as the inner value or as `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Findings<T> {
    Found(T),
    Unavailable { error: String },
}

impl<T> Findings<T> {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Findings::Unavailable {
            error: message.into(),
        }
    }

    pub fn found(&self) -> Option<&T> {
        match self {
            Findings::Found(v) => Some(v),
            Findings::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Findings::Found(_))
    }
}

/// Per-entity failure statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStats {
    pub machine_id: String,
    pub failure_rate: f64,
    pub total_failures: u64,
    pub sample_count: usize,
}

impl MachineStats {
    fn from_group(group: &GroupStats) -> Option<Self> {
        Some(Self {
            machine_id: group.key.clone(),
            failure_rate: group.mean?,
            total_failures: group.sum.round() as u64,
            sample_count: group.count,
        })
    }
}

/// Output of [`analyze_failure_rates`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRateAnalysis {
    pub total_records: usize,
    pub analysis_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_failure_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_failures: Option<u64>,
    /// Mean indicator value per product type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_product_type: Option<BTreeMap<String, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_risk_machines: Option<Vec<MachineStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_machines: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    pub fn classify(correlation: f64) -> Self {
        let magnitude = correlation.abs();
        if magnitude > STRONG_CORRELATION {
            Strength::Strong
        } else if magnitude > MODERATE_CORRELATION {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

/// A numeric column's correlation with the failure indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    /// Pearson coefficient, rounded to 4 decimal places.
    pub correlation: f64,
    pub strength: Strength,
    pub direction: Direction,
}

impl RiskFactor {
    fn new(factor: &str, raw: f64) -> Self {
        // Strength follows the reported (rounded) value; direction follows the sign.
        let correlation = stats::round_to(raw, 4);
        Self {
            factor: factor.to_string(),
            correlation,
            strength: Strength::classify(correlation),
            direction: if raw > 0.0 {
                Direction::Positive
            } else {
                Direction::Negative
            },
        }
    }
}

/// Occurrences of one failure category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureTypeCount {
    pub failure_type: String,
    pub count: usize,
}

/// Locate the indicator column and return its values.
///
/// `Ok(None)` when no indicator column exists.
fn indicator(dataset: &Dataset) -> Result<Option<(&Column, &[Option<f64>])>, AnalysisError> {
    let Some(column) = find_column(dataset, ColumnRole::Indicator) else {
        return Ok(None);
    };
    let values = column
        .as_numeric()
        .ok_or_else(|| AnalysisError::NonNumericIndicator {
            column: column.name().to_string(),
        })?;
    Ok(Some((column, values)))
}

/// Sort entities by descending failure rate (stable) and keep the top N.
fn rank_machines(mut machines: Vec<MachineStats>) -> Vec<MachineStats> {
    machines.sort_by(|a, b| b.failure_rate.total_cmp(&a.failure_rate));
    machines.truncate(MAX_RANKED_MACHINES);
    machines
}

/// Overall failure rate, plus breakdowns by product type and by machine.
pub fn analyze_failure_rates(dataset: &Dataset) -> Result<FailureRateAnalysis, AnalysisError> {
    let mut result = FailureRateAnalysis {
        total_records: dataset.len(),
        analysis_available: false,
        error: None,
        overall_failure_rate: None,
        total_failures: None,
        by_product_type: None,
        high_risk_machines: None,
        total_machines: None,
    };

    let Some((target, values)) = indicator(dataset)? else {
        result.error = Some(format!("No {} column found", ColumnRole::Indicator.label()));
        return Ok(result);
    };

    let overall = stats::mean(values).ok_or_else(|| AnalysisError::EmptyIndicator {
        column: target.name().to_string(),
    })?;

    result.analysis_available = true;
    result.overall_failure_rate = Some(overall);
    result.total_failures = Some(stats::sum(values).round() as u64);

    if let Some(type_col) = find_column(dataset, ColumnRole::Category) {
        let by_type: BTreeMap<String, f64> = stats::group_by(type_col, values)
            .into_iter()
            .filter_map(|g| Some((g.key, g.mean?)))
            .collect();
        result.by_product_type = Some(by_type);
    }

    if let Some(machine_col) = find_column(dataset, ColumnRole::Entity) {
        let groups = stats::group_by(machine_col, values);
        let cutoff = overall * HIGH_RISK_MULTIPLIER;

        let flagged = groups
            .iter()
            .filter_map(MachineStats::from_group)
            .filter(|m| m.failure_rate > cutoff)
            .collect();

        result.high_risk_machines = Some(rank_machines(flagged));
        result.total_machines = Some(groups.len());
    }

    debug!(
        "Failure rate analysis: rate={:.4}, records={}",
        overall, result.total_records
    );

    Ok(result)
}

/// Correlate every other numeric column with the failure indicator.
///
/// Factors come back sorted by descending absolute correlation; ties keep
/// column order.
pub fn identify_risk_factors(dataset: &Dataset) -> Result<Findings<Vec<RiskFactor>>, AnalysisError> {
    let Some((target, target_values)) = indicator(dataset)? else {
        return Ok(Findings::unavailable("No target column found"));
    };

    let mut factors: Vec<RiskFactor> = dataset
        .columns()
        .iter()
        .filter(|c| c.name() != target.name())
        .filter_map(|c| {
            let values = c.as_numeric()?;
            let r = stats::pearson(values, target_values)?;
            Some(RiskFactor::new(c.name(), r))
        })
        .collect();

    factors.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));

    debug!("Identified {} risk factors", factors.len());
    Ok(Findings::Found(factors))
}

/// Machines whose failure rate is strictly above `threshold`, worst first.
pub fn get_high_risk_machines(
    dataset: &Dataset,
    threshold: f64,
) -> Result<Findings<Vec<MachineStats>>, AnalysisError> {
    let Some((_, values)) = indicator(dataset)? else {
        return Ok(Findings::unavailable(format!(
            "No {} column found",
            ColumnRole::Indicator.label()
        )));
    };
    let Some(machine_col) = find_column(dataset, ColumnRole::Entity) else {
        return Ok(Findings::unavailable(format!(
            "No {} column found",
            ColumnRole::Entity.label()
        )));
    };

    let machines = stats::group_by(machine_col, values)
        .iter()
        .filter_map(MachineStats::from_group)
        .filter(|m| m.failure_rate > threshold)
        .collect();

    Ok(Findings::Found(rank_machines(machines)))
}

/// Count of records per failure type, most frequent first.
pub fn analyze_failure_types(dataset: &Dataset) -> Findings<Vec<FailureTypeCount>> {
    let Some(column) = find_column(dataset, ColumnRole::FailureType) else {
        return Findings::unavailable("No failure type column found");
    };

    let counts = stats::value_counts(column, 0..dataset.len())
        .into_iter()
        .map(|(failure_type, count)| FailureTypeCount {
            failure_type,
            count,
        })
        .collect();

    Findings::Found(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 100 rows, 10 machines, 5 failures (machine M01 has 3, M02 has 2).
    fn hundred_rows() -> Dataset {
        let target: Vec<f64> = (0..100)
            .map(|i| if [0, 10, 20, 1, 11].contains(&i) { 1.0 } else { 0.0 })
            .collect();
        let machines: Vec<String> = (0..100).map(|i| format!("M{:02}", i % 10)).collect();
        let types: Vec<&str> = (0..100).map(|i| if i % 2 == 0 { "L" } else { "H" }).collect();
        let wear: Vec<f64> = (0..100).map(|i| target[i] * 200.0 + (i % 7) as f64).collect();
        let noise: Vec<f64> = (0..100).map(|i| ((i * 37) % 11) as f64).collect();

        Dataset::from_columns(vec![
            Column::numeric("UDI", (1..=100).map(|i| i as f64)),
            Column::text("Product_ID", machines),
            Column::text("Type", types),
            Column::numeric("Tool_wear_min", wear),
            Column::numeric("Noise", noise),
            Column::numeric("Constant", vec![1.0; 100]),
            Column::numeric("Target", target),
        ])
        .unwrap()
    }

    #[test]
    fn test_known_failure_rate() {
        let result = analyze_failure_rates(&hundred_rows()).unwrap();

        assert!(result.analysis_available);
        assert_eq!(result.total_records, 100);
        assert_eq!(result.overall_failure_rate, Some(0.05));
        assert_eq!(result.total_failures, Some(5));
        assert_eq!(result.total_machines, Some(10));
    }

    #[test]
    fn test_failure_count_matches_rate() {
        let result = analyze_failure_rates(&hundred_rows()).unwrap();
        let rate = result.overall_failure_rate.unwrap();
        assert!((0.0..=1.0).contains(&rate));
        assert_eq!(
            result.total_failures.unwrap(),
            (rate * result.total_records as f64).round() as u64
        );
    }

    #[test]
    fn test_failure_rates_by_type_and_machine() {
        let result = analyze_failure_rates(&hundred_rows()).unwrap();

        let by_type = result.by_product_type.unwrap();
        // Failures at rows 0, 10, 20 (L) and 1, 11 (H); 50 rows each.
        assert_eq!(by_type.get("L"), Some(&0.06));
        assert_eq!(by_type.get("H"), Some(&0.04));

        // Cutoff is 0.075: M00 (0.3) and M01 (0.2) qualify.
        let high_risk = result.high_risk_machines.unwrap();
        assert_eq!(high_risk.len(), 2);
        assert_eq!(high_risk[0].machine_id, "M00");
        assert_eq!(high_risk[0].total_failures, 3);
        assert_eq!(high_risk[0].sample_count, 10);
        assert_eq!(high_risk[1].machine_id, "M01");
    }

    #[test]
    fn test_failure_rates_without_indicator() {
        let ds = Dataset::from_columns(vec![Column::numeric("col1", [1.0, 2.0])]).unwrap();
        let result = analyze_failure_rates(&ds).unwrap();

        assert!(!result.analysis_available);
        assert_eq!(result.total_records, 2);
        assert_eq!(result.error.as_deref(), Some("No target/failure column found"));
        assert!(result.overall_failure_rate.is_none());
    }

    #[test]
    fn test_text_indicator_is_an_error() {
        let ds = Dataset::from_columns(vec![Column::text("Failure_Type", ["None", "Wear"])]).unwrap();
        let err = analyze_failure_rates(&ds).unwrap_err();
        assert!(matches!(err, AnalysisError::NonNumericIndicator { .. }));
    }

    #[test]
    fn test_risk_factors_sorted_and_classified() {
        let factors = identify_risk_factors(&hundred_rows()).unwrap();
        let factors = factors.found().unwrap();

        // Constant column has undefined correlation and is dropped.
        assert!(factors.iter().all(|f| f.factor != "Constant"));
        assert!(factors.iter().all(|f| f.factor != "Target"));
        assert_eq!(factors[0].factor, "Tool_wear_min");
        assert_eq!(factors[0].strength, Strength::Strong);
        assert_eq!(factors[0].direction, Direction::Positive);

        for pair in factors.windows(2) {
            assert!(pair[0].correlation.abs() >= pair[1].correlation.abs());
        }
        for f in factors {
            assert_eq!(f.strength, Strength::classify(f.correlation));
            assert_eq!(f.correlation, stats::round_to(f.correlation, 4));
        }
    }

    #[test]
    fn test_strength_thresholds() {
        assert_eq!(Strength::classify(0.31), Strength::Strong);
        assert_eq!(Strength::classify(-0.5), Strength::Strong);
        assert_eq!(Strength::classify(0.3), Strength::Moderate);
        assert_eq!(Strength::classify(-0.11), Strength::Moderate);
        assert_eq!(Strength::classify(0.1), Strength::Weak);
        assert_eq!(Strength::classify(0.0), Strength::Weak);
    }

    #[test]
    fn test_direction_uses_sign_before_rounding() {
        let tiny = RiskFactor::new("Rotational_speed_rpm", 0.00003);
        assert_eq!(tiny.correlation, 0.0);
        assert_eq!(tiny.strength, Strength::Weak);
        assert_eq!(tiny.direction, Direction::Positive);

        let tiny_negative = RiskFactor::new("Torque_Nm", -0.00003);
        assert_eq!(tiny_negative.direction, Direction::Negative);
    }

    #[test]
    fn test_risk_factors_without_target() {
        let ds = Dataset::from_columns(vec![Column::numeric("col1", [1.0, 2.0])]).unwrap();
        let factors = identify_risk_factors(&ds).unwrap();
        assert_eq!(factors, Findings::unavailable("No target column found"));
        assert_eq!(
            serde_json::to_value(&factors).unwrap(),
            serde_json::json!({"error": "No target column found"})
        );
    }

    #[test]
    fn test_high_risk_machines_threshold_is_strict() {
        let ds = hundred_rows();

        // M00 = 0.3, M01 = 0.2, every other machine 0.0.
        let machines = get_high_risk_machines(&ds, 0.2).unwrap();
        let machines = machines.found().unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].machine_id, "M00");

        let machines = get_high_risk_machines(&ds, DEFAULT_HIGH_RISK_THRESHOLD).unwrap();
        assert_eq!(machines.found().unwrap().len(), 2);

        let none = get_high_risk_machines(&ds, 0.3).unwrap();
        assert!(none.found().unwrap().is_empty());
    }

    #[test]
    fn test_high_risk_machines_capped_at_ten() {
        let n = 24;
        let machines: Vec<String> = (0..n).map(|i| format!("M{:02}", i / 2)).collect();
        let target: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        let ds = Dataset::from_columns(vec![
            Column::text("Machine", machines),
            Column::numeric("Target", target),
        ])
        .unwrap();

        let ranked = get_high_risk_machines(&ds, 0.0).unwrap();
        let ranked = ranked.found().unwrap();
        assert_eq!(ranked.len(), MAX_RANKED_MACHINES);
        // All rates tie at 0.5, so key order is preserved.
        assert_eq!(ranked[0].machine_id, "M00");
        assert_eq!(ranked[9].machine_id, "M09");
    }

    #[test]
    fn test_high_risk_machines_missing_column() {
        let ds = Dataset::from_columns(vec![Column::numeric("Target", [0.0, 1.0])]).unwrap();
        let result = get_high_risk_machines(&ds, 0.05).unwrap();
        assert!(!result.is_available());
    }

    #[test]
    fn test_failure_types_tally() {
        let ds = Dataset::from_columns(vec![Column::text(
            "Failure_Type",
            ["No Failure", "Tool Wear", "No Failure", "Heat", "No Failure", "Tool Wear"],
        )])
        .unwrap();

        let tally = analyze_failure_types(&ds);
        let tally = tally.found().unwrap();
        assert_eq!(tally[0].failure_type, "No Failure");
        assert_eq!(tally[0].count, 3);
        assert_eq!(tally[1].failure_type, "Tool Wear");
        assert_eq!(tally[1].count, 2);
        assert_eq!(tally[2].count, 1);
    }

    #[test]
    fn test_failure_types_missing_column_is_marked() {
        let tally = analyze_failure_types(&hundred_rows());
        match tally {
            Findings::Unavailable { error } => assert_eq!(error, "No failure type column found"),
            Findings::Found(_) => panic!("expected a not-found marker"),
        }
    }
}
