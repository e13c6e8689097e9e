//! Markdown and JSON report generation.

use crate::cli::OutputFormat;
use crate::data::SummaryStats;
use crate::models::{AnalysisReport, ReportMetadata};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str("# Production Line Health Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report));
    output.push_str(&generate_summary_section(&report.summary));
    output.push_str(&generate_stats_section(report));
    output.push_str(&generate_charts_section(&report.charts));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Data File:** `{}`\n", metadata.data_file));
    section.push_str(&format!("- **Session:** `{}`\n", metadata.session_id));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Records Analyzed:** {}\n",
        metadata.records_analyzed
    ));
    section.push_str(&format!("- **Agent Rounds:** {}\n", metadata.rounds));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_table_of_contents(report: &AnalysisReport) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Dataset Statistics](#dataset-statistics)\n");
    if !report.charts.is_empty() {
        toc.push_str("- [Charts](#charts)\n");
    }
    toc.push('\n');

    toc
}

fn generate_summary_section(summary: &str) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    if summary.trim().is_empty() {
        section.push_str("_The agent did not produce a written summary._\n\n");
    } else {
        section.push_str(summary.trim());
        section.push_str("\n\n");
    }

    section
}

/// Generate the dataset statistics table.
fn generate_stats_section(report: &AnalysisReport) -> String {
    let stats: &SummaryStats = &report.stats;
    let mut section = String::new();

    section.push_str("## Dataset Statistics\n\n");

    if let Some(warning) = &report.data_warning {
        section.push_str(&format!("> ⚠️ {}\n\n", warning));
    }

    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|---:|\n");
    section.push_str(&format!("| Records | {} |\n", stats.total_records));
    section.push_str(&format!("| Columns | {} |\n", stats.columns.len()));
    section.push_str(&format!(
        "| Numeric Columns | {} |\n",
        stats.numeric_columns.len()
    ));
    if let Some(rate) = stats.failure_rate {
        section.push_str(&format!("| Failure Rate | {:.2}% |\n", rate * 100.0));
    }
    if let Some(failures) = stats.total_failures {
        section.push_str(&format!("| Total Failures | {} |\n", failures));
    }
    if let Some(machines) = stats.unique_machines {
        section.push_str(&format!("| Machines Monitored | {} |\n", machines));
    }
    if let Some(health) = report.health() {
        section.push_str(&format!("| Health | {} {} |\n", health.emoji(), health));
    }
    section.push('\n');

    if !stats.columns.is_empty() {
        section.push_str("**Columns:** ");
        let names: Vec<String> = stats.columns.iter().map(|c| format!("`{}`", c)).collect();
        section.push_str(&names.join(", "));
        section.push_str("\n\n");
    }

    section
}

fn generate_charts_section(charts: &[String]) -> String {
    if charts.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Charts\n\n");
    for (i, path) in charts.iter().enumerate() {
        section.push_str(&format!("![Chart {}]({})\n\n", i + 1, path));
    }

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by linehealth*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render the report in `format` and write it to `path`.
pub fn write_report(report: &AnalysisReport, path: &Path, format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Markdown => generate_markdown_report(report),
        OutputFormat::Json => generate_json_report(report)?,
    };

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report: {}", path.display()))
}
