//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// linehealth - LLM-powered production line health advisor
///
/// Load a production CSV, let a local model analyze failure rates, risk
/// factors and machine health with statistical tools, and get a
/// Markdown/JSON report with charts.
///
/// Examples:
///   linehealth --data production.csv
///   linehealth --data production.csv --model qwen2.5:14b --chat
///   linehealth --data production.csv --format json --output report.json
///   linehealth --data production.csv --dry-run
///   linehealth --check
///   linehealth --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Production data CSV to analyze
    #[arg(
        short,
        long,
        value_name = "CSV",
        required_unless_present_any = ["init_config", "check"]
    )]
    pub data: Option<PathBuf>,

    /// Ollama model to use for analysis
    ///
    /// Must support tool calling. Can also be set via LINEHEALTH_MODEL or
    /// .linehealth.toml.
    #[arg(short, long, env = "LINEHEALTH_MODEL")]
    pub model: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Ollama API endpoint URL
    ///
    /// A bare host such as 127.0.0.1:11434 is treated as http.
    #[arg(long, env = "OLLAMA_HOST", value_name = "URL")]
    pub ollama_url: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .linehealth.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    ///
    /// No timeout unless set here or in the config file.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum agent rounds per question
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<usize>,

    /// Failure rate above which a machine is reported as high risk
    #[arg(long, value_name = "RATE")]
    pub high_risk_threshold: Option<f64>,

    /// Directory where chart SVG files are written
    #[arg(long, value_name = "DIR")]
    pub charts_dir: Option<PathBuf>,

    /// Ask follow-up questions interactively after the report
    #[arg(long, conflicts_with = "dry_run")]
    pub chat: bool,

    /// Dry run: load and summarize the data without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Check that the Ollama endpoint is reachable and exit
    #[arg(long)]
    pub check: bool,

    /// Generate a default .linehealth.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if !self.check {
            let Some(data) = &self.data else {
                return Err("--data is required".to_string());
            };
            if !data.exists() {
                return Err(format!("Data file does not exist: {}", data.display()));
            }
            if !data.is_file() {
                return Err(format!("Data path is not a file: {}", data.display()));
            }
        }

        if let Some(url) = &self.ollama_url {
            if url.trim().is_empty() {
                return Err("Ollama URL cannot be empty".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if let Some(threshold) = self.high_risk_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("High-risk threshold must be between 0.0 and 1.0".to_string());
            }
        }

        if self.max_rounds == Some(0) {
            return Err("Max rounds must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/production_sample.csv");

    fn make_args() -> Args {
        Args::parse_from(["linehealth", "--data", SAMPLE])
    }

    #[test]
    fn test_defaults() {
        let args = make_args();
        assert_eq!(args.format, OutputFormat::Markdown);
        assert!(args.output.is_none());
        assert!(args.timeout.is_none());
        assert!(!args.chat);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_data_required_unless_init_or_check() {
        assert!(Args::try_parse_from(["linehealth"]).is_err());
        assert!(Args::try_parse_from(["linehealth", "--init-config"]).is_ok());

        let args = Args::try_parse_from(["linehealth", "--check"]).unwrap();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_chat_conflicts_with_dry_run() {
        assert!(Args::try_parse_from(["linehealth", "--data", SAMPLE, "--chat", "--dry-run"]).is_err());
    }

    #[test]
    fn test_validation_missing_file() {
        let mut args = make_args();
        args.data = Some(PathBuf::from("/definitely/not/here.csv"));
        assert!(args.validate().unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_validation_ranges() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.max_rounds = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ollama_url = Some("  ".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
