//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.linehealth.toml` files.

use crate::agent::llm::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_TEMPERATURE};
use crate::agent::{AgentConfig, ClientConfig, DEFAULT_MAX_ROUNDS};
use crate::analysis::DEFAULT_HIGH_RISK_THRESHOLD;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".linehealth.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings.
    #[serde(default)]
    pub agent: AgentSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Directory for exported chart files.
    #[serde(default = "default_charts_dir")]
    pub charts_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            charts_dir: default_charts_dir(),
        }
    }
}

fn default_output() -> String {
    "linehealth_report.md".to_string()
}

fn default_charts_dir() -> String {
    "charts".to_string()
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama model name; must support tool calling.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds. Unset means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: None,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum model rounds per question.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Failure rate above which a machine counts as high risk.
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            high_risk_threshold: default_high_risk_threshold(),
        }
    }
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

fn default_high_risk_threshold() -> f64 {
    DEFAULT_HIGH_RISK_THRESHOLD
}

/// Prefix a bare `host:port` with `http://`, as the Ollama tooling does.
pub fn normalize_ollama_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.linehealth.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        self.model.ollama_url = normalize_ollama_url(&self.model.ollama_url);
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = Some(timeout);
        }

        if let Some(rounds) = args.max_rounds {
            self.agent.max_rounds = rounds;
        }
        if let Some(threshold) = args.high_risk_threshold {
            self.agent.high_risk_threshold = threshold;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref dir) = args.charts_dir {
            self.general.charts_dir = dir.display().to_string();
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_rounds: self.agent.max_rounds,
            high_risk_threshold: self.agent.high_risk_threshold,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.general.output)
    }

    pub fn charts_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.charts_dir)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
