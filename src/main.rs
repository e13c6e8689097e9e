//! linehealth - LLM-powered production line health advisor
//!
//! A CLI tool that loads manufacturing CSV data and lets an Ollama model
//! analyze it through statistical and charting tools, producing a health
//! report and answering follow-up questions.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, unreadable data, etc.)

mod agent;
mod analysis;
mod charts;
mod cli;
mod config;
mod data;
mod models;
mod report;

use agent::{AnalystAgent, OllamaClient, SessionStore, TurnOutcome};
use anyhow::{Context, Result};
use charts::{decode_data_uri, SvgChartRenderer};
use chrono::Utc;
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use data::{Dataset, SummaryStats};
use indicatif::{ProgressBar, ProgressStyle};
use models::{AnalysisReport, HealthStatus, ReportMetadata};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("linehealth v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .linehealth.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, Ollama URL, and agent limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete workflow for the parsed arguments.
async fn run(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    if args.check {
        return handle_check(&config).await;
    }

    let data_path = args.data.clone().context("--data is required")?;

    println!("📥 Loading production data: {}", data_path.display());
    let dataset = data::load_csv_from_path(&data_path)?;
    let stats = data::get_summary_stats(&dataset);
    let data_warning = match data::validate_production_data(&dataset) {
        Ok(()) => None,
        Err(message) => {
            warn!("{}", message);
            Some(message)
        }
    };
    println!(
        "   {} records, {} columns ({} numeric)",
        stats.total_records,
        stats.columns.len(),
        stats.numeric_columns.len()
    );

    if args.dry_run {
        handle_dry_run(&stats, data_warning.as_deref());
        return Ok(());
    }

    let start_time = Instant::now();
    let dataset = Arc::new(dataset);

    println!("🤖 Initializing AI agent...");
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Max rounds: {}", config.agent.max_rounds);
    match config.model.timeout_seconds {
        Some(seconds) => println!("   Timeout: {}s", seconds),
        None => println!("   Timeout: none"),
    }

    let client = Arc::new(OllamaClient::new(config.client_config())?);
    let renderer = Arc::new(SvgChartRenderer::new());
    let agent = AnalystAgent::new(client, renderer, config.agent_config());

    let store = SessionStore::new();
    let session_id = Uuid::new_v4().to_string();
    store.load_dataset(&session_id, dataset.clone()).await;

    println!("\n🔬 Running initial analysis...");
    let spinner = create_spinner(args.quiet, "The agent is analyzing the data...");
    let result = agent.run_initial_analysis(&store, &session_id).await;
    spinner.finish_and_clear();
    let outcome = result?;

    let charts_dir = config.charts_dir();
    let chart_paths = write_charts(&outcome.charts, &charts_dir, 0)?;

    let duration = start_time.elapsed().as_secs_f64();
    let report = AnalysisReport {
        metadata: ReportMetadata {
            data_file: data_path.display().to_string(),
            session_id: session_id.clone(),
            analysis_date: Utc::now(),
            model_used: agent.model_name().to_string(),
            records_analyzed: dataset.len(),
            rounds: outcome.rounds,
            stop_reason: outcome.stop_reason,
            duration_seconds: duration,
        },
        summary: outcome.response.clone(),
        stats,
        data_warning,
        charts: chart_paths.iter().map(|p| p.display().to_string()).collect(),
    };

    println!("\n📝 Generating report...");
    let output_path = config.output_path();
    report::write_report(&report, &output_path, args.format)?;

    print_summary(&report, &outcome);
    println!("\n✅ Analysis complete! Report saved to: {}", output_path.display());

    if args.chat {
        run_chat(&agent, &store, &session_id, dataset, &charts_dir, chart_paths.len(), args.quiet)
            .await?;
    }

    Ok(())
}

/// Handle --check: report whether Ollama is reachable.
async fn handle_check(config: &Config) -> Result<()> {
    let client = Arc::new(OllamaClient::new(config.client_config())?);
    let agent = AnalystAgent::new(
        client,
        Arc::new(SvgChartRenderer::new()),
        config.agent_config(),
    );

    println!("🔌 Checking Ollama at {}...", config.model.ollama_url);
    if agent.check_connection().await {
        println!("✅ Ollama is reachable. Model: {}", config.model.name);
        Ok(())
    } else {
        anyhow::bail!("Cannot reach Ollama at {}", config.model.ollama_url)
    }
}

/// Handle --dry-run: print what the agent would start from, without calling it.
fn handle_dry_run(stats: &SummaryStats, data_warning: Option<&str>) {
    println!("\n🔍 Dry run: summarizing data (no LLM call)...\n");
    println!("   Columns: {}", stats.columns.join(", "));
    println!("   Numeric columns: {}", stats.numeric_columns.join(", "));

    if let Some(rate) = stats.failure_rate {
        let health = HealthStatus::from_failure_rate(rate);
        println!(
            "   Failure rate: {:.2}% {} {}",
            rate * 100.0,
            health.emoji(),
            health
        );
    }
    if let Some(failures) = stats.total_failures {
        println!("   Total failures: {}", failures);
    }
    if let Some(machines) = stats.unique_machines {
        println!("   Machines: {}", machines);
    }

    match data_warning {
        None => println!("   Schema: looks like production data"),
        Some(warning) => println!("   ⚠️  Schema: {}", warning),
    }

    println!("\n✅ Dry run complete. No LLM calls were made.");
}

fn print_summary(report: &AnalysisReport, outcome: &TurnOutcome) {
    println!("\n📊 Analysis Summary:");
    println!("   Records: {}", report.stats.total_records);
    if let (Some(rate), Some(health)) = (report.stats.failure_rate, report.health()) {
        println!("   Failure rate: {:.2}% {} {}", rate * 100.0, health.emoji(), health);
    }
    println!("   Charts: {}", report.charts.len());
    println!("   Agent rounds: {} ({:?})", outcome.rounds, outcome.stop_reason);
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
}

/// Interactive follow-up questions on the same session.
async fn run_chat(
    agent: &AnalystAgent,
    store: &SessionStore,
    session_id: &str,
    dataset: Arc<Dataset>,
    charts_dir: &Path,
    mut charts_written: usize,
    quiet: bool,
) -> Result<()> {
    println!("\n💬 Ask follow-up questions. Type /reset to start over, exit to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nyou> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let question = line.trim();

        match question {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                store.load_dataset(session_id, dataset.clone()).await;
                println!("🔄 Conversation reset.");
                continue;
            }
            _ => {}
        }

        let spinner = create_spinner(quiet, "Thinking...");
        let result = agent.chat(store, session_id, question).await;
        spinner.finish_and_clear();

        match result {
            Ok(outcome) => {
                println!("\n{}", outcome.response);
                let paths = write_charts(&outcome.charts, charts_dir, charts_written)?;
                for path in &paths {
                    println!("   📈 {}", path.display());
                }
                charts_written += paths.len();
            }
            Err(e) => eprintln!("❌ {}", e),
        }
    }

    store.evict(session_id);
    println!("👋 Session closed.");
    Ok(())
}

/// Decode chart data URIs and write them as files, numbered after `offset`.
fn write_charts(images: &[String], dir: &Path, offset: usize) -> Result<Vec<PathBuf>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create charts directory: {}", dir.display()))?;

    let mut paths = Vec::with_capacity(images.len());
    for image in images {
        let Some(decoded) = decode_data_uri(image) else {
            warn!("Skipping chart that is not a base64 data URI");
            continue;
        };
        let path = dir.join(format!(
            "chart_{:02}.{}",
            offset + paths.len() + 1,
            decoded.extension()
        ));
        std::fs::write(&path, &decoded.bytes)
            .with_context(|| format!("Failed to write chart: {}", path.display()))?;
        debug!("Wrote {}", path.display());
        paths.push(path);
    }

    Ok(paths)
}

fn create_spinner(hidden: bool, message: &str) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
