//! EDA Gateway CLI
//!
//! The `edagate` command evaluates hardware design submissions against the
//! configured EDA tool services.
//!
//! ## Commands
//!
//! - `evaluate`: Unpack a submission archive, run every enabled backend and print the scores
//! - `health`: Check every tool service
//! - `score`: Re-aggregate a saved outcome map offline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edagate_core::{
    aggregate, BackendKind, BackendOutcome, EvaluationOptions, GatewayConfig, GatewayError,
    Orchestrator, ScoreBreakdown, METRICS,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

/// Exit code for a rejected submission.
const EXIT_INVALID_SUBMISSION: u8 = 2;

#[derive(Parser)]
#[command(name = "edagate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate hardware designs against EDA tool services", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Gateway configuration file (TOML)
    #[arg(short, long, global = true, env = "EDAGATE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a submission archive (.zip)
    Evaluate {
        /// Path to the submission archive
        archive: PathBuf,

        /// Also write the full result (raw reports included) to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check the health of every tool service
    Health,

    /// Re-aggregate a saved outcome map or result document
    Score {
        /// JSON file with an outcome map, or a full result document
        outcomes: PathBuf,

        /// Target clock frequency, used as the delay baseline
        #[arg(long)]
        clock_mhz: Option<f64>,

        /// Exit non-zero unless functionality reaches this score
        #[arg(long)]
        min_functionality: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    edagate_core::init_tracing(cli.json, level);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            match err
                .downcast_ref::<GatewayError>()
                .and_then(GatewayError::as_invalid)
            {
                Some(invalid) => {
                    eprintln!("Submission rejected ({}): {}", invalid.reason, invalid.detail);
                    ExitCode::from(EXIT_INVALID_SUBMISSION)
                }
                None => {
                    eprintln!("Error: {:#}", err);
                    ExitCode::FAILURE
                }
            }
        }
    };
    METRICS.flush();
    code
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Evaluate { archive, output } => {
            cmd_evaluate(config, &archive, output.as_deref()).await
        }
        Commands::Health => cmd_health(config).await,
        Commands::Score {
            outcomes,
            clock_mhz,
            min_functionality,
        } => cmd_score(&config, &outcomes, clock_mhz, min_functionality),
    }
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => GatewayConfig::from_env().context("Invalid configuration from environment"),
    }
}

async fn cmd_evaluate(config: GatewayConfig, archive: &Path, output: Option<&Path>) -> Result<ExitCode> {
    let bytes = tokio::fs::read(archive)
        .await
        .with_context(|| format!("Failed to read archive {:?}", archive))?;
    info!(archive = %archive.display(), bytes = bytes.len(), "Submitting design");

    let ctx = edagate_backends::build_context(config).context("Failed to set up tool services")?;
    let orchestrator = Orchestrator::new(ctx);
    let result = orchestrator.submit(bytes).await?;

    if let Some(path) = output {
        write_json(path, &result)?;
        info!(path = %path.display(), "Wrote full result");
    }
    print_json(&result.to_document())?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_health(config: GatewayConfig) -> Result<ExitCode> {
    let ctx = edagate_backends::build_context(config).context("Failed to set up tool services")?;
    let health = Orchestrator::new(ctx).health().await;

    let all_healthy = health.values().all(|h| h.is_healthy());
    let report: BTreeMap<&str, _> = health.iter().map(|(kind, h)| (kind.name(), h)).collect();
    print_json(&report)?;

    Ok(if all_healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_score(
    config: &GatewayConfig,
    path: &Path,
    clock_mhz: Option<f64>,
    min_functionality: Option<f64>,
) -> Result<ExitCode> {
    let scores = score_file(config, path, clock_mhz)?;
    print_json(&scores)?;

    match min_functionality {
        Some(threshold) if !scores.meets_functionality(threshold) => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn score_file(config: &GatewayConfig, path: &Path, clock_mhz: Option<f64>) -> Result<ScoreBreakdown> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let outcomes = parse_outcomes(&text).with_context(|| format!("Failed to parse {:?}", path))?;

    let options = EvaluationOptions {
        clock_frequency_mhz: clock_mhz,
        ..EvaluationOptions::default()
    };
    Ok(aggregate(&outcomes, &config.scoring_policy(&options)))
}

/// Accept either a bare outcome map or a result document with `outcomes`.
fn parse_outcomes(text: &str) -> Result<BTreeMap<BackendKind, BackendOutcome>> {
    let mut value: Value = serde_json::from_str(text).context("not valid JSON")?;
    if let Some(outcomes) = value.get_mut("outcomes") {
        value = outcomes.take();
    }
    serde_json::from_value(value).context("not an outcome map")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{}", content);
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("serialize result")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
