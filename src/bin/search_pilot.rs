//! Search pilot CLI.
//!
//! Usage:
//!   $ AZURE_OPENAI_ENDPOINT=... AZURE_OPENAI_API_KEY=... \
//!     cargo run --bin search-pilot -- run --search-text "AI news"
//!   $ OPENAI_API_KEY=... cargo run --bin search-pilot -- run --headless --pacing fast

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{error, info};
use search_pilot::config::{Pacing, PilotConfig, PilotConfigOverrides, Verbosity};
use search_pilot::logging::{LogCallback, LogConfig, LogLevel, PilotLogRecord, PilotLogger};
use search_pilot::pilot::SearchPilot;

#[derive(Parser)]
#[command(
    name = "search-pilot",
    author,
    version,
    about = "Prefill a web search and let a computer-use agent open a news article"
)]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pilot: navigate, prefill, then the agent loop.
    Run(RunArgs),
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum PacingArg {
    Interactive,
    Fast,
    None,
}

impl From<PacingArg> for Pacing {
    fn from(value: PacingArg) -> Self {
        match value {
            PacingArg::Interactive => Pacing::Interactive,
            PacingArg::Fast => Pacing::Fast,
            PacingArg::None => Pacing::None,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Search engine to open.
    #[arg(long)]
    url: Option<String>,

    /// Query typed into the search box.
    #[arg(long)]
    search_text: Option<String>,

    /// Upper bound on decision-service calls.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Run the browser without a window.
    #[arg(long)]
    headless: bool,

    /// How long the observer-facing pauses last.
    #[arg(long, value_enum)]
    pacing: Option<PacingArg>,

    /// Directory that receives snapshots.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Do not write the plain-text log file.
    #[arg(long)]
    no_log_file: bool,

    /// Print the run report as JSON when done.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let verbosity = verbosity_from_count(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args, verbosity).await?,
    }

    Ok(())
}

async fn run(args: RunArgs, verbosity: Verbosity) -> Result<()> {
    let base = PilotConfig::from_env().context("invalid environment configuration")?;
    let config = base.with_overrides(PilotConfigOverrides {
        target_url: args.url,
        search_text: args.search_text,
        max_iterations: args.max_iterations,
        headless: args.headless.then_some(true),
        pacing: args.pacing.map(Pacing::from),
        artifact_dir: args.artifact_dir,
        log_file: args.no_log_file.then_some(None),
        verbose: Some(verbosity),
    });
    info!("Starting search pilot against {}", config.target_url);

    let mut log_config = LogConfig::from_pilot_config(&config);
    log_config.external_logger = Some(make_logger_callback());
    let logger = Arc::new(PilotLogger::with_config(log_config));

    let pilot = SearchPilot::from_config(config)
        .context("failed to configure the decision service")?
        .with_logger(logger);

    match pilot.launch_and_run().await {
        Ok(report) => {
            info!(
                "Done: {} iterations, ${:.4} estimated, success: {}",
                report.agent.iterations_run,
                report.agent.total_cost,
                report.succeeded()
            );
            if args.json {
                let rendered = serde_json::to_string_pretty(&report)
                    .context("failed to render run report")?;
                println!("{rendered}");
            }
            Ok(())
        }
        Err(err) => {
            error!("Search pilot failed: {err}");
            Err(err).context("search pilot run failed")
        }
    }
}

fn make_logger_callback() -> LogCallback {
    Arc::new(|record: &PilotLogRecord| {
        let category = record.category.as_deref().unwrap_or("pilot");
        match record.level {
            LogLevel::Error => log::error!(target: "search_pilot", "[{category}] {}", record.message),
            LogLevel::Warn => log::warn!(target: "search_pilot", "[{category}] {}", record.message),
            LogLevel::Info => log::info!(target: "search_pilot", "[{category}] {}", record.message),
            LogLevel::Debug => log::debug!(target: "search_pilot", "[{category}] {}", record.message),
        }
    })
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
