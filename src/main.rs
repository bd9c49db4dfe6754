use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::config::{Settings, DEFAULT_SETTINGS_PATH, DEFAULT_SOURCES_PATH};

mod commands;

#[derive(Parser)]
#[command(
    name = "sentinel",
    version,
    about = "Detects data source updates from lightweight metadata",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to logging.format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Sources file
    #[arg(long, global = true, default_value = DEFAULT_SOURCES_PATH)]
    sources: PathBuf,

    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// State file, overrides state.path
    #[arg(long, global = true)]
    state: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check sources for updates
    Check {
        /// Check a single source
        #[arg(short, long)]
        source: Option<String>,

        /// Write a CSV report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip timestamp verification
        #[arg(long, default_value = "false")]
        no_verify: bool,
    },

    /// List configured sources
    List,

    /// Show stored state
    State {
        /// Show a single source
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Forget stored state
    Clear {
        /// Forget a single source
        #[arg(short, long, conflicts_with = "all", required_unless_present = "all")]
        source: Option<String>,

        /// Forget every source
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Missing .env is fine
    dotenvy::dotenv().ok();

    let mut settings = Settings::load_or_default(&cli.settings)?.with_env_overrides();
    if let Some(state) = cli.state {
        settings.state.path = state;
    }

    let log_format = cli
        .log_format
        .unwrap_or_else(|| settings.logging.format.clone());
    setup_tracing(&log_format, &settings.logging.level, cli.verbose)?;

    settings.validate().context("Invalid settings")?;

    match cli.command {
        Commands::Check {
            source,
            output,
            no_verify,
        } => {
            tracing::info!(
                source = ?source,
                output = ?output,
                no_verify = %no_verify,
                "Starting check command"
            );
            let params = commands::CheckParams {
                sources_path: cli.sources,
                source,
                output,
                verify: !no_verify,
            };
            commands::check(settings, params).await?;
        }

        Commands::List => {
            commands::list(&cli.sources)?;
        }

        Commands::State { source } => {
            commands::show_state(&settings, source.as_deref())?;
        }

        Commands::Clear { source, all } => {
            tracing::info!(source = ?source, all = %all, "Starting clear command");
            commands::clear(&settings, source.as_deref(), all)?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("sentinel=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("sentinel={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sentinel=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
