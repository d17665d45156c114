use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wavescope::analytics::{BinSize, VariantOptions, VariantType};
use wavescope::config::Config;
use wavescope::metrics;
use wavescope::models::{RawObservation, TimeRange};
use wavescope::pipeline::{BatchOptions, TrendAnalyticsService};
use wavescope::storage::open_store;
use wavescope::utils::parse_time_interval;

#[derive(Parser)]
#[command(
    name = "wavescope",
    version,
    about = "Trend signal analytics: scoring, anomaly detection, forecasting and historical variants",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (WAVESCOPE_* variables still override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Reference time (RFC 3339) instead of the current time
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score raw observations and store them
    Ingest {
        /// JSON array of observations; reads stdin when omitted or "-"
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Detect anomalies for trends active in the trailing window
    Detect {
        /// Window length (e.g. 24h, 7d)
        #[arg(short, long, default_value = "24h")]
        window: String,
    },

    /// Forecast one trend
    Forecast {
        /// Trend identifier
        #[arg(short, long)]
        trend: String,

        /// Hours ahead; defaults to the configured horizon
        #[arg(long)]
        horizon: Option<u32>,
    },

    /// Generate historical variants for one trend
    Variants {
        /// Trend identifier
        #[arg(short, long)]
        trend: String,

        /// How much history to load
        #[arg(long, default_value = "30d")]
        history: String,

        /// Comma-separated variant types (snapshot, aggregated, projected, comparative)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Run every derivation for all trends active in the trailing window
    Run {
        /// Window length (e.g. 24h, 7d)
        #[arg(short, long, default_value = "24h")]
        window: String,

        /// Hours ahead; defaults to the configured horizon
        #[arg(long)]
        horizon: Option<u32>,

        /// Print Prometheus metrics to stderr when done
        #[arg(long, default_value = "false")]
        emit_metrics: bool,
    },

    /// Rank trends active in the trailing window by viral potential
    Viral {
        /// Window length (e.g. 24h, 7d)
        #[arg(short, long, default_value = "24h")]
        window: String,
    },

    /// Normalize and bin every trend point in the trailing window
    Normalize {
        /// Window length; defaults to the configured rolling window
        #[arg(short, long)]
        window: Option<String>,

        /// Bin size (minute, hourly, daily); defaults to the configured size
        #[arg(long)]
        bin: Option<BinSize>,
    },

    /// Print registered Prometheus metrics
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(config.logging.format.as_str());
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed; continuing without metrics");
    }

    let now = cli.now.unwrap_or_else(Utc::now);
    tracing::debug!(now = %now, "wavescope starting");

    match cli.command {
        Commands::Ingest { input } => {
            tracing::info!(input = ?input, "Starting ingest command");
            let service = build_service(&config)?;
            let observations = read_observations(input.as_deref()).await?;
            let report = service.ingest(&observations, now).await?;
            print_json(&report)?;
        }

        Commands::Detect { window } => {
            tracing::info!(window = %window, "Starting detect command");
            let service = build_service(&config)?;
            let window = TimeRange::trailing(now, parse_time_interval(&window)?);
            let anomalies = service.detect_anomalies(window).await?;
            print_json(&anomalies)?;
        }

        Commands::Forecast { trend, horizon } => {
            let horizon = horizon.unwrap_or(config.analytics.forecast.horizon_hours);
            tracing::info!(trend_id = %trend, horizon = horizon, "Starting forecast command");
            let service = build_service(&config)?;
            let forecast = service.generate_forecast(&trend, horizon, now).await?;
            if forecast.is_none() {
                tracing::info!(trend_id = %trend, "Not enough history to forecast");
            }
            print_json(&forecast)?;
        }

        Commands::Variants {
            trend,
            history,
            types,
        } => {
            tracing::info!(trend_id = %trend, history = %history, "Starting variants command");
            let service = build_service(&config)?;
            let range = TimeRange::trailing(now, parse_time_interval(&history)?);
            let series = service.store().query_series(&trend, range).await?;

            let mut options = VariantOptions::at(now);
            if !types.is_empty() {
                options = options.only(parse_variant_types(&types)?);
            }
            let variants = service.generate_variants(&trend, &series, &options).await?;
            print_json(&variants)?;
        }

        Commands::Run {
            window,
            horizon,
            emit_metrics,
        } => {
            tracing::info!(window = %window, horizon = ?horizon, "Starting batch run");
            let service = build_service(&config)?;
            let window = TimeRange::trailing(now, parse_time_interval(&window)?);
            let mut options = BatchOptions::at(now);
            if let Some(h) = horizon {
                options = options.with_horizon(h);
            }
            let report = tokio::select! {
                report = service.run_batch(window, &options) => report?,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to wait for Ctrl+C")?;
                    tracing::warn!("Shutdown signal received, abandoning batch run");
                    return Ok(());
                }
            };
            print_json(&report)?;

            if emit_metrics {
                let text = metrics::encode_metrics()
                    .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
                eprintln!("{text}");
            }
        }

        Commands::Viral { window } => {
            tracing::info!(window = %window, "Starting viral command");
            let service = build_service(&config)?;
            let window = TimeRange::trailing(now, parse_time_interval(&window)?);
            let report = service.analyze_viral(window, now).await?;
            print_json(&report)?;
        }

        Commands::Normalize { window, bin } => {
            tracing::info!(window = ?window, bin = ?bin, "Starting normalize command");
            let service = build_service(&config)?;
            let window = match window {
                Some(w) => TimeRange::trailing(now, parse_time_interval(&w)?),
                None => service.normalization_window(now),
            };
            let bins = service.normalize_window(window, bin).await?;
            print_json(&bins)?;
        }

        Commands::Metrics => {
            let text = metrics::encode_metrics()
                .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
            print!("{text}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env();
            config
        }
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_service(config: &Config) -> Result<TrendAnalyticsService> {
    let store = open_store(&config.storage).context("Failed to open trend store")?;
    Ok(TrendAnalyticsService::new(store, config)?)
}

async fn read_observations(input: Option<&std::path::Path>) -> Result<Vec<RawObservation>> {
    let content = match input {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read observations: {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read observations from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&content).context("Observations must be a JSON array")
}

fn parse_variant_types(types: &[String]) -> Result<BTreeSet<VariantType>> {
    types
        .iter()
        .map(|t| t.trim().parse::<VariantType>().map_err(anyhow::Error::msg))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("wavescope=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("wavescope={level},warn"))
            .context("Invalid log level")?
    };

    // stdout carries JSON results, so logs go to stderr
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
