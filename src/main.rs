use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use sysstats::config::Config;
use sysstats::error::ConfigError;
use sysstats::samples::{Counter, StatVector};
use sysstats::session::StatsSession;

/// Command-line arguments for the system stats sampler
#[derive(Parser)]
#[command(
    name = "sysstats",
    about = "Sample CPU, memory, swap and disk utilization",
    long_about = "Runs the platform performance counter utility at a fixed interval and prints \
                  CPU, memory, page file and disk utilization as fractions of capacity."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Sampling interval in seconds, overriding the configuration file
    #[arg(short, long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Log every raw percentage as it is parsed
    #[arg(
        short,
        long,
        help = "Log each parsed percentage and default the log level to debug"
    )]
    debug: bool,

    /// Print one JSON object per sample
    #[arg(long)]
    json: bool,

    /// Stop after this many samples, counting the initial empty one
    #[arg(short = 'n', long, value_name = "N")]
    count: Option<usize>,
}

impl Cli {
    /// Validate the CLI arguments
    fn validate(&self) -> Result<(), String> {
        if self.interval == Some(0) {
            return Err("Interval must be at least one second".to_string());
        }

        if self.count == Some(0) {
            return Err("Sample count must be at least one".to_string());
        }

        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in load_config.
            if config_path.exists() && !config_path.is_file() {
                return Err(format!(
                    "Configuration path is not a file: {}",
                    config_path.display()
                ));
            }
        }

        Ok(())
    }
}

/// Read the configuration file, if one was given
fn read_config(config_path: Option<&PathBuf>) -> Option<Result<Config, ConfigError>> {
    config_path.map(|path| Config::from_file(path))
}

/// Default log filter when `RUST_LOG` is unset
fn log_filter(cli: &Cli, read: Option<&Result<Config, ConfigError>>) -> &'static str {
    let file_debug = matches!(read, Some(Ok(config)) if config.debug);
    if cli.debug || file_debug {
        "debug"
    } else {
        "warn"
    }
}

/// Settle on the configuration read from file, or use defaults
///
/// A missing or invalid file is reported and replaced by the defaults.
fn load_config(
    config_path: Option<&PathBuf>,
    read: Option<Result<Config, ConfigError>>,
) -> Config {
    match (config_path, read) {
        (Some(path), Some(read)) => {
            info!("Loading configuration from: {}", path.display());
            match read {
                Ok(config) => config,
                Err(ConfigError::ReadError(e)) => {
                    warn!("Configuration file unreadable ({}), using defaults", e);
                    Config::default()
                }
                Err(e) => {
                    error!("Configuration error in '{}': {}", path.display(), e);
                    warn!("Using default configuration due to invalid config file");
                    Config::default()
                }
            }
        }
        _ => {
            info!("Using default configuration");
            Config::default()
        }
    }
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_cli(cli: &Cli, mut config: Config) -> Config {
    if let Some(seconds) = cli.interval {
        config.interval_seconds = seconds;
    }
    config.debug |= cli.debug;
    config
}

/// One rendered sample in JSON output mode
#[derive(Serialize)]
struct SampleLine {
    timestamp: DateTime<Utc>,
    cpu: f64,
    memory: f64,
    swap: f64,
    disk: f64,
}

impl SampleLine {
    fn new(stats: &StatVector, timestamp: DateTime<Utc>) -> Self {
        let value = |counter: Counter| stats.get(counter).unwrap_or(0.0);
        Self {
            timestamp,
            cpu: value(Counter::Cpu),
            memory: value(Counter::Memory),
            swap: value(Counter::Swap),
            disk: value(Counter::Disk),
        }
    }
}

fn render_text(stats: &StatVector) -> String {
    Counter::ALL
        .iter()
        .map(|counter| {
            format!(
                "{} {:5.1}%",
                counter.label(),
                stats.get(*counter).unwrap_or(0.0) * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn render_json(stats: &StatVector, timestamp: DateTime<Utc>) -> serde_json::Result<String> {
    serde_json::to_string(&SampleLine::new(stats, timestamp))
}

fn run(cli: &Cli, config: Config) -> anyhow::Result<()> {
    let session = StatsSession::start(Duration::from_secs(config.interval_seconds), &config);

    let quit = session.quit_signal();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, stopping sampler...");
        if let Err(e) = quit.send(()) {
            error!("Failed to send quit signal: {}", e);
        }
    })
    .context("Error setting Ctrl+C handler")?;

    let mut printed = 0;
    for stats in session.results().iter() {
        let line = if cli.json {
            render_json(&stats, Utc::now()).context("Failed to encode sample")?
        } else {
            render_text(&stats)
        };
        println!("{}", line);

        printed += 1;
        if cli.count == Some(printed) {
            session.quit();
            break;
        }
    }

    // Let the counter source see the quit and close the channel.
    for _ in session.results().iter() {}
    session.join().context("Stats session did not shut down cleanly")?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    // The file decides the default log level, so read it before logging starts.
    let read = read_config(cli.config.as_ref());
    let default_filter = log_filter(&cli, read.as_ref());
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = apply_cli(&cli, load_config(cli.config.as_ref(), read));
    if let Err(e) = run(&cli, config) {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Sampler shutdown complete");
}
