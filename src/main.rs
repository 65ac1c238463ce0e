//! CLI entry point for the CTA arrival publisher.
//!
//! `run` polls Bus Tracker and Train Tracker on a fixed interval and publishes
//! per-stop ETAs to MQTT until interrupted. `list-stops` prints the resolved
//! stop registry and exits.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cta_mqtt::config::AppConfig;
use cta_mqtt::publish::MqttPublisher;
use cta_mqtt::registry::StopRegistry;
use cta_mqtt::scheduler::UpdateCycle;
use cta_mqtt::tracker::{BusTracker, TrainTracker};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "cta_mqtt")]
#[command(about = "Publish CTA bus and train arrival estimates to MQTT", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the prediction APIs and publish ETAs until interrupted
    Run {
        /// Seconds between update cycles (overrides UPDATE_INTERVAL_SECS)
        #[arg(short, long)]
        interval: Option<u64>,

        /// JSON stop registry (overrides STOPS_FILE)
        #[arg(short, long, value_name = "FILE")]
        stops: Option<String>,

        /// Number of update cycles to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        cycles: usize,
    },
    /// Print the monitored stops and their topics
    ListStops {
        /// JSON stop registry (overrides STOPS_FILE)
        #[arg(short, long, value_name = "FILE")]
        stops: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _log_guard = init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            interval,
            stops,
            cycles,
        } => run(interval, stops, cycles).await?,
        Commands::ListStops { stops } => {
            let stops = stops.or_else(|| std::env::var("STOPS_FILE").ok());
            let registry = load_registry(stops.as_deref())?;
            list_stops(&registry);
        }
    }

    Ok(())
}

/// Colored stderr plus a JSON daily-rolling log file.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/cta_mqtt.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("cta_mqtt.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

fn load_registry(path: Option<&str>) -> Result<StopRegistry> {
    let registry = match path {
        Some(path) => {
            StopRegistry::load(path).with_context(|| format!("loading stop registry {path}"))?
        }
        None => StopRegistry::default(),
    };
    if registry.is_empty() {
        bail!("stop registry has no stops or aggregates");
    }
    Ok(registry)
}

fn list_stops(registry: &StopRegistry) {
    for spec in registry.bus_stops().chain(registry.rail_stops()) {
        info!(
            mode = %spec.mode,
            stop_id = %spec.stop_id,
            route = ?spec.route,
            topic = %spec.topic,
            "Stop"
        );
    }
    for group in registry.aggregates() {
        let members: Vec<&str> = group.members.iter().map(|m| m.topic.as_str()).collect();
        info!(
            name = %group.name,
            topic = %group.topic,
            members = ?members,
            "Aggregate"
        );
    }
}

/// Connects, then runs update cycles until `cycles` complete or Ctrl+C.
async fn run(interval: Option<u64>, stops: Option<String>, cycles: usize) -> Result<()> {
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(secs) = interval {
        if secs == 0 {
            bail!("--interval must be greater than 0");
        }
        config.update_interval = Duration::from_secs(secs);
    }
    if stops.is_some() {
        config.stops_file = stops;
    }
    info!(config = ?config, "Configuration loaded");

    let registry = load_registry(config.stops_file.as_deref())?;

    let bus = Arc::new(
        BusTracker::new(&config.bus_api_url, &config.bus_api_key, config.http_timeout)
            .context("building Bus Tracker client")?,
    );
    let rail = Arc::new(
        TrainTracker::new(&config.rail_api_url, &config.rail_api_key, config.http_timeout)
            .context("building Train Tracker client")?,
    );

    let publisher = Arc::new(MqttPublisher::new(&config.broker));
    publisher
        .connect()
        .await
        .context("initial MQTT connection failed")?;

    let mut cycle = UpdateCycle::new(
        registry,
        bus,
        rail,
        publisher.clone(),
        config.update_interval,
        config.timezone,
    );

    if cycles == 0 {
        info!(
            interval_secs = config.update_interval.as_secs(),
            "Publishing indefinitely. Press Ctrl+C to stop."
        );
    } else {
        info!(cycles, interval_secs = config.update_interval.as_secs(), "Starting update cycles");
    }

    tokio::select! {
        _ = cycle.run(cycles) => info!("Requested cycles complete"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for interrupt, shutting down"),
        },
    }

    publisher.disconnect().await;
    Ok(())
}
