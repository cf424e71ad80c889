use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use routerpulse::collector::{CollectorConfig, DeviceCollector};
use routerpulse::config::AgentConfig;
use routerpulse::connection::health;
use routerpulse::device::RestConnector;
use routerpulse::registry::{DeviceRegistry, PostgresRegistry, StaticRegistry};
use routerpulse::scheduler::Scheduler;
use routerpulse::sink::{InfluxSink, Sink};
use routerpulse::transform::{ClassificationTables, FieldClassifier, PointBuilder};
use routerpulse::util::logging;

const HEALTH_DEADLINE: Duration = Duration::from_secs(10);

/// Poll RouterOS devices and write their state to InfluxDB
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the collection interval in seconds
    #[arg(short, long, value_name = "SECS")]
    interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        AgentConfig::load(args.config.as_deref()).context("Invalid configuration")?;
    if let Some(secs) = args.interval.filter(|s| *s > 0) {
        config.collection_interval = secs;
    }

    logging::init(&config.log_level, config.log_file.as_deref());
    info!("routerpulse {} starting", routerpulse::VERSION);

    let influx = Arc::new(InfluxSink::new(&config.influx)?);
    health::check_within(influx.as_ref(), HEALTH_DEADLINE).await;
    let sink: Arc<dyn Sink> = influx;

    let registry: Arc<dyn DeviceRegistry> = match &config.registry {
        Some(db) => {
            let registry = PostgresRegistry::new(db, &config.static_hosts)?;
            health::check_within(&registry, HEALTH_DEADLINE).await;
            Arc::new(registry)
        }
        None => {
            info!("Using {} static hosts", config.static_hosts.len());
            Arc::new(StaticRegistry::new(&config.static_hosts))
        }
    };

    let classifier = FieldClassifier::new(
        Arc::new(ClassificationTables::builtin()),
        config.collector.unknown_fields,
    );
    let builder = Arc::new(PointBuilder::new(classifier, Arc::clone(&sink)));
    let connector = Arc::new(RestConnector::new(config.device.clone()));
    let collector = Arc::new(DeviceCollector::new(
        connector,
        builder,
        CollectorConfig::from(&config.device),
    ));

    let scheduler = Arc::new(
        Scheduler::new(registry, collector, sink, config.interval()).with_mode(
            config.collector.mode,
            config.collector.max_concurrent_devices,
        ),
    );

    if args.once {
        let report = scheduler.run_cycle().await;
        info!(
            "Single cycle complete: {} devices, {} ok, {} failed, {} points",
            report.devices, report.succeeded, report.failed, report.points
        );
        scheduler.close().await;
        return Ok(());
    }

    scheduler.run(shutdown_signal()).await;
    info!("Stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
