//! The periodic collection loop
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, MissedTickBehavior};

use crate::collector::{DeviceCollector, DeviceReport};
use crate::config::CollectionMode;
use crate::registry::DeviceRegistry;
use crate::sink::Sink;

/// Summary of one collection cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices returned by the registry
    pub devices: usize,
    /// Devices that accepted a session
    pub succeeded: usize,
    pub failed: usize,
    /// Points accepted by the sink
    pub points: usize,
    /// Points transmitted by the flush; `None` when the flush failed or the
    /// cycle was skipped
    pub flushed: Option<usize>,
}

impl CycleReport {
    fn record(&mut self, device: &DeviceReport) {
        if device.connected {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.points += device.points;
    }
}

/// Runs a collection cycle over every registered device on a fixed period
pub struct Scheduler {
    registry: Arc<dyn DeviceRegistry>,
    collector: Arc<DeviceCollector>,
    sink: Arc<dyn Sink>,
    mode: CollectionMode,
    max_concurrent: usize,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        collector: Arc<DeviceCollector>,
        sink: Arc<dyn Sink>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            collector,
            sink,
            mode: CollectionMode::Parallel,
            max_concurrent: 32,
            interval,
        }
    }

    /// Set how devices are scheduled within a cycle
    pub fn with_mode(mut self, mode: CollectionMode, max_concurrent: usize) -> Self {
        self.mode = mode;
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Poll every device once, then flush the sink
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let hosts = match self.registry.list_devices().await {
            Ok(hosts) if hosts.is_empty() => {
                warn!("{} returned no devices, skipping cycle", self.registry.name());
                return report;
            }
            Ok(hosts) => hosts,
            Err(e) => {
                error!("Skipping cycle: {}", e);
                return report;
            }
        };

        report.devices = hosts.len();
        debug!("Starting cycle over {} devices ({:?})", hosts.len(), self.mode);

        match self.mode {
            CollectionMode::Parallel => self.collect_parallel(hosts, &mut report).await,
            CollectionMode::Sequential => self.collect_sequential(hosts, &mut report).await,
        }

        report.flushed = match self.sink.flush().await {
            Ok(sent) => Some(sent),
            Err(e) => {
                error!("Flush to {} failed: {}", self.sink.name(), e);
                None
            }
        };

        report
    }

    async fn collect_parallel(&self, hosts: Vec<String>, report: &mut CycleReport) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for host in hosts {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let collector = Arc::clone(&self.collector);
            tasks.spawn(async move {
                let _permit = permit;
                collector.collect(&host).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            settle(result, report);
        }
    }

    async fn collect_sequential(&self, hosts: Vec<String>, report: &mut CycleReport) {
        let mut tasks = JoinSet::new();

        for host in hosts {
            let collector = Arc::clone(&self.collector);
            tasks.spawn(async move { collector.collect(&host).await });
            if let Some(result) = tasks.join_next().await {
                settle(result, report);
            }
        }
    }

    /// Run cycles until `shutdown` resolves, then release the sink and registry
    ///
    /// The first cycle starts immediately. Each cycle runs in its own task so
    /// a panic is contained to that cycle. A cycle in flight at shutdown is
    /// abandoned.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Collecting every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let scheduler = Arc::clone(&self);
            let mut cycle = tokio::spawn(async move { scheduler.run_cycle().await });

            tokio::select! {
                _ = &mut shutdown => {
                    cycle.abort();
                    info!("Abandoning collection cycle in progress");
                    break;
                }
                result = &mut cycle => match result {
                    Ok(report) => info!(
                        "Cycle complete: {} devices, {} ok, {} failed, {} points, flushed {}",
                        report.devices,
                        report.succeeded,
                        report.failed,
                        report.points,
                        report.flushed.map_or_else(|| "none".to_string(), |n| n.to_string())
                    ),
                    Err(e) => error!("Collection cycle aborted: {}", e),
                },
            }
        }

        info!("Shutting down");
        self.close().await;
    }

    /// Flush and close the sink, then close the registry
    pub async fn close(&self) {
        if let Err(e) = self.sink.close().await {
            error!("Closing {} failed: {}", self.sink.name(), e);
        }
        self.registry.close().await;
    }
}

fn settle(result: Result<DeviceReport, JoinError>, report: &mut CycleReport) {
    match result {
        Ok(device) => report.record(&device),
        Err(e) => {
            error!("Device task failed: {}", e);
            report.failed += 1;
        }
    }
}
