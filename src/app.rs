//! # Gateway Assembly
//!
//! Builds every channel, poller and the port supervisor from a [`Config`],
//! and owns the background tasks until shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::fetcher::{HttpFetcher, SimulatedFetcher};
use crate::bridge::BridgeClient;
use crate::config::{BridgeMode, Config};
use crate::error::Result;
use crate::port::{PortBridge, PortSupervisor, SimulatedPortBridge};
use crate::sensors::altimeter::AltimeterData;
use crate::sensors::gps::{GpsData, GpsView};
use crate::sensors::pitot::PitotData;
use crate::sensors::servo::{ServoData, ServoView};
use crate::sensors::tacho::TachoData;
use crate::sensors::{ChannelEndpoint, RawView, Reading, SensorChannel, Simulate, View};
use crate::server::AppState;
use crate::storage::{LocalArchiveUploader, ObjectStoreUploader, Uploader};
use crate::telemetry::channel::{Channel, HistoryLimits};
use crate::telemetry::log_appender::LogAppender;
use crate::telemetry::scheduler::Scheduler;

/// Running gateway: HTTP state plus the background tasks feeding it.
#[derive(Debug)]
pub struct Gateway {
    state: AppState,
    scheduler: Scheduler,
}

impl Gateway {
    /// Opens every channel log, spawns the pollers and the port health
    /// check. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel log cannot be opened, the history
    /// limits or a polling frequency are invalid, or an HTTP client cannot
    /// be built.
    pub fn start(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let mode = config.bridge.mode;
        info!("Starting gateway in {:?} mode", mode);

        let limits = HistoryLimits::new(config.history.high_water_mark, config.history.spill_size)?;
        let client = BridgeClient::new(&config.bridge.base_url, config.bridge.timeout())?;
        let mut scheduler = Scheduler::new(cancel);

        let mut builder = ChannelBuilder {
            config,
            limits,
            client: &client,
            scheduler: &mut scheduler,
            endpoints: Vec::new(),
        };
        builder.add::<AltimeterData, _>(RawView, config.channels.altimeter)?;
        builder.add::<GpsData, _>(GpsView, config.channels.gps)?;
        builder.add::<PitotData, _>(RawView, config.channels.pitot)?;
        builder.add::<TachoData, _>(RawView, config.channels.tachometer)?;
        builder.add::<ServoData, _>(ServoView::new()?, config.channels.servo)?;
        let endpoints = builder.endpoints;

        let bridge: Arc<dyn PortBridge> = match mode {
            BridgeMode::Live => Arc::new(client.clone()),
            BridgeMode::Mock => Arc::new(SimulatedPortBridge::default()),
        };
        let ports = Arc::new(PortSupervisor::new(bridge));
        spawn_health_check(&mut scheduler, Arc::clone(&ports), config.port.health_check_interval());

        let uploader = build_uploader(config)?;
        let state = AppState::new(endpoints, ports, uploader, &config.storage.bucket);

        info!("Gateway started with {} background tasks", scheduler.task_count());
        Ok(Self { state, scheduler })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stops every poller and the health check, waiting for in-flight work.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }
}

struct ChannelBuilder<'a> {
    config: &'a Config,
    limits: HistoryLimits,
    client: &'a BridgeClient,
    scheduler: &'a mut Scheduler,
    endpoints: Vec<Arc<dyn ChannelEndpoint>>,
}

impl ChannelBuilder<'_> {
    fn add<R, V>(&mut self, view: V, frequency_hz: f64) -> Result<()>
    where
        R: Reading + Simulate,
        V: View<R> + 'static,
    {
        let history = &self.config.history;
        let log = LogAppender::open(R::KIND, &history.spool_dir, &history.archive_dir)?;
        let channel = Arc::new(Channel::new(R::KIND, self.limits, log));

        let fetch_timeout = self.config.bridge.timeout();
        match self.config.bridge.mode {
            BridgeMode::Live => self.scheduler.spawn_poller(
                Arc::clone(&channel),
                HttpFetcher::<R>::new(self.client.clone()),
                frequency_hz,
                fetch_timeout,
            )?,
            BridgeMode::Mock => self.scheduler.spawn_poller(
                Arc::clone(&channel),
                SimulatedFetcher::<R>::new(),
                frequency_hz,
                fetch_timeout,
            )?,
        }

        self.endpoints.push(Arc::new(SensorChannel::new(channel, view)));
        Ok(())
    }
}

fn spawn_health_check(scheduler: &mut Scheduler, ports: Arc<PortSupervisor>, period: Duration) {
    info!("Checking port health every {:?}", period);
    scheduler.spawn_periodic("port-health", period, move || {
        let ports = Arc::clone(&ports);
        async move {
            if let Err(e) = ports.health_check().await {
                warn!("Port health check failed: {}", e);
            }
        }
    });
}

fn build_uploader(config: &Config) -> Result<Arc<dyn Uploader>> {
    let storage = &config.storage;
    match storage.endpoint.as_deref() {
        Some(endpoint) => {
            info!("Uploading logs to {} (bucket {})", endpoint, storage.bucket);
            Ok(Arc::new(ObjectStoreUploader::new(
                endpoint,
                storage.public_base_url.as_deref(),
                storage.upload_timeout(),
            )?))
        }
        None => {
            info!(
                "No object store configured, archiving logs under {}",
                display_dir(&storage.local_archive_dir)
            );
            Ok(Arc::new(LocalArchiveUploader::new(&storage.local_archive_dir)))
        }
    }
}

fn display_dir(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
