//! Polling scheduler
//!
//! Owns the in-memory snapshot and drives the refresh cycle:
//! 1. Load the cached snapshot once at start
//! 2. When the interval has elapsed (or nothing was fetched yet), fetch the
//!    device list, then the room list, replacing each collection only when
//!    its own fetch succeeded
//! 3. Persist the snapshot and run a collection pass
//! 4. Otherwise idle in short slices so cancellation is seen promptly
//!
//! An in-flight request is never interrupted; the stop signal is checked
//! between cycles and while idling.

use cloudmeter_core::{MetadataCache, MetricsSink, NameTemplate, Resolver, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::CloudClient;
use crate::collector::{CollectReport, Collector};

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Minimum time between two refresh cycles
    pub interval: Duration,
    /// Longest single idle wait
    pub idle_slice: Duration,
    /// Template for rendered display names
    pub name_template: NameTemplate,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            idle_slice: Duration::from_secs(5),
            name_template: NameTemplate::default(),
        }
    }
}

/// Background refresh loop
pub struct Poller {
    client: Arc<CloudClient>,
    cache: MetadataCache,
    collector: Collector,
    config: PollerConfig,
    snapshot: Snapshot,
    last_update: Option<Instant>,
    stop: CancellationToken,
}

impl Poller {
    /// Create a poller that stops when `shutdown` (process-wide) or its own
    /// stop token is cancelled
    pub fn new(
        client: Arc<CloudClient>,
        cache: MetadataCache,
        sink: Arc<dyn MetricsSink>,
        config: PollerConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            collector: Collector::new(client.clone(), sink),
            client,
            cache,
            config,
            snapshot: Snapshot::default(),
            last_update: None,
            stop: shutdown.child_token(),
        }
    }

    /// Token that stops only this poller
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Resolver over the current snapshot
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.snapshot, &self.config.name_template)
    }

    /// Seed the snapshot from the cache; failures leave it empty
    pub fn load_cache(&mut self) {
        match self.cache.load() {
            Ok(Some(snapshot)) => {
                info!(
                    devices = snapshot.device_count(),
                    rooms = snapshot.room_count(),
                    "Loaded cloud cache"
                );
                self.snapshot = snapshot;
            }
            Ok(None) => debug!("No cloud cache available"),
            Err(e) => error!(error = %e, "Error loading cloud cache"),
        }
    }

    /// Whether a refresh cycle should start now
    pub fn is_due(&self) -> bool {
        match self.last_update {
            None => true,
            Some(last) => last.elapsed() > self.config.interval,
        }
    }

    /// Run one refresh cycle: fetch metadata, persist it, collect metrics
    pub async fn refresh(&mut self) -> CollectReport {
        self.last_update = Some(Instant::now());
        debug!("Updating from cloud");

        // An empty list counts as no answer
        match self.client.device_list().await {
            Some(devices) if !devices.is_empty() => self.snapshot.devices = Some(devices),
            Some(_) => warn!("Cloud returned an empty device list, keeping the previous one"),
            None => {}
        }
        match self.client.room_list().await {
            Some(rooms) if !rooms.is_empty() => self.snapshot.rooms = Some(rooms),
            Some(_) => debug!("Cloud returned an empty room list, keeping the previous one"),
            None => {}
        }

        if let Err(e) = self.cache.save(&self.snapshot) {
            warn!(error = %e, "Error saving cloud cache");
        }

        info!(
            devices = self.snapshot.device_count(),
            rooms = self.snapshot.room_count(),
            "Cloud metadata refreshed"
        );

        let resolver = Resolver::new(&self.snapshot, &self.config.name_template);
        let report = self.collector.collect(&resolver).await;

        info!(
            devices = report.devices,
            written = report.written,
            skipped = report.skipped,
            next_in_secs = self.config.interval.as_secs(),
            "Collection pass done, waiting before next collection cycle"
        );
        report
    }

    /// Run until cancelled
    pub async fn run(mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Cloud poller started"
        );
        self.load_cache();

        while !self.stop.is_cancelled() {
            if self.is_due() {
                self.refresh().await;
                continue;
            }

            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = sleep(self.config.idle_slice) => {}
            }
        }

        info!("Cloud poller stopped");
    }
}
