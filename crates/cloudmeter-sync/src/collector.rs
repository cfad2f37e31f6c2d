//! Power metrics collection
//!
//! One pass asks the cloud for the status of every known device and writes
//! the first meter's power and energy readings as gauges. Status requests
//! are paced like all others, so a pass over N devices takes at least
//! N times the request spacing.

use cloudmeter_core::{GaugeLabels, MetricsSink, Resolver, POWER_ACTUAL, POWER_COUNTER};
use std::sync::Arc;
use tracing::debug;

use crate::client::CloudClient;

/// Outcome of a collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Devices visited
    pub devices: usize,
    /// Gauge values written
    pub written: usize,
    /// Devices without a status or without meter data
    pub skipped: usize,
}

/// Writes per-device power gauges to a sink
pub struct Collector {
    client: Arc<CloudClient>,
    sink: Arc<dyn MetricsSink>,
}

impl Collector {
    pub fn new(client: Arc<CloudClient>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { client, sink }
    }

    /// Run one pass over the devices known to `resolver`
    ///
    /// Devices whose status can't be fetched, or that report no meters, are
    /// skipped; the pass always continues with the next device.
    pub async fn collect(&self, resolver: &Resolver<'_>) -> CollectReport {
        let mut report = CollectReport::default();

        for (id, device) in resolver.snapshot().iter_devices() {
            report.devices += 1;

            let Some(status) = self.client.device_status(id).await else {
                debug!(device = %id, "No status for device, skipping");
                report.skipped += 1;
                continue;
            };
            let Some(meter) = status.primary_meter() else {
                debug!(device = %id, "Device reports no meters, skipping");
                report.skipped += 1;
                continue;
            };

            let labels = GaugeLabels::new(
                resolver.resolve_room(id).unwrap_or_default(),
                device.name.clone(),
                device.kind.clone(),
            );

            if let Some(power) = meter.power {
                debug!(device = %id, power = power, "Collecting power metrics (actual)");
                self.sink.set_gauge(POWER_ACTUAL, &labels, power);
                report.written += 1;
            }
            if let Some(total) = meter.total_watt_hours() {
                debug!(device = %id, total = total, "Collecting power metrics (counter)");
                self.sink.set_gauge(POWER_COUNTER, &labels, total);
                report.written += 1;
            }
        }

        report
    }
}
