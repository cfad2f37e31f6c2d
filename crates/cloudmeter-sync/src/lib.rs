//! Cloudmeter Sync - Cloud metadata synchronization engine
//!
//! This crate talks to the cloud API and turns its answers into gauges:
//! - A rate-limited request client (process-wide pacing, bounded retry)
//! - Endpoint helpers for the device list, room list and device status
//! - The metrics collector writing power gauges through a sink
//! - The polling scheduler that refreshes metadata, persists it and
//!   triggers collection until it is cancelled

pub mod api;
pub mod client;
pub mod collector;
pub mod pacer;
pub mod poller;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{ClientError, CloudClient, DEFAULT_MAX_RETRIES};
pub use collector::{CollectReport, Collector};
pub use pacer::{Pacer, DEFAULT_SPACING};
pub use poller::{Poller, PollerConfig};
pub use transport::{HttpResponse, ReqwestTransport, Transport, TransportError, DEFAULT_TIMEOUT};
