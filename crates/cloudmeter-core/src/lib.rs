//! Cloudmeter Core - Metadata types, caching, name resolution and gauges
//!
//! This crate provides the foundational pieces of the Cloudmeter exporter:
//! - Device and room records as returned by the cloud API
//! - The persisted metadata snapshot and its cache store backends
//! - Identifier resolution (display names, room labels, relay usage)
//! - The gauge sink interface and an in-memory registry that renders
//!   the Prometheus text format

pub mod cache;
pub mod metrics;
pub mod model;
pub mod resolver;

pub use cache::{CacheError, CacheStore, JsonFileStore, MemoryStore, MetadataCache, CACHE_KEY};
pub use metrics::{GaugeLabels, GaugeRegistry, MetricsSink, POWER_ACTUAL, POWER_COUNTER};
pub use model::{
    DeviceMap, DeviceRecord, DeviceStatus, ExternalSensor, MeterReading, RoomMap, RoomRecord, Snapshot,
};
pub use resolver::{NameTemplate, Resolver, HIDDEN_ROOM_ID, HIDDEN_ROOM_LABEL};
