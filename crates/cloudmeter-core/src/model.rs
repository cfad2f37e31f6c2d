//! Device, room and status records as served by the cloud API

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Devices keyed by cloud identifier (`<id>` or `<id>_<channel>`)
pub type DeviceMap = BTreeMap<String, DeviceRecord>;

/// Rooms keyed by room identifier
pub type RoomMap = BTreeMap<String, RoomRecord>;

/// A device entry from the device-list endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// User-assigned display name
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: String,
    /// Device type tag (e.g. "SHPLG-S")
    #[serde(default, rename = "type", deserialize_with = "deserialize_text")]
    pub kind: String,
    /// Room identifier; the API sends it as a number, the cache as a string
    #[serde(
        default,
        deserialize_with = "deserialize_room_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub room_id: Option<String>,
    /// Named external sensors keyed by sensor index
    #[serde(
        default,
        deserialize_with = "deserialize_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub external_sensors_names: Option<BTreeMap<String, ExternalSensor>>,
    /// What the relay drives ("light", "socket", ...)
    #[serde(
        default,
        deserialize_with = "deserialize_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub relay_usage: Option<String>,
    /// Fields we don't interpret but keep for the cache
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceRecord {
    /// Create a record with a name, type and room
    pub fn new(name: &str, kind: &str, room_id: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            room_id: room_id.map(str::to_string),
            ..Default::default()
        }
    }

    /// Configured name of an external sensor, if any
    pub fn external_sensor_name(&self, index: u32) -> Option<&str> {
        self.external_sensors_names
            .as_ref()?
            .get(&index.to_string())
            .map(|s| s.name.as_str())
    }
}

/// External sensor naming entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalSensor {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: String,
}

/// A room entry from the room-list endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            extra: Map::new(),
        }
    }
}

/// Device and room metadata held in memory and mirrored to the cache
///
/// A collection is `None` until it has been loaded or fetched once. Each
/// collection is only ever replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub devices: Option<DeviceMap>,
    pub rooms: Option<RoomMap>,
}

impl Snapshot {
    pub fn new(devices: DeviceMap, rooms: RoomMap) -> Self {
        Self {
            devices: Some(devices),
            rooms: Some(rooms),
        }
    }

    /// True before anything was loaded or fetched
    pub fn is_empty(&self) -> bool {
        self.devices.is_none() && self.rooms.is_none()
    }

    pub fn device(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.as_ref()?.get(id)
    }

    pub fn room(&self, id: &str) -> Option<&RoomRecord> {
        self.rooms.as_ref()?.get(id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.as_ref().map_or(0, |d| d.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.as_ref().map_or(0, |r| r.len())
    }

    /// Iterate devices in identifier order
    pub fn iter_devices(&self) -> impl Iterator<Item = (&String, &DeviceRecord)> {
        self.devices.iter().flat_map(|d| d.iter())
    }
}

/// Live status of a single device
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub meters: Vec<MeterReading>,
}

impl DeviceStatus {
    /// The first meter, which is the one exported
    pub fn primary_meter(&self) -> Option<&MeterReading> {
        self.meters.first()
    }
}

/// One meter entry of a device status
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct MeterReading {
    /// Instantaneous power in watts
    #[serde(default)]
    pub power: Option<f64>,
    /// Accumulated energy in watt-minutes
    #[serde(default)]
    pub total: Option<f64>,
}

impl MeterReading {
    /// Accumulated energy converted to watt-hours
    pub fn total_watt_hours(&self) -> Option<f64> {
        self.total.map(|t| t / 60.0)
    }
}

fn deserialize_room_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Strings as-is, numbers and booleans as their text, anything else empty
fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// A value of the wrong shape reads as absent
fn deserialize_or_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
