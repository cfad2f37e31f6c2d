//! Cloud API endpoints
//!
//! All endpoints answer with a `{"isok": .., "data": {..}}` envelope; each
//! helper extracts the part it needs and decodes it into core types.

use cloudmeter_core::{DeviceMap, DeviceStatus, RoomMap};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::client::{ClientError, CloudClient};

pub const DEVICE_LIST_PATH: &str = "interface/device/list";
pub const ROOM_LIST_PATH: &str = "interface/room/list";
pub const DEVICE_STATUS_PATH: &str = "device/status";

impl CloudClient {
    /// All devices registered to the account
    pub async fn device_list(&self) -> Option<DeviceMap> {
        let body = self.post(DEVICE_LIST_PATH, &[]).await?;
        decode_entries(DEVICE_LIST_PATH, body, "/data/devices")
    }

    /// All rooms of the account
    pub async fn room_list(&self) -> Option<RoomMap> {
        let body = self.post(ROOM_LIST_PATH, &[]).await?;
        decode_entries(ROOM_LIST_PATH, body, "/data/rooms")
    }

    /// Live status of one device
    pub async fn device_status(&self, id: &str) -> Option<DeviceStatus> {
        let body = self.post(DEVICE_STATUS_PATH, &[("id", id)]).await?;
        decode_logged(DEVICE_STATUS_PATH, body, "/data/device_status")
    }
}

/// Decode the value at `pointer` inside a response body
pub fn decode_data<T: DeserializeOwned>(mut body: Value, pointer: &'static str) -> Result<T, ClientError> {
    let data = body
        .pointer_mut(pointer)
        .filter(|v| !v.is_null())
        .map(Value::take)
        .ok_or(ClientError::MissingData(pointer))?;
    Ok(serde_json::from_value(data)?)
}

fn decode_logged<T: DeserializeOwned>(path: &str, body: Value, pointer: &'static str) -> Option<T> {
    match decode_data(body, pointer) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!(path = %path, error = %e, "Unexpected response from cloud");
            None
        }
    }
}

/// Decode a keyed list entry by entry, dropping the entries that don't parse
fn decode_entries<T: DeserializeOwned>(
    path: &str,
    body: Value,
    pointer: &'static str,
) -> Option<BTreeMap<String, T>> {
    let raw: BTreeMap<String, Value> = decode_logged(path, body, pointer)?;
    let mut entries = BTreeMap::new();
    for (id, value) in raw {
        match serde_json::from_value(value) {
            Ok(entry) => {
                entries.insert(id, entry);
            }
            Err(e) => warn!(path = %path, id = %id, error = %e, "Skipping malformed entry"),
        }
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::Pacer;
    use crate::testing::{ok, ScriptedTransport};
    use serde_json::json;
    use std::sync::Arc;

    fn client(transport: &Arc<ScriptedTransport>) -> CloudClient {
        CloudClient::new(transport.clone(), Arc::new(Pacer::default()), "key")
    }

    #[test]
    fn test_decode_data() {
        let body = json!({ "isok": true, "data": { "rooms": { "5": { "name": "Kitchen" } } } });
        let rooms: RoomMap = decode_data(body, "/data/rooms").unwrap();
        assert_eq!(rooms["5"].name, "Kitchen");

        let err = decode_data::<RoomMap>(json!({ "isok": false }), "/data/rooms").unwrap_err();
        assert!(matches!(err, ClientError::MissingData("/data/rooms")));

        let err = decode_data::<RoomMap>(json!({ "data": { "rooms": null } }), "/data/rooms").unwrap_err();
        assert!(matches!(err, ClientError::MissingData(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_list() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            DEVICE_LIST_PATH,
            ok(json!({ "isok": true, "data": { "devices": {
                "dev1": { "name": "Lamp", "type": "SHPLG-S", "room_id": 5 }
            } } })),
        );

        let devices = client(&transport).device_list().await.unwrap();
        assert_eq!(devices["dev1"].name, "Lamp");
        assert_eq!(devices["dev1"].room_id.as_deref(), Some("5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_device_record_does_not_drop_the_list() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            DEVICE_LIST_PATH,
            ok(json!({ "isok": true, "data": { "devices": {
                "dev1": { "name": "Lamp", "type": "SHPLG-S", "room_id": 5 },
                "dev2": { "name": null, "type": "SHSW-1", "external_sensors_names": 3 },
                "dev3": "garbage"
            } } })),
        );

        let devices = client(&transport).device_list().await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices["dev1"].name, "Lamp");
        assert_eq!(devices["dev2"].name, "");
        assert_eq!(devices["dev2"].kind, "SHSW-1");
        assert!(!devices.contains_key("dev3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_status_sends_id() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(
            "device/status:dev1",
            ok(json!({ "isok": true, "data": { "device_status": {
                "meters": [{ "power": 42.0, "total": 600 }]
            } } })),
        );

        let status = client(&transport).device_status("dev1").await.unwrap();
        assert_eq!(status.primary_meter().unwrap().power, Some(42.0));
        assert_eq!(transport.calls()[0].field("id"), Some("dev1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_envelope_is_no_result() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(ROOM_LIST_PATH, ok(json!({ "isok": false, "errors": ["wrong_auth"] })));
        assert!(client(&transport).room_list().await.is_none());
    }
}
