//! Identifier resolution
//!
//! Maps raw cloud identifiers to the labels people recognise: the device's
//! display name (rendered through a user template) and the name of the room
//! it lives in. Resolution is best-effort: missing metadata degrades to a
//! fallback label, it never fails the caller.

use crate::model::{DeviceRecord, Snapshot};

/// Room identifier the cloud uses for devices hidden from room grouping
pub const HIDDEN_ROOM_ID: &str = "-10";

/// Label shown for devices in the hidden room
pub const HIDDEN_ROOM_LABEL: &str = "[Hidden]";

/// External sensor name the cloud reports for sensors nobody named
const UNNAMED_SENSOR: &str = "unnamed";

/// Display-name template with `{id}`, `{name}` and `{room}` placeholders
///
/// `{{` and `}}` produce literal braces. Unknown placeholders are kept as
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate(String);

impl NameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute the placeholders
    pub fn render(&self, id: &str, name: &str, room: &str) -> String {
        let mut out = String::with_capacity(self.0.len() + name.len() + room.len());
        let mut chars = self.0.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for k in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    match (closed, key.as_str()) {
                        (true, "id") => out.push_str(id),
                        (true, "name") => out.push_str(name),
                        (true, "room") => out.push_str(room),
                        (true, _) => {
                            out.push('{');
                            out.push_str(&key);
                            out.push('}');
                        }
                        (false, _) => {
                            out.push('{');
                            out.push_str(&key);
                        }
                    }
                }
                _ => out.push(c),
            }
        }

        out
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self::new("{name}")
    }
}

/// Resolves names and rooms against a metadata snapshot
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    snapshot: &'a Snapshot,
    template: &'a NameTemplate,
}

impl<'a> Resolver<'a> {
    pub fn new(snapshot: &'a Snapshot, template: &'a NameTemplate) -> Self {
        Self { snapshot, template }
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    /// Display name for a device, a channel of it, or one of its external sensors
    ///
    /// With a channel index the composite record `<id>_<index - 1>` is
    /// preferred; when it exists it already names the channel, otherwise the
    /// bare record is used and `" - <index>"` is appended for indices above 1.
    /// A named external sensor replaces the device name and drops the suffix.
    pub fn resolve_name(
        &self,
        id: &str,
        channel: Option<u32>,
        external_sensor: Option<u32>,
    ) -> Option<String> {
        let mut add_index = matches!(channel, Some(idx) if idx > 1);

        let mut device = None;
        if let Some(idx) = channel.filter(|idx| *idx >= 1) {
            let composite = format!("{}_{}", id, idx - 1);
            if let Some(found) = self.snapshot.device(&composite) {
                device = Some(found);
                add_index = false;
            }
        }
        let device = device.or_else(|| self.snapshot.device(id))?;

        let mut name = device.name.as_str();
        if let Some(sensor_name) = external_sensor.and_then(|idx| device.external_sensor_name(idx)) {
            if sensor_name != UNNAMED_SENSOR {
                name = sensor_name;
                add_index = false;
            }
        }

        let room = self.room_label(device);
        let mut value = self.template.render(id, name, &room);
        if add_index {
            if let Some(idx) = channel {
                value.push_str(&format!(" - {}", idx));
            }
        }
        Some(value)
    }

    /// Room label of a device, `None` if the device is unknown
    pub fn resolve_room(&self, id: &str) -> Option<String> {
        self.snapshot.device(id).map(|device| self.room_label(device))
    }

    /// Room label for a device record
    ///
    /// Hidden sentinel first, then the room list, then the raw identifier.
    /// A device without a room, or a missing room list, yields `""`.
    pub fn room_label(&self, device: &DeviceRecord) -> String {
        let Some(room_id) = device.room_id.as_deref() else {
            return String::new();
        };
        if room_id == HIDDEN_ROOM_ID {
            return HIDDEN_ROOM_LABEL.to_string();
        }
        let Some(rooms) = self.snapshot.rooms.as_ref() else {
            return String::new();
        };
        match rooms.get(room_id) {
            Some(room) => room.name.clone(),
            None => room_id.to_string(),
        }
    }

    /// What a relay is configured to drive, looked up by lowercase key
    pub fn relay_usage(&self, id: &str, channel: Option<u32>) -> Option<&'a str> {
        let key = match channel {
            Some(ch) if ch > 0 => format!("{}_{}", id, ch),
            _ => id.to_string(),
        }
        .to_lowercase();
        self.snapshot.device(&key)?.relay_usage.as_deref()
    }
}
