//! Canonical device model.
//!
//! A [`Device`] is the stable, deduplicated record of one physical unit.
//! Identity is carried by [`DeviceUid`], a type-prefixed string assigned at
//! first observation and never changed afterwards.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed enumeration of the device classes the facility monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// Wearable health watch (heart rate, SpO2, blood pressure, skin temp).
    Smartwatch,
    /// Moisture/temperature diaper sensor.
    DiaperSensor,
    /// Step/motion sensor.
    Pedometer,
    /// UWB positioning tag worn or attached to assets.
    PositioningTag,
    /// Fixed UWB positioning anchor.
    PositioningAnchor,
    /// Sensor gateway itself.
    Gateway,
}

impl DeviceType {
    /// UID prefix segment for this type.
    pub fn prefix(&self) -> &'static str {
        match self {
            DeviceType::Smartwatch => "WATCH",
            DeviceType::DiaperSensor => "DIAPER",
            DeviceType::Pedometer => "PEDO",
            DeviceType::PositioningTag => "TAG",
            DeviceType::PositioningAnchor => "ANCHOR",
            DeviceType::Gateway => "GATEWAY",
        }
    }

    /// Whether this type is keyed by a MAC address (as opposed to a numeric id).
    pub fn mac_keyed(&self) -> bool {
        matches!(self, DeviceType::Smartwatch | DeviceType::DiaperSensor)
    }

    /// Look up a type by its UID prefix segment.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "WATCH" => Some(DeviceType::Smartwatch),
            "DIAPER" => Some(DeviceType::DiaperSensor),
            "PEDO" => Some(DeviceType::Pedometer),
            "TAG" => Some(DeviceType::PositioningTag),
            "ANCHOR" => Some(DeviceType::PositioningAnchor),
            "GATEWAY" => Some(DeviceType::Gateway),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Semantically unique device identity, format `<PREFIX>:<identifier>`.
///
/// The identifier may itself contain colons (MAC addresses do), so parsing
/// splits on the first colon only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceUid(String);

impl DeviceUid {
    /// Build a UID from a type and its identifying attribute.
    pub fn new(device_type: DeviceType, identifier: impl AsRef<str>) -> Self {
        DeviceUid(format!("{}:{}", device_type.prefix(), identifier.as_ref()))
    }

    /// The full UID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The prefix segment, if well-formed.
    pub fn prefix(&self) -> Option<&str> {
        self.0.split_once(':').map(|(p, _)| p)
    }

    /// The identifier with the prefix segment stripped.
    pub fn identifier(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, rest)| rest)
    }

    /// The device type encoded in the prefix, if recognized.
    pub fn device_type(&self) -> Option<DeviceType> {
        self.prefix().and_then(DeviceType::from_prefix)
    }
}

impl fmt::Display for DeviceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceUid {
    fn from(s: String) -> Self {
        DeviceUid(s)
    }
}

/// Device lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Offline,
    Error,
}

/// A position fix reported by the location engine.
///
/// `z` and `quality` are frequently omitted on the wire and default to zero;
/// a wholly absent position stays absent rather than defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub quality: u32,
}

/// The canonical device record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Store-assigned stable id.
    pub id: String,
    /// Type-prefixed unique identity, assigned once.
    pub device_uid: DeviceUid,
    pub device_type: DeviceType,
    /// Display name; seeded from observations when they carry one.
    pub name: String,
    /// The identifying attribute first observed (MAC or numeric id).
    pub hardware_id: String,
    pub status: DeviceStatus,
    /// Owning sensor gateway, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    /// Battery percentage, clamped to 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    /// Most recently observed fields. Merged additively, never replaced
    /// wholesale.
    #[serde(default)]
    pub last_data: Map<String, Value>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Create a new device record at the given observation time.
    pub fn new(
        id: impl Into<String>,
        device_uid: DeviceUid,
        device_type: DeviceType,
        hardware_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let hardware_id = hardware_id.into();
        Self {
            id: id.into(),
            name: format!("{}_{}", device_type.prefix(), hardware_id),
            device_uid,
            device_type,
            hardware_id,
            status: DeviceStatus::Active,
            gateway_id: None,
            battery_level: None,
            last_data: Map::new(),
            last_seen: timestamp,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Set the owning gateway.
    pub fn with_gateway(mut self, gateway_id: impl Into<String>) -> Self {
        self.gateway_id = Some(gateway_id.into());
        self
    }

    /// Set the battery level (clamped to 0-100).
    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery_level = Some(level.min(100));
        self
    }

    /// The position from `last_data`, if one has been observed.
    pub fn position(&self) -> Option<Position> {
        self.last_data
            .get("position")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Immutable observation log entry appended on every successful upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceData {
    pub id: String,
    pub device_id: String,
    pub device_uid: DeviceUid,
    /// Content marker of the observation ("300B", "location", ...).
    pub data_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
}

/// A resident devices can be bound to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resident {
    pub id: String,
    pub name: String,
    pub room: String,
}

/// Binding role of a device for a resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingType {
    Primary,
    Secondary,
}

/// Relation between one device and one resident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub id: String,
    pub resident_id: String,
    pub device_id: String,
    pub binding_type: BindingType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_round_trip() {
        let uid = DeviceUid::new(DeviceType::Smartwatch, "E0:0E:08:36:93:F8");
        assert_eq!(uid.as_str(), "WATCH:E0:0E:08:36:93:F8");
        assert_eq!(uid.prefix(), Some("WATCH"));
        // MAC identifiers keep their own colons intact
        assert_eq!(uid.identifier(), Some("E0:0E:08:36:93:F8"));
        assert_eq!(uid.device_type(), Some(DeviceType::Smartwatch));
    }

    #[test]
    fn test_uid_numeric_identifier() {
        let uid = DeviceUid::new(DeviceType::PositioningTag, "23349");
        assert_eq!(uid.as_str(), "TAG:23349");
        assert_eq!(uid.identifier(), Some("23349"));
    }

    #[test]
    fn test_type_prefix_round_trip() {
        for ty in [
            DeviceType::Smartwatch,
            DeviceType::DiaperSensor,
            DeviceType::Pedometer,
            DeviceType::PositioningTag,
            DeviceType::PositioningAnchor,
            DeviceType::Gateway,
        ] {
            assert_eq!(DeviceType::from_prefix(ty.prefix()), Some(ty));
        }
    }

    #[test]
    fn test_device_battery_clamp() {
        let device = Device::new(
            "d-1",
            DeviceUid::new(DeviceType::Pedometer, "5345"),
            DeviceType::Pedometer,
            "5345",
            Utc::now(),
        )
        .with_battery(150);
        assert_eq!(device.battery_level, Some(100));
    }

    #[test]
    fn test_device_position_accessor() {
        let mut device = Device::new(
            "d-2",
            DeviceUid::new(DeviceType::PositioningTag, "23349"),
            DeviceType::PositioningTag,
            "23349",
            Utc::now(),
        );
        assert!(device.position().is_none());

        device.last_data.insert(
            "position".to_string(),
            serde_json::json!({"x": 1.0, "y": 2.0, "z": 0.0, "quality": 90}),
        );
        let pos = device.position().unwrap();
        assert_eq!(pos.x, 1.0);
        assert_eq!(pos.quality, 90);
    }

    #[test]
    fn test_position_defaults() {
        // z and quality are optional on the wire
        let pos: Position = serde_json::from_value(serde_json::json!({"x": 3.5, "y": -1.0})).unwrap();
        assert_eq!(pos.z, 0.0);
        assert_eq!(pos.quality, 0);
    }
}
