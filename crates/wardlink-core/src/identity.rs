//! Resolved identity and observation types.
//!
//! The telemetry crate produces these from inbound messages; the storage
//! crate consumes them to create or update device records. They live here so
//! neither crate depends on the other's internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{DeviceType, DeviceUid};

/// Identity inferred from one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub device_type: DeviceType,
    /// Canonical UID derived from the identifying attribute.
    pub uid: DeviceUid,
    /// The identifying attribute itself (MAC or decimal id).
    pub hardware_id: String,
    /// MAC address, whenever the payload carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Owning gateway, from the payload or the message envelope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
}

/// One identified observation, ready for the device store.
///
/// `fields` is the merge input for the device's `last_data`. It is carried as
/// a raw JSON value: the store treats anything that is not an object as an
/// empty merge rather than an error. The extracted battery/name ride
/// alongside so the store updates them only when the observation actually
/// supplied a value.
#[derive(Debug, Clone)]
pub struct Observation {
    pub identity: Identity,
    pub fields: Value,
    pub battery_level: Option<u8>,
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    /// Content marker of the source message ("300B", "location", ...).
    pub data_type: String,
}

impl Observation {
    /// Create an observation with empty fields.
    pub fn new(identity: Identity, timestamp: DateTime<Utc>, topic: impl Into<String>) -> Self {
        Self {
            identity,
            fields: Value::Null,
            battery_level: None,
            name: None,
            timestamp,
            topic: topic.into(),
            data_type: String::new(),
        }
    }

    /// Attach merge fields.
    pub fn with_fields(mut self, fields: impl Into<Value>) -> Self {
        self.fields = fields.into();
        self
    }

    /// Attach a battery reading.
    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery_level = Some(level.min(100));
        self
    }

    /// Attach a reported name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the content marker.
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }
}
