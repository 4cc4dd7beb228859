//! Events emitted to consumers.
//!
//! These are UI/export notifications only; they are not part of the
//! durability contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::{DeviceType, DeviceUid};

/// Notification published by the device store on mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WardEvent {
    /// A previously-unseen physical device was created.
    DeviceCreated {
        device_id: String,
        device_uid: DeviceUid,
        device_type: DeviceType,
    },
    /// An existing device absorbed a new observation.
    DeviceUpdated {
        device_id: String,
        device_type: DeviceType,
        /// Summary of the top-level fields that changed.
        changed: Vec<String>,
    },
    /// A device was removed by operator action.
    DeviceRemoved { device_id: String },
}

impl WardEvent {
    /// The id of the device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            WardEvent::DeviceCreated { device_id, .. } => device_id,
            WardEvent::DeviceUpdated { device_id, .. } => device_id,
            WardEvent::DeviceRemoved { device_id } => device_id,
        }
    }

    /// Whether this event reports a brand-new device.
    pub fn is_created(&self) -> bool {
        matches!(self, WardEvent::DeviceCreated { .. })
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event id.
    pub id: Uuid,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// Component that published the event.
    pub source: String,
}

impl EventMetadata {
    /// Create metadata with the given source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}
