//! Core types for Wardlink.
//!
//! This crate defines the device model, configuration, errors and the event
//! bus shared by the telemetry and storage crates.

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod eventbus;
pub mod identity;

pub use config::EngineConfig;
pub use device::{
    BindingType, Device, DeviceBinding, DeviceData, DeviceStatus, DeviceType, DeviceUid, Position,
    Resident,
};
pub use error::{Error, Result};
pub use event::{EventMetadata, WardEvent};
pub use eventbus::{EventBus, EventBusReceiver, FilteredReceiver, DEFAULT_CHANNEL_CAPACITY};
pub use identity::{Identity, Observation};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::device::{
        BindingType, Device, DeviceBinding, DeviceData, DeviceStatus, DeviceType, DeviceUid,
        Position, Resident,
    };
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventMetadata, WardEvent};
    pub use crate::eventbus::{EventBus, EventBusReceiver};
    pub use crate::identity::{Identity, Observation};
}
