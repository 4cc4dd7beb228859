//! Downlink command construction.
//!
//! Commands published back to a gateway's downlink channel carry a fresh
//! random serial in `[0, 65536)`. The serial correlates acknowledgements with
//! requests; it is not uniqueness-guaranteed.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};

use wardlink_core::Result;

/// Transport seam for publishing downlink commands.
#[async_trait]
pub trait DownlinkPublisher: Send + Sync {
    /// Publish one command payload to a topic.
    async fn publish(&self, topic: &str, payload: Value) -> Result<()>;
}

/// The downlink channel for a gateway.
pub fn downlink_topic(gateway_name: &str) -> String {
    format!("UWB/GW{}_Dnlink", gateway_name)
}

/// Builder for the command wire object.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    content: String,
    gateway_id: u64,
    device_id: u64,
    extra: Map<String, Value>,
}

impl CommandRequest {
    /// Create a command addressed to one node behind one gateway.
    pub fn new(content: impl Into<String>, gateway_id: u64, device_id: u64) -> Self {
        Self {
            content: content.into(),
            gateway_id,
            device_id,
            extra: Map::new(),
        }
    }

    /// Add a type-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Render the wire object, stamping a fresh serial.
    pub fn into_wire(self) -> Value {
        let mut wire = Map::new();
        wire.insert("content".to_string(), Value::String(self.content));
        wire.insert("gateway id".to_string(), Value::from(self.gateway_id));
        wire.insert("id".to_string(), Value::from(self.device_id));
        for (key, value) in self.extra {
            wire.insert(key, value);
        }
        let serial: u32 = rand::thread_rng().gen_range(0..65536);
        wire.insert("serial no".to_string(), Value::from(serial));
        Value::Object(wire)
    }

    /// Render and publish in one step.
    pub async fn send(self, publisher: &dyn DownlinkPublisher, gateway_name: &str) -> Result<()> {
        let topic = downlink_topic(gateway_name);
        publisher.publish(&topic, self.into_wire()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingPublisher {
        published: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl DownlinkPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: Value) -> Result<()> {
            self.published
                .lock()
                .expect("lock poisoned")
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    #[test]
    fn test_wire_shape() {
        let wire = CommandRequest::new("led on", 137205, 23349)
            .with_field("led", Value::from(1))
            .into_wire();

        assert_eq!(wire["content"], Value::from("led on"));
        assert_eq!(wire["gateway id"], Value::from(137205));
        assert_eq!(wire["id"], Value::from(23349));
        assert_eq!(wire["led"], Value::from(1));

        let serial = wire["serial no"].as_u64().unwrap();
        assert!(serial < 65536);
    }

    #[test]
    fn test_extra_fields_cannot_shadow_serial() {
        // The stamped serial always wins over a caller-supplied one
        let wire = CommandRequest::new("config", 1, 2)
            .with_field("serial no", Value::from(999_999))
            .into_wire();
        assert!(wire["serial no"].as_u64().unwrap() < 65536);
    }

    #[tokio::test]
    async fn test_send_targets_downlink_topic() {
        let publisher = RecordingPublisher {
            published: Mutex::new(Vec::new()),
        };

        CommandRequest::new("led off", 137205, 7)
            .send(&publisher, "137205")
            .await
            .unwrap();

        let published = publisher.published.lock().expect("lock poisoned");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "UWB/GW137205_Dnlink");
        assert_eq!(published[0].1["content"], Value::from("led off"));
    }
}
