//! Inbound message envelope and topic classification.

use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The gateway a message arrived through, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySource {
    pub id: String,
    pub name: String,
}

/// One raw message from the transport: topic, arbitrary payload, receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewaySource>,
}

impl Envelope {
    /// Create an envelope received now.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
            gateway: None,
        }
    }

    /// Set the receipt timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the source gateway.
    pub fn with_gateway(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.gateway = Some(GatewaySource {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Classify this envelope's topic.
    pub fn topic_class(&self) -> TopicClass {
        TopicClass::classify(&self.topic)
    }
}

/// Logical topic classes published by the sensor gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    /// Wearable/sensor health payloads.
    Health,
    /// Position fixes.
    Location,
    /// Node info messages (battery, firmware, power state).
    NodeMessage,
    /// Node configuration reports.
    NodeConfig,
    /// Command acknowledgements.
    Ack,
    /// Anything else.
    Other,
}

impl TopicClass {
    /// Classify a topic string by its suffix.
    pub fn classify(topic: &str) -> Self {
        if topic.ends_with("_Health") {
            TopicClass::Health
        } else if topic.ends_with("_Loca") {
            TopicClass::Location
        } else if topic.ends_with("_Message") {
            TopicClass::NodeMessage
        } else if topic.ends_with("_TagConf") || topic.ends_with("_AncConf") {
            TopicClass::NodeConfig
        } else if topic.ends_with("_Ack") || topic.ends_with("ack_from_node") {
            TopicClass::Ack
        } else {
            TopicClass::Other
        }
    }
}

/// The four topic filters the engine subscribes to per monitored gateway.
pub fn subscription_topics(gateway_name: &str) -> Vec<String> {
    ["_Health", "_Loca", "_Message", "_TagConf"]
        .iter()
        .map(|suffix| format!("UWB/GW{}{}", gateway_name, suffix))
        .collect()
}

/// Bounded ring of recently-seen envelopes.
///
/// The transport pushes every delivery here; the engine drains the buffer on
/// (re)subscription so a restart does not lose the last observations.
pub struct ReplayBuffer {
    buf: RwLock<VecDeque<Envelope>>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a buffer holding at most `capacity` envelopes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push an envelope, dropping the oldest when full.
    pub fn push(&self, envelope: Envelope) {
        let mut buf = self.buf.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(envelope);
    }

    /// Snapshot of the buffered envelopes, oldest first.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.buf
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of buffered envelopes.
    pub fn len(&self) -> usize {
        self.buf.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all buffered envelopes.
    pub fn clear(&self) {
        self.buf.write().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
    }
}
