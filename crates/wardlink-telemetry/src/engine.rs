//! The message-processing engine.
//!
//! One envelope runs this path to completion before the next is taken:
//! classify → drop replays → resolve identity → fragment fold (tags and
//! anchors) or direct merge → store upsert. Unidentifiable messages are
//! normal noise and are dropped without ceremony.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use wardlink_core::{DeviceType, EngineConfig, Observation};
use wardlink_storage::{DeviceStore, UpsertOutcome};

use crate::fields;
use crate::fusion::{FragmentKind, FusionCache};
use crate::identity;
use crate::message::{Envelope, ReplayBuffer, TopicClass};

/// Bounded set remembering which envelopes were already applied, so a replay
/// drain plus live delivery of the same message counts once.
struct SeenSet {
    keys: HashSet<(String, i64)>,
    order: VecDeque<(String, i64)>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record a key; returns false when it was already present.
    fn insert(&mut self, key: (String, i64)) -> bool {
        if !self.keys.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        true
    }
}

/// Wires the resolver, the fusion cache and the device store together.
pub struct TelemetryEngine {
    store: Arc<DeviceStore>,
    cache: Arc<FusionCache>,
    seen: Mutex<SeenSet>,
}

impl TelemetryEngine {
    /// Create an engine over the given store and cache.
    pub fn new(store: Arc<DeviceStore>, cache: Arc<FusionCache>, config: &EngineConfig) -> Self {
        Self {
            store,
            cache,
            // Roomy enough to cover a full replay buffer plus live traffic
            seen: Mutex::new(SeenSet::new(config.replay_buffer_size * 2)),
        }
    }

    /// Process one envelope. Returns the upsert outcome, or `None` when the
    /// message was noise, a replay, or an acknowledgement.
    pub async fn handle(&self, envelope: &Envelope) -> Option<UpsertOutcome> {
        if envelope.topic_class() == TopicClass::Ack {
            trace!(topic = %envelope.topic, "acknowledgement, ignored");
            return None;
        }

        let key = (envelope.topic.clone(), envelope.timestamp.timestamp_millis());
        if !self.seen.lock().await.insert(key) {
            trace!(topic = %envelope.topic, "already processed, skipped");
            return None;
        }

        let gateway = envelope.gateway.as_ref().map(|g| g.id.as_str());
        let Some(identity) = identity::resolve(&envelope.payload, gateway) else {
            trace!(topic = %envelope.topic, "unidentifiable message dropped");
            return None;
        };

        let content = fields::content(&envelope.payload).unwrap_or_default().to_string();
        let fragment_kind = matches!(
            identity.device_type,
            DeviceType::PositioningTag | DeviceType::PositioningAnchor
        )
        .then(|| FragmentKind::from_content(&content))
        .flatten();

        let fields_value = match fragment_kind {
            Some(kind) => {
                let folded = self
                    .cache
                    .apply(&identity.uid, kind, envelope.payload.clone(), envelope.timestamp)
                    .await;
                Value::Object(folded)
            }
            None => envelope.payload.clone(),
        };

        let observation = Observation {
            battery_level: fields::battery_level(&fields_value),
            name: fields::name(&fields_value),
            identity,
            fields: fields_value,
            timestamp: envelope.timestamp,
            topic: envelope.topic.clone(),
            data_type: content,
        };

        match self.store.create_or_update(&observation).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(topic = %envelope.topic, "store rejected observation: {}", e);
                None
            }
        }
    }

    /// Drain the replay buffer, applying each envelope once.
    ///
    /// Called on (re)subscription so a restart picks up the most recent
    /// observations the transport still holds.
    pub async fn drain_replay(&self, buffer: &ReplayBuffer) -> usize {
        let envelopes = buffer.snapshot();
        let total = envelopes.len();
        let mut applied = 0;
        for envelope in &envelopes {
            if self.handle(envelope).await.is_some() {
                applied += 1;
            }
        }
        debug!(total, applied, "replay buffer drained");
        applied
    }

    /// The device store this engine writes to.
    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    /// The fusion cache this engine folds through.
    pub fn cache(&self) -> &Arc<FusionCache> {
        &self.cache
    }
}
