//! Multi-fragment fusion cache for positioning tags and anchors.
//!
//! A tag is described by three message kinds that never arrive together:
//! node info (`content: "info"`), position fixes (`content: "location"`) and
//! configuration reports (`content: "config"`). Each kind lands in its own
//! slot; folding combines all currently-present slots into one field map,
//! later slots winning per key. Slots are only ever cleared by the eviction
//! sweeper, never by the fold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use wardlink_core::{DeviceUid, Position};
use wardlink_storage::DeviceStore;

use crate::fields;

/// The three fragment kinds a tag id accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Message,
    Location,
    Config,
}

impl FragmentKind {
    /// Map a content marker to its fragment kind.
    pub fn from_content(content: &str) -> Option<Self> {
        match content {
            "info" => Some(FragmentKind::Message),
            "location" => Some(FragmentKind::Location),
            "config" => Some(FragmentKind::Config),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Fragment {
    payload: Value,
    received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FragmentSlots {
    message: Option<Fragment>,
    location: Option<Fragment>,
    config: Option<Fragment>,
    last_update: DateTime<Utc>,
}

impl FragmentSlots {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            message: None,
            location: None,
            config: None,
            last_update: timestamp,
        }
    }
}

/// Routing markers that must not leak into the folded field map.
const ROUTING_KEYS: &[&str] = &["node", "content"];

/// Config report fields, canonical name first, wire spellings after.
const CONFIG_FIELDS: &[(&str, &[&str])] = &[
    ("name", &["name"]),
    ("led", &["led"]),
    ("ble", &["ble"]),
    ("location_engine", &["location engine", "location_engine"]),
    ("fw_update", &["fw update", "fw_update"]),
    ("responsive_mode", &["responsive mode(0=On,1=Off)", "responsive_mode"]),
    ("stationary_detect", &["stationary detect", "stationary_detect"]),
    ("nominal_udr", &["nominal udr(hz)", "nominal_udr"]),
    ("stationary_udr", &["stationary udr(hz)", "stationary_udr"]),
];

/// Per-uid fragment accumulator with bounded lifetime.
pub struct FusionCache {
    slots: RwLock<HashMap<DeviceUid, FragmentSlots>>,
    retention: Duration,
}

impl FusionCache {
    /// Create a cache whose entries survive `retention` without observation.
    pub fn new(retention: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Write one fragment and return the fold over all present slots.
    ///
    /// Only the slot for `kind` is touched; the other two keep whatever they
    /// held before.
    pub async fn apply(
        &self,
        uid: &DeviceUid,
        kind: FragmentKind,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Map<String, Value> {
        let mut slots = self.slots.write().await;
        let entry = slots
            .entry(uid.clone())
            .or_insert_with(|| FragmentSlots::new(received_at));

        let fragment = Fragment {
            payload,
            received_at,
        };
        match kind {
            FragmentKind::Message => entry.message = Some(fragment),
            FragmentKind::Location => entry.location = Some(fragment),
            FragmentKind::Config => entry.config = Some(fragment),
        }
        entry.last_update = received_at;

        trace!(uid = %uid, ?kind, "fragment stored");
        fold_slots(entry)
    }

    /// Fold the currently-present slots for a uid without writing anything.
    pub async fn fold(&self, uid: &DeviceUid) -> Option<Map<String, Value>> {
        let slots = self.slots.read().await;
        slots.get(uid).map(fold_slots)
    }

    /// Drop entries whose last update is older than the retention window.
    ///
    /// Returns how many entries were evicted.
    pub async fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now
            - chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::zero());

        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, entry| entry.last_update >= cutoff);
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, remaining = slots.len(), "fusion cache swept");
        }
        evicted
    }

    /// Number of tracked uids.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Whether no uid is tracked.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Whether a uid currently has any fragments.
    pub async fn contains(&self, uid: &DeviceUid) -> bool {
        self.slots.read().await.contains_key(uid)
    }
}

/// Fold order is fixed: message fields, then the location projection, then
/// the config projection. Later slots win on key collision; absent slots
/// contribute nothing.
fn fold_slots(slots: &FragmentSlots) -> Map<String, Value> {
    let mut folded = Map::new();

    if let Some(fragment) = &slots.message {
        if let Some(object) = fragment.payload.as_object() {
            for (key, value) in object {
                if ROUTING_KEYS.contains(&key.as_str()) {
                    continue;
                }
                folded.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(fragment) = &slots.location {
        if let Some(raw) = fragment.payload.get("position") {
            if let Ok(position) = serde_json::from_value::<Position>(raw.clone()) {
                if let Ok(normalized) = serde_json::to_value(&position) {
                    folded.insert("position".to_string(), normalized);
                }
            }
        }
        if let Some(time) = fragment.payload.get("time").and_then(Value::as_str) {
            folded.insert("time".to_string(), Value::String(time.to_string()));
        }
    }

    if let Some(fragment) = &slots.config {
        for (canonical, aliases) in CONFIG_FIELDS {
            if let Some(value) = fields::first_value(&fragment.payload, aliases) {
                folded.insert((*canonical).to_string(), value.clone());
            }
        }
    }

    folded
}

/// Periodic sweeper bounding cache memory and flipping stale devices offline.
pub struct EvictionSweeper {
    cache: Arc<FusionCache>,
    store: Option<Arc<DeviceStore>>,
    interval: Duration,
    offline_threshold: Duration,
    running: Arc<RwLock<bool>>,
    task_handle: RwLock<Option<JoinHandle<()>>>,
}

impl EvictionSweeper {
    /// Create a sweeper over the given cache.
    pub fn new(cache: Arc<FusionCache>, interval: Duration, offline_threshold: Duration) -> Self {
        Self {
            cache,
            store: None,
            interval,
            offline_threshold,
            running: Arc::new(RwLock::new(false)),
            task_handle: RwLock::new(None),
        }
    }

    /// Also mark stale devices offline on each sweep.
    pub fn with_store(mut self, store: Arc<DeviceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Start the sweep task. A second start is a no-op.
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let cache = self.cache.clone();
        let store = self.store.clone();
        let interval = self.interval;
        let offline_threshold = self.offline_threshold;
        let running_flag = self.running.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick has nothing to sweep
            loop {
                ticker.tick().await;
                if !*running_flag.read().await {
                    break;
                }

                let now = Utc::now();
                cache.evict_stale(now).await;
                if let Some(store) = &store {
                    store.mark_stale_offline(offline_threshold, now).await;
                }
            }
        });

        *self.task_handle.write().await = Some(handle);
    }

    /// Stop the sweep task.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(handle) = self.task_handle.write().await.take() {
            handle.abort();
            handle.await.ok();
        }
    }

    /// Whether the sweep task is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
