//! Canonical device record store.
//!
//! The store exclusively owns [`Device`] entities. Mutation happens only
//! through the upsert path driven by resolved observations, plus explicit
//! operator actions (remove, bind/unbind). `device_uid` is unique across the
//! store and never changes once assigned.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use wardlink_core::{
    BindingType, Device, DeviceBinding, DeviceData, DeviceStatus, DeviceType, EventBus, Resident,
    WardEvent,
};
use wardlink_core::Observation;

use crate::blob::BlobStore;
use crate::dedup::find_match;
use crate::error::{Error, Result};

/// Blob names on the external key-value surface.
pub const BLOB_DEVICES: &str = "devices";
pub const BLOB_RESIDENTS: &str = "residents";
pub const BLOB_BINDINGS: &str = "bindings";
pub const BLOB_DEVICE_DATA: &str = "deviceData";
/// Prefix for timestamped full-backup blobs.
pub const BACKUP_PREFIX: &str = "backup:";

const EVENT_SOURCE: &str = "device-store";

/// Result of one upsert.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub device_id: String,
    /// Whether a new device was created (as opposed to updated).
    pub created: bool,
    /// Name of the equivalence rule that matched, for updates.
    pub matched_rule: Option<&'static str>,
    /// Top-level fields that changed, for updates.
    pub changed: Vec<String>,
}

/// Serializable full state, written as blobs and as the backup payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub devices: Vec<Device>,
    pub residents: Vec<Resident>,
    pub bindings: Vec<DeviceBinding>,
    pub device_data: HashMap<String, Vec<DeviceData>>,
}

#[derive(Default)]
struct StoreState {
    /// id -> device
    devices: HashMap<String, Device>,
    /// device_uid -> id
    uid_index: HashMap<String, String>,
    residents: HashMap<String, Resident>,
    bindings: Vec<DeviceBinding>,
    /// id -> bounded most-recent observation window, newest at the back
    device_data: HashMap<String, VecDeque<DeviceData>>,
}

/// The device record store.
pub struct DeviceStore {
    state: RwLock<StoreState>,
    blobs: Option<BlobStore>,
    events: Option<EventBus>,
    dirty: Notify,
    max_records_per_device: usize,
}

impl DeviceStore {
    /// Create an empty store keeping `max_records_per_device` observations.
    pub fn new(max_records_per_device: usize) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            blobs: None,
            events: None,
            dirty: Notify::new(),
            max_records_per_device,
        }
    }

    /// Attach the durable blob surface.
    pub fn with_blobs(mut self, blobs: BlobStore) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Attach the event bus for created/updated notifications.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Load persisted collections, tolerating absence and corrupt content.
    pub async fn load(&self) -> Result<usize> {
        let Some(blobs) = &self.blobs else {
            return Ok(0);
        };

        let devices: Vec<Device> = blobs.read_json(BLOB_DEVICES).unwrap_or_default();
        let residents: Vec<Resident> = blobs.read_json(BLOB_RESIDENTS).unwrap_or_default();
        let bindings: Vec<DeviceBinding> = blobs.read_json(BLOB_BINDINGS).unwrap_or_default();
        let device_data: HashMap<String, Vec<DeviceData>> =
            blobs.read_json(BLOB_DEVICE_DATA).unwrap_or_default();

        let mut state = self.state.write().await;
        state.uid_index = devices
            .iter()
            .map(|d| (d.device_uid.as_str().to_string(), d.id.clone()))
            .collect();
        state.devices = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        state.residents = residents.into_iter().map(|r| (r.id.clone(), r)).collect();
        state.bindings = bindings;
        state.device_data = device_data
            .into_iter()
            .map(|(id, records)| (id, records.into_iter().collect()))
            .collect();

        debug!(
            devices = state.devices.len(),
            residents = state.residents.len(),
            bindings = state.bindings.len(),
            "store loaded"
        );
        Ok(state.devices.len())
    }

    /// Create or update the device described by one identified observation.
    ///
    /// Runs the equivalence rules against the current collection; on "new"
    /// allocates an id and a UID, otherwise merges into the matched record.
    /// Fields that are not an object merge as empty: data quality issues must
    /// not interrupt the stream.
    pub async fn create_or_update(&self, observation: &Observation) -> Result<UpsertOutcome> {
        let fields: Map<String, serde_json::Value> = observation
            .fields
            .as_object()
            .cloned()
            .unwrap_or_default();
        let identity = &observation.identity;
        let timestamp = observation.timestamp;

        let mut state = self.state.write().await;

        let matched = find_match(state.devices.values(), identity)
            .map(|(device, rule)| (device.id.clone(), rule))
            // Backstop for the uid-uniqueness invariant: a uid already in the
            // index always resolves to its owner.
            .or_else(|| {
                state
                    .uid_index
                    .get(identity.uid.as_str())
                    .map(|id| (id.clone(), "uid-equal"))
            });

        let outcome = match matched {
            None => {
                let id = Uuid::new_v4().to_string();
                let mut device = Device::new(
                    &id,
                    identity.uid.clone(),
                    identity.device_type,
                    &identity.hardware_id,
                    timestamp,
                );
                device.gateway_id = identity.gateway_id.clone();
                device.battery_level = observation.battery_level;
                if let Some(name) = &observation.name {
                    device.name = name.clone();
                }
                device.last_data = fields;

                state
                    .uid_index
                    .insert(identity.uid.as_str().to_string(), id.clone());
                state.devices.insert(id.clone(), device);
                debug!(device_uid = %identity.uid, id = %id, "device created");

                if let Some(events) = &self.events {
                    events.publish(
                        WardEvent::DeviceCreated {
                            device_id: id.clone(),
                            device_uid: identity.uid.clone(),
                            device_type: identity.device_type,
                        },
                        EVENT_SOURCE,
                    );
                }

                UpsertOutcome {
                    device_id: id,
                    created: true,
                    matched_rule: None,
                    changed: Vec::new(),
                }
            }
            Some((id, rule)) => {
                let Some(device) = state.devices.get_mut(&id) else {
                    return Err(Error::NotFound(format!("device {}", id)));
                };

                let mut changed: Vec<String> = Vec::new();
                for (key, value) in &fields {
                    if device.last_data.get(key) != Some(value) {
                        changed.push(key.clone());
                    }
                    device.last_data.insert(key.clone(), value.clone());
                }

                // Never overwrite with an absent reading
                if let Some(level) = observation.battery_level {
                    if device.battery_level != Some(level) {
                        changed.push("battery_level".to_string());
                    }
                    device.battery_level = Some(level);
                }
                if let Some(gateway_id) = &identity.gateway_id {
                    if device.gateway_id.as_deref() != Some(gateway_id) {
                        changed.push("gateway_id".to_string());
                    }
                    device.gateway_id = Some(gateway_id.clone());
                }
                if let Some(name) = &observation.name {
                    if &device.name != name {
                        changed.push("name".to_string());
                    }
                    device.name = name.clone();
                }
                if device.status != DeviceStatus::Active {
                    changed.push("status".to_string());
                    device.status = DeviceStatus::Active;
                }
                device.last_seen = timestamp;
                device.updated_at = timestamp;

                trace!(device_uid = %device.device_uid, rule, ?changed, "device updated");

                let device_type = device.device_type;
                if let Some(events) = &self.events {
                    events.publish(
                        WardEvent::DeviceUpdated {
                            device_id: id.clone(),
                            device_type,
                            changed: changed.clone(),
                        },
                        EVENT_SOURCE,
                    );
                }

                UpsertOutcome {
                    device_id: id,
                    created: false,
                    matched_rule: Some(rule),
                    changed,
                }
            }
        };

        self.append_record(&mut state, &outcome.device_id, observation);
        drop(state);

        self.dirty.notify_one();
        Ok(outcome)
    }

    fn append_record(&self, state: &mut StoreState, device_id: &str, observation: &Observation) {
        let record = DeviceData {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            device_uid: observation.identity.uid.clone(),
            data_type: observation.data_type.clone(),
            payload: observation.fields.clone(),
            timestamp: observation.timestamp,
            topic: observation.topic.clone(),
            gateway_id: observation.identity.gateway_id.clone(),
        };

        let window = state.device_data.entry(device_id.to_string()).or_default();
        window.push_back(record);
        while window.len() > self.max_records_per_device {
            window.pop_front();
        }
    }

    /// Remove a device by operator action. Cascades binding removal.
    pub async fn remove_device(&self, device_id: &str) -> Result<Device> {
        let mut state = self.state.write().await;
        let device = state
            .devices
            .remove(device_id)
            .ok_or_else(|| Error::NotFound(format!("device {}", device_id)))?;

        state.uid_index.remove(device.device_uid.as_str());
        state.bindings.retain(|b| b.device_id != device_id);
        state.device_data.remove(device_id);
        drop(state);

        if let Some(events) = &self.events {
            events.publish(
                WardEvent::DeviceRemoved {
                    device_id: device_id.to_string(),
                },
                EVENT_SOURCE,
            );
        }
        self.dirty.notify_one();
        Ok(device)
    }

    /// Get a device by store id.
    pub async fn get(&self, device_id: &str) -> Option<Device> {
        self.state.read().await.devices.get(device_id).cloned()
    }

    /// Get a device by its unique UID.
    pub async fn get_by_uid(&self, uid: &str) -> Option<Device> {
        let state = self.state.read().await;
        let id = state.uid_index.get(uid)?;
        state.devices.get(id).cloned()
    }

    /// All devices, unordered.
    pub async fn list_devices(&self) -> Vec<Device> {
        self.state.read().await.devices.values().cloned().collect()
    }

    /// Number of devices.
    pub async fn device_count(&self) -> usize {
        self.state.read().await.devices.len()
    }

    /// The most recent observation records for a device, newest first.
    pub async fn recent_data(&self, device_id: &str, limit: usize) -> Vec<DeviceData> {
        let state = self.state.read().await;
        state
            .device_data
            .get(device_id)
            .map(|window| window.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Insert or replace a resident.
    pub async fn upsert_resident(&self, resident: Resident) {
        let mut state = self.state.write().await;
        state.residents.insert(resident.id.clone(), resident);
        drop(state);
        self.dirty.notify_one();
    }

    /// Remove a resident. Cascades binding removal.
    pub async fn remove_resident(&self, resident_id: &str) -> Result<Resident> {
        let mut state = self.state.write().await;
        let resident = state
            .residents
            .remove(resident_id)
            .ok_or_else(|| Error::NotFound(format!("resident {}", resident_id)))?;
        state.bindings.retain(|b| b.resident_id != resident_id);
        drop(state);
        self.dirty.notify_one();
        Ok(resident)
    }

    /// Get a resident by id.
    pub async fn get_resident(&self, resident_id: &str) -> Option<Resident> {
        self.state.read().await.residents.get(resident_id).cloned()
    }

    /// Bind a device to a resident. Idempotent for an existing pair.
    ///
    /// Unknown ids are contract violations surfaced to the operator layer.
    pub async fn bind(
        &self,
        device_id: &str,
        resident_id: &str,
        binding_type: BindingType,
    ) -> Result<DeviceBinding> {
        let mut state = self.state.write().await;
        if !state.devices.contains_key(device_id) {
            return Err(Error::NotFound(format!("device {}", device_id)));
        }
        if !state.residents.contains_key(resident_id) {
            return Err(Error::NotFound(format!("resident {}", resident_id)));
        }

        if let Some(existing) = state
            .bindings
            .iter()
            .find(|b| b.device_id == device_id && b.resident_id == resident_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let binding = DeviceBinding {
            id: Uuid::new_v4().to_string(),
            resident_id: resident_id.to_string(),
            device_id: device_id.to_string(),
            binding_type,
            created_at: now,
            updated_at: now,
        };
        state.bindings.push(binding.clone());
        drop(state);

        self.dirty.notify_one();
        Ok(binding)
    }

    /// Remove the binding between a device and a resident.
    pub async fn unbind(&self, device_id: &str, resident_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.bindings.len();
        state
            .bindings
            .retain(|b| !(b.device_id == device_id && b.resident_id == resident_id));
        if state.bindings.len() == before {
            return Err(Error::NotFound(format!(
                "binding {} <-> {}",
                device_id, resident_id
            )));
        }
        drop(state);
        self.dirty.notify_one();
        Ok(())
    }

    /// All bindings.
    pub async fn list_bindings(&self) -> Vec<DeviceBinding> {
        self.state.read().await.bindings.clone()
    }

    /// Devices bound to a resident.
    pub async fn devices_for_resident(&self, resident_id: &str) -> Vec<Device> {
        let state = self.state.read().await;
        state
            .bindings
            .iter()
            .filter(|b| b.resident_id == resident_id)
            .filter_map(|b| state.devices.get(&b.device_id))
            .cloned()
            .collect()
    }

    /// Device counts per status.
    pub async fn status_summary(&self) -> HashMap<DeviceStatus, usize> {
        let state = self.state.read().await;
        let mut summary = HashMap::new();
        for device in state.devices.values() {
            *summary.entry(device.status).or_insert(0) += 1;
        }
        summary
    }

    /// Device counts per type.
    pub async fn type_summary(&self) -> HashMap<DeviceType, usize> {
        let state = self.state.read().await;
        let mut summary = HashMap::new();
        for device in state.devices.values() {
            *summary.entry(device.device_type).or_insert(0) += 1;
        }
        summary
    }

    /// Flip devices unseen for longer than `threshold` to offline.
    ///
    /// Returns how many were flipped. A later observation flips them back.
    pub async fn mark_stale_offline(&self, threshold: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now
            - chrono::Duration::from_std(threshold).unwrap_or_else(|_| chrono::Duration::zero());
        let mut flipped = Vec::new();

        {
            let mut state = self.state.write().await;
            for device in state.devices.values_mut() {
                if device.status == DeviceStatus::Active && device.last_seen < cutoff {
                    device.status = DeviceStatus::Offline;
                    flipped.push((device.id.clone(), device.device_type));
                }
            }
        }

        if !flipped.is_empty() {
            if let Some(events) = &self.events {
                for (device_id, device_type) in &flipped {
                    events.publish(
                        WardEvent::DeviceUpdated {
                            device_id: device_id.clone(),
                            device_type: *device_type,
                            changed: vec!["status".to_string()],
                        },
                        EVENT_SOURCE,
                    );
                }
            }
            self.dirty.notify_one();
        }
        flipped.len()
    }

    /// Clone the full state for persistence or export.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        StoreSnapshot {
            devices: state.devices.values().cloned().collect(),
            residents: state.residents.values().cloned().collect(),
            bindings: state.bindings.clone(),
            device_data: state
                .device_data
                .iter()
                .map(|(id, window)| (id.clone(), window.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Write the four named blobs from the current state.
    pub async fn write_snapshot(&self) -> Result<()> {
        let Some(blobs) = &self.blobs else {
            return Ok(());
        };
        let snapshot = self.snapshot().await;
        blobs.write_json(BLOB_DEVICES, &snapshot.devices)?;
        blobs.write_json(BLOB_RESIDENTS, &snapshot.residents)?;
        blobs.write_json(BLOB_BINDINGS, &snapshot.bindings)?;
        blobs.write_json(BLOB_DEVICE_DATA, &snapshot.device_data)?;
        Ok(())
    }

    /// Write a timestamped full-backup blob.
    pub async fn write_backup(&self, now: DateTime<Utc>) -> Result<()> {
        let Some(blobs) = &self.blobs else {
            return Ok(());
        };
        let snapshot = self.snapshot().await;
        let name = format!("{}{}", BACKUP_PREFIX, now.to_rfc3339());
        blobs.write_json(&name, &snapshot)
    }

    /// Await the next dirty mark. Used by the persistence scheduler.
    pub async fn dirty_notified(&self) {
        self.dirty.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wardlink_core::{DeviceUid, Identity};

    fn watch_identity(mac: &str) -> Identity {
        Identity {
            device_type: DeviceType::Smartwatch,
            uid: DeviceUid::new(DeviceType::Smartwatch, mac),
            hardware_id: mac.to_string(),
            mac: Some(mac.to_string()),
            gateway_id: Some("137205".to_string()),
        }
    }

    fn observation(mac: &str, fields: serde_json::Value) -> Observation {
        Observation::new(watch_identity(mac), Utc::now(), "UWB/GW137205_Health")
            .with_fields(fields)
            .with_data_type("300B")
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let store = DeviceStore::new(10);

        let created = store
            .create_or_update(&observation("AA:BB", json!({"hr": 75})))
            .await
            .unwrap();
        assert!(created.created);

        let updated = store
            .create_or_update(&observation("AA:BB", json!({"hr": 80})))
            .await
            .unwrap();
        assert!(!updated.created);
        assert_eq!(updated.device_id, created.device_id);
        assert_eq!(updated.matched_rule, Some("uid-equal"));
        assert!(updated.changed.contains(&"hr".to_string()));

        assert_eq!(store.device_count().await, 1);
        let device = store.get(&created.device_id).await.unwrap();
        assert_eq!(device.last_data["hr"], json!(80));
    }

    #[tokio::test]
    async fn test_merge_is_additive() {
        let store = DeviceStore::new(10);

        store
            .create_or_update(&observation("AA:BB", json!({"hr": 75})))
            .await
            .unwrap();
        let outcome = store
            .create_or_update(&observation("AA:BB", json!({"spO2": 98})))
            .await
            .unwrap();

        let device = store.get(&outcome.device_id).await.unwrap();
        // Earlier fields survive, they are never wholesale replaced
        assert_eq!(device.last_data["hr"], json!(75));
        assert_eq!(device.last_data["spO2"], json!(98));
    }

    #[tokio::test]
    async fn test_malformed_fields_merge_empty() {
        let store = DeviceStore::new(10);

        let outcome = store
            .create_or_update(&observation("AA:BB", json!("not an object")))
            .await
            .unwrap();
        let device = store.get(&outcome.device_id).await.unwrap();
        assert!(device.last_data.is_empty());
    }

    #[tokio::test]
    async fn test_battery_never_overwritten_with_absent() {
        let store = DeviceStore::new(10);

        let first = observation("AA:BB", json!({})).with_battery(86);
        let outcome = store.create_or_update(&first).await.unwrap();

        // Second observation carries no battery reading
        store
            .create_or_update(&observation("AA:BB", json!({"hr": 70})))
            .await
            .unwrap();

        let device = store.get(&outcome.device_id).await.unwrap();
        assert_eq!(device.battery_level, Some(86));
    }

    #[tokio::test]
    async fn test_device_data_window_bounded() {
        let store = DeviceStore::new(3);

        let mut device_id = String::new();
        for i in 0..5 {
            let outcome = store
                .create_or_update(&observation("AA:BB", json!({ "seq": i })))
                .await
                .unwrap();
            device_id = outcome.device_id;
        }

        let records = store.recent_data(&device_id, 10).await;
        assert_eq!(records.len(), 3);
        // Newest first; oldest entries were dropped
        assert_eq!(records[0].payload["seq"], json!(4));
        assert_eq!(records[2].payload["seq"], json!(2));
    }

    #[tokio::test]
    async fn test_remove_cascades_bindings() {
        let store = DeviceStore::new(10);
        let outcome = store
            .create_or_update(&observation("AA:BB", json!({})))
            .await
            .unwrap();

        store
            .upsert_resident(Resident {
                id: "R001".to_string(),
                name: "Resident 1".to_string(),
                room: "201".to_string(),
            })
            .await;
        store
            .bind(&outcome.device_id, "R001", BindingType::Primary)
            .await
            .unwrap();
        assert_eq!(store.list_bindings().await.len(), 1);

        store.remove_device(&outcome.device_id).await.unwrap();
        assert!(store.list_bindings().await.is_empty());
    }

    #[tokio::test]
    async fn test_bind_unknown_device_errors() {
        let store = DeviceStore::new(10);
        store
            .upsert_resident(Resident {
                id: "R001".to_string(),
                name: "Resident 1".to_string(),
                room: "201".to_string(),
            })
            .await;

        let err = store
            .bind("missing", "R001", BindingType::Primary)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stale_devices_marked_offline() {
        let store = DeviceStore::new(10);
        let old = Utc::now() - chrono::Duration::seconds(120);
        let obs = Observation::new(watch_identity("AA:BB"), old, "UWB/GW137205_Health")
            .with_fields(json!({}));
        let outcome = store.create_or_update(&obs).await.unwrap();

        let flipped = store
            .mark_stale_offline(Duration::from_secs(60), Utc::now())
            .await;
        assert_eq!(flipped, 1);
        let device = store.get(&outcome.device_id).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);

        // A fresh observation flips it back
        store
            .create_or_update(&observation("AA:BB", json!({})))
            .await
            .unwrap();
        let device = store.get(&outcome.device_id).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Active);
    }

    #[tokio::test]
    async fn test_summaries() {
        let store = DeviceStore::new(10);
        store
            .create_or_update(&observation("AA:BB", json!({})))
            .await
            .unwrap();
        store
            .create_or_update(&observation("CC:DD", json!({})))
            .await
            .unwrap();

        let by_status = store.status_summary().await;
        assert_eq!(by_status.get(&DeviceStatus::Active), Some(&2));

        let by_type = store.type_summary().await;
        assert_eq!(by_type.get(&DeviceType::Smartwatch), Some(&2));
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_load_tolerates_corrupt_blob() {
        use crate::backends::{BlobBackend, MemoryBackend};
        use std::sync::Arc;

        let backend = Arc::new(MemoryBackend::new());
        backend.write(BLOB_DEVICES, b"not json at all").unwrap();
        let store = DeviceStore::new(10).with_blobs(BlobStore::new(backend));

        assert_eq!(store.load().await.unwrap(), 0);
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_snapshot_round_trip() {
        use crate::backends::MemoryBackend;
        use std::sync::Arc;

        let blobs = BlobStore::new(Arc::new(MemoryBackend::new()));
        let store = DeviceStore::new(10).with_blobs(blobs.clone());

        store
            .create_or_update(&observation("AA:BB", json!({"hr": 75})))
            .await
            .unwrap();
        store.write_snapshot().await.unwrap();

        let reloaded = DeviceStore::new(10).with_blobs(blobs);
        assert_eq!(reloaded.load().await.unwrap(), 1);
        let device = reloaded.get_by_uid("WATCH:AA:BB").await.unwrap();
        assert_eq!(device.last_data["hr"], json!(75));
    }
}
