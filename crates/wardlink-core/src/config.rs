//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the fusion engine and its background tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a tag's fragment set survives without a new observation
    /// before the sweeper drops it (seconds).
    #[serde(default = "default_fragment_retention_secs")]
    pub fragment_retention_secs: u64,

    /// Interval between eviction sweeps (seconds).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Debounce window coalescing store mutations into one write (millis).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval between unconditional full-snapshot writes (seconds).
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// A device unseen for longer than this is marked offline (seconds).
    #[serde(default = "default_offline_threshold_secs")]
    pub offline_threshold_secs: u64,

    /// Capacity of the recent-message replay buffer.
    #[serde(default = "default_replay_buffer_size")]
    pub replay_buffer_size: usize,

    /// Most-recent observation records retained per device.
    #[serde(default = "default_max_records_per_device")]
    pub max_records_per_device: usize,
}

fn default_fragment_retention_secs() -> u64 {
    3600 // 1 hour
}

fn default_sweep_interval_secs() -> u64 {
    300 // 5 minutes
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_snapshot_interval_secs() -> u64 {
    300
}

fn default_offline_threshold_secs() -> u64 {
    60
}

fn default_replay_buffer_size() -> usize {
    500
}

fn default_max_records_per_device() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fragment_retention_secs: default_fragment_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            debounce_ms: default_debounce_ms(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            offline_threshold_secs: default_offline_threshold_secs(),
            replay_buffer_size: default_replay_buffer_size(),
            max_records_per_device: default_max_records_per_device(),
        }
    }
}

impl EngineConfig {
    /// Fragment retention as a [`Duration`].
    pub fn fragment_retention(&self) -> Duration {
        Duration::from_secs(self.fragment_retention_secs)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Debounce window as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Snapshot interval as a [`Duration`].
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    /// Offline threshold as a [`Duration`].
    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fragment_retention_secs, 3600);
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.replay_buffer_size, 500);
    }

    #[test]
    fn test_partial_deserialization() {
        // Missing fields fall back to defaults
        let config: EngineConfig = serde_json::from_str(r#"{"debounce_ms": 250}"#).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.sweep_interval_secs, 300);
    }
}
