//! BLE scanner configuration (§6).

use serde::Deserialize;

/// Configuration for the passive BLE scanner adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Host Bluetooth adapter index (`bluetooth.adapter`).
    pub adapter: usize,
    /// Optional MAC address allowlist (e.g. `["A4:C1:38:AA:BB:CC"]`).
    ///
    /// When empty, every MiBeacon-advertising device is accepted.
    pub device_filter: Vec<String>,
    /// Capacity of the bounded, drop-oldest Scanner→Cache channel (§4.3).
    pub channel_capacity: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            device_filter: Vec::new(),
            channel_capacity: 256,
        }
    }
}

impl BleConfig {
    /// Whether `mac` (colon-separated, any case) passes the configured
    /// filter.
    #[must_use]
    pub fn passes_filter(&self, mac: &str) -> bool {
        self.device_filter.is_empty() || self.device_filter.iter().any(|f| f.eq_ignore_ascii_case(mac))
    }
}
