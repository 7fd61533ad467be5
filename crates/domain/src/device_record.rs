//! `DeviceRecord` — the cache's one stateful entity per MAC, and the
//! `CompleteReading` it emits (§3, §4.4).

use crate::mac::MacAddress;
use crate::reading::PartialReading;
use crate::signal::{self, SignalLabel};
use crate::stats::ValueStatistics;
use crate::time::Timestamp;

/// Sensor model inferred from the MiBeacon product ID (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    Lywsd03mmc,
    Lywsdcgq,
    /// Product ID present but not one of the two known models; still
    /// ingested and published normally (§4.4 Failure modes).
    Unknown,
}

impl DeviceModel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lywsd03mmc => "LYWSD03MMC",
            Self::Lywsdcgq => "LYWSDCGQ",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a `CompleteReading` was emitted (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ThresholdBased,
    Periodic,
}

impl MessageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThresholdBased => "threshold-based",
            Self::Periodic => "periodic",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frozen view of a [`ValueStatistics`] taken at publish time, before the
/// source is reset to zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub count: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

impl From<ValueStatistics> for StatsSnapshot {
    fn from(stats: ValueStatistics) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            avg: stats.avg(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LatestValues {
    temperature: Option<f64>,
    humidity: Option<f64>,
    battery: Option<u8>,
    voltage_mv: Option<u16>,
    rssi: Option<i8>,
    last_seen: Option<Timestamp>,
}

impl LatestValues {
    fn is_complete(&self) -> bool {
        self.temperature.is_some() && self.humidity.is_some() && self.battery.is_some()
    }
}

/// A publish-ready, fully-populated reading (§3). Consumed by the publisher
/// and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteReading {
    pub mac: MacAddress,
    pub friendly_name: Option<String>,
    pub device_model: DeviceModel,
    pub temperature: f64,
    pub humidity: f64,
    pub battery: u8,
    pub voltage_mv: Option<u16>,
    pub rssi: Option<i8>,
    pub signal: SignalLabel,
    pub last_seen: Timestamp,
    pub message_type: MessageType,
    pub temperature_stats: StatsSnapshot,
    pub humidity_stats: StatsSnapshot,
    pub battery_stats: StatsSnapshot,
    pub rssi_stats: StatsSnapshot,
}

/// Per-MAC cache entry. Owned exclusively by the cache (single writer);
/// never destroyed during a run.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    mac: MacAddress,
    friendly_name: Option<String>,
    device_model: DeviceModel,
    latest: LatestValues,
    last_published_values: Option<(f64, f64)>,
    last_publish_at: Option<Timestamp>,
    first_seen: Timestamp,
    temperature_stats: ValueStatistics,
    humidity_stats: ValueStatistics,
    battery_stats: ValueStatistics,
    rssi_stats: ValueStatistics,
}

impl DeviceRecord {
    #[must_use]
    pub fn new(mac: MacAddress, first_seen: Timestamp) -> Self {
        Self {
            mac,
            friendly_name: None,
            device_model: DeviceModel::Unknown,
            latest: LatestValues::default(),
            last_published_values: None,
            last_publish_at: None,
            first_seen,
            temperature_stats: ValueStatistics::new(),
            humidity_stats: ValueStatistics::new(),
            battery_stats: ValueStatistics::new(),
            rssi_stats: ValueStatistics::new(),
        }
    }

    #[must_use]
    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    #[must_use]
    pub fn first_seen(&self) -> Timestamp {
        self.first_seen
    }

    #[must_use]
    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    #[must_use]
    pub fn device_model(&self) -> DeviceModel {
        self.device_model
    }

    pub fn set_friendly_name(&mut self, name: Option<String>) {
        self.friendly_name = name;
    }

    pub fn set_device_model(&mut self, model: DeviceModel) {
        self.device_model = model;
    }

    /// Update `rssi`/`last_seen` and, if a reading decoded, merge its
    /// fields into `latest` and feed every touched `ValueStatistics`
    /// (§4.4 ingest pipeline, steps 1 and 3).
    pub fn observe(&mut self, reading: Option<&PartialReading>, rssi: Option<i8>, received_at: Timestamp) {
        self.latest.last_seen = Some(received_at);
        if let Some(rssi) = rssi {
            self.latest.rssi = Some(rssi);
            self.rssi_stats.observe(f64::from(rssi));
        }

        let Some(reading) = reading else {
            return;
        };
        if let Some(t) = reading.temperature {
            self.latest.temperature = Some(t);
            self.temperature_stats.observe(t);
        }
        if let Some(h) = reading.humidity {
            self.latest.humidity = Some(h);
            self.humidity_stats.observe(h);
        }
        if let Some(b) = reading.battery {
            self.latest.battery = Some(b);
            self.battery_stats.observe(f64::from(b));
        }
        if let Some(v) = reading.voltage_mv {
            self.latest.voltage_mv = Some(v);
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.latest.is_complete()
    }

    /// Decide whether `latest` (assumed complete) should be emitted at
    /// `now`, and as which [`MessageType`], per §4.4's emit decision.
    /// Threshold-based wins when both conditions hold on the same event.
    fn decide(&self, now: Timestamp, delta_temperature: f64, delta_humidity: f64, period: chrono::Duration) -> Option<MessageType> {
        let Some((last_t, last_h)) = self.last_published_values else {
            return Some(MessageType::ThresholdBased);
        };
        let t = self.latest.temperature.expect("is_complete checked by caller");
        let h = self.latest.humidity.expect("is_complete checked by caller");
        if (t - last_t).abs() >= delta_temperature || (h - last_h).abs() >= delta_humidity {
            return Some(MessageType::ThresholdBased);
        }
        let since_last = self
            .last_publish_at
            .map_or(chrono::Duration::max_value(), |last| now - last);
        if since_last >= period {
            return Some(MessageType::Periodic);
        }
        None
    }

    /// Evaluate the emit decision at `now` and, if it fires, snapshot
    /// statistics, construct the [`CompleteReading`], and call
    /// [`DeviceRecord::mark_published`] — all as one atomic step, so an
    /// external observer never sees a half-reset state.
    #[must_use]
    pub fn try_emit(&mut self, now: Timestamp, delta_temperature: f64, delta_humidity: f64, period: chrono::Duration) -> Option<CompleteReading> {
        if !self.is_complete() {
            return None;
        }
        let message_type = self.decide(now, delta_temperature, delta_humidity, period)?;

        let reading = CompleteReading {
            mac: self.mac,
            friendly_name: self.friendly_name.clone(),
            device_model: self.device_model,
            temperature: self.latest.temperature.expect("checked by is_complete"),
            humidity: self.latest.humidity.expect("checked by is_complete"),
            battery: self.latest.battery.expect("checked by is_complete"),
            voltage_mv: self.latest.voltage_mv,
            rssi: self.latest.rssi,
            signal: signal::classify(self.latest.rssi),
            last_seen: self.latest.last_seen.unwrap_or(now),
            message_type,
            temperature_stats: self.temperature_stats.into(),
            humidity_stats: self.humidity_stats.into(),
            battery_stats: self.battery_stats.into(),
            rssi_stats: self.rssi_stats.into(),
        };

        self.mark_published(now);
        Some(reading)
    }

    /// Reset `last_published_values`/`last_publish_at` and zero every
    /// statistic — the interval they describe starts over from `now`.
    fn mark_published(&mut self, now: Timestamp) {
        self.last_published_values = Some((
            self.latest.temperature.expect("only called after emitting a complete reading"),
            self.latest.humidity.expect("only called after emitting a complete reading"),
        ));
        self.last_publish_at = Some(now);
        self.temperature_stats.reset();
        self.humidity_stats.reset();
        self.battery_stats.reset();
        self.rssi_stats.reset();
    }
}
