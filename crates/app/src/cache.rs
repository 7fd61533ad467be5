//! `SensorCache` — the single-writer hub described in §4.4. Merges partial
//! readings into `CompleteReading`s and decides when to publish.

use std::collections::HashMap;

use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::time::Timestamp;
use mijiableht_domain::{CompleteReading, DeviceModel, DeviceRecord};

/// Diagnostic, read-only view of one cached device (§4.4 `snapshot()`).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub mac: MacAddress,
    pub friendly_name: Option<String>,
    pub device_model: DeviceModel,
    pub is_complete: bool,
    pub first_seen: Timestamp,
}

/// Window within which a repeated frame counter for the same MAC is an
/// exact-duplicate advertisement repeat, not a new observation (§4.1).
fn duplicate_window() -> chrono::Duration {
    chrono::Duration::seconds(2)
}

/// One `DeviceRecord` per MAC, with the threshold/period policy applied
/// uniformly to every device (§4.4, §6).
pub struct SensorCache {
    records: HashMap<MacAddress, DeviceRecord>,
    friendly_names: HashMap<MacAddress, String>,
    last_frames: HashMap<MacAddress, (u8, Timestamp)>,
    delta_temperature: f64,
    delta_humidity: f64,
    publish_interval: chrono::Duration,
}

impl SensorCache {
    #[must_use]
    pub fn new(delta_temperature: f64, delta_humidity: f64, publish_interval: chrono::Duration) -> Self {
        Self {
            records: HashMap::new(),
            friendly_names: HashMap::new(),
            last_frames: HashMap::new(),
            delta_temperature,
            delta_humidity,
            publish_interval,
        }
    }

    /// Register a `friendly_name` for a MAC, from `devices.static_devices[]`
    /// (§6). Applies immediately to an existing record, and to any record
    /// created later for the same MAC.
    pub fn configure_friendly_name(&mut self, mac: MacAddress, friendly_name: String) {
        if let Some(record) = self.records.get_mut(&mac) {
            record.set_friendly_name(Some(friendly_name.clone()));
        }
        self.friendly_names.insert(mac, friendly_name);
    }

    /// Ingest one scanner observation (§4.4 ingest pipeline).
    ///
    /// Runs the codec on `service_data`; if it yields nothing, only
    /// `rssi`/`last_seen` are updated. A repeated frame counter for the
    /// same MAC within a 2-second window is treated as an exact-duplicate
    /// advertisement repeat and ignored entirely (§4.1), not observed.
    /// Returns a [`CompleteReading`] when the emit decision fires.
    pub fn ingest(&mut self, mac: MacAddress, rssi: Option<i8>, service_data: &[u8], received_at: Timestamp) -> Option<CompleteReading> {
        let (reading, device_model) = match mijiableht_codec::decode(mac, service_data, received_at) {
            Ok(frame) => {
                if self.is_duplicate_repeat(mac, frame.frame_counter, received_at) {
                    tracing::debug!(%mac, frame_counter = frame.frame_counter, "duplicate frame counter within 2s window, ignoring");
                    return None;
                }
                self.last_frames.insert(mac, (frame.frame_counter, received_at));
                (frame.readings.into_iter().next(), Some(frame.device_model))
            }
            Err(failure) => {
                tracing::debug!(%mac, error = %failure, "codec rejected frame");
                (None, None)
            }
        };

        let friendly_name = self.friendly_names.get(&mac).cloned();
        let delta_temperature = self.delta_temperature;
        let delta_humidity = self.delta_humidity;
        let publish_interval = self.publish_interval;

        let record = self.records.entry(mac).or_insert_with(|| DeviceRecord::new(mac, received_at));
        if record.friendly_name().is_none() {
            if let Some(name) = friendly_name {
                record.set_friendly_name(Some(name));
            }
        }
        if let Some(model) = device_model {
            record.set_device_model(model);
        }
        record.observe(reading.as_ref(), rssi, received_at);
        record.try_emit(received_at, delta_temperature, delta_humidity, publish_interval)
    }

    /// Surface any periodic heartbeats that have come due, independent of
    /// new advertisements arriving (§4.4 `tick`).
    pub fn tick(&mut self, now: Timestamp) -> Vec<CompleteReading> {
        let delta_temperature = self.delta_temperature;
        let delta_humidity = self.delta_humidity;
        let publish_interval = self.publish_interval;
        self.records
            .values_mut()
            .filter_map(|record| record.try_emit(now, delta_temperature, delta_humidity, publish_interval))
            .collect()
    }

    /// Whether `frame_counter` repeats the last one seen for `mac` inside
    /// the 2-second duplicate window (§4.1).
    fn is_duplicate_repeat(&self, mac: MacAddress, frame_counter: u8, received_at: Timestamp) -> bool {
        self.last_frames
            .get(&mac)
            .is_some_and(|(last_counter, last_at)| *last_counter == frame_counter && received_at - *last_at < duplicate_window())
    }

    /// Diagnostic-only list of every cached device.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        self.records
            .values()
            .map(|record| DeviceSnapshot {
                mac: record.mac(),
                friendly_name: record.friendly_name().map(ToOwned::to_owned),
                device_model: record.device_model(),
                is_complete: record.is_complete(),
                first_seen: record.first_seen(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TLV_TEMPERATURE: u16 = 0x1004;
    const TLV_HUMIDITY: u16 = 0x1006;
    const TLV_BATTERY: u16 = 0x100A;
    const PRODUCT_ID_LYWSD03MMC: u16 = 0x055B;

    fn mac() -> MacAddress {
        MacAddress::new([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF])
    }

    fn frame(tlvs: &[(u16, Vec<u8>)]) -> Vec<u8> {
        frame_with_counter(0x01, tlvs)
    }

    fn frame_with_counter(frame_counter: u8, tlvs: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut data = vec![0u8, 0u8];
        data.extend_from_slice(&PRODUCT_ID_LYWSD03MMC.to_le_bytes());
        data.push(frame_counter);
        let mut mac_le = mac().bytes();
        mac_le.reverse();
        data.extend_from_slice(&mac_le);
        for (tlv_type, value) in tlvs {
            data.extend_from_slice(&tlv_type.to_le_bytes());
            data.push(u8::try_from(value.len()).unwrap());
            data.extend_from_slice(value);
        }
        data
    }

    fn default_cache() -> SensorCache {
        SensorCache::new(0.2, 1.0, chrono::Duration::seconds(300))
    }

    #[test]
    fn should_not_emit_until_temperature_humidity_and_battery_are_all_known() {
        let mut cache = default_cache();
        let now = mijiableht_domain::time::now();
        let data = frame(&[(TLV_TEMPERATURE, 220i16.to_le_bytes().to_vec())]);
        let result = cache.ingest(mac(), Some(-60), &data, now);
        assert!(result.is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn should_emit_complete_reading_once_all_three_fields_observed() {
        let mut cache = default_cache();
        let now = mijiableht_domain::time::now();
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x01, &[(TLV_TEMPERATURE, 220i16.to_le_bytes().to_vec())]), now);
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x02, &[(TLV_HUMIDITY, 450u16.to_le_bytes().to_vec())]), now);
        let result = cache.ingest(mac(), Some(-60), &frame_with_counter(0x03, &[(TLV_BATTERY, vec![80])]), now);
        let reading = result.unwrap();
        assert_eq!(reading.temperature, 22.0);
        assert_eq!(reading.humidity, 45.0);
        assert_eq!(reading.battery, 80);
    }

    #[test]
    fn should_update_rssi_only_when_codec_yields_nothing() {
        let mut cache = default_cache();
        let now = mijiableht_domain::time::now();
        let malformed = vec![0u8; 5];
        let result = cache.ingest(mac(), Some(-65), &malformed, now);
        assert!(result.is_none());
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].is_complete);
    }

    #[test]
    fn should_apply_configured_friendly_name_to_new_records() {
        let mut cache = default_cache();
        cache.configure_friendly_name(mac(), "Living Room".to_owned());
        let now = mijiableht_domain::time::now();
        cache.ingest(mac(), Some(-60), &frame(&[(TLV_BATTERY, vec![80])]), now);
        let snapshot = cache.snapshot();
        assert_eq!(snapshot[0].friendly_name.as_deref(), Some("Living Room"));
    }

    #[test]
    fn should_surface_periodic_heartbeat_via_tick() {
        let mut cache = default_cache();
        let t0 = mijiableht_domain::time::now();
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x01, &[(TLV_TEMPERATURE, 220i16.to_le_bytes().to_vec())]), t0);
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x02, &[(TLV_HUMIDITY, 450u16.to_le_bytes().to_vec())]), t0);
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x03, &[(TLV_BATTERY, vec![80])]), t0);

        let t1 = t0 + chrono::Duration::seconds(301);
        let emitted = cache.tick(t1);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].message_type, mijiableht_domain::MessageType::Periodic);
    }

    #[test]
    fn should_track_distinct_devices_separately() {
        let mut cache = default_cache();
        let now = mijiableht_domain::time::now();
        let other_mac = MacAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        cache.ingest(mac(), Some(-60), &frame(&[(TLV_BATTERY, vec![80])]), now);

        let mut other_frame = vec![0u8, 0u8];
        other_frame.extend_from_slice(&PRODUCT_ID_LYWSD03MMC.to_le_bytes());
        other_frame.push(0x01);
        let mut other_mac_le = other_mac.bytes();
        other_mac_le.reverse();
        other_frame.extend_from_slice(&other_mac_le);
        other_frame.extend_from_slice(&TLV_BATTERY.to_le_bytes());
        other_frame.push(1);
        other_frame.push(50);

        cache.ingest(other_mac, Some(-60), &other_frame, now);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn should_suppress_repeated_frame_counter_within_two_seconds() {
        let mut cache = default_cache();
        let t0 = mijiableht_domain::time::now();
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x05, &[(TLV_BATTERY, vec![80])]), t0);

        let t1 = t0 + chrono::Duration::milliseconds(500);
        let result = cache.ingest(mac(), Some(-61), &frame_with_counter(0x05, &[(TLV_BATTERY, vec![90])]), t1);

        assert!(result.is_none());
        let snapshot = cache.snapshot();
        // the repeat never reached `observe`, so rssi/battery weren't touched
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn should_not_suppress_repeated_frame_counter_after_the_window_elapses() {
        let mut cache = default_cache();
        let t0 = mijiableht_domain::time::now();
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x05, &[(TLV_TEMPERATURE, 220i16.to_le_bytes().to_vec())]), t0);

        let t1 = t0 + chrono::Duration::seconds(3);
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x05, &[(TLV_HUMIDITY, 450u16.to_le_bytes().to_vec())]), t1);
        let result = cache.ingest(mac(), Some(-60), &frame_with_counter(0x06, &[(TLV_BATTERY, vec![80])]), t1);

        let reading = result.unwrap();
        assert_eq!(reading.temperature, 22.0);
        assert_eq!(reading.humidity, 45.0);
    }

    #[test]
    fn should_not_suppress_a_different_frame_counter_within_the_window() {
        let mut cache = default_cache();
        let t0 = mijiableht_domain::time::now();
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x05, &[(TLV_TEMPERATURE, 220i16.to_le_bytes().to_vec())]), t0);

        let t1 = t0 + chrono::Duration::milliseconds(500);
        cache.ingest(mac(), Some(-60), &frame_with_counter(0x06, &[(TLV_HUMIDITY, 450u16.to_le_bytes().to_vec())]), t1);
        let result = cache.ingest(mac(), Some(-60), &frame_with_counter(0x07, &[(TLV_BATTERY, vec![80])]), t1);

        let reading = result.unwrap();
        assert_eq!(reading.temperature, 22.0);
        assert_eq!(reading.humidity, 45.0);
    }

    #[test]
    fn should_not_suppress_the_same_frame_counter_for_a_different_mac() {
        let mut cache = default_cache();
        let now = mijiableht_domain::time::now();
        let other_mac = MacAddress::new([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

        cache.ingest(mac(), Some(-60), &frame_with_counter(0x05, &[(TLV_BATTERY, vec![80])]), now);

        let mut other_frame = vec![0u8, 0u8];
        other_frame.extend_from_slice(&PRODUCT_ID_LYWSD03MMC.to_le_bytes());
        other_frame.push(0x05);
        let mut other_mac_le = other_mac.bytes();
        other_mac_le.reverse();
        other_frame.extend_from_slice(&other_mac_le);
        other_frame.extend_from_slice(&TLV_BATTERY.to_le_bytes());
        other_frame.push(1);
        other_frame.push(50);

        cache.ingest(other_mac, Some(-60), &other_frame, now);
        assert_eq!(cache.len(), 2);
    }
}
