//! `PartialReading` — a subset of {T, H, B, V} emitted by the codec for a
//! single MiBeacon advertisement.

use crate::error::ValidationError;
use crate::mac::MacAddress;
use crate::time::Timestamp;

const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -40.0..=85.0;
const HUMIDITY_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// A decoded subset of a device's fields from one advertisement.
///
/// At least one of `temperature`, `humidity`, `battery`, `voltage_mv` is
/// `Some` — [`PartialReading::build`] rejects an all-`None` reading and any
/// out-of-range value (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialReading {
    pub mac: MacAddress,
    pub received_at: Timestamp,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<u8>,
    pub voltage_mv: Option<u16>,
}

/// Step-by-step builder for [`PartialReading`], mirroring the rest of the
/// workspace's builder-with-validation convention.
#[derive(Debug, Default)]
pub struct PartialReadingBuilder {
    mac: Option<MacAddress>,
    received_at: Option<Timestamp>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    battery: Option<u8>,
    voltage_mv: Option<u16>,
}

impl PartialReading {
    #[must_use]
    pub fn builder() -> PartialReadingBuilder {
        PartialReadingBuilder::default()
    }
}

impl PartialReadingBuilder {
    #[must_use]
    pub fn mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    #[must_use]
    pub fn received_at(mut self, received_at: Timestamp) -> Self {
        self.received_at = Some(received_at);
        self
    }

    #[must_use]
    pub fn temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    #[must_use]
    pub fn humidity(mut self, percent_rh: f64) -> Self {
        self.humidity = Some(percent_rh);
        self
    }

    #[must_use]
    pub fn battery(mut self, percent: u8) -> Self {
        self.battery = Some(percent);
        self
    }

    #[must_use]
    pub fn voltage_mv(mut self, mv: u16) -> Self {
        self.voltage_mv = Some(mv);
        self
    }

    /// Validate ranges and non-emptiness, then construct the reading.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when every field is `None`, or when a
    /// present field falls outside its declared range.
    pub fn build(self) -> Result<PartialReading, ValidationError> {
        if let Some(t) = self.temperature {
            if !TEMPERATURE_RANGE.contains(&t) {
                return Err(ValidationError::TemperatureOutOfRange(t));
            }
        }
        if let Some(h) = self.humidity {
            if !HUMIDITY_RANGE.contains(&h) {
                return Err(ValidationError::HumidityOutOfRange(h));
            }
        }
        if let Some(b) = self.battery {
            if b > 100 {
                return Err(ValidationError::BatteryOutOfRange(b));
            }
        }
        if self.temperature.is_none()
            && self.humidity.is_none()
            && self.battery.is_none()
            && self.voltage_mv.is_none()
        {
            return Err(ValidationError::Empty);
        }

        Ok(PartialReading {
            mac: self.mac.unwrap_or(MacAddress::new([0; 6])),
            received_at: self.received_at.unwrap_or_else(crate::time::now),
            temperature: self.temperature,
            humidity: self.humidity,
            battery: self.battery,
            voltage_mv: self.voltage_mv,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> MacAddress {
        MacAddress::new([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF])
    }

    #[test]
    fn should_build_reading_with_single_field() {
        let reading = PartialReading::builder()
            .mac(mac())
            .received_at(crate::time::now())
            .temperature(22.5)
            .build()
            .unwrap();
        assert_eq!(reading.temperature, Some(22.5));
        assert_eq!(reading.humidity, None);
    }

    #[test]
    fn should_build_combo_reading_with_both_fields() {
        let reading = PartialReading::builder()
            .mac(mac())
            .received_at(crate::time::now())
            .temperature(23.5)
            .humidity(45.2)
            .build()
            .unwrap();
        assert_eq!(reading.temperature, Some(23.5));
        assert_eq!(reading.humidity, Some(45.2));
    }

    #[test]
    fn should_reject_empty_reading() {
        let result = PartialReading::builder().mac(mac()).build();
        assert_eq!(result.unwrap_err(), ValidationError::Empty);
    }

    #[test]
    fn should_accept_temperature_boundary_values() {
        assert!(
            PartialReading::builder()
                .mac(mac())
                .temperature(-40.0)
                .build()
                .is_ok()
        );
        assert!(
            PartialReading::builder()
                .mac(mac())
                .temperature(85.0)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn should_reject_temperature_just_outside_boundary() {
        assert!(
            PartialReading::builder()
                .mac(mac())
                .temperature(-40.1)
                .build()
                .is_err()
        );
        assert!(
            PartialReading::builder()
                .mac(mac())
                .temperature(85.1)
                .build()
                .is_err()
        );
    }

    #[test]
    fn should_reject_humidity_out_of_range() {
        let result = PartialReading::builder().mac(mac()).humidity(100.1).build();
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_battery_out_of_range() {
        let result = PartialReading::builder().mac(mac()).battery(101).build();
        assert!(result.is_err());
    }

    #[test]
    fn should_accept_battery_boundary_values() {
        assert!(PartialReading::builder().mac(mac()).battery(0).build().is_ok());
        assert!(PartialReading::builder().mac(mac()).battery(100).build().is_ok());
    }

    #[test]
    fn should_build_voltage_only_reading() {
        let reading = PartialReading::builder().mac(mac()).voltage_mv(2980).build().unwrap();
        assert_eq!(reading.voltage_mv, Some(2980));
    }
}
