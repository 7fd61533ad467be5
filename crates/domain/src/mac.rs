//! BLE MAC address newtype shared by the codec, cache, and both adapters.

use std::fmt;
use std::str::FromStr;

/// A 6-byte BLE device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

/// Returned when a colon-separated MAC string does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address string")]
pub struct ParseMacError;

impl MacAddress {
    #[must_use]
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn bytes(self) -> [u8; 6] {
        self.0
    }

    /// Lowercase slug with no separators, suitable for MQTT topic segments
    /// (the spec's `device_id`, despite the name, is uppercased by the
    /// caller — see [`MacAddress::device_id`]).
    #[must_use]
    pub fn slug(self) -> String {
        let [a, b, c, d, e, f] = self.0;
        format!("{a:02x}{b:02x}{c:02x}{d:02x}{e:02x}{f:02x}")
    }

    /// The MAC uppercased with colons stripped, as used in MQTT topics
    /// (§4.5: `device_id`).
    #[must_use]
    pub fn device_id(self) -> String {
        self.slug().to_uppercase()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, ff] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{ff:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or(ParseMacError)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError)?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError);
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_format_with_colons_uppercase() {
        let mac = MacAddress::new([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
        assert_eq!(mac.to_string(), "A4:C1:38:5B:0E:DF");
    }

    #[test]
    fn should_format_slug_lowercase_no_separators() {
        let mac = MacAddress::new([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]);
        assert_eq!(mac.slug(), "a4c1385b0edf");
    }

    #[test]
    fn should_format_device_id_uppercase_no_separators() {
        let mac = MacAddress::new([0x4C, 0x65, 0xA8, 0xDB, 0x99, 0x44]);
        assert_eq!(mac.device_id(), "4C65A8DB9944");
    }

    #[test]
    fn should_roundtrip_through_display_and_from_str() {
        let mac = MacAddress::new([0x00, 0x01, 0x02, 0x0A, 0x0B, 0x0C]);
        let parsed: MacAddress = mac.to_string().parse().unwrap();
        assert_eq!(mac, parsed);
    }

    #[test]
    fn should_parse_lowercase_hex() {
        let parsed: MacAddress = "a4:c1:38:5b:0e:df".parse().unwrap();
        assert_eq!(parsed, MacAddress::new([0xA4, 0xC1, 0x38, 0x5B, 0x0E, 0xDF]));
    }

    #[test]
    fn should_reject_too_few_octets() {
        let result: Result<MacAddress, _> = "A4:C1:38".parse();
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_too_many_octets() {
        let result: Result<MacAddress, _> = "A4:C1:38:5B:0E:DF:00".parse();
        assert!(result.is_err());
    }

    #[test]
    fn should_reject_non_hex_octet() {
        let result: Result<MacAddress, _> = "ZZ:C1:38:5B:0E:DF".parse();
        assert!(result.is_err());
    }

    #[test]
    fn should_order_macs_byte_lexicographically() {
        let a = MacAddress::new([0, 0, 0, 0, 0, 1]);
        let b = MacAddress::new([0, 0, 0, 0, 0, 2]);
        assert!(a < b);
    }
}
