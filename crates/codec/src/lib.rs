//! # mijiableht-codec
//!
//! Pure MiBeacon service-data decoder (§4.1). Raw advertisement bytes in,
//! typed [`PartialReading`]s out — no I/O, no BLE dependency. Depends only
//! on `mijiableht-domain`.

pub mod error;

use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::DeviceModel;
use mijiableht_domain::reading::PartialReading;
use mijiableht_domain::time::Timestamp;

pub use error::CodecFailure;

/// Xiaomi MiBeacon 16-bit service-data UUID (§4.1, §6).
pub const SERVICE_UUID_FE95: u16 = 0xFE95;

const HEADER_LEN: usize = 11;
const FRAME_CONTROL_ENCRYPTED_BIT: u16 = 0x0008;
const FRAME_CONTROL_CAPABILITY_BIT: u16 = 0x0020;

const PRODUCT_ID_LYWSDCGQ: u16 = 0x045B;
const PRODUCT_ID_LYWSD03MMC: u16 = 0x055B;

const TLV_TEMPERATURE: u16 = 0x1004;
const TLV_HUMIDITY: u16 = 0x1006;
const TLV_BATTERY: u16 = 0x100A;
const TLV_TEMPERATURE_HUMIDITY: u16 = 0x100D;
const TLV_VOLTAGE: u16 = 0x100B;

/// Everything the codec can determine from one frame: the decoded
/// readings (zero or one, TLVs having been merged per §4.1's "last
/// occurrence wins" rule), the inferred device model, and the frame
/// counter (byte 4) — callers use the latter only to suppress
/// exact-duplicate repeats within a 2-second window (§4.1); the codec
/// itself does not interpret it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub readings: Vec<PartialReading>,
    pub device_model: DeviceModel,
    pub frame_counter: u8,
}

/// Decode a MiBeacon service-data payload (§4.1).
///
/// `adv_mac` is the MAC address reported by the BLE advertisement itself,
/// used to cross-check the MAC embedded in the frame.
///
/// # Errors
///
/// Returns [`CodecFailure`] for encrypted frames, frames shorter than 11
/// bytes, or a MAC mismatch. All three are soft failures: callers should
/// log at DEBUG and treat them as "no readings", never propagate upward.
pub fn decode(adv_mac: MacAddress, data: &[u8], received_at: Timestamp) -> Result<DecodedFrame, CodecFailure> {
    if data.len() < HEADER_LEN {
        return Err(CodecFailure::ShortFrame { len: data.len() });
    }

    let frame_control = u16::from_le_bytes([data[0], data[1]]);
    if frame_control & FRAME_CONTROL_ENCRYPTED_BIT != 0 {
        return Err(CodecFailure::EncryptedFrame);
    }

    let product_id = u16::from_le_bytes([data[2], data[3]]);
    let device_model = match product_id {
        PRODUCT_ID_LYWSDCGQ => DeviceModel::Lywsdcgq,
        PRODUCT_ID_LYWSD03MMC => DeviceModel::Lywsd03mmc,
        _ => DeviceModel::Unknown,
    };
    let frame_counter = data[4];

    let mut embedded_mac = [0u8; 6];
    embedded_mac.copy_from_slice(&data[5..11]);
    embedded_mac.reverse();
    if embedded_mac != adv_mac.bytes() {
        return Err(CodecFailure::BadMac);
    }

    let mut offset = HEADER_LEN;
    if frame_control & FRAME_CONTROL_CAPABILITY_BIT != 0 {
        offset += 1;
    }

    let mut builder = PartialReading::builder().mac(adv_mac).received_at(received_at);

    while offset + 3 <= data.len() {
        let tlv_type = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let len = data[offset + 2] as usize;
        let value_start = offset + 3;
        let value_end = value_start + len;
        if value_end > data.len() {
            // Truncated TLV: stop, keeping whatever was decoded so far.
            break;
        }
        let value = &data[value_start..value_end];
        builder = apply_tlv(builder, tlv_type, value);
        offset = value_end;
    }

    let readings = match builder.build() {
        Ok(reading) => vec![reading],
        Err(_) => vec![],
    };

    Ok(DecodedFrame {
        readings,
        device_model,
        frame_counter,
    })
}

fn apply_tlv(builder: mijiableht_domain::reading::PartialReadingBuilder, tlv_type: u16, value: &[u8]) -> mijiableht_domain::reading::PartialReadingBuilder {
    match tlv_type {
        TLV_TEMPERATURE if value.len() >= 2 => {
            let raw = i16::from_le_bytes([value[0], value[1]]);
            builder.temperature(f64::from(raw) / 10.0)
        }
        TLV_HUMIDITY if value.len() >= 2 => {
            let raw = u16::from_le_bytes([value[0], value[1]]);
            builder.humidity(f64::from(raw) / 10.0)
        }
        TLV_BATTERY if !value.is_empty() => builder.battery(value[0]),
        TLV_TEMPERATURE_HUMIDITY if value.len() >= 4 => {
            let temp_raw = i16::from_le_bytes([value[0], value[1]]);
            let hum_raw = u16::from_le_bytes([value[2], value[3]]);
            builder.temperature(f64::from(temp_raw) / 10.0).humidity(f64::from(hum_raw) / 10.0)
        }
        TLV_VOLTAGE if value.len() >= 2 => {
            let raw = u16::from_le_bytes([value[0], value[1]]);
            builder.voltage_mv(raw)
        }
        // Unknown TLV type, or a known type whose value is shorter than
        // expected: skipped, not fatal (§4.1).
        _ => builder,
    }
}


#[cfg(test)]
fn time_now() -> Timestamp {
    mijiableht_domain::time::now()
}
