//! # mijiableht-domain
//!
//! Pure domain model for the mijiableht BLE-to-MQTT daemon.
//!
//! ## Responsibilities
//! - Foundational types: MAC addresses, error conventions, timestamps
//! - Define the sensor reading model: `PartialReading`, `ValueStatistics`,
//!   `DeviceRecord`, `CompleteReading`
//! - Classify RSSI into a qualitative signal label
//! - Contain all invariant enforcement (range checks, emit-decision policy)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**. It must never import
//! anything from `app`, adapters, or external IO crates. All IO boundaries
//! (the BLE adapter, the MQTT adapter) live downstream and depend on this
//! crate, not the other way around.

pub mod error;
pub mod mac;
pub mod reading;
pub mod signal;
pub mod stats;
pub mod time;

mod device_record;

pub use device_record::{CompleteReading, DeviceModel, DeviceRecord, MessageType, StatsSnapshot};
