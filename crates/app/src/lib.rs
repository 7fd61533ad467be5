//! # mijiableht-app
//!
//! Application layer — the stateful core wired between the two adapter
//! crates.
//!
//! ## Responsibilities
//! - [`cache`] — `SensorCache`, the single-writer hub that merges partial
//!   readings into `CompleteReading`s (§4.4). Pure compute, no IO.
//! - [`backoff`] — shared exponential-backoff-with-jitter helper used by
//!   both the BLE scanner's and the MQTT publisher's reconnect logic
//!   (§4.3, §4.5, §7).
//! - [`event_queue`] — the bounded, drop-oldest channel the Scanner posts
//!   advertisement events to (§4.3, §5).
//!
//! ## Dependency rule
//! Depends on `mijiableht-domain` and `mijiableht-codec` only. Never
//! imports adapter crates; adapters depend on this crate, not the reverse.

pub mod backoff;
pub mod cache;
pub mod event_queue;

pub use cache::{DeviceSnapshot, SensorCache};
