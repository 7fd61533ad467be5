//! Passive MiBeacon scan loop and reconnect state machine (§4.3).
//!
//! ```text
//! Initial ──start──▶ Scanning ──stop──▶ Stopped
//!                      │
//!                      └─error──▶ Reconnecting ──success──▶ Scanning
//!                                        │
//!                                        └──fatal──▶ Failed
//! ```
//!
//! `start()`/`stop()` in [`crate::BleScanner`] drive this from the outside
//! via `JoinHandle::abort()`; everything below runs inside that spawned
//! task until aborted or until a fatal [`ScannerError`] ends the loop.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager};
use tokio::sync::oneshot;
use tokio_stream::{Stream, StreamExt as _};
use uuid::Uuid;

use mijiableht_app::backoff::Backoff;
use mijiableht_app::event_queue::{EventQueue, ScannerEvent};
use mijiableht_domain::mac::MacAddress;

use crate::config::BleConfig;
use crate::error::ScannerError;

/// MiBeacon service UUID `0xFE95` expanded to the Bluetooth base UUID.
const SERVICE_UUID_FE95: Uuid = Uuid::from_bytes([
    0x00, 0x00, 0xfe, 0x95, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb,
]);

/// Deadline for the "scanner subscribe" sequence — acquiring the manager,
/// the configured adapter, and the event stream, then starting the scan
/// (§5: 10 s).
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the scan loop until a fatal error occurs (or the task is
/// aborted from outside). Sends at most one [`ScannerError`] on `fatal`,
/// only when the loop is giving up for good.
pub(crate) async fn run(config: BleConfig, queue: Arc<EventQueue>, fatal: oneshot::Sender<ScannerError>) {
    let mut backoff = Backoff::default();

    loop {
        match scan_once(&config, &queue, &mut backoff).await {
            Ok(()) => {
                tracing::warn!("BLE scan stream ended unexpectedly, reconnecting");
            }
            Err(err) if err.is_fatal() => {
                tracing::error!(error = %err, "BLE scanner failed fatally");
                let _ = fatal.send(err);
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "BLE scanner transient error, reconnecting");
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "BLE scanner backing off");
        tokio::time::sleep(delay).await;
    }
}

/// Acquires the manager, the configured adapter, and its event stream, and
/// starts the passive scan — the "scanner subscribe" sequence bounded by
/// [`SUBSCRIBE_TIMEOUT`] in [`scan_once`].
async fn subscribe(config: &BleConfig) -> Result<(Adapter, Pin<Box<dyn Stream<Item = CentralEvent> + Send>>), ScannerError> {
    let manager = Manager::new().await.map_err(ScannerError::from)?;
    let adapters = manager.adapters().await.map_err(ScannerError::from)?;
    let central = adapters
        .into_iter()
        .nth(config.adapter)
        .ok_or(ScannerError::AdapterUnavailable(config.adapter))?;

    let events = central.events().await.map_err(ScannerError::from)?;
    central
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID_FE95],
        })
        .await
        .map_err(ScannerError::from)?;

    Ok((central, events))
}

/// Acquires the configured adapter, starts a passive scan, and forwards
/// every MiBeacon advertisement to `queue` until the event stream ends.
async fn scan_once(config: &BleConfig, queue: &EventQueue, backoff: &mut Backoff) -> Result<(), ScannerError> {
    let (central, mut events) = tokio::time::timeout(SUBSCRIBE_TIMEOUT, subscribe(config))
        .await
        .map_err(|_| ScannerError::Transient(btleplug::Error::RuntimeError("scanner subscribe timed out".to_owned())))??;

    backoff.reset();
    tracing::info!(adapter = config.adapter, "BLE scanner started passive scan");

    while let Some(event) = events.next().await {
        let CentralEvent::ServiceDataAdvertisement { id, service_data } = event else {
            continue;
        };
        for (uuid, data) in service_data {
            if uuid != SERVICE_UUID_FE95 {
                continue;
            }
            let Ok(peripheral) = central.peripheral(&id).await else {
                continue;
            };
            let mac_str = peripheral.address().to_string();
            if !config.passes_filter(&mac_str) {
                tracing::debug!(mac = %mac_str, "filtered out by device_filter");
                continue;
            }
            let Ok(mac) = mac_str.parse::<MacAddress>() else {
                tracing::debug!(mac = %mac_str, "advertiser MAC did not parse, skipping");
                continue;
            };
            let rssi = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|props| props.rssi)
                .map(clamp_rssi);

            queue.push(ScannerEvent {
                mac,
                rssi,
                service_data: data,
                received_at: mijiableht_domain::time::now(),
            });
        }
    }

    let _ = central.stop_scan().await;
    Ok(())
}

fn clamp_rssi(rssi: i16) -> i8 {
    rssi.clamp(i16::from(i8::MIN), i16::from(i8::MAX)) as i8
}
